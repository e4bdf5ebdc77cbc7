use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, PathRejection},
        FromRequest, FromRequestParts, Path, Request,
    },
    http::{request::Parts, StatusCode},
    Json,
};
use serde::de::DeserializeOwned;

use crate::errors::{ApiFailure, MessageBody};
use crate::log_validation;

/// JSON body extractor whose rejections use the `{ message }` error body.
#[derive(Debug, Clone)]
pub struct AppJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for AppJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiFailure;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(AppJson(value)),
            Err(rejection) => Err(reject_body(rejection)),
        }
    }
}

fn reject_body(rejection: JsonRejection) -> ApiFailure {
    log_validation!(failure, "request_body", error = &rejection);
    let message = match rejection {
        JsonRejection::MissingJsonContentType(_) => "Request body must be JSON".to_string(),
        JsonRejection::JsonSyntaxError(_) => "Malformed JSON in request body".to_string(),
        other => other.body_text(),
    };
    (StatusCode::BAD_REQUEST, Json(MessageBody::new(message)))
}

/// Path extractor whose rejections use the `{ message }` error body.
#[derive(Debug, Clone)]
pub struct AppPath<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for AppPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiFailure;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(AppPath(value)),
            Err(rejection) => Err(reject_path(rejection)),
        }
    }
}

fn reject_path(rejection: PathRejection) -> ApiFailure {
    log_validation!(failure, "request_path", error = &rejection);
    (rejection.status(), Json(MessageBody::new(rejection.body_text())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::header::CONTENT_TYPE};
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Named {
        #[allow(dead_code)]
        name: String,
    }

    async fn extract(content_type: Option<&str>, body: &'static str) -> Result<AppJson<Named>, ApiFailure> {
        let mut builder = Request::builder().method("POST").uri("/");
        if let Some(content_type) = content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        let request = builder.body(Body::from(body)).unwrap();
        AppJson::<Named>::from_request(request, &()).await
    }

    #[tokio::test]
    async fn test_body_rejections_become_messages() {
        assert!(extract(Some("application/json"), r#"{"name":"Asha"}"#).await.is_ok());

        let (status, body) = extract(None, r#"{"name":"Asha"}"#).await.unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.0.message, "Request body must be JSON");

        let (status, body) = extract(Some("application/json"), "{not json").await.unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.0.message, "Malformed JSON in request body");

        let (status, body) = extract(Some("application/json"), "{}").await.unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.0.message.contains("missing field `name`"));
    }
}
