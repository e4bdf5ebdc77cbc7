use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{delete, get, post, put},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    account_service::AccountService,
    ai_service::AiService,
    auth::{AdminUser, AuthUser, JwtService, StaffUser, StudentUser, TeacherUser},
    classroom_service::ClassroomService,
    config::Config,
    database::Database,
    email_service::Mailer,
    errors::{ApiError, ApiFailure, ErrorContext, MessageBody},
    extractors::{AppJson, AppPath},
    learning_service::LearningService,
    models::*,
};

use crate::{log_api_start, log_api_success, log_api_warn};

#[derive(Clone)]
pub struct AppState {
    pub accounts: AccountService,
    pub learning: LearningService,
    pub classroom: ClassroomService,
    pub ai_service: AiService,
}

impl AppState {
    pub fn new(db: Database, config: &Config, mailer: Arc<dyn Mailer>) -> Self {
        let jwt = JwtService::new(&config.auth.jwt_secret, config.auth.token_ttl_days);
        Self {
            accounts: AccountService::new(
                db.clone(),
                jwt,
                mailer,
                config.email.frontend_url.clone(),
            ),
            learning: LearningService::new(db.clone()),
            classroom: ClassroomService::new(db),
            ai_service: AiService::new(&config.ai),
        }
    }
}

type ApiResult<T> = Result<Json<T>, ApiFailure>;
type CreatedResult<T> = Result<(StatusCode, Json<T>), ApiFailure>;

fn respond<T>(result: Result<T, ApiError>, context: ErrorContext) -> ApiResult<T> {
    result
        .map(Json)
        .map_err(|e| e.to_response_with_context(context))
}

fn created<T>(result: Result<T, ApiError>, context: ErrorContext) -> CreatedResult<T> {
    respond(result, context).map(|body| (StatusCode::CREATED, body))
}

fn message(text: &str) -> Json<MessageBody> {
    Json(MessageBody::new(text))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

// Auth endpoints
pub async fn register(
    State(state): State<AppState>,
    AppJson(request): AppJson<RegisterRequest>,
) -> CreatedResult<AuthResponse> {
    log_api_start!("register");
    created(
        state.accounts.register(request).await,
        ErrorContext::new("register", "user"),
    )
}

pub async fn login(
    State(state): State<AppState>,
    AppJson(request): AppJson<LoginRequest>,
) -> ApiResult<AuthResponse> {
    log_api_start!("login");
    respond(
        state.accounts.login(request).await,
        ErrorContext::new("login", "user"),
    )
}

pub async fn forgot_password(
    State(state): State<AppState>,
    AppJson(request): AppJson<ForgotPasswordRequest>,
) -> ApiResult<MessageBody> {
    log_api_start!("forgot_password");
    respond(
        state.accounts.forgot_password(request).await.map(MessageBody::new),
        ErrorContext::new("forgot_password", "user")
            .with_user_message(crate::account_service::RESET_EMAIL_FAILED_MESSAGE),
    )
}

pub async fn reset_password(
    State(state): State<AppState>,
    AppPath(token): AppPath<String>,
    AppJson(request): AppJson<ResetPasswordRequest>,
) -> ApiResult<MessageBody> {
    log_api_start!("reset_password");
    respond(
        state
            .accounts
            .reset_password(&token, request)
            .await
            .map(MessageBody::new),
        ErrorContext::new("reset_password", "user"),
    )
}

// Lesson endpoints
pub async fn list_lessons(State(state): State<AppState>, user: AuthUser) -> ApiResult<Vec<Lesson>> {
    log_api_start!("list_lessons", user_id = user.id());
    let result = state.learning.list_lessons().await;
    if let Ok(lessons) = &result {
        log_api_success!("list_lessons", count = lessons.len(), "lessons listed");
    }
    respond(result, ErrorContext::new("list_lessons", "lesson"))
}

pub async fn create_lesson(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(request): AppJson<CreateLessonRequest>,
) -> CreatedResult<Lesson> {
    log_api_start!("create_lesson", user_id = user.id());
    created(
        state.learning.create_lesson(user.id(), request).await,
        ErrorContext::new("create_lesson", "lesson"),
    )
}

pub async fn get_lesson(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<Uuid>,
) -> ApiResult<Lesson> {
    log_api_start!("get_lesson", user_id = user.id(), resource_id = id);
    respond(
        state.learning.get_lesson(id).await,
        ErrorContext::new("get_lesson", "lesson").with_id(&id.to_string()),
    )
}

pub async fn update_lesson(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<Uuid>,
    AppJson(request): AppJson<UpdateLessonRequest>,
) -> ApiResult<Lesson> {
    log_api_start!("update_lesson", user_id = user.id(), resource_id = id);
    respond(
        state.learning.update_lesson(id, request).await,
        ErrorContext::new("update_lesson", "lesson").with_id(&id.to_string()),
    )
}

pub async fn delete_lesson(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<Uuid>,
) -> ApiResult<MessageBody> {
    log_api_start!("delete_lesson", user_id = user.id(), resource_id = id);
    let result = state.learning.delete_lesson(id).await;
    respond(
        result.map(|_| MessageBody::new("Lesson removed")),
        ErrorContext::new("delete_lesson", "lesson").with_id(&id.to_string()),
    )
}

// Quiz endpoints
pub async fn create_quiz(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(request): AppJson<CreateQuizRequest>,
) -> CreatedResult<Quiz> {
    log_api_start!("create_quiz", user_id = user.id(), resource_id = request.lesson_id);
    created(
        state.learning.create_quiz(user.id(), request).await,
        ErrorContext::new("create_quiz", "quiz"),
    )
}

pub async fn get_quiz_for_lesson(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(lesson_id): AppPath<Uuid>,
) -> ApiResult<Quiz> {
    log_api_start!("get_quiz_for_lesson", user_id = user.id(), resource_id = lesson_id);
    respond(
        state.learning.get_quiz_for_lesson(lesson_id).await,
        ErrorContext::new("get_quiz_for_lesson", "quiz").with_id(&lesson_id.to_string()),
    )
}

// Submission endpoints
pub async fn create_submission(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(request): AppJson<CreateSubmissionRequest>,
) -> CreatedResult<Submission> {
    log_api_start!("create_submission", user_id = user.id(), resource_id = request.quiz_id);
    created(
        state.learning.create_submission(user.id(), request).await,
        ErrorContext::new("create_submission", "submission"),
    )
}

pub async fn list_submissions(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Vec<SubmissionView>> {
    log_api_start!("list_submissions", user_id = user.id());
    respond(
        state.learning.list_submissions(user.id(), user.is_staff()).await,
        ErrorContext::new("list_submissions", "submission"),
    )
}

pub async fn list_lesson_submissions(
    State(state): State<AppState>,
    StaffUser(user): StaffUser,
    AppPath(lesson_id): AppPath<Uuid>,
) -> ApiResult<Vec<SubmissionView>> {
    log_api_start!("list_lesson_submissions", user_id = user.id(), resource_id = lesson_id);
    respond(
        state.learning.list_lesson_submissions(lesson_id).await,
        ErrorContext::new("list_lesson_submissions", "submission").with_id(&lesson_id.to_string()),
    )
}

pub async fn add_feedback(
    State(state): State<AppState>,
    StaffUser(user): StaffUser,
    AppPath(id): AppPath<Uuid>,
    AppJson(request): AppJson<FeedbackRequest>,
) -> ApiResult<Submission> {
    log_api_start!("add_feedback", user_id = user.id(), resource_id = id);
    respond(
        state.learning.add_feedback(id, request).await,
        ErrorContext::new("add_feedback", "submission").with_id(&id.to_string()),
    )
}

// Progress endpoints
pub async fn update_progress(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(request): AppJson<UpdateProgressRequest>,
) -> ApiResult<Progress> {
    log_api_start!("update_progress", user_id = user.id(), resource_id = request.lesson_id);
    respond(
        state.learning.update_progress(user.id(), request).await,
        ErrorContext::new("update_progress", "progress"),
    )
}

pub async fn list_progress(
    State(state): State<AppState>,
    StaffUser(user): StaffUser,
) -> ApiResult<Vec<ProgressView>> {
    log_api_start!("list_progress", user_id = user.id());
    respond(
        state.learning.list_progress().await,
        ErrorContext::new("list_progress", "progress"),
    )
}

pub async fn my_progress(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<ProgressSummary> {
    log_api_start!("my_progress", user_id = user.id());
    respond(
        state.learning.progress_summary(user.id()).await,
        ErrorContext::new("my_progress", "progress"),
    )
}

pub async fn student_progress(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(student_id): AppPath<Uuid>,
) -> ApiResult<Vec<ProgressView>> {
    if !user.is_staff() && user.id() != student_id {
        log_api_warn!("student_progress", user_id = user.id(), "attempt to read another student's progress");
        return Err(ApiError::Forbidden(
            "Not authorized to view this student's progress".to_string(),
        )
        .to_response_with_context(
            ErrorContext::new("student_progress", "progress").with_id(&student_id.to_string()),
        ));
    }
    respond(
        state.learning.student_progress(student_id).await,
        ErrorContext::new("student_progress", "progress").with_id(&student_id.to_string()),
    )
}

// Teacher endpoints
pub async fn list_students(
    State(state): State<AppState>,
    TeacherUser(user): TeacherUser,
) -> ApiResult<Vec<StudentRef>> {
    log_api_start!("list_students", user_id = user.id());
    respond(
        state.classroom.list_students(user.id()).await,
        ErrorContext::new("list_students", "classroom"),
    )
}

pub async fn add_student(
    State(state): State<AppState>,
    TeacherUser(user): TeacherUser,
    AppJson(request): AppJson<AddStudentRequest>,
) -> CreatedResult<StudentRef> {
    log_api_start!("add_student", user_id = user.id());
    created(
        state.classroom.add_student(user.id(), request).await,
        ErrorContext::new("add_student", "classroom"),
    )
}

pub async fn remove_student(
    State(state): State<AppState>,
    TeacherUser(user): TeacherUser,
    AppPath(student_id): AppPath<Uuid>,
) -> ApiResult<MessageBody> {
    log_api_start!("remove_student", user_id = user.id(), resource_id = student_id);
    respond(
        state
            .classroom
            .remove_student(user.id(), student_id)
            .await
            .map(|_| MessageBody::new("Student removed")),
        ErrorContext::new("remove_student", "classroom").with_id(&student_id.to_string()),
    )
}

pub async fn assign_task(
    State(state): State<AppState>,
    TeacherUser(user): TeacherUser,
    AppJson(request): AppJson<AssignTaskRequest>,
) -> CreatedResult<Task> {
    log_api_start!("assign_task", user_id = user.id());
    created(
        state.classroom.assign_task(user.id(), request).await,
        ErrorContext::new("assign_task", "task"),
    )
}

pub async fn list_teacher_tasks(
    State(state): State<AppState>,
    TeacherUser(user): TeacherUser,
) -> ApiResult<Vec<Task>> {
    log_api_start!("list_teacher_tasks", user_id = user.id());
    respond(
        state.classroom.list_teacher_tasks(user.id()).await,
        ErrorContext::new("list_teacher_tasks", "task"),
    )
}

// Admin endpoints
pub async fn list_users(State(state): State<AppState>, AdminUser(user): AdminUser) -> ApiResult<Vec<User>> {
    log_api_start!("list_users", user_id = user.id());
    respond(
        state.accounts.list_users().await,
        ErrorContext::new("list_users", "user"),
    )
}

pub async fn create_user(
    State(state): State<AppState>,
    AdminUser(user): AdminUser,
    AppJson(request): AppJson<CreateUserRequest>,
) -> CreatedResult<User> {
    log_api_start!("create_user", user_id = user.id());
    created(
        state.accounts.create_user(request).await,
        ErrorContext::new("create_user", "user"),
    )
}

pub async fn update_user(
    State(state): State<AppState>,
    AdminUser(user): AdminUser,
    AppPath(id): AppPath<Uuid>,
    AppJson(request): AppJson<UpdateUserRequest>,
) -> ApiResult<User> {
    log_api_start!("update_user", user_id = user.id(), resource_id = id);
    respond(
        state.accounts.update_user(id, request).await,
        ErrorContext::new("update_user", "user").with_id(&id.to_string()),
    )
}

pub async fn delete_user(
    State(state): State<AppState>,
    AdminUser(user): AdminUser,
    AppPath(id): AppPath<Uuid>,
) -> ApiResult<MessageBody> {
    log_api_start!("delete_user", user_id = user.id(), resource_id = id);
    respond(
        state
            .accounts
            .delete_user(id)
            .await
            .map(|_| MessageBody::new("User removed")),
        ErrorContext::new("delete_user", "user").with_id(&id.to_string()),
    )
}

pub async fn list_all_tasks(State(state): State<AppState>, AdminUser(user): AdminUser) -> ApiResult<Vec<Task>> {
    log_api_start!("list_all_tasks", user_id = user.id());
    respond(
        state.classroom.list_all_tasks().await,
        ErrorContext::new("list_all_tasks", "task"),
    )
}

// AI endpoint
pub async fn ai_chat(
    State(state): State<AppState>,
    StudentUser(user): StudentUser,
    AppJson(request): AppJson<ChatRequest>,
) -> ApiResult<ChatResponse> {
    let Some(text) = request.message.as_deref().filter(|m| !m.trim().is_empty()) else {
        return Err((StatusCode::BAD_REQUEST, message("Message is required.")));
    };

    log_api_start!("ai_chat", user_id = user.id());
    respond(
        state
            .ai_service
            .chat(text)
            .await
            .map(|reply| ChatResponse { reply }),
        ErrorContext::new("ai_chat", "ai"),
    )
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        // Auth routes
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/forgot-password", post(forgot_password))
        .route("/api/auth/reset-password/:token", post(reset_password))
        // Lesson routes
        .route("/api/lessons", get(list_lessons).post(create_lesson))
        .route(
            "/api/lessons/:id",
            get(get_lesson).put(update_lesson).delete(delete_lesson),
        )
        // Quiz routes
        .route("/api/quizzes", post(create_quiz))
        .route("/api/quizzes/:lesson_id", get(get_quiz_for_lesson))
        // Submission routes
        .route("/api/submissions", post(create_submission).get(list_submissions))
        .route("/api/submissions/lesson/:lesson_id", get(list_lesson_submissions))
        .route("/api/submissions/:id/feedback", post(add_feedback))
        // Progress routes
        .route("/api/progress", post(update_progress).get(list_progress))
        .route("/api/progress/me", get(my_progress))
        .route("/api/progress/student/:student_id", get(student_progress))
        // Teacher routes
        .route("/api/teacher/students", get(list_students).post(add_student))
        .route("/api/teacher/students/:student_id", delete(remove_student))
        .route("/api/teacher/tasks", post(assign_task).get(list_teacher_tasks))
        // Admin routes
        .route("/api/admin/users", get(list_users).post(create_user))
        .route("/api/admin/users/:id", put(update_user).delete(delete_user))
        .route("/api/admin/tasks", get(list_all_tasks))
        // AI routes
        .route("/api/ai/chat", post(ai_chat))
        .with_state(state)
}
