pub mod account_service;
pub mod ai_service;
pub mod api;
pub mod auth;
pub mod classroom_service;
pub mod config;
pub mod database;
pub mod email_service;
pub mod errors;
pub mod extractors;
pub mod learning_service;
pub mod logging;
pub mod models;
pub mod tracking;
pub mod voice;

#[cfg(test)]
mod tests {
    mod learning_flow_test;
}

pub use account_service::AccountService;
pub use ai_service::AiService;
pub use api::{create_router, AppState};
pub use classroom_service::ClassroomService;
pub use config::Config;
pub use database::Database;
pub use email_service::{DisabledMailer, Mailer, SmtpMailer};
pub use errors::*;
pub use learning_service::LearningService;
pub use models::*;
