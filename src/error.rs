use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde_json::json;
use thiserror::Error;

use crate::model::Role;

/// Failures reported by the remote data gateway.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Invalid login credentials")]
    InvalidCredentials,

    #[error("email rate limit exceeded")]
    RateLimited,

    #[error("Email not confirmed")]
    UnconfirmedEmail,

    #[error("User already registered")]
    DuplicateEmail,

    #[error("No account is registered with that email")]
    UnknownEmail,

    #[error("Reset code is invalid or has expired")]
    InvalidResetCode,

    #[error("Confirmation code is invalid or has expired")]
    InvalidConfirmationCode,

    #[error("Record not found")]
    NotFound,

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("{0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Malformed row: {0}")]
    Decode(#[from] serde_json::Error),
}

impl GatewayError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, GatewayError::RateLimited)
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Everything a user action can fail with. Each variant renders as a
/// user-facing message; none of them are fatal to the process.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("You entered the same {field}")]
    Duplicate { field: &'static str },

    #[error("Too many requests made. Please try again after a few minutes.")]
    RateLimited,

    #[error("Rate limit exceeded after {attempts} attempts. Please try again later.")]
    RetriesExhausted { attempts: u32 },

    #[error("Role mismatch: You cannot sign in as a {requested}.")]
    RoleMismatch { requested: Role },

    #[error("Role mismatch or user not found.")]
    AccountNotFound,

    #[error("Please verify your email before signing in.")]
    UnconfirmedEmail,

    #[error("Invalid login credentials")]
    InvalidCredentials,

    #[error("The selected date changed; reload the attendance sheet")]
    StaleDate,

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Session token error: {0}")]
    Session(#[from] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Remote(GatewayError),
}

pub type AppResult<T> = Result<T, AppError>;

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::RateLimited => AppError::RateLimited,
            GatewayError::InvalidCredentials => AppError::InvalidCredentials,
            GatewayError::UnconfirmedEmail => AppError::UnconfirmedEmail,
            GatewayError::Validation(msg) => AppError::Validation(msg),
            other => AppError::Remote(other),
        }
    }
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    /// Message shown to the user. Database internals are not echoed back.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Remote(GatewayError::Database(_))
            | AppError::Remote(GatewayError::Decode(_))
            | AppError::Session(_) => {
                "Something went wrong, Contact with system admin".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::StaleDate => StatusCode::BAD_REQUEST,
            AppError::Duplicate { .. } => StatusCode::CONFLICT,
            AppError::RateLimited | AppError::RetriesExhausted { .. } => {
                StatusCode::TOO_MANY_REQUESTS
            }
            AppError::RoleMismatch { .. } | AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::AccountNotFound
            | AppError::UnconfirmedEmail
            | AppError::InvalidCredentials
            | AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Remote(GatewayError::DuplicateEmail) => StatusCode::CONFLICT,
            AppError::Remote(GatewayError::Constraint(_)) => StatusCode::CONFLICT,
            AppError::Remote(GatewayError::NotFound) | AppError::Remote(GatewayError::UnknownEmail) => {
                StatusCode::NOT_FOUND
            }
            AppError::Remote(GatewayError::InvalidResetCode)
            | AppError::Remote(GatewayError::InvalidConfirmationCode) => StatusCode::BAD_REQUEST,
            AppError::Remote(_) => StatusCode::BAD_GATEWAY,
            AppError::Session(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "message": self.user_message()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_rate_limit_becomes_user_rate_limit() {
        let err: AppError = GatewayError::RateLimited.into();
        assert!(matches!(err, AppError::RateLimited));
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn database_details_are_not_shown_to_users() {
        let err: AppError = GatewayError::Database(sqlx::Error::PoolTimedOut).into();
        assert_eq!(err.user_message(), "Something went wrong, Contact with system admin");
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn role_mismatch_names_the_requested_role() {
        let err = AppError::RoleMismatch { requested: Role::Teacher };
        assert_eq!(err.to_string(), "Role mismatch: You cannot sign in as a teacher.");
    }
}
