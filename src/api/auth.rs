use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use utoipa::ToSchema;

use crate::auth::Session;
use crate::auth::flows::{self, AuthOutcome, SignInForm, SignUpForm};
use crate::config::Config;
use crate::error::AppResult;
use crate::gateway::MySqlGateway;
use crate::retry::RuntimeSleeper;
use crate::utils::email_index::EmailIndex;

#[derive(Serialize, ToSchema)]
pub struct SignInResponse {
    #[serde(flatten)]
    pub outcome: AuthOutcome,
    pub access_token: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ForgotPasswordReq {
    #[schema(example = "ana@school.edu")]
    pub email: String,
}

#[derive(Serialize, ToSchema)]
pub struct ForgotPasswordResponse {
    #[schema(example = "Password reset email sent!")]
    pub message: String,
    /// One "Rate limit exceeded. Retrying in N seconds..." line per wait.
    pub notices: Vec<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct ResetPasswordReq {
    pub email: String,
    #[schema(example = "104233")]
    pub code: String,
    pub new_password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ConfirmEmailReq {
    #[schema(example = "ana@school.edu")]
    pub email: String,
    #[schema(example = "582014")]
    pub code: String,
}

#[derive(Deserialize, ToSchema)]
pub struct EmailQuery {
    pub email: String,
}

/// Sign in as teacher or student
#[utoipa::path(
    post,
    path = "/auth/signin",
    request_body = SignInForm,
    responses(
        (status = 200, description = "Signed in", body = SignInResponse),
        (status = 400, description = "Missing field", body = Object, example = json!({
            "message": "Please fill in all fields."
        })),
        (status = 401, description = "Invalid credentials or unconfirmed email"),
        (status = 403, description = "Role mismatch", body = Object, example = json!({
            "message": "Role mismatch: You cannot sign in as a teacher."
        })),
        (status = 429, description = "Rate limited", body = Object, example = json!({
            "message": "Too many requests made. Please try again after a few minutes."
        }))
    ),
    tag = "Auth"
)]
pub async fn sign_in(
    form: web::Json<SignInForm>,
    gateway: web::Data<MySqlGateway>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    let (session, outcome) = flows::sign_in(gateway.get_ref(), &form).await?;
    let access_token = session.issue(&config.jwt_secret, config.session_ttl)?;
    Ok(HttpResponse::Ok().json(SignInResponse {
        outcome,
        access_token,
    }))
}

/// Create an account
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignUpForm,
    responses(
        (status = 201, description = "Account created", body = AuthOutcome),
        (status = 400, description = "Validation failed", body = Object, example = json!({
            "message": "Passwords do not match!"
        })),
        (status = 409, description = "Email already registered"),
        (status = 429, description = "Rate limited")
    ),
    tag = "Auth"
)]
pub async fn sign_up(
    form: web::Json<SignUpForm>,
    gateway: web::Data<MySqlGateway>,
    index: web::Data<EmailIndex>,
) -> AppResult<HttpResponse> {
    let outcome = flows::sign_up(gateway.get_ref(), index.get_ref(), &form).await?;
    Ok(HttpResponse::Created().json(outcome))
}

/// Check whether an email can still be used to sign up
#[utoipa::path(
    get,
    path = "/auth/email-available",
    params(("email" = String, Query, description = "Email to check")),
    responses(
        (status = 200, description = "Availability", body = Object, example = json!({
            "available": true
        }))
    ),
    tag = "Auth"
)]
pub async fn email_available(
    query: web::Query<EmailQuery>,
    gateway: web::Data<MySqlGateway>,
    index: web::Data<EmailIndex>,
) -> HttpResponse {
    let available = index.is_email_available(gateway.get_ref(), &query.email).await;
    HttpResponse::Ok().json(json!({ "available": available }))
}

/// Mail a password reset code, backing off while the backend is rate limited
#[utoipa::path(
    post,
    path = "/auth/forgot-password",
    request_body = ForgotPasswordReq,
    responses(
        (status = 200, description = "Reset code sent", body = ForgotPasswordResponse),
        (status = 404, description = "Unknown email"),
        (status = 429, description = "Still rate limited after every retry")
    ),
    tag = "Auth"
)]
pub async fn forgot_password(
    payload: web::Json<ForgotPasswordReq>,
    gateway: web::Data<MySqlGateway>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    let mut notices = Vec::new();
    let message = flows::request_password_reset(
        gateway.get_ref(),
        &payload.email,
        &config.reset_backoff(),
        &RuntimeSleeper,
        |notice| notices.push(notice.message()),
    )
    .await?;
    Ok(HttpResponse::Ok().json(ForgotPasswordResponse { message, notices }))
}

/// Confirm an email address with the code mailed at sign-up
#[utoipa::path(
    post,
    path = "/auth/confirm-email",
    request_body = ConfirmEmailReq,
    responses(
        (status = 200, description = "Email confirmed", body = Object, example = json!({
            "message": "Email confirmed! You can now sign in."
        })),
        (status = 400, description = "Invalid or expired code"),
        (status = 429, description = "Rate limited")
    ),
    tag = "Auth"
)]
pub async fn confirm_email(
    payload: web::Json<ConfirmEmailReq>,
    gateway: web::Data<MySqlGateway>,
) -> AppResult<HttpResponse> {
    let message = flows::confirm_email(gateway.get_ref(), &payload.email, &payload.code).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": message })))
}

/// Set a new password using the mailed reset code
#[utoipa::path(
    post,
    path = "/auth/reset-password",
    request_body = ResetPasswordReq,
    responses(
        (status = 200, description = "Password changed", body = Object, example = json!({
            "message": "Password reset successful!"
        })),
        (status = 400, description = "Invalid or expired code")
    ),
    tag = "Auth"
)]
pub async fn reset_password(
    payload: web::Json<ResetPasswordReq>,
    gateway: web::Data<MySqlGateway>,
) -> AppResult<HttpResponse> {
    let message = flows::complete_password_reset(
        gateway.get_ref(),
        &payload.email,
        &payload.code,
        &payload.new_password,
    )
    .await?;
    Ok(HttpResponse::Ok().json(json!({ "message": message })))
}

/// Sign out. Sessions are stateless tokens; the client drops its copy.
#[utoipa::path(
    post,
    path = "/auth/signout",
    responses((status = 204, description = "Signed out")),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn sign_out(session: Option<Session>) -> HttpResponse {
    if let Some(session) = session {
        info!(user_id = session.user_id, "Signed out");
    }
    HttpResponse::NoContent().finish()
}
