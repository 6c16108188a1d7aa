//! Sign-in, sign-up and password recovery, independent of the HTTP layer.

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;

use super::session::Session;
use crate::error::{AppError, AppResult, GatewayError};
use crate::gateway::{Filter, Gateway, Profile, Table, to_row};
use crate::model::{AccountRecord, Role};
use crate::retry::{Backoff, RetryNotice, Sleeper, attempt_with_backoff};
use crate::utils::email_index::EmailIndex;
use crate::view::Page;

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct SignInForm {
    #[schema(example = "teacher")]
    pub role: String,
    #[schema(example = "mrs.cruz@school.edu")]
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct SignUpForm {
    #[schema(example = "student")]
    pub role: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    #[schema(example = "Juan Dela Cruz")]
    pub name: String,
    /// Required when signing up as a student, ignored otherwise.
    #[serde(default)]
    pub student_number: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuthOutcome {
    #[schema(example = "Teacher login successful!")]
    pub message: String,
    #[schema(example = "/teachers/dashboard")]
    pub redirect: String,
}

fn filled(value: &str) -> bool {
    !value.trim().is_empty()
}

fn parse_role(raw: &str) -> Option<Role> {
    raw.trim().parse().ok()
}

#[instrument(name = "auth_sign_in", skip(gateway, form), fields(email = %form.email, role = %form.role))]
pub async fn sign_in<G: Gateway>(gateway: &G, form: &SignInForm) -> AppResult<(Session, AuthOutcome)> {
    info!("Sign-in request received");

    let role = parse_role(&form.role);
    let (Some(role), true, true) = (role, filled(&form.email), !form.password.is_empty()) else {
        info!("Validation failed: missing field");
        return Err(AppError::validation("Please fill in all fields."));
    };
    let email = form.email.trim().to_lowercase();

    let identity = gateway.authenticate(&email, &form.password).await.map_err(|e| {
        match &e {
            GatewayError::RateLimited => warn!("Sign-in rate limited"),
            GatewayError::InvalidCredentials => info!("Invalid credentials"),
            other => error!(error = %other, "Sign-in failed"),
        }
        AppError::from(e)
    })?;

    debug!(user_id = identity.user_id, "Checking account role");
    let account = gateway
        .query_rows(Table::Accounts, &[Filter::eq("email", &email)?], None)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to fetch account");
            AppError::AccountNotFound
        })?
        .into_iter()
        .next()
        .ok_or(AppError::AccountNotFound)?;
    let account: AccountRecord =
        crate::gateway::from_row(account).map_err(|_| AppError::AccountNotFound)?;

    if account.role != role {
        info!(account_role = %account.role, "Role mismatch");
        return Err(AppError::RoleMismatch { requested: role });
    }

    if !identity.email_confirmed {
        info!("Email not confirmed");
        return Err(AppError::UnconfirmedEmail);
    }

    info!("Sign-in successful");
    let session = Session {
        user_id: identity.user_id,
        email: identity.email,
        role,
    };
    Ok((
        session,
        AuthOutcome {
            message: format!("{} login successful!", role.title()),
            redirect: Page::landing(role).route().to_string(),
        },
    ))
}

impl SignUpForm {
    fn validate(&self) -> AppResult<(Role, Option<String>)> {
        let role = parse_role(&self.role);
        let student_number = self
            .student_number
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        let complete = role.is_some()
            && filled(&self.email)
            && !self.password.is_empty()
            && filled(&self.name)
            && (role != Some(Role::Student) || student_number.is_some());
        let Some(role) = role.filter(|_| complete) else {
            return Err(AppError::validation("Please fill in all required fields."));
        };

        if self.password != self.confirm_password {
            return Err(AppError::validation("Passwords do not match!"));
        }

        let student_number = match role {
            Role::Student => student_number.map(str::to_string),
            Role::Teacher => None,
        };
        Ok((role, student_number))
    }
}

#[instrument(name = "auth_sign_up", skip(gateway, index, form), fields(email = %form.email, role = %form.role))]
pub async fn sign_up<G: Gateway>(
    gateway: &G,
    index: &EmailIndex,
    form: &SignUpForm,
) -> AppResult<AuthOutcome> {
    let (role, student_number) = form.validate()?;
    let email = form.email.trim().to_lowercase();

    if !index.is_email_available(gateway, &email).await {
        info!("Email already registered");
        return Err(AppError::Remote(GatewayError::DuplicateEmail));
    }

    let profile = Profile {
        fullname: form.name.trim().to_string(),
        role,
        student_number,
    };
    gateway
        .register(&email, &form.password, &profile)
        .await
        .map_err(|e| {
            error!(error = %e, "Registration failed");
            e
        })?;
    index.mark_taken(&email).await;

    let account = AccountRecord {
        email,
        fullname: profile.fullname,
        role,
    };
    gateway
        .insert_rows(Table::Accounts, vec![to_row(&account)?])
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to insert account row");
            e
        })?;

    info!("Account created");
    Ok(AuthOutcome {
        message: "Account created successfully! Please verify your email.".to_string(),
        redirect: match role {
            Role::Teacher => "/teachers",
            Role::Student => "/students",
        }
        .to_string(),
    })
}

/// Confirm the address a sign-up was made with, using the mailed code.
#[instrument(name = "auth_confirm_email", skip(gateway, code))]
pub async fn confirm_email<G: Gateway>(gateway: &G, email: &str, code: &str) -> AppResult<String> {
    if !filled(email) || !filled(code) {
        return Err(AppError::validation("Please fill in all fields."));
    }

    gateway
        .confirm_email(&email.trim().to_lowercase(), code.trim())
        .await
        .map_err(|e| {
            error!(error = %e, "Email confirmation failed");
            e
        })?;

    info!("Email confirmed");
    Ok("Email confirmed! You can now sign in.".to_string())
}

/// Ask the backend to mail a reset code, backing off while it is rate limited.
/// `notify` receives each "retrying in N seconds" notice before the wait.
#[instrument(name = "auth_forgot_password", skip(gateway, backoff, sleeper, notify))]
pub async fn request_password_reset<G, S, N>(
    gateway: &G,
    email: &str,
    backoff: &Backoff,
    sleeper: &S,
    notify: N,
) -> AppResult<String>
where
    G: Gateway,
    S: Sleeper,
    N: FnMut(&RetryNotice),
{
    if !filled(email) {
        return Err(AppError::validation("Please enter your email."));
    }
    let email = email.trim().to_lowercase();

    attempt_with_backoff(backoff, sleeper, notify, || gateway.request_password_reset(&email)).await?;

    info!("Password reset email sent");
    Ok("Password reset email sent!".to_string())
}

#[instrument(name = "auth_reset_password", skip(gateway, code, new_password))]
pub async fn complete_password_reset<G: Gateway>(
    gateway: &G,
    email: &str,
    code: &str,
    new_password: &str,
) -> AppResult<String> {
    if !filled(email) || !filled(code) || new_password.is_empty() {
        return Err(AppError::validation("Please fill in all fields."));
    }

    gateway
        .complete_password_reset(&email.trim().to_lowercase(), code.trim(), new_password)
        .await
        .map_err(|e| {
            error!(error = %e, "Password reset failed");
            e
        })?;

    info!("Password reset successful");
    Ok("Password reset successful!".to_string())
}
