use std::time::{SystemTime, UNIX_EPOCH};

use actix_web::body::BoxBody;
use actix_web::dev::{Payload, ServiceRequest, ServiceResponse};
use actix_web::middleware::Next;
use actix_web::web::Data;
use actix_web::{Error, FromRequest, HttpMessage, HttpRequest, ResponseError};
use futures::future::{Ready, ready};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::model::Role;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: u64,
    /// Email of the signed-in user.
    pub sub: String,
    pub role: u8, // role id
    pub exp: usize,
    pub jti: String,
}

fn now() -> usize {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as usize
}

/// Who is signed in. Saved as a bearer token at sign-in and loaded back from
/// it on every protected request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: u64,
    pub email: String,
    pub role: Role,
}

impl Session {
    pub fn issue(&self, secret: &str, ttl: usize) -> AppResult<String> {
        let claims = Claims {
            user_id: self.user_id,
            sub: self.email.clone(),
            role: self.role.id(),
            exp: now() + ttl,
            jti: Uuid::new_v4().to_string(),
        };
        Ok(encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )?)
    }

    pub fn load(token: &str, secret: &str) -> AppResult<Session> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| {
            debug!(error = %e, "rejected session token");
            AppError::Unauthorized("Invalid or expired token".to_string())
        })?;

        let role = Role::from_id(data.claims.role)
            .ok_or_else(|| AppError::Unauthorized("Invalid role".to_string()))?;

        Ok(Session {
            user_id: data.claims.user_id,
            email: data.claims.sub,
            role,
        })
    }

    pub fn require_teacher(&self) -> AppResult<()> {
        self.require(Role::Teacher, "Teachers only")
    }

    pub fn require_student(&self) -> AppResult<()> {
        self.require(Role::Student, "Students only")
    }

    fn require(&self, role: Role, message: &str) -> AppResult<()> {
        if self.role == role {
            Ok(())
        } else {
            Err(AppError::Forbidden(message.to_string()))
        }
    }
}

fn bearer_token(req: &HttpRequest) -> AppResult<&str> {
    let header = req
        .headers()
        .get("Authorization")
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?;
    header
        .to_str()
        .map_err(|_| AppError::Unauthorized("Invalid Authorization header encoding".to_string()))?
        .strip_prefix("Bearer ")
        .ok_or_else(|| {
            AppError::Unauthorized("Authorization header must start with Bearer".to_string())
        })
}

fn session_from(req: &HttpRequest) -> AppResult<Session> {
    if let Some(session) = req.extensions().get::<Session>() {
        return Ok(session.clone());
    }
    let config = req
        .app_data::<Data<Config>>()
        .ok_or_else(|| AppError::Unauthorized("Config missing".to_string()))?;
    Session::load(bearer_token(req)?, &config.jwt_secret)
}

impl FromRequest for Session {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(session_from(req))
    }
}

/// Rejects requests without a valid session and leaves the session in the
/// request extensions for handlers.
pub async fn session_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    match session_from(req.request()) {
        Ok(session) => {
            req.extensions_mut().insert(session);
            next.call(req).await
        }
        Err(e) => {
            let resp = e.error_response();
            Ok(req.into_response(resp))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    fn teacher() -> Session {
        Session {
            user_id: 3,
            email: "mrs.cruz@school.edu".into(),
            role: Role::Teacher,
        }
    }

    #[test]
    fn saved_session_loads_back() {
        let token = teacher().issue(SECRET, 60).unwrap();
        assert_eq!(Session::load(&token, SECRET).unwrap(), teacher());
    }

    #[test]
    fn token_signed_with_another_secret_is_rejected() {
        let token = teacher().issue("other", 60).unwrap();
        assert!(matches!(Session::load(&token, SECRET), Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn role_gates() {
        let session = teacher();
        assert!(session.require_teacher().is_ok());
        assert!(matches!(session.require_student(), Err(AppError::Forbidden(_))));
    }
}
