use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{Duration, Utc};
use gatehouse_core::user::normalize_email;
use gatehouse_core::{Role, User};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{error::AppError, middleware::auth::UserClaims, middleware::user_auth_middleware, state::AppState};

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::Attendee
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

pub fn routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/api/users/profile", get(profile))
        .route_layer(middleware::from_fn_with_state(state, user_auth_middleware));

    Router::new()
        .route("/api/users/register", post(register))
        .route("/api/users/login", post(login))
        .merge(protected)
}

async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::ValidationError("name must not be empty".to_string()));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::ValidationError(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    let email = normalize_email(&req.email)?;

    let password_hash = hash_password(req.password.as_bytes())?;
    let user = User::new(name.to_string(), email, password_hash, req.role);
    state.users.create(&user).await?;
    info!(user_id = %user.id, role = user.role.as_str(), "account registered");

    let token = issue_token(&state, &user)?;
    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let rejected = || AppError::AuthenticationError("invalid email or password".to_string());

    let email = normalize_email(&req.email).map_err(|_| rejected())?;
    let user = state.users.find_by_email(&email).await?.ok_or_else(rejected)?;
    if !verify_password(req.password.as_bytes(), &user.password_hash)? {
        return Err(rejected());
    }

    let token = issue_token(&state, &user)?;
    Ok(Json(AuthResponse { token, user }))
}

async fn profile(
    State(state): State<AppState>,
    Extension(claims): Extension<UserClaims>,
) -> Result<Json<User>, AppError> {
    let requester = claims.requester()?;
    Ok(Json(state.users.get(requester.user_id).await?))
}

pub fn issue_token(state: &AppState, user: &User) -> Result<String, AppError> {
    let claims = UserClaims {
        sub: user.id.to_string(),
        email: user.email.expose().clone(),
        role: user.role.as_str().to_owned(),
        exp: (Utc::now() + Duration::seconds(state.auth.expiration as i64)).timestamp() as usize,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(state.auth.secret.as_bytes()))
        .map_err(|e| AppError::InternalServerError(format!("Token encoding failed: {}", e)))
}

fn hash_password(password: &[u8]) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password, &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::InternalServerError(format!("Password hashing failed: {}", e)))
}

fn verify_password(password: &[u8], hash: &str) -> Result<bool, AppError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| AppError::InternalServerError(format!("Stored hash unreadable: {}", e)))?;
    match Argon2::default().verify_password(password, &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AppError::InternalServerError(format!("Password verification failed: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hashed = hash_password(b"correct horse").unwrap();
        assert!(verify_password(b"correct horse", &hashed).unwrap());
        assert!(!verify_password(b"battery staple", &hashed).unwrap());
    }
}
