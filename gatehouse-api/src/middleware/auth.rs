use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use gatehouse_core::{Requester, Role};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UserClaims {
    pub sub: String,
    pub email: String,
    pub role: String,
    pub exp: usize,
}

impl UserClaims {
    pub fn requester(&self) -> Result<Requester, AppError> {
        let user_id = Uuid::parse_str(&self.sub)
            .map_err(|_| AppError::AuthenticationError("malformed token subject".to_string()))?;
        let role = Role::parse(&self.role)
            .map_err(|_| AppError::AuthenticationError("malformed token role".to_string()))?;
        Ok(Requester { user_id, email: self.email.clone(), role })
    }
}

/// Bearer-token gate for every route that acts on behalf of a user.
pub async fn user_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::AuthenticationError("missing bearer token".to_string()))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::AuthenticationError("missing bearer token".to_string()))?;

    let token_data = decode::<UserClaims>(
        token,
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::AuthenticationError("invalid or expired token".to_string()))?;

    req.extensions_mut().insert(token_data.claims);

    Ok(next.run(req).await)
}
