use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::error::AppError;
use crate::state::AppState;

/// Per-IP fixed window backed by Redis. Fails open: a Redis outage or a
/// missing peer address never blocks traffic.
pub async fn rate_limit_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(redis) = state.redis.as_ref() else {
        return next.run(req).await;
    };
    let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>().copied() else {
        return next.run(req).await;
    };

    let key = format!("ratelimit:{}", addr.ip());
    match redis.check_rate_limit(&key, state.business_rules.rate_limit_per_minute, 60).await {
        Ok(true) => next.run(req).await,
        Ok(false) => AppError::RateLimited.into_response(),
        Err(e) => {
            warn!(error = %e, "rate limiter unavailable, allowing request");
            next.run(req).await
        }
    }
}
