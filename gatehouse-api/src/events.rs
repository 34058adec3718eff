use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::{get, post, put},
    Extension, Json, Router,
};
use gatehouse_core::{Event, EventChanges, NewEvent};
use gatehouse_tickets::EventAnalytics;
use uuid::Uuid;

use crate::{error::AppError, middleware::auth::UserClaims, middleware::user_auth_middleware, state::AppState};

pub fn routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/api/events", post(create_event))
        .route("/api/events/myevents", get(my_events))
        .route("/api/events/{id}", put(update_event).delete(delete_event))
        .route("/api/events/{id}/analytics", get(event_analytics))
        .route_layer(middleware::from_fn_with_state(state, user_auth_middleware));

    Router::new()
        .route("/api/events", get(list_events))
        .route("/api/events/{id}", get(get_event))
        .merge(protected)
}

async fn list_events(State(state): State<AppState>) -> Result<Json<Vec<Event>>, AppError> {
    Ok(Json(state.catalog.list_events().await?))
}

async fn get_event(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Event>, AppError> {
    Ok(Json(state.catalog.get_event(id).await?))
}

async fn create_event(
    State(state): State<AppState>,
    Extension(claims): Extension<UserClaims>,
    Json(draft): Json<NewEvent>,
) -> Result<(StatusCode, Json<Event>), AppError> {
    let organizer = claims.requester()?;
    let event = state.catalog.create_event(&organizer, draft).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

async fn my_events(
    State(state): State<AppState>,
    Extension(claims): Extension<UserClaims>,
) -> Result<Json<Vec<Event>>, AppError> {
    let organizer = claims.requester()?;
    Ok(Json(state.catalog.list_my_events(&organizer).await?))
}

async fn update_event(
    State(state): State<AppState>,
    Extension(claims): Extension<UserClaims>,
    Path(id): Path<Uuid>,
    Json(changes): Json<EventChanges>,
) -> Result<Json<Event>, AppError> {
    let organizer = claims.requester()?;
    Ok(Json(state.catalog.update_event(&organizer, id, changes).await?))
}

async fn delete_event(
    State(state): State<AppState>,
    Extension(claims): Extension<UserClaims>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let organizer = claims.requester()?;
    state.catalog.delete_event(&organizer, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn event_analytics(
    State(state): State<AppState>,
    Extension(claims): Extension<UserClaims>,
    Path(id): Path<Uuid>,
) -> Result<Json<EventAnalytics>, AppError> {
    let organizer = claims.requester()?;
    Ok(Json(state.queries.event_analytics(&organizer, id).await?))
}
