use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use gatehouse_core::{AuditEntry, Ticket, TicketScope};
use gatehouse_tickets::TicketView;
use serde::Deserialize;
use uuid::Uuid;

use crate::{error::AppError, middleware::auth::UserClaims, middleware::user_auth_middleware, state::AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    pub event_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRequest {
    pub event_id: Uuid,
    pub attendee_emails: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub status: TicketScope,
}

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/tickets/purchase", post(purchase))
        .route("/api/tickets/request-group", post(request_group))
        .route("/api/tickets/mytickets", get(my_tickets))
        .route("/api/tickets/accept/{id}", post(accept))
        .route("/api/tickets/decline/{id}", post(decline))
        .route("/api/tickets/checkin/{id}", post(check_in))
        .route("/api/tickets/{id}/audit", get(audit_trail))
        .route_layer(middleware::from_fn_with_state(state, user_auth_middleware))
}

async fn purchase(
    State(state): State<AppState>,
    Extension(claims): Extension<UserClaims>,
    Json(req): Json<PurchaseRequest>,
) -> Result<(StatusCode, Json<Ticket>), AppError> {
    let buyer = claims.requester()?;
    let ticket = state.reservations.purchase_solo(&buyer, req.event_id).await?;
    Ok((StatusCode::CREATED, Json(ticket)))
}

async fn request_group(
    State(state): State<AppState>,
    Extension(claims): Extension<UserClaims>,
    Json(req): Json<GroupRequest>,
) -> Result<(StatusCode, Json<Vec<Ticket>>), AppError> {
    let buyer = claims.requester()?;
    let tickets = state
        .reservations
        .purchase_group(&buyer, req.event_id, &req.attendee_emails)
        .await?;
    Ok((StatusCode::CREATED, Json(tickets)))
}

async fn my_tickets(
    State(state): State<AppState>,
    Extension(claims): Extension<UserClaims>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<TicketView>>, AppError> {
    let requester = claims.requester()?;
    let tickets = state.queries.list_my_tickets(&requester, params.status, Utc::now()).await?;
    Ok(Json(tickets))
}

async fn accept(
    State(state): State<AppState>,
    Extension(claims): Extension<UserClaims>,
    Path(id): Path<Uuid>,
) -> Result<Json<Ticket>, AppError> {
    let invitee = claims.requester()?;
    Ok(Json(state.invitations.accept(id, &invitee).await?))
}

async fn decline(
    State(state): State<AppState>,
    Extension(claims): Extension<UserClaims>,
    Path(id): Path<Uuid>,
) -> Result<Json<Ticket>, AppError> {
    let invitee = claims.requester()?;
    Ok(Json(state.invitations.decline(id, &invitee).await?))
}

async fn check_in(
    State(state): State<AppState>,
    Extension(claims): Extension<UserClaims>,
    Path(id): Path<Uuid>,
) -> Result<Json<Ticket>, AppError> {
    let organizer = claims.requester()?;
    Ok(Json(state.invitations.check_in(id, &organizer).await?))
}

async fn audit_trail(
    State(state): State<AppState>,
    Extension(claims): Extension<UserClaims>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<AuditEntry>>, AppError> {
    let requester = claims.requester()?;
    Ok(Json(state.queries.audit_trail(id, &requester).await?))
}
