use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use gatehouse_api::{app, AppState, AuthConfig};
use gatehouse_store::BusinessRules;
use serde_json::{json, Value};
use tower::ServiceExt;

fn test_app() -> Router {
    let auth = AuthConfig { secret: "test-secret".to_string(), expiration: 3600 };
    app(AppState::in_memory(auth, BusinessRules::default()))
}

async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap_or(Value::Null) };
    (status, value)
}

async fn register(app: &Router, name: &str, email: &str, role: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/users/register",
        None,
        Some(json!({ "name": name, "email": email, "password": "s3cret-pass", "role": role })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["token"].as_str().unwrap().to_string()
}

async fn create_event(app: &Router, organizer: &str, capacity: u32) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/events",
        Some(organizer),
        Some(json!({
            "name": "Night Market",
            "date": (Utc::now() + Duration::days(7)).to_rfc3339(),
            "location": "Old Town Square",
            "capacity": capacity,
            "ticketPrice": 120.0,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health() {
    let app = test_app();
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_register_login_and_profile() {
    let app = test_app();
    register(&app, "Dana", "Dana@Example.com", "attendee").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/users/login",
        None,
        Some(json!({ "email": "dana@example.com", "password": "s3cret-pass" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("password_hash").is_none() && body["user"].get("passwordHash").is_none());
    let token = body["token"].as_str().unwrap().to_string();

    let (status, profile) = send(&app, Method::GET, "/api/users/profile", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["email"], "dana@example.com");
    assert_eq!(profile["role"], "attendee");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/users/login",
        None,
        Some(json!({ "email": "dana@example.com", "password": "wrong-pass" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "UNAUTHORIZED");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/users/register",
        None,
        Some(json!({ "name": "Dup", "email": "dana@example.com", "password": "s3cret-pass" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "CONFLICT");
}

#[tokio::test]
async fn test_missing_or_bad_token_is_unauthorized() {
    let app = test_app();
    let (status, _) = send(&app, Method::GET, "/api/tickets/mytickets", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app, Method::GET, "/api/tickets/mytickets", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_group_invitation_round_trip() {
    let app = test_app();
    let organizer = register(&app, "Olu", "olu@example.com", "organizer").await;
    let buyer = register(&app, "Bea", "bea@example.com", "attendee").await;
    let ana = register(&app, "Ana", "ana@example.com", "attendee").await;
    let event_id = create_event(&app, &organizer, 5).await;

    let (status, tickets) = send(
        &app,
        Method::POST,
        "/api/tickets/request-group",
        Some(&buyer),
        Some(json!({ "eventId": event_id, "attendeeEmails": ["ana@example.com"] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{tickets}");
    assert_eq!(tickets.as_array().unwrap().len(), 2);
    assert_eq!(tickets[0]["status"], "confirmed");
    assert_eq!(tickets[1]["status"], "pending_acceptance");
    assert_eq!(tickets[1]["inviteeEmail"], "ana@example.com");
    let invitation_id = tickets[1]["id"].as_str().unwrap().to_string();

    let (status, listed) =
        send(&app, Method::GET, "/api/tickets/mytickets?status=upcoming", Some(&ana), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["id"], invitation_id.as_str());
    assert_eq!(listed[0]["event"]["name"], "Night Market");

    let accept = format!("/api/tickets/accept/{}", invitation_id);
    let (status, accepted) = send(&app, Method::POST, &accept, Some(&buyer), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{accepted}");

    let (status, accepted) = send(&app, Method::POST, &accept, Some(&ana), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(accepted["status"], "confirmed");
    assert!(accepted["txHash"].is_string());

    let (status, again) = send(&app, Method::POST, &accept, Some(&ana), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(again["error"], "ALREADY_RESOLVED");

    let (status, event) = send(&app, Method::GET, &format!("/api/events/{}", event_id), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(event["ticketsSold"], 2);
    assert_eq!(event["ticketsReserved"], 0);

    let (status, analytics) = send(
        &app,
        Method::GET,
        &format!("/api/events/{}/analytics", event_id),
        Some(&organizer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(analytics["totalRevenue"], 240.0);
    assert_eq!(analytics["attendees"].as_array().unwrap().len(), 2);

    let (status, used) = send(
        &app,
        Method::POST,
        &format!("/api/tickets/checkin/{}", invitation_id),
        Some(&organizer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(used["status"], "used");

    let (status, trail) = send(
        &app,
        Method::GET,
        &format!("/api/tickets/{}/audit", invitation_id),
        Some(&ana),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let steps: Vec<&str> = trail.as_array().unwrap().iter().map(|e| e["to"].as_str().unwrap()).collect();
    assert_eq!(steps, ["pending_acceptance", "accepted", "confirmed", "used"]);
}

#[tokio::test]
async fn test_sold_out_and_validation_errors() {
    let app = test_app();
    let organizer = register(&app, "Olu", "olu@example.com", "organizer").await;
    let buyer = register(&app, "Bea", "bea@example.com", "attendee").await;
    let event_id = create_event(&app, &organizer, 2).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/tickets/request-group",
        Some(&buyer),
        Some(json!({
            "eventId": event_id,
            "attendeeEmails": ["a@example.com", "b@example.com", "c@example.com", "d@example.com", "e@example.com"],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/tickets/request-group",
        Some(&buyer),
        Some(json!({ "eventId": event_id, "attendeeEmails": ["a@example.com", "b@example.com"] })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "SOLD_OUT");

    let (status, mine) = send(&app, Method::GET, "/api/tickets/mytickets", Some(&buyer), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(mine.as_array().unwrap().is_empty());

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/tickets/purchase",
        Some(&buyer),
        Some(json!({ "eventId": uuid::Uuid::new_v4() })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_event_management_rules() {
    let app = test_app();
    let organizer = register(&app, "Olu", "olu@example.com", "organizer").await;
    let attendee = register(&app, "Bea", "bea@example.com", "attendee").await;
    let event_id = create_event(&app, &organizer, 10).await;
    let path = format!("/api/events/{}", event_id);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/events",
        Some(&attendee),
        Some(json!({
            "name": "Nope",
            "date": Utc::now().to_rfc3339(),
            "location": "Nowhere",
            "capacity": 1,
            "ticketPrice": 0.0,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, Method::POST, "/api/tickets/purchase", Some(&attendee), Some(json!({ "eventId": event_id }))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) =
        send(&app, Method::PUT, &path, Some(&organizer), Some(json!({ "ticketPrice": 99.0 }))).await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");

    let (status, updated) =
        send(&app, Method::PUT, &path, Some(&organizer), Some(json!({ "location": "Riverside" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["location"], "Riverside");

    let (status, _) = send(&app, Method::DELETE, &path, Some(&organizer), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, mine) = send(&app, Method::GET, "/api/events/myevents", Some(&organizer), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine.as_array().unwrap().len(), 1);

    let (status, all) = send(&app, Method::GET, "/api/events", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 1);
}
