use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gatehouse_shared::Masked;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;
use validator::ValidateEmail;

use crate::repository::UserRepository;
use crate::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Attendee,
    Organizer,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Attendee => "attendee",
            Role::Organizer => "organizer",
        }
    }

    pub fn parse(value: &str) -> CoreResult<Self> {
        match value {
            "attendee" => Ok(Role::Attendee),
            "organizer" => Ok(Role::Organizer),
            other => Err(CoreError::Validation(format!("unknown role '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: Masked<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(name: String, email: String, password_hash: String, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            email: Masked::new(email),
            password_hash,
            role,
            created_at: Utc::now(),
        }
    }

    pub fn requester(&self) -> Requester {
        Requester {
            user_id: self.id,
            email: self.email.expose().clone(),
            role: self.role,
        }
    }
}

/// The authenticated caller of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
}

/// Trim, lowercase and check an address is well formed.
pub fn normalize_email(raw: &str) -> CoreResult<String> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        return Err(CoreError::Validation("email must not be empty".to_string()));
    }
    if !email.validate_email() {
        return Err(CoreError::Validation(format!("'{}' is not a valid email address", email)));
    }
    Ok(email)
}

/// Accounts kept in process memory; used by tests and database-less runs.
#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<Uuid, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, user: &User) -> CoreResult<Uuid> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == user.email) {
            return Err(CoreError::Conflict("an account with this email already exists".to_string()));
        }
        users.insert(user.id, user.clone());
        Ok(user.id)
    }

    async fn get(&self, id: Uuid) -> CoreResult<User> {
        self.users
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("user {}", id)))
    }

    async fn find_by_email(&self, email: &str) -> CoreResult<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email.expose() == email)
            .cloned())
    }
}
