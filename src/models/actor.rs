use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Admin,
    Driver,
    Sender,
    Receiver,
    System,
}

/// Whoever is asking for a change. Authentication happens upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub role: ActorRole,
    pub id: Option<Uuid>,
}

impl Actor {
    pub fn admin(id: Uuid) -> Self {
        Self {
            role: ActorRole::Admin,
            id: Some(id),
        }
    }

    pub fn driver(id: Uuid) -> Self {
        Self {
            role: ActorRole::Driver,
            id: Some(id),
        }
    }

    pub fn sender(id: Uuid) -> Self {
        Self {
            role: ActorRole::Sender,
            id: Some(id),
        }
    }

    pub fn system() -> Self {
        Self {
            role: ActorRole::System,
            id: None,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == ActorRole::Admin
    }

    pub fn is(&self, role: ActorRole, id: Uuid) -> bool {
        self.role == role && self.id == Some(id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
}
