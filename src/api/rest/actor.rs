use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::actor::{Actor, ActorRole};

pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";
pub const ACTOR_ID_HEADER: &str = "x-actor-id";

fn header<'a>(parts: &'a Parts, name: &str) -> Result<Option<&'a str>, AppError> {
    match parts.headers.get(name) {
        Some(value) => value
            .to_str()
            .map(Some)
            .map_err(|_| AppError::BadRequest(format!("{name} is not valid text"))),
        None => Ok(None),
    }
}

fn parse_role(raw: &str) -> Result<ActorRole, AppError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "admin" => Ok(ActorRole::Admin),
        "driver" => Ok(ActorRole::Driver),
        "sender" => Ok(ActorRole::Sender),
        "receiver" => Ok(ActorRole::Receiver),
        "system" => Ok(ActorRole::System),
        other => Err(AppError::BadRequest(format!(
            "unknown actor role: {other}, expected admin/driver/sender/receiver/system"
        ))),
    }
}

/// Identity set by the upstream auth layer.
#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let role = header(parts, ACTOR_ROLE_HEADER)?
            .ok_or_else(|| AppError::Forbidden(format!("missing {ACTOR_ROLE_HEADER} header")))?;
        let role = parse_role(role)?;

        let id = match header(parts, ACTOR_ID_HEADER)? {
            Some(raw) => Some(
                Uuid::parse_str(raw.trim())
                    .map_err(|err| AppError::BadRequest(format!("invalid {ACTOR_ID_HEADER}: {err}")))?,
            ),
            None => None,
        };

        if id.is_none() && role != ActorRole::System {
            return Err(AppError::BadRequest(format!(
                "{ACTOR_ID_HEADER} is required for role {role:?}"
            )));
        }

        Ok(Actor { role, id })
    }
}
