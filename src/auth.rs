//! Caller identity supplied by the upstream identity layer.
//!
//! The gateway in front of this service authenticates users and forwards
//! `x-user-id` and `x-user-role` headers; we trust them as-is. Authorization
//! is checked once per operation through `Actor` instead of re-implementing
//! role-string comparisons in every handler.

use axum::{
    extract::FromRequestParts,
    http::request::Parts,
};
use serde::Serialize;

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Volunteer,
    OrgAdmin,
    Admin,
}

impl Role {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "volunteer" => Some(Role::Volunteer),
            "org_admin" => Some(Role::OrgAdmin),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub user_id: i32,
    pub role: Role,
}

impl Actor {
    pub fn require_volunteer(&self) -> Result<(), ApiError> {
        if self.role == Role::Volunteer {
            Ok(())
        } else {
            Err(ApiError::Authorization(
                "only volunteers can perform this action".to_string(),
            ))
        }
    }

    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(ApiError::Authorization("admin role required".to_string()))
        }
    }

    pub fn require_staff(&self) -> Result<(), ApiError> {
        if matches!(self.role, Role::OrgAdmin | Role::Admin) {
            Ok(())
        } else {
            Err(ApiError::Authorization(
                "organization admin or admin role required".to_string(),
            ))
        }
    }

    /// Whether this actor may manage resources owned by `owner_user_id`.
    /// Platform admins may manage anything; org admins only what they own.
    pub fn owns_or_admin(&self, owner_user_id: i32) -> Result<(), ApiError> {
        if self.role == Role::Admin || self.user_id == owner_user_id {
            Ok(())
        } else {
            Err(ApiError::Authorization(
                "you do not manage this resource".to_string(),
            ))
        }
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("x-user-id")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.parse::<i32>().ok())
            .ok_or_else(|| ApiError::Authorization("missing or invalid x-user-id".to_string()))?;

        let role = parts
            .headers
            .get("x-user-role")
            .and_then(|h| h.to_str().ok())
            .and_then(Role::parse)
            .ok_or_else(|| ApiError::Authorization("missing or invalid x-user-role".to_string()))?;

        Ok(Actor { user_id, role })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volunteer_cannot_act_as_admin() {
        let actor = Actor { user_id: 1, role: Role::Volunteer };
        assert!(actor.require_volunteer().is_ok());
        assert!(actor.require_admin().is_err());
        assert!(actor.require_staff().is_err());
    }

    #[test]
    fn admin_owns_everything() {
        let actor = Actor { user_id: 1, role: Role::Admin };
        assert!(actor.owns_or_admin(999).is_ok());
        assert!(actor.require_staff().is_ok());
    }

    #[test]
    fn org_admin_owns_only_own_resources() {
        let actor = Actor { user_id: 7, role: Role::OrgAdmin };
        assert!(actor.owns_or_admin(7).is_ok());
        assert!(actor.owns_or_admin(8).is_err());
    }

    #[test]
    fn unknown_role_string_is_rejected() {
        assert!(Role::parse("superuser").is_none());
        assert_eq!(Role::parse("org_admin"), Some(Role::OrgAdmin));
    }
}
