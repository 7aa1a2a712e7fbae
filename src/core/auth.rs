//! Request identity and authorization policies
//!
//! The acting user is always explicit: an [`AuthProvider`] turns request
//! headers into an [`AuthContext`], which is then passed as a parameter to
//! every lifecycle and query call.
//!
//! The default [`HeaderAuthProvider`] reads:
//! - `X-User-Id`: the user's UUID
//! - `X-User-Role`: `buyer`, `seller` or `admin`

use crate::core::error::{MartError, Result};
use async_trait::async_trait;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Buyer,
    Seller,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Buyer => "buyer",
            Role::Seller => "seller",
            Role::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "buyer" => Some(Role::Buyer),
            "seller" => Some(Role::Seller),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authorization context extracted from a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthContext {
    /// Marketplace user acting as buyer or seller
    User { user_id: Uuid, role: Role },

    /// Operator with access to every order
    Admin { admin_id: Uuid },

    /// No identity supplied
    Anonymous,
}

impl AuthContext {
    pub fn buyer(user_id: Uuid) -> Self {
        AuthContext::User {
            user_id,
            role: Role::Buyer,
        }
    }

    pub fn seller(user_id: Uuid) -> Self {
        AuthContext::User {
            user_id,
            role: Role::Seller,
        }
    }

    pub fn admin(admin_id: Uuid) -> Self {
        AuthContext::Admin { admin_id }
    }

    /// Check if context represents an admin
    pub fn is_admin(&self) -> bool {
        matches!(self, AuthContext::Admin { .. })
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, AuthContext::Anonymous)
    }

    /// Role of the actor, if identified
    pub fn role(&self) -> Option<Role> {
        match self {
            AuthContext::User { role, .. } => Some(*role),
            AuthContext::Admin { .. } => Some(Role::Admin),
            AuthContext::Anonymous => None,
        }
    }

    /// Id recorded as `updatedBy` on tracking entries
    pub fn actor_id(&self) -> Option<Uuid> {
        match self {
            AuthContext::User { user_id, .. } => Some(*user_id),
            AuthContext::Admin { admin_id } => Some(*admin_id),
            AuthContext::Anonymous => None,
        }
    }

    /// True when the actor is `user_id` acting in `role`
    pub fn acts_as(&self, role: Role, user_id: &Uuid) -> bool {
        matches!(self, AuthContext::User { user_id: id, role: r } if *r == role && id == user_id)
    }

    /// Fail with 401 when no identity was supplied
    pub fn require_identity(&self) -> Result<()> {
        if self.is_anonymous() {
            Err(MartError::unauthorized(format!(
                "missing {} and {} headers",
                USER_ID_HEADER, USER_ROLE_HEADER
            )))
        } else {
            Ok(())
        }
    }
}

/// Authorization policy for an operation
#[derive(Debug, Clone)]
pub enum AuthPolicy {
    /// Actor must have one of these roles
    HasRole(Vec<Role>),
}

impl AuthPolicy {
    /// Check if auth context satisfies this policy
    pub fn check(&self, context: &AuthContext) -> bool {
        match self {
            AuthPolicy::HasRole(roles) => context.role().is_some_and(|r| roles.contains(&r)),
        }
    }

    /// Like [`AuthPolicy::check`] but maps failure to 401 or 403
    pub fn enforce(&self, context: &AuthContext, action: &str) -> Result<()> {
        if self.check(context) {
            return Ok(());
        }
        context.require_identity()?;
        Err(MartError::forbidden(format!(
            "{} may not {}",
            context.role().map(|r| r.as_str()).unwrap_or("anonymous"),
            action
        )))
    }
}

/// Trait for auth providers
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Extract auth context from request headers
    async fn extract_context(&self, headers: &HeaderMap) -> Result<AuthContext>;
}

/// Reads identity from `X-User-Id` / `X-User-Role`
///
/// Both headers absent means [`AuthContext::Anonymous`]; a malformed or
/// half-present identity is rejected with 401 rather than downgraded.
#[derive(Debug, Clone, Default)]
pub struct HeaderAuthProvider;

impl HeaderAuthProvider {
    pub fn context_from_headers(headers: &HeaderMap) -> Result<AuthContext> {
        let header = |name: &str| -> Result<Option<String>> {
            match headers.get(name) {
                None => Ok(None),
                Some(value) => value
                    .to_str()
                    .map(|v| Some(v.trim().to_string()))
                    .map_err(|_| MartError::unauthorized(format!("{} is not valid text", name))),
            }
        };

        match (header(USER_ID_HEADER)?, header(USER_ROLE_HEADER)?) {
            (None, None) => Ok(AuthContext::Anonymous),
            (Some(id), Some(role)) => {
                let user_id = Uuid::parse_str(&id).map_err(|_| {
                    MartError::unauthorized(format!("{} '{}' is not a UUID", USER_ID_HEADER, id))
                })?;
                let role = Role::parse(&role).ok_or_else(|| {
                    MartError::unauthorized(format!("unknown role '{}'", role))
                })?;
                Ok(match role {
                    Role::Admin => AuthContext::Admin { admin_id: user_id },
                    role => AuthContext::User { user_id, role },
                })
            }
            (Some(_), None) => Err(MartError::unauthorized(format!(
                "{} is required with {}",
                USER_ROLE_HEADER, USER_ID_HEADER
            ))),
            (None, Some(_)) => Err(MartError::unauthorized(format!(
                "{} is required with {}",
                USER_ID_HEADER, USER_ROLE_HEADER
            ))),
        }
    }
}

#[async_trait]
impl AuthProvider for HeaderAuthProvider {
    async fn extract_context(&self, headers: &HeaderMap) -> Result<AuthContext> {
        Self::context_from_headers(headers)
    }
}
