//! Authentication context handed over by the request gateway.

use serde::{Deserialize, Serialize};

use crate::types::{Role, UserId};

/// Who is making a request.
///
/// Session issuance happens outside this workspace; the gateway resolves
/// the session and passes the result here.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthContext {
    /// Authenticated account, `None` for anonymous callers.
    pub user_id: Option<UserId>,
    /// Role of the authenticated account.
    pub role: Option<Role>,
    /// Administrative callers pass every rule, including locked ones.
    pub is_admin: bool,
}

impl AuthContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(user_id: UserId, role: Role) -> Self {
        Self {
            user_id: Some(user_id),
            role: Some(role),
            is_admin: false,
        }
    }

    pub fn admin() -> Self {
        Self {
            user_id: None,
            role: None,
            is_admin: true,
        }
    }
}
