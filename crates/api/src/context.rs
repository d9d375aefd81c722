use bloodline_auth::{AuthzError, Role, require_self_or_staff, require_staff};
use bloodline_core::UserId;

/// Principal context for a request (authenticated identity + roles).
///
/// Inserted by the auth middleware; handlers pass `user_id()` explicitly as
/// the requester or approver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    user_id: UserId,
    roles: Vec<Role>,
}

impl PrincipalContext {
    pub fn new(user_id: UserId, roles: Vec<Role>) -> Self {
        Self { user_id, roles }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn is_staff(&self) -> bool {
        require_staff(&self.roles).is_ok()
    }

    pub fn require_staff(&self) -> Result<(), AuthzError> {
        require_staff(&self.roles)
    }

    pub fn require_self_or_staff(&self, owner: UserId) -> Result<(), AuthzError> {
        require_self_or_staff(self.user_id, &self.roles, owner)
    }
}
