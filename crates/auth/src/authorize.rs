//! Staff guard.
//!
//! - No IO
//! - No panics
//! - Pure policy check on the roles carried by the token

use thiserror::Error;

use bloodline_core::UserId;

use crate::Role;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: staff role required")]
    StaffOnly,

    #[error("forbidden: not your resource")]
    NotOwner,
}

/// Staff-only operations: approvals, rejections, stock and bank management.
pub fn require_staff(roles: &[Role]) -> Result<(), AuthzError> {
    if roles.iter().any(Role::is_staff) {
        Ok(())
    } else {
        Err(AuthzError::StaffOnly)
    }
}

/// Per-user reads: the owner or any staff member.
pub fn require_self_or_staff(
    principal: UserId,
    roles: &[Role],
    owner: UserId,
) -> Result<(), AuthzError> {
    if principal == owner || require_staff(roles).is_ok() {
        Ok(())
    } else {
        Err(AuthzError::NotOwner)
    }
}
