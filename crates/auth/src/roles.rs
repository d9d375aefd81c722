use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Role name carried in the token.
///
/// Roles stay opaque strings so the identity layer can add new ones without a
/// release here; only [`Role::ADMIN`] has meaning to this service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    /// Staff: manages stock and settles donation requests.
    pub const ADMIN: Role = Role(Cow::Borrowed("admin"));
    pub const DONOR: Role = Role(Cow::Borrowed("donor"));
    pub const HOSPITAL: Role = Role(Cow::Borrowed("hospital"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_staff(&self) -> bool {
        self.as_str() == Self::ADMIN.as_str()
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
