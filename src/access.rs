//! Roles and explicit authorization checks
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    #[n(0)]
    Admin,
    #[n(1)]
    Producer,
    #[n(2)]
    Artist,
    #[n(3)]
    User,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Producer, Role::Artist, Role::User];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Producer => "producer",
            Role::Artist => "artist",
            Role::User => "user",
        }
    }

    /// Regular users are approved on registration, every other role waits for an admin.
    pub fn auto_approved(&self) -> bool {
        matches!(self, Role::User)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| ValidationError::invalid("role", s))
    }
}

/// The authenticated identity performing an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
    pub role: Role,
    pub is_active: bool,
    pub is_approved: bool,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessDenied {
    #[error("access denied")]
    Forbidden,
    #[error("account is inactive")]
    Inactive,
    #[error("account is pending approval")]
    PendingApproval,
}

/// Checks the caller against the allowed roles and, when given, the owning user id.
pub fn authorize(caller: &Caller, allowed: &[Role], owner: Option<&str>) -> Result<(), AccessDenied> {
    if !caller.is_active {
        return Err(AccessDenied::Inactive);
    }
    if !allowed.contains(&caller.role) {
        return Err(AccessDenied::Forbidden);
    }
    if !caller.is_approved && !caller.role.auto_approved() {
        return Err(AccessDenied::PendingApproval);
    }
    match owner {
        Some(owner_id) if owner_id != caller.user_id => Err(AccessDenied::Forbidden),
        _ => Ok(()),
    }
}

/// Ownership check where admins are exempt.
pub fn authorize_owner_or_admin(
    caller: &Caller,
    allowed: &[Role],
    owner: Option<&str>,
) -> Result<(), AccessDenied> {
    if caller.role == Role::Admin {
        return authorize(caller, allowed, None);
    }
    authorize(caller, allowed, owner)
}
