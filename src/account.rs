//! User accounts
use chrono::Utc;

use crate::access::{AccessDenied, Caller, Role};
use crate::error::ValidationError;
use crate::types::TimeStamp;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct User {
    #[n(0)]
    pub id: String, // bech32 encoded uuid7
    #[n(1)]
    pub username: String,
    #[n(2)]
    pub email: String,
    #[n(3)]
    pub role: Role,
    #[n(4)]
    pub is_active: bool, // login gate
    #[n(5)]
    pub is_approved: bool, // privilege gate
    #[n(6)]
    pub first_name: Option<String>,
    #[n(7)]
    pub last_name: Option<String>,
    #[n(8)]
    pub bio: Option<String>,
    #[n(9)]
    pub created_at: TimeStamp<Utc>,
    #[n(10)]
    pub last_login: Option<TimeStamp<Utc>>,
}

/// Registration form
#[derive(Debug, Default, Clone)]
pub struct NewUser {
    pub username: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl NewUser {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_username(mut self, username: &str) -> Self {
        self.username = Some(username.to_string());
        self
    }
    pub fn set_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }
    pub fn set_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }
    pub fn set_name(mut self, first: &str, last: &str) -> Self {
        self.first_name = Some(first.to_string());
        self.last_name = Some(last.to_string());
        self
    }

    pub fn validate_and_finalise(self, id: String) -> Result<User, ValidationError> {
        let username = required(self.username, "username")?;
        let email = required(self.email, "email")?;
        if !email.contains('@') {
            return Err(ValidationError::invalid("email", email));
        }
        let role = self.role.unwrap_or(Role::User);

        Ok(User {
            id,
            username,
            email,
            role,
            is_active: true,
            is_approved: role.auto_approved(),
            first_name: self.first_name,
            last_name: self.last_name,
            bio: None,
            created_at: TimeStamp::new(),
            last_login: None,
        })
    }
}

impl User {
    pub fn full_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            _ => self.username.clone(),
        }
    }

    pub fn caller(&self) -> Caller {
        Caller {
            user_id: self.id.clone(),
            role: self.role,
            is_active: self.is_active,
            is_approved: self.is_approved,
        }
    }

    pub fn check_login(&self) -> Result<(), AccessDenied> {
        if !self.is_active {
            return Err(AccessDenied::Inactive);
        }
        if !self.is_approved && !self.role.auto_approved() {
            return Err(AccessDenied::PendingApproval);
        }
        Ok(())
    }
}

/// Ids of the records tied to one account, kept so deletion can find them inside a
/// single transaction.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Default, PartialEq, Eq)]
pub struct Holdings {
    #[n(0)]
    pub messages: Vec<String>,
    #[n(1)]
    pub sessions: Vec<String>,
    #[n(2)]
    pub orders: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Held {
    Message,
    Session,
    Order,
}

impl Holdings {
    pub fn add(&mut self, kind: Held, record_id: &str) {
        let ids = match kind {
            Held::Message => &mut self.messages,
            Held::Session => &mut self.sessions,
            Held::Order => &mut self.orders,
        };
        if !ids.iter().any(|id| id == record_id) {
            ids.push(record_id.to_string());
        }
    }
}

pub(crate) fn required(value: Option<String>, field: &'static str) -> Result<String, ValidationError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(ValidationError::MissingField(field)),
    }
}
