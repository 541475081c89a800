//! Caller identity.
//!
//! The edge layer verifies the bearer token and hands the core a plain
//! [`Caller`] value. Business logic never decodes tokens itself; it only asks
//! the caller who they are and what role they hold.

use crate::error::{ServiceError, ServiceResult};
use serde::{Deserialize, Serialize};

/// Role claim carried by every authenticated request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Operator with access to every order and the delivery controls
    Admin,
    /// Regular buyer
    Customer,
}

/// Verified identity of the caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    /// Subject id from the token (`users.id`)
    pub user_id: i64,
    /// Email claim
    pub email: String,
    /// Optional display name claim
    pub name: Option<String>,
    /// Role claim
    pub role: Role,
}

impl Caller {
    /// Build a customer identity.
    #[must_use]
    pub fn customer(user_id: i64, email: impl Into<String>) -> Self {
        Self {
            user_id,
            email: email.into(),
            name: None,
            role: Role::Customer,
        }
    }

    /// Build an operator identity.
    #[must_use]
    pub fn operator(user_id: i64, email: impl Into<String>) -> Self {
        Self {
            user_id,
            email: email.into(),
            name: None,
            role: Role::Admin,
        }
    }

    /// Whether the caller acts on behalf of the operator team.
    #[must_use]
    pub fn is_operator(&self) -> bool {
        self.role == Role::Admin
    }

    /// Reject callers that are not operators.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Forbidden`] for customers.
    pub fn require_operator(&self) -> ServiceResult<()> {
        if self.is_operator() {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(
                "operator role required".to_string(),
            ))
        }
    }

    /// Name to greet the caller with: the name claim, else the email's local part.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| email_local_part(&self.email))
    }
}

/// Part of an email address before `@` (the whole string if there is none).
#[must_use]
pub fn email_local_part(email: &str) -> String {
    email.split('@').next().unwrap_or(email).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn customers_are_not_operators() {
        let caller = Caller::customer(1, "ana@example.com");
        assert!(!caller.is_operator());
        assert!(matches!(
            caller.require_operator(),
            Err(ServiceError::Forbidden(_))
        ));
        assert!(Caller::operator(2, "ops@example.com").require_operator().is_ok());
    }

    #[test]
    fn display_name_falls_back_to_email_local_part() {
        let mut caller = Caller::customer(1, "ana.lopez@example.com");
        assert_eq!(caller.display_name(), "ana.lopez");
        caller.name = Some("Ana".to_string());
        assert_eq!(caller.display_name(), "Ana");
    }

    #[test]
    fn role_uses_upper_case_claims() {
        let role: Role = serde_json::from_str("\"ADMIN\"").unwrap_or(Role::Customer);
        assert_eq!(role, Role::Admin);
    }
}
