use thiserror::Error;

use super::payment::GatewayError;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// A business rule refused the action. The message is shown to the user as is.
    #[error("{0}")]
    PolicyViolation(String),
    #[error("cannot {action} while status is '{from}'")]
    InvalidTransition {
        from: &'static str,
        action: &'static str,
    },
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        DomainError::InvalidInput(msg.into())
    }

    pub fn policy(msg: impl Into<String>) -> Self {
        DomainError::PolicyViolation(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        DomainError::Forbidden(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_names_status_and_action() {
        let err = DomainError::InvalidTransition {
            from: "delivered",
            action: "cancel",
        };
        assert_eq!(err.to_string(), "cannot cancel while status is 'delivered'");
    }

    #[test]
    fn policy_violation_is_shown_verbatim() {
        let err = DomainError::policy("cannot cancel after delivery");
        assert_eq!(err.to_string(), "cannot cancel after delivery");
    }

    #[test]
    fn not_found_names_entity() {
        assert_eq!(DomainError::NotFound("Order").to_string(), "Order not found");
    }
}
