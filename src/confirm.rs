use clap::Args;
use thiserror::Error;

pub const CLEAR_TOKEN: &str = "CLEAR";
pub const REPLACE_TOKEN: &str = "REPLACE";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfirmError {
    #[error("Canceled, nothing was changed.")]
    Declined,
    #[error("Canceled. Type {expected} exactly to proceed.")]
    TokenMismatch { expected: &'static str },
}

/// The pending effect of a destructive operation. Nothing has happened yet; the
/// caller shows `description` and comes back with an [`Acknowledgement`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub description: String,
    pub token: &'static str,
}

impl Plan {
    pub fn new(description: impl Into<String>, token: &'static str) -> Self {
        Self {
            description: description.into(),
            token,
        }
    }

    pub fn accept(&self, ack: &Acknowledgement) -> Result<(), ConfirmError> {
        if !ack.confirmed {
            return Err(ConfirmError::Declined);
        }
        if ack.token != self.token {
            return Err(ConfirmError::TokenMismatch {
                expected: self.token,
            });
        }
        Ok(())
    }

    pub fn prompt(&self) -> String {
        format!(
            "{} Re-run with --yes --token {} to proceed.",
            self.description, self.token
        )
    }
}

/// Yes/no answer followed by the literal token challenge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Args)]
pub struct Acknowledgement {
    /// Confirm the destructive operation
    #[arg(long = "yes")]
    pub confirmed: bool,
    /// Literal confirmation token
    #[arg(long, default_value = "")]
    pub token: String,
}

impl Acknowledgement {
    pub fn new(confirmed: bool, token: &str) -> Self {
        Self {
            confirmed,
            token: token.to_owned(),
        }
    }

    /// Nothing asked for yet, the caller only wants the plan.
    pub fn is_empty(&self) -> bool {
        !self.confirmed && self.token.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_requires_confirmation() {
        let plan = Plan::new("Clear 3 payments.", CLEAR_TOKEN);
        assert_eq!(
            plan.accept(&Acknowledgement::new(false, "CLEAR")),
            Err(ConfirmError::Declined)
        );
    }

    #[test]
    fn test_accept_requires_exact_token() {
        let plan = Plan::new("Clear 3 payments.", CLEAR_TOKEN);
        assert_eq!(
            plan.accept(&Acknowledgement::new(true, "clear")),
            Err(ConfirmError::TokenMismatch { expected: "CLEAR" })
        );
        assert_eq!(
            plan.accept(&Acknowledgement::new(true, " CLEAR")),
            Err(ConfirmError::TokenMismatch { expected: "CLEAR" })
        );
        assert_eq!(plan.accept(&Acknowledgement::new(true, "CLEAR")), Ok(()));
    }

    #[test]
    fn test_prompt_names_token() {
        let plan = Plan::new("Replace all cards.", REPLACE_TOKEN);
        assert_eq!(
            plan.prompt(),
            "Replace all cards. Re-run with --yes --token REPLACE to proceed."
        );
    }
}
