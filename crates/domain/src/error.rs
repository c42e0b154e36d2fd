use thiserror::Error;

/// Errors surfaced by domain-level invariant checks.
///
/// Store and API layers wrap these; see §7 of the spec for the broader
/// error-family taxonomy (validation / not-found / precondition / transient
/// / fatal) that callers map these onto.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid state transition: {resource} cannot move from {from} to {to}")]
    InvalidTransition {
        resource: &'static str,
        from: String,
        to: String,
    },

    #[error("{field} is required")]
    MissingField { field: &'static str },

    #[error("{0}")]
    Invalid(String),
}
