//! Error types for the container runtime.
//!
//! Every failure raised by registration, resolution or lifecycle orchestration
//! is a [`ContainerError`]. User code (factories, class builders, hooks)
//! returns `anyhow::Result` and is wrapped here with the token it belongs to.

use thiserror::Error;

use crate::provider::Token;

/// Main error type for container operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ContainerError {
    /// Missing token, invalid variant fields, unknown import or dependency
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Resolve of a token that has no registered provider
    #[error("No provider registered for token '{token}'")]
    UnknownProvider { token: Token },

    /// Resolution re-entered a token already on the resolution stack
    #[error("Circular dependency detected: {}", .path.join(" -> "))]
    CircularDependency { path: Vec<Token> },

    /// Request-scoped provider resolved without an active request context
    #[error("Provider '{token}' is request-scoped and no request context is active")]
    ScopeContext { token: Token },

    /// Lifecycle hook returned an error
    #[error("Hook '{hook}' failed on '{token}': {reason}")]
    Hook {
        token: Token,
        hook: String,
        reason: String,
    },

    /// Factory or class builder returned an error
    #[error("Failed to construct '{token}': {reason}")]
    Factory { token: Token, reason: String },

    /// Resolved instance is not of the requested type
    #[error("Instance for '{token}' is not a {expected}")]
    TypeMismatch { token: Token, expected: String },

    /// Lifecycle operation invoked in a state that does not allow it
    #[error("Invalid state: {message}")]
    InvalidState { message: String },
}

pub type ContainerResult<T> = Result<T, ContainerError>;

impl ContainerError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn unknown_provider(token: impl Into<Token>) -> Self {
        Self::UnknownProvider {
            token: token.into(),
        }
    }

    /// Wrap a hook error, keeping its full context chain
    pub fn hook(token: impl Into<Token>, hook: impl Into<String>, err: anyhow::Error) -> Self {
        Self::Hook {
            token: token.into(),
            hook: hook.into(),
            reason: format!("{err:#}"),
        }
    }

    pub fn factory(token: impl Into<Token>, err: anyhow::Error) -> Self {
        Self::Factory {
            token: token.into(),
            reason: format!("{err:#}"),
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    pub fn is_unknown_provider(&self) -> bool {
        matches!(self, Self::UnknownProvider { .. })
    }

    /// True for `CircularDependency`
    pub fn is_circular(&self) -> bool {
        matches!(self, Self::CircularDependency { .. })
    }

    pub fn is_scope_context(&self) -> bool {
        matches!(self, Self::ScopeContext { .. })
    }

    /// Cycle path carried by a `CircularDependency` error
    pub fn cycle_path(&self) -> Option<&[Token]> {
        match self {
            Self::CircularDependency { path } => Some(path),
            _ => None,
        }
    }
}

/// Errors raised by offline graph analysis
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Graph contains a cycle through '{token}'")]
    Cycle { token: Token },

    #[error("Unknown graph node '{token}'")]
    UnknownNode { token: Token },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circular_display_joins_path() {
        let err = ContainerError::CircularDependency {
            path: vec!["A".into(), "B".into(), "C".into(), "A".into()],
        };
        assert_eq!(err.to_string(), "Circular dependency detected: A -> B -> C -> A");
        assert!(err.is_circular());
        assert_eq!(err.cycle_path().map(|p| p.len()), Some(4));
    }

    #[test]
    fn test_hook_error_keeps_context_chain() {
        let source = anyhow::anyhow!("disk full").context("flushing cache");
        let err = ContainerError::hook("Cache", "onDestroy", source);
        match err {
            ContainerError::Hook { token, hook, reason } => {
                assert_eq!(token, "Cache");
                assert_eq!(hook, "onDestroy");
                assert_eq!(reason, "flushing cache: disk full");
            }
            other => panic!("Expected Hook error, got {other:?}"),
        }
    }
}
