//! src/error.rs
//! ============================================================================
//! # `DeckError`: Unified Error Type for the Plugin Runtime
//!
//! Every fallible operation in the crate returns `DeckResult<T>`. Only the
//! construction-time variants (see [`DeckError::is_fatal`]) may abort startup;
//! everything raised while processing a single inbound event is logged by the
//! dispatcher and the runtime keeps serving the next one.

use std::{io, path::PathBuf};
use thiserror::Error;
use tracing::{error, warn};

use crate::controller::routing::DISPATCH_TARGET;

pub type DeckResult<T> = Result<T, DeckError>;

/// Unified error type for all plugin runtime operations.
#[derive(Debug, Error)]
pub enum DeckError {
    /// Inbound event name has no entry in the routing table.
    #[error("No route for event '{event}'")]
    UnknownRoute { event: String },

    /// Message or payload does not match the shape its route expects.
    #[error("Invalid '{event}' message: {reason}")]
    PayloadValidation { event: String, reason: String },

    /// A targeted route referenced an action type that was never registered.
    #[error("Action '{action}' is not registered (event '{event}')")]
    UnregisteredAction { event: String, action: String },

    /// A handler was registered without a usable action identifier.
    #[error("Action handler {type_name} has no action identifier")]
    MissingActionIdentifier { type_name: &'static str },

    /// The same action identifier was registered twice.
    #[error("Action '{action}' is already registered")]
    DuplicateRegistration { action: String },

    /// Two routing table entries share one event name.
    #[error("Event '{event}' is routed twice")]
    DuplicateRoute { event: String },

    /// A route pairs a handler method with a payload it cannot accept.
    #[error("Route '{event}': handler {method} cannot accept {payload} payloads")]
    RouteMismatch {
        event: String,
        method: &'static str,
        payload: &'static str,
    },

    /// An application handler returned an error or panicked.
    #[error("Handler {method} failed for {target}: {reason}")]
    HandlerExecution {
        method: &'static str,
        target: String,
        reason: String,
    },

    /// The outbound sender was handed something it cannot transmit.
    #[error("Refusing to send invalid payload: {reason}")]
    InvalidSendPayload { reason: String },

    /// The outbound writer has stopped.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Reading or writing a transport frame failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// TOML config parsing error.
    #[error("Config parse error: {0}")]
    Config(#[from] toml::de::Error),

    /// Config file I/O error with path.
    #[error("Failed to read config file {path:?}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Standard IO error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl DeckError {
    /// Create a payload validation error
    pub fn payload_validation<S1: Into<String>, S2: Into<String>>(event: S1, reason: S2) -> Self {
        Self::PayloadValidation {
            event: event.into(),
            reason: reason.into(),
        }
    }

    /// Create an unknown route error
    pub fn unknown_route<S: Into<String>>(event: S) -> Self {
        Self::UnknownRoute {
            event: event.into(),
        }
    }

    /// Create an unregistered action error
    pub fn unregistered_action<S1: Into<String>, S2: Into<String>>(event: S1, action: S2) -> Self {
        Self::UnregisteredAction {
            event: event.into(),
            action: action.into(),
        }
    }

    /// Create a handler execution error
    pub fn handler_execution<S1: Into<String>, S2: Into<String>>(
        method: &'static str,
        target: S1,
        reason: S2,
    ) -> Self {
        Self::HandlerExecution {
            method,
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid send payload error
    pub fn invalid_send<S: Into<String>>(reason: S) -> Self {
        Self::InvalidSendPayload {
            reason: reason.into(),
        }
    }

    /// Construction errors abort startup; everything else is per-event.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MissingActionIdentifier { .. }
                | Self::DuplicateRegistration { .. }
                | Self::DuplicateRoute { .. }
                | Self::RouteMismatch { .. }
        )
    }

    /// Emit this error at the level the runtime reports it with.
    ///
    /// Protocol drift (unknown events, unknown actions) is a warning; broken
    /// payloads and failing handlers are errors.
    pub fn log(&self) {
        match self {
            Self::UnknownRoute { .. } | Self::UnregisteredAction { .. } => {
                warn!(target: DISPATCH_TARGET, error = %self, "dropping event");
            }
            _ => {
                error!(target: DISPATCH_TARGET, error = %self, "dropping event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_construction_errors_are_fatal() {
        assert!(DeckError::DuplicateRegistration { action: "a".into() }.is_fatal());
        assert!(DeckError::MissingActionIdentifier { type_name: "X" }.is_fatal());
        assert!(DeckError::DuplicateRoute { event: "keyUp".into() }.is_fatal());

        assert!(!DeckError::unknown_route("unknownThing").is_fatal());
        assert!(!DeckError::payload_validation("keyUp", "missing context").is_fatal());
        assert!(!DeckError::handler_execution("on_key_up", "ctx", "boom").is_fatal());
        assert!(!DeckError::invalid_send("number").is_fatal());
    }

    #[test]
    fn test_messages_carry_context() {
        let err: DeckError = DeckError::unregistered_action("keyDown", "com.example.missing");
        let text: String = err.to_string();
        assert!(text.contains("com.example.missing"));
        assert!(text.contains("keyDown"));
    }
}
