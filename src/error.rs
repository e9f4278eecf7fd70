//! Error types for Viaduct.

use thiserror::Error;

/// Result type alias using Viaduct's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Viaduct operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A caller-supplied argument was invalid (unknown stage, bad handle).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The stage is already attached to a pipe.
    #[error("stage '{stage}' is already attached to a pipe")]
    AlreadyAttached {
        /// Name of the offending stage.
        stage: String,
    },

    /// A stage with the same identity is already registered.
    #[error("stage '{name}' is already registered")]
    AlreadyRegistered {
        /// Identity of the offending stage.
        name: String,
    },

    /// The requested stage is not known to the registry or chain.
    #[error("stage not found: {0}")]
    NotFound(String),

    /// The `previous` stage given to attach is not attached to the same pipe.
    #[error("previous stage '{previous}' is not attached to the target pipe")]
    InvalidPrevious {
        /// Name of the stage passed as `previous`.
        previous: String,
    },

    /// Allocation failed while duplicating or building stage state.
    #[error("allocation failed: {0}")]
    OutOfMemory(String),

    /// Format negotiation failed: no format combination can be transported
    /// end-to-end through the chain.
    #[error("unsupported format configuration: {0}")]
    Unsupported(String),

    /// Internal invariant violation. This signals chain/transaction misuse by
    /// the commit driver, not bad input; it is logged at error level when
    /// constructed.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// A stage hook itself returned failure (attach, validate, or a
    /// lifecycle hook with a must-succeed contract).
    #[error("stage '{stage}' rejected {phase}: {source}")]
    StageRejected {
        /// Name of the rejecting stage.
        stage: String,
        /// The operation the stage rejected.
        phase: &'static str,
        /// The stage's own error.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Build an [`Error::IllegalState`], logging it loudly. Hitting this path
    /// means the caller broke the duplicate-before-use or single-transaction
    /// protocol, so it must never go unnoticed.
    pub(crate) fn illegal_state(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::error!("illegal state: {msg}");
        Self::IllegalState(msg)
    }

    /// Wrap a stage hook failure with the stage and phase identity.
    pub(crate) fn rejected(stage: impl Into<String>, phase: &'static str, source: Error) -> Self {
        Self::StageRejected {
            stage: stage.into(),
            phase,
            source: Box::new(source),
        }
    }
}
