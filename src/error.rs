//! Error taxonomy for the windowing engine
//!
//! Every public operation returns [`Result`]. Nothing is retried automatically
//! except the bounded shared-memory name retry in [`crate::shm`].

use thiserror::Error;

/// Errors produced by the engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// The Wayland display could not be reached at all
    #[error("no Wayland display reachable: {0}")]
    NoDisplay(String),

    /// A required global was not advertised by the compositor
    #[error("compositor does not advertise required global `{0}`")]
    MissingCapability(&'static str),

    /// No shared-memory object could be created within the attempt budget
    #[error("could not allocate shared memory after {attempts} attempts")]
    ResourceExhausted { attempts: u32 },

    /// Submitted content does not match the current window dimensions
    #[error("content is {actual} bytes but the window expects {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    /// The transport failed while dispatching
    #[error("connection to compositor lost: {0}")]
    ConnectionLost(String),

    /// An operation was attempted on a closed window
    #[error("window used after close")]
    UseAfterClose,

    /// Width or height is zero or too large for a shm buffer
    #[error("invalid window dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    /// The keyboard layout library rejected a keymap
    #[error("keymap rejected: {0}")]
    Keymap(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// Whether the window can keep running after this error
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::NoDisplay(_)
                | EngineError::MissingCapability(_)
                | EngineError::ConnectionLost(_)
                | EngineError::UseAfterClose
        )
    }
}
