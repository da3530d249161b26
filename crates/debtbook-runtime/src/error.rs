#![forbid(unsafe_code)]

//! Error types for the render scheduler.
//!
//! None of these ever escape [`RenderScheduler::invalidate`]; they exist so
//! renderers and hooks have a typed failure channel, and so registration can
//! report a rejected binding to its caller.
//!
//! [`RenderScheduler::invalidate`]: crate::RenderScheduler::invalidate

use std::any::Any;
use std::fmt;

use crate::view_key::ViewKey;

/// A failure reported by a renderer or by the derived-state rebuild hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderError {
    message: String,
}

impl RenderError {
    /// Create an error carrying `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Build an error from a caught panic payload.
    #[must_use]
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let detail = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_owned()
        };
        Self::new(format!("panicked: {detail}"))
    }

    /// The failure message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for RenderError {}

impl From<String> for RenderError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for RenderError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Why a renderer could not be bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterError {
    /// [`ViewKey::Derived`] is handled structurally and never takes a renderer.
    ReservedKey,
    /// A different renderer is already bound and the policy forbids replacing it.
    Conflict(ViewKey),
}

impl fmt::Display for RegisterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReservedKey => write!(
                f,
                "view key '{}' is reserved and cannot carry a renderer",
                ViewKey::Derived
            ),
            Self::Conflict(key) => {
                write!(f, "a different renderer is already bound to '{key}'")
            }
        }
    }
}

impl std::error::Error for RegisterError {}
