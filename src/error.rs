// src/error.rs
//! Error handling for the hair bridge.
//!
//! Load and bind failures are recovered locally by the caller (the entity stays
//! inert, the camera keeps its previous hook). They are returned as [`Error`] so
//! hosts and tests can inspect them, but they never abort a gated render pass.

use std::fmt;
use thiserror::Error;

use crate::entity::EntityId;

/// Which backend resource a load was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Shader,
    Asset,
    Instance,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResourceKind::Shader => "shader",
            ResourceKind::Asset => "asset",
            ResourceKind::Instance => "instance",
        })
    }
}

/// Main error type.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The native hair library failed to initialise. Reported once at startup.
    #[error("hair backend unavailable (sdk version {sdk_version})")]
    BackendUnavailable { sdk_version: String },

    /// A shader, asset or instance load returned an empty handle.
    #[error("failed to load hair {kind} from '{path}'")]
    ResourceLoadFailure { kind: ResourceKind, path: String },

    /// Host state contradicts what the bridge expects, e.g. a camera with two hair hooks.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// No hair entity is registered under this id.
    #[error("unknown hair entity {0:?}")]
    UnknownEntity(EntityId),

    /// I/O errors while reading configuration.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be parsed.
    #[error("config error: {0}")]
    Config(String),

    /// Simple custom message.
    #[error("{0}")]
    Custom(String),

    /// Context chaining.
    #[error("{message}: {source}")]
    WithContext {
        message: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    #[inline]
    pub fn custom<S: Into<String>>(msg: S) -> Self {
        Self::Custom(msg.into())
    }

    #[inline]
    pub fn format(args: fmt::Arguments) -> Self {
        Self::Custom(fmt::format(args))
    }

    #[inline]
    pub fn msg(msg: &'static str) -> Self {
        Self::Custom(msg.into())
    }

    #[inline]
    pub fn load_failure(kind: ResourceKind, path: impl Into<String>) -> Self {
        Self::ResourceLoadFailure {
            kind,
            path: path.into(),
        }
    }

    /// Add context to any error.
    #[inline]
    pub fn context<C: Into<String>>(self, context: C) -> Self {
        Self::WithContext {
            message: context.into(),
            source: Box::new(self),
        }
    }

    /// Strips any context wrappers and returns the underlying error.
    pub fn root(&self) -> &Error {
        match self {
            Error::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    #[inline]
    pub fn is_backend_unavailable(&self) -> bool {
        matches!(self.root(), Error::BackendUnavailable { .. })
    }

    #[inline]
    pub fn is_resource_failure(&self) -> bool {
        matches!(self.root(), Error::ResourceLoadFailure { .. })
    }

    #[inline]
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self.root(), Error::InvariantViolation(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(err.to_string())
    }
}

/// Convenient `Result` alias.
pub type Result<T> = std::result::Result<T, Error>;
