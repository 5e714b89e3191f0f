use thiserror::Error;

use crate::operation::ParamKind;

/// Problems with the pipeline layout. These abort startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("duplicate operation name: {0}")]
    DuplicateOperation(String),

    #[error("duplicate parameter name: {0}")]
    DuplicateParameter(String),

    #[error("invalid operation name {0:?}")]
    InvalidOperationName(String),

    #[error("invalid parameter tag {tag:?} on operation {operation}")]
    InvalidParameterTag { operation: String, tag: String },

    #[error("unknown effect {0:?}")]
    UnknownEffect(String),

    #[error("frame rate must be positive, got {0}")]
    InvalidFrameRate(u32),
}

/// A control message that could not be applied. The target is left untouched.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UpdateError {
    #[error("no parameter named {0}")]
    UnknownParameter(String),

    #[error("cannot parse {payload:?} as {kind} for {name}: {reason}")]
    Parse {
        name: String,
        payload: String,
        kind: ParamKind,
        reason: String,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("operation {operation} failed to render: {reason}")]
pub struct RenderError {
    pub operation: String,
    pub reason: String,
}

impl RenderError {
    pub fn new(operation: &str, reason: impl Into<String>) -> Self {
        RenderError {
            operation: operation.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("viewer connection is closed")]
    Closed,

    #[error("viewer is not keeping up, frame dropped")]
    Backlogged,
}
