use std::time::Duration;

use netctl_virtchnl::{Opcode, TransportError};
use thiserror::Error;

use crate::registry::DeviceId;

pub type Result<T> = std::result::Result<T, CtlError>;

/// Coarse error classes callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A command is already in flight on this adapter.
    Busy,
    /// The mailbox failed independently of any particular command.
    Transport,
    /// Mismatched completion, malformed payload, or a step issued out of order.
    Protocol,
    /// Port table full or a per-message/capability limit exceeded.
    ResourceExhausted,
    /// No completion arrived within the poll bound; the slot must be cleared.
    Timeout,
    /// Firmware completed the command with a non-zero return code.
    CommandFailed,
    /// Caller supplied something unusable.
    InvalidArgument,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CtlError {
    #[error("command slot busy: {pending:?} still pending")]
    Busy { pending: Opcode },

    #[error("mailbox transport error: {0}")]
    Transport(String),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("{op:?} timed out after {waited:?}")]
    Timeout { op: Opcode, waited: Duration },

    #[error("{op:?} failed with firmware status {retval}")]
    CommandFailed { op: Opcode, retval: i32 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no virtual port at index {0}")]
    NoSuchVport(u16),

    #[error("adapter {0} is already registered")]
    DuplicateAdapter(DeviceId),
}

impl CtlError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CtlError::Busy { .. } => ErrorKind::Busy,
            CtlError::Transport(_) => ErrorKind::Transport,
            CtlError::ProtocolViolation(_) => ErrorKind::Protocol,
            CtlError::ResourceExhausted(_) => ErrorKind::ResourceExhausted,
            CtlError::Timeout { .. } => ErrorKind::Timeout,
            CtlError::CommandFailed { .. } => ErrorKind::CommandFailed,
            CtlError::InvalidConfig(_)
            | CtlError::NoSuchVport(_)
            | CtlError::DuplicateAdapter(_) => ErrorKind::InvalidArgument,
        }
    }

    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        CtlError::ProtocolViolation(msg.into())
    }
}

impl From<TransportError> for CtlError {
    fn from(err: TransportError) -> Self {
        CtlError::Transport(err.to_string())
    }
}
