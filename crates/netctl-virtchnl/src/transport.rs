use std::sync::Arc;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("mailbox send queue is full")]
    Full,

    #[error("mailbox is not initialized")]
    NotReady,

    #[error("mailbox access failed: {0}")]
    Io(String),
}

/// Raw mailbox primitive the control plane calls into.
///
/// Implementations move whole frames; they do not interpret them. Both methods take `&self`
/// because the issuing context and the completion context use the same mailbox concurrently.
pub trait MailboxTransport: Send + Sync {
    /// Queue one frame for delivery to firmware.
    fn send(&self, frame: &[u8]) -> Result<(), TransportError>;

    /// Fetch the next frame from firmware, if any.
    fn poll(&self) -> Result<Option<Vec<u8>>, TransportError>;
}

impl<T: MailboxTransport + ?Sized> MailboxTransport for &T {
    fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
        <T as MailboxTransport>::send(&**self, frame)
    }

    fn poll(&self) -> Result<Option<Vec<u8>>, TransportError> {
        <T as MailboxTransport>::poll(&**self)
    }
}

impl<T: MailboxTransport + ?Sized> MailboxTransport for Box<T> {
    fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
        <T as MailboxTransport>::send(&**self, frame)
    }

    fn poll(&self) -> Result<Option<Vec<u8>>, TransportError> {
        <T as MailboxTransport>::poll(&**self)
    }
}

impl<T: MailboxTransport + ?Sized> MailboxTransport for Arc<T> {
    fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
        <T as MailboxTransport>::send(&**self, frame)
    }

    fn poll(&self) -> Result<Option<Vec<u8>>, TransportError> {
        <T as MailboxTransport>::poll(&**self)
    }
}
