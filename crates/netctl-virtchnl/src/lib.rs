//! Control-channel protocol spoken over the device mailbox.
//!
//! This crate is the leaf of the control plane. It knows nothing about adapters or
//! virtual ports; it only defines:
//!
//! - [`Opcode`] and the firmware status codes ([`status`])
//! - [`MailboxMessage`]: the frame every mailbox record carries
//! - typed payloads ([`VersionInfo`], [`Capabilities`], [`CreateVportRequest`], ...)
//! - [`classify`]: turning a raw mailbox event into a [`MessageClass`]
//! - [`MailboxTransport`]: the send/poll primitive the control plane calls into
//!
//! All multi-byte fields are little-endian. Decoders validate lengths and enum values and
//! reject trailing bytes; they never panic on malformed input.

mod caps;
mod classify;
mod event;
mod frame;
mod opcode;
mod queues;
mod transport;
mod vport;
mod wire;

pub use caps::{
    Capabilities, ChecksumCaps, OtherCaps, RssCaps, SegmentationCaps, VersionInfo,
    VERSION_MAJOR, VERSION_MINOR,
};
pub use classify::{classify, MessageClass};
pub use event::{EventKind, EventMessage};
pub use frame::{MailboxMessage, FRAME_HEADER_LEN, MAX_MAILBOX_PAYLOAD};
pub use opcode::{status, Opcode, OPCODE_NONE};
pub use queues::{
    max_queues_per_msg, ConfigRxQueues, ConfigTxQueues, RxQueueInfo, TxQueueInfo,
    CONFIG_QUEUES_HEADER_LEN,
};
pub use transport::{MailboxTransport, TransportError};
pub use vport::{
    CreateVportRequest, CreateVportResponse, QueueModel, QueueRegChunk, QueueType, VportRef,
};
pub use wire::DecodeError;
