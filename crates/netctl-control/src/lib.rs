//! Control plane for a virtual-port network adapter.
//!
//! An [`Adapter`] talks to device firmware over a [`netctl_virtchnl::MailboxTransport`] with
//! at most one command outstanding at a time. Startup negotiates the protocol version and
//! capabilities; after that the adapter creates, enables and configures virtual ports, each a
//! command round-trip whose result is only recorded once firmware acknowledged it.
//!
//! ```text
//! issuer                      CommandSlot                     completion path
//!   acquire(op) ───────────► pending = op
//!   submit ── frame ──► firmware ── reply ──► classify ──► notify(op, retval, payload)
//!   wait: poll until idle ◄─ pending = none (after response + retval are published)
//! ```

pub mod adapter;
pub mod config;
pub mod engine;
pub mod error;
mod negotiate;
pub mod registry;
pub mod slot;
pub mod vport;

pub use adapter::{Adapter, NegotiationState};
pub use config::{parse_vport_list, AdapterConfig};
pub use engine::{CommandEngine, CommandInfo, CompletionMode, CompletionPath, Serviced};
pub use error::{CtlError, ErrorKind, Result};
pub use registry::{AdapterRegistry, DeviceId};
pub use slot::CommandSlot;
pub use vport::{ChunkLayout, HostDataHandle, QueueCounts, QueueRegion, VirtualPort};
