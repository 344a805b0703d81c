//! Command round-trips over the mailbox.
//!
//! [`CommandEngine`] is the issuing side: acquire the slot, submit the request, poll (bounded)
//! for the slot to go idle, then interpret the result code. [`CompletionPath`] is the
//! delivery side: it classifies mailbox events and drives [`CommandSlot::notify`]. The two may
//! run on different threads; they share nothing but the slot and the transport.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use netctl_virtchnl::{
    classify, status, EventMessage, MailboxMessage, MailboxTransport, MessageClass, Opcode,
};
use serde::Deserialize;
use tracing::{debug, error, warn};

use crate::config::AdapterConfig;
use crate::error::{CtlError, Result};
use crate::slot::CommandSlot;

/// Who drains the mailbox while a command is outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionMode {
    /// The issuer services the mailbox itself while it polls. Used before interrupts are
    /// wired up, e.g. during capability negotiation.
    #[default]
    Inline,
    /// A separate context (interrupt handler or event loop) drives [`CompletionPath`]; the
    /// issuer only watches the slot.
    Deferred,
}

/// Request/response envelope for one round-trip.
#[derive(Debug, Clone, Copy)]
pub struct CommandInfo<'a> {
    pub op: Opcode,
    pub in_args: &'a [u8],
    /// Upper bound on the number of response bytes returned to the caller.
    pub out_size: usize,
}

impl<'a> CommandInfo<'a> {
    pub fn new(op: Opcode, in_args: &'a [u8], out_size: usize) -> Self {
        Self {
            op,
            in_args,
            out_size,
        }
    }
}

/// Outcome of servicing one mailbox event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Serviced {
    Idle,
    Completed(Opcode),
    Notification(EventMessage),
    /// The mailbox failed; `released` is the command woken with a transport error, if any.
    TransportFault {
        reason: String,
        released: Option<Opcode>,
    },
    /// A completion did not match the pending command; `released` is the command woken with
    /// a protocol error, if any.
    ProtocolViolation {
        received: Opcode,
        released: Option<Opcode>,
    },
}

pub struct CompletionPath<T> {
    slot: Arc<CommandSlot>,
    transport: Arc<T>,
}

impl<T> Clone for CompletionPath<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
            transport: self.transport.clone(),
        }
    }
}

impl<T: MailboxTransport> CompletionPath<T> {
    /// Read and dispatch at most one mailbox event.
    pub fn service_once(&self) -> Serviced {
        match classify(self.transport.poll()) {
            MessageClass::NoMessage => Serviced::Idle,
            MessageClass::Notification(event) => {
                debug!(?event, "mailbox notification");
                Serviced::Notification(event)
            }
            MessageClass::TransportError(reason) => {
                let released = self.slot.fail_pending(status::ERR_ADMIN_QUEUE_ERROR);
                error!(%reason, ?released, "mailbox transport error");
                Serviced::TransportFault { reason, released }
            }
            MessageClass::Completion(msg) => self.complete(msg),
        }
    }

    /// Service events until the mailbox is empty or `stop` is set. Notifications are handed
    /// to `on_event`; everything else is absorbed into the slot.
    pub fn poll_loop(
        &self,
        stop: &AtomicBool,
        idle_sleep: Duration,
        mut on_event: impl FnMut(EventMessage),
    ) {
        while !stop.load(Ordering::Acquire) {
            match self.service_once() {
                Serviced::Idle => thread::sleep(idle_sleep),
                Serviced::Notification(event) => on_event(event),
                _ => {}
            }
        }
    }

    fn complete(&self, msg: MailboxMessage) -> Serviced {
        let op = match msg.op() {
            Ok(op) => op,
            Err(err) => {
                // `classify` only yields completions with known opcodes.
                let released = self.slot.fail_pending(status::ERR_ADMIN_QUEUE_ERROR);
                return Serviced::TransportFault {
                    reason: err.to_string(),
                    released,
                };
            }
        };

        match self.slot.notify(op, msg.retval, &msg.payload) {
            Ok(()) => {
                debug!(?op, retval = msg.retval, len = msg.payload.len(), "command completed");
                Serviced::Completed(op)
            }
            Err(err) => {
                let released = self.slot.fail_pending(status::ERR_OPCODE_MISMATCH);
                error!(%err, ?released, "unexpected command completion");
                Serviced::ProtocolViolation {
                    received: op,
                    released,
                }
            }
        }
    }
}

pub struct CommandEngine<T> {
    slot: Arc<CommandSlot>,
    transport: Arc<T>,
    completion: CompletionPath<T>,
    mode: CompletionMode,
    timeout: Duration,
    poll_interval: Duration,
    /// Notifications picked up while servicing inline.
    events: Mutex<VecDeque<EventMessage>>,
}

impl<T: MailboxTransport> CommandEngine<T> {
    pub fn new(transport: Arc<T>, config: &AdapterConfig) -> Self {
        let slot = Arc::new(CommandSlot::new(config.mailbox_buf_size));
        let completion = CompletionPath {
            slot: slot.clone(),
            transport: transport.clone(),
        };
        Self {
            slot,
            transport,
            completion,
            mode: config.completion_mode,
            timeout: config.cmd_timeout(),
            poll_interval: config.poll_interval(),
            events: Mutex::new(VecDeque::new()),
        }
    }

    pub fn slot(&self) -> &CommandSlot {
        &self.slot
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn mode(&self) -> CompletionMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: CompletionMode) {
        self.mode = mode;
    }

    /// Handle for the completion-delivery context.
    pub fn completion_path(&self) -> CompletionPath<T> {
        self.completion.clone()
    }

    pub fn acquire(&self, op: Opcode) -> Result<()> {
        self.slot.acquire(op)
    }

    /// Hand a request for the already-acquired `op` to the mailbox. On send failure the slot
    /// is cleared, since no completion can follow.
    pub fn submit(&self, op: Opcode, in_args: &[u8]) -> Result<()> {
        let frame = MailboxMessage::request(op, in_args.to_vec()).encode();
        if let Err(err) = self.transport.send(&frame) {
            error!(?op, %err, "failed to send command");
            self.slot.clear();
            return Err(err.into());
        }
        Ok(())
    }

    /// Poll until the slot goes idle or the timeout expires.
    ///
    /// On timeout the slot is left holding `op`; the caller must [`Self::clear`] it before
    /// issuing anything else.
    pub fn wait(&self, op: Opcode) -> Result<()> {
        let start = Instant::now();
        loop {
            if self.mode == CompletionMode::Inline {
                self.service_inline();
            }
            if self.slot.is_idle() {
                return Ok(());
            }

            let waited = start.elapsed();
            if waited >= self.timeout {
                warn!(?op, ?waited, "no response for command");
                return Err(CtlError::Timeout { op, waited });
            }
            thread::sleep(self.poll_interval.min(self.timeout - waited));
        }
    }

    pub fn clear(&self) {
        self.slot.clear();
    }

    /// Full round-trip: acquire, submit, wait, interpret.
    pub fn execute(&self, info: CommandInfo<'_>) -> Result<Vec<u8>> {
        self.acquire(info.op)?;
        self.submit(info.op, info.in_args)?;
        self.wait(info.op)?;

        match self.slot.retval() {
            status::SUCCESS => Ok(self.slot.response(info.out_size)),
            status::ERR_OPCODE_MISMATCH => Err(CtlError::protocol(format!(
                "{:?} released by a mismatched completion",
                info.op
            ))),
            status::ERR_ADMIN_QUEUE_ERROR => Err(CtlError::Transport(format!(
                "mailbox failed while {:?} was pending",
                info.op
            ))),
            retval => {
                warn!(op = ?info.op, retval, "command failed");
                Err(CtlError::CommandFailed {
                    op: info.op,
                    retval,
                })
            }
        }
    }

    /// Notifications collected while servicing the mailbox inline.
    pub fn take_events(&self) -> Vec<EventMessage> {
        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        events.drain(..).collect()
    }

    fn service_inline(&self) {
        loop {
            match self.completion.service_once() {
                Serviced::Idle => return,
                Serviced::Notification(event) => self
                    .events
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push_back(event),
                Serviced::Completed(_)
                | Serviced::TransportFault { .. }
                | Serviced::ProtocolViolation { .. } => {
                    if self.slot.is_idle() {
                        return;
                    }
                }
            }
        }
    }
}
