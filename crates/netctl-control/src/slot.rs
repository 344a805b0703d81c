//! Single-outstanding-command slot shared between the issuing context and the completion
//! context of one adapter.
//!
//! The slot is a pending-operation marker plus a result code and a response buffer. The
//! marker is the only synchronization point:
//!
//! - [`CommandSlot::acquire`] moves the marker from "none" to an opcode (compare-exchange,
//!   acquire ordering on both outcomes).
//! - [`CommandSlot::notify`] claims the marker by setting [`PUBLISHING_BIT`], stores the
//!   response and result code, issues a release fence and only then stores "none".
//! - The issuer observes "none" with an acquire load; everything written before the fence is
//!   visible from that point on.
//!
//! The response buffer is stored as atomic words written and read with relaxed ordering. The
//! fence/acquire pair is what orders them; using atomics keeps the buffer free of data races
//! even when a caller breaks the protocol (e.g. calls [`CommandSlot::clear`] while a
//! completion is in flight).

#[cfg(all(feature = "loom", test))]
use loom::sync::atomic::{fence, AtomicI32, AtomicU32};
#[cfg(not(all(feature = "loom", test)))]
use std::sync::atomic::{fence, AtomicI32, AtomicU32};

use std::sync::atomic::Ordering;

use netctl_virtchnl::{status, Opcode, OPCODE_NONE};
use tracing::{error, warn};

use crate::error::{CtlError, Result};

/// Set in the marker while a completion is being written. A marker with this bit set is
/// neither idle nor claimable by another completion.
pub const PUBLISHING_BIT: u32 = 1 << 31;

pub struct CommandSlot {
    pending: AtomicU32,
    retval: AtomicI32,
    resp_len: AtomicU32,
    resp: Box<[AtomicU32]>,
    capacity: usize,
}

impl CommandSlot {
    pub fn new(capacity_bytes: usize) -> Self {
        let words = capacity_bytes.div_ceil(4);
        Self {
            pending: AtomicU32::new(OPCODE_NONE),
            retval: AtomicI32::new(status::SUCCESS),
            resp_len: AtomicU32::new(0),
            resp: (0..words).map(|_| AtomicU32::new(0)).collect(),
            capacity: capacity_bytes,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Claim the slot for `op`.
    ///
    /// Fails with [`CtlError::Busy`] naming the operation that currently holds the slot. Never
    /// retries.
    pub fn acquire(&self, op: Opcode) -> Result<()> {
        if !op.is_command() {
            return Err(CtlError::protocol(format!("{op:?} cannot be issued as a command")));
        }

        match self.pending.compare_exchange(
            OPCODE_NONE,
            op.as_u32(),
            Ordering::Acquire,
            Ordering::Acquire,
        ) {
            Ok(_) => Ok(()),
            Err(actual) => {
                let err = match decode_marker(actual) {
                    Some(pending) => CtlError::Busy { pending },
                    None => CtlError::protocol(format!("command slot holds bad marker {actual:#x}")),
                };
                error!(requested = ?op, %err, "there is an incomplete command");
                Err(err)
            }
        }
    }

    /// Operation currently holding the slot, including one whose completion is being written.
    pub fn pending(&self) -> Option<Opcode> {
        decode_marker(self.pending.load(Ordering::Acquire))
    }

    /// Whether the marker reads "none". An acquire load: once this returns `true` the result
    /// code and response of the last completion are visible to the caller.
    pub fn is_idle(&self) -> bool {
        self.pending.load(Ordering::Acquire) == OPCODE_NONE
    }

    /// Publish the completion of `op`.
    ///
    /// Fails without touching the slot when the slot is idle, holds a different operation, or
    /// another completion for `op` is already being written.
    pub fn notify(&self, op: Opcode, retval: i32, payload: &[u8]) -> Result<()> {
        let raw = op.as_u32();
        if let Err(actual) = self.pending.compare_exchange(
            raw,
            raw | PUBLISHING_BIT,
            Ordering::Acquire,
            Ordering::Acquire,
        ) {
            return Err(match decode_marker(actual) {
                None => CtlError::protocol(format!("completion for {op:?} with no pending command")),
                Some(pending) if pending == op => {
                    CtlError::protocol(format!("duplicate completion for {op:?}"))
                }
                Some(pending) => CtlError::protocol(format!(
                    "completion for {op:?} while {pending:?} is pending"
                )),
            });
        }

        self.publish(retval, payload);
        Ok(())
    }

    /// Release whatever command is pending with an empty, synthesized completion carrying
    /// `retval`. Returns the released operation, or `None` if nothing was claimable.
    ///
    /// This is the error path for transport failures and mismatched completions: the issuer
    /// is woken with a distinguished return code instead of waiting for its timeout.
    pub fn fail_pending(&self, retval: i32) -> Option<Opcode> {
        let mut cur = self.pending.load(Ordering::Acquire);
        loop {
            if cur == OPCODE_NONE || cur & PUBLISHING_BIT != 0 {
                return None;
            }
            match self.pending.compare_exchange_weak(
                cur,
                cur | PUBLISHING_BIT,
                Ordering::Acquire,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => cur = actual,
            }
        }

        self.publish(retval, &[]);
        decode_marker(cur)
    }

    /// Unconditionally return the slot to idle with a success result code.
    ///
    /// Used after a timeout where no completion will arrive. Calling this while a real
    /// completion is still on its way is a caller error.
    pub fn clear(&self) {
        self.retval.store(status::SUCCESS, Ordering::Relaxed);
        fence(Ordering::Release);
        self.pending.store(OPCODE_NONE, Ordering::Release);
    }

    /// Result code of the last completion. Only meaningful after [`Self::is_idle`] returned
    /// `true` following a completion.
    pub fn retval(&self) -> i32 {
        self.retval.load(Ordering::Relaxed)
    }

    /// Copy out at most `max` bytes of the last completion's response.
    pub fn response(&self, max: usize) -> Vec<u8> {
        let len = (self.resp_len.load(Ordering::Relaxed) as usize)
            .min(self.capacity)
            .min(max);
        let mut out = Vec::with_capacity(len);
        for word in self.resp.iter().take(len.div_ceil(4)) {
            out.extend_from_slice(&word.load(Ordering::Relaxed).to_le_bytes());
        }
        out.truncate(len);
        out
    }

    fn publish(&self, retval: i32, payload: &[u8]) {
        let len = if payload.len() > self.capacity {
            warn!(
                len = payload.len(),
                capacity = self.capacity,
                "truncating oversized command response"
            );
            self.capacity
        } else {
            payload.len()
        };

        for (word, bytes) in self.resp.iter().zip(payload[..len].chunks(4)) {
            let mut w = [0u8; 4];
            w[..bytes.len()].copy_from_slice(bytes);
            word.store(u32::from_le_bytes(w), Ordering::Relaxed);
        }
        self.resp_len.store(len as u32, Ordering::Relaxed);
        self.retval.store(retval, Ordering::Relaxed);

        // The result code may be checked from another thread; everything above must be visible
        // before the marker reads "none".
        fence(Ordering::Release);
        self.pending.store(OPCODE_NONE, Ordering::Release);
    }
}

fn decode_marker(raw: u32) -> Option<Opcode> {
    match raw & !PUBLISHING_BIT {
        OPCODE_NONE => None,
        v => Opcode::try_from(v).ok(),
    }
}


#[cfg(all(test, feature = "loom"))]
mod loom_tests {
    use super::*;

    use loom::sync::Arc;
    use loom::thread;

    #[test]
    fn completion_is_visible_after_idle() {
        loom::model(|| {
            let slot = Arc::new(CommandSlot::new(8));
            slot.acquire(Opcode::GetCaps).unwrap();

            let completer = {
                let slot = slot.clone();
                thread::spawn(move || {
                    slot.notify(Opcode::GetCaps, -5, &[1, 2, 3, 4, 5]).unwrap();
                })
            };

            while !slot.is_idle() {
                thread::yield_now();
            }
            assert_eq!(slot.retval(), -5);
            assert_eq!(slot.response(usize::MAX), vec![1, 2, 3, 4, 5]);

            completer.join().unwrap();
        });
    }

    #[test]
    fn racing_acquires_have_one_winner() {
        loom::model(|| {
            let slot = Arc::new(CommandSlot::new(4));

            let other = {
                let slot = slot.clone();
                thread::spawn(move || slot.acquire(Opcode::DestroyVport).is_ok())
            };
            let mine = slot.acquire(Opcode::CreateVport).is_ok();
            let theirs = other.join().unwrap();

            assert!(mine ^ theirs);
        });
    }

    #[test]
    fn notify_and_fail_pending_publish_once() {
        loom::model(|| {
            let slot = Arc::new(CommandSlot::new(4));
            slot.acquire(Opcode::EnableVport).unwrap();

            let failer = {
                let slot = slot.clone();
                thread::spawn(move || slot.fail_pending(status::ERR_ADMIN_QUEUE_ERROR).is_some())
            };
            let notified = slot.notify(Opcode::EnableVport, 0, &[7]).is_ok();
            let failed = failer.join().unwrap();

            assert!(notified ^ failed);
            assert!(slot.is_idle());
            let expected = if notified {
                0
            } else {
                status::ERR_ADMIN_QUEUE_ERROR
            };
            assert_eq!(slot.retval(), expected);
        });
    }
}
