//! Software model of the firmware end of the control mailbox.
//!
//! [`FirmwareModel`] implements [`MailboxTransport`]: every frame sent to it is decoded and
//! answered the way control-plane firmware would, and the reply is queued for the next
//! [`MailboxTransport::poll`]. Faults can be queued with [`FirmwareModel::inject_fault`] to
//! exercise lost completions, mismatched replies, mailbox failures and garbage frames.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use netctl_virtchnl::{
    status, Capabilities, ChecksumCaps, ConfigRxQueues, ConfigTxQueues, CreateVportRequest,
    CreateVportResponse, EventMessage, MailboxMessage, MailboxTransport, Opcode, OtherCaps,
    QueueRegChunk, QueueType, RssCaps, SegmentationCaps, TransportError, VersionInfo, VportRef,
};
use tracing::debug;

pub const DEFAULT_MAX_MTU: u16 = 9000;

/// Tail register stride handed out for every queue class.
pub const QTAIL_SPACING: u32 = 0x1000;

const QTAIL_BASE_TX: u64 = 0x0010_0000;
const QTAIL_BASE_RX: u64 = 0x0020_0000;
const QTAIL_BASE_TX_COMPL: u64 = 0x0030_0000;
const QTAIL_BASE_RX_BUF: u64 = 0x0040_0000;

/// One-shot misbehaviour applied to the next frame sent to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// `send` itself fails; the request never reaches firmware.
    SendError(TransportError),
    /// The request is swallowed and no completion is ever produced.
    DropReply,
    /// The request is answered with a completion carrying the wrong opcode.
    ReplyWithOpcode(Opcode),
    /// The request is rejected with the given return code.
    FailWith(i32),
    /// The reply is replaced by bytes that are not a valid frame.
    CorruptReply,
    /// The request is swallowed and the next `poll` fails.
    PollError(TransportError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelVport {
    pub request: CreateVportRequest,
    pub enabled: bool,
    pub configured_txqs: usize,
    pub configured_rxqs: usize,
}

struct State {
    version: VersionInfo,
    caps: Capabilities,
    next_vport_id: u32,
    next_queue_id: u32,
    vports: BTreeMap<u32, ModelVport>,
    outbox: VecDeque<Vec<u8>>,
    faults: VecDeque<Fault>,
    poll_error: Option<TransportError>,
    received: Vec<u32>,
}

pub struct FirmwareModel {
    state: Mutex<State>,
}

impl FirmwareModel {
    pub fn new() -> Self {
        Self::with_caps(Self::default_caps())
    }

    pub fn with_caps(caps: Capabilities) -> Self {
        Self {
            state: Mutex::new(State {
                version: VersionInfo::current(),
                caps,
                next_vport_id: 1,
                next_queue_id: 0,
                vports: BTreeMap::new(),
                outbox: VecDeque::new(),
                faults: VecDeque::new(),
                poll_error: None,
                received: Vec::new(),
            }),
        }
    }

    pub fn default_caps() -> Capabilities {
        Capabilities {
            csum_caps: ChecksumCaps::all(),
            seg_caps: SegmentationCaps::IPV4_TCP | SegmentationCaps::IPV6_TCP,
            rss_caps: RssCaps::all(),
            other_caps: OtherCaps::WB_ON_ITR | OtherCaps::LINK_SPEED,
            max_rx_q: 256,
            max_tx_q: 256,
            max_rx_bufq: 512,
            max_tx_complq: 256,
            max_vports: 8,
            default_num_vports: 1,
        }
    }

    /// Make the model report a different protocol version.
    pub fn set_version(&self, version: VersionInfo) {
        self.lock().version = version;
    }

    pub fn inject_fault(&self, fault: Fault) {
        self.lock().faults.push_back(fault);
    }

    /// Queue an unsolicited notification for the next `poll`.
    pub fn push_event(&self, event: EventMessage) {
        let frame = MailboxMessage::completion(Opcode::Event, status::SUCCESS, event.encode());
        self.lock().outbox.push_back(frame.encode());
    }

    /// Queue an arbitrary frame for the next `poll`.
    pub fn push_raw(&self, frame: Vec<u8>) {
        self.lock().outbox.push_back(frame);
    }

    pub fn vport_ids(&self) -> Vec<u32> {
        self.lock().vports.keys().copied().collect()
    }

    pub fn vport(&self, vport_id: u32) -> Option<ModelVport> {
        self.lock().vports.get(&vport_id).cloned()
    }

    /// Raw opcodes of every frame that reached firmware, in order.
    pub fn received(&self) -> Vec<u32> {
        self.lock().received.clone()
    }

    pub fn pending_replies(&self) -> usize {
        self.lock().outbox.len()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panicking test thread must not wedge every other user of the model.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for FirmwareModel {
    fn default() -> Self {
        Self::new()
    }
}

impl MailboxTransport for FirmwareModel {
    fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
        let mut state = self.lock();

        let fault = state.faults.pop_front();
        if let Some(Fault::SendError(err)) = &fault {
            return Err(err.clone());
        }

        let request = MailboxMessage::decode(frame)
            .map_err(|e| TransportError::Io(format!("firmware rejected frame: {e}")))?;
        state.received.push(request.opcode);

        let reply = match fault {
            Some(Fault::DropReply) => {
                debug!(opcode = request.opcode, "firmware model dropping reply");
                return Ok(());
            }
            Some(Fault::PollError(err)) => {
                state.poll_error = Some(err);
                return Ok(());
            }
            Some(Fault::ReplyWithOpcode(op)) => {
                MailboxMessage::completion(op, status::SUCCESS, Vec::new()).encode()
            }
            Some(Fault::FailWith(retval)) => MailboxMessage {
                opcode: request.opcode,
                retval,
                payload: Vec::new(),
            }
            .encode(),
            Some(Fault::CorruptReply) => vec![0xde, 0xad, 0xbe, 0xef],
            Some(Fault::SendError(_)) | None => state.handle(&request).encode(),
        };

        state.outbox.push_back(reply);
        Ok(())
    }

    fn poll(&self) -> Result<Option<Vec<u8>>, TransportError> {
        let mut state = self.lock();
        if let Some(err) = state.poll_error.take() {
            return Err(err);
        }
        Ok(state.outbox.pop_front())
    }
}

impl State {
    fn handle(&mut self, request: &MailboxMessage) -> MailboxMessage {
        let op = match request.op() {
            Ok(op) => op,
            Err(_) => {
                return MailboxMessage {
                    opcode: request.opcode,
                    retval: status::ERR_NOT_SUPPORTED,
                    payload: Vec::new(),
                }
            }
        };

        let result = match op {
            Opcode::Version => Ok(self.version.encode()),
            Opcode::GetCaps => Ok(self.caps.encode()),
            Opcode::CreateVport => self.create_vport(&request.payload),
            Opcode::DestroyVport => self.with_vport(&request.payload, |vports, id| {
                vports.remove(&id);
            }),
            Opcode::EnableVport => self.with_vport(&request.payload, |vports, id| {
                if let Some(v) = vports.get_mut(&id) {
                    v.enabled = true;
                }
            }),
            Opcode::DisableVport => self.with_vport(&request.payload, |vports, id| {
                if let Some(v) = vports.get_mut(&id) {
                    v.enabled = false;
                }
            }),
            Opcode::ConfigTxQueues => match ConfigTxQueues::decode(&request.payload) {
                Ok(msg) => match self.vports.get_mut(&msg.vport_id) {
                    Some(v) => {
                        v.configured_txqs += msg.queues.len();
                        Ok(Vec::new())
                    }
                    None => Err(status::ERR_PARAM),
                },
                Err(_) => Err(status::ERR_PARAM),
            },
            Opcode::ConfigRxQueues => match ConfigRxQueues::decode(&request.payload) {
                Ok(msg) => match self.vports.get_mut(&msg.vport_id) {
                    Some(v) => {
                        v.configured_rxqs += msg.queues.len();
                        Ok(Vec::new())
                    }
                    None => Err(status::ERR_PARAM),
                },
                Err(_) => Err(status::ERR_PARAM),
            },
            Opcode::EnableQueues | Opcode::DisableQueues => Ok(Vec::new()),
            Opcode::Event => Err(status::ERR_NOT_SUPPORTED),
        };

        match result {
            Ok(payload) => MailboxMessage::completion(op, status::SUCCESS, payload),
            Err(retval) => MailboxMessage::completion(op, retval, Vec::new()),
        }
    }

    fn with_vport(
        &mut self,
        payload: &[u8],
        f: impl FnOnce(&mut BTreeMap<u32, ModelVport>, u32),
    ) -> Result<Vec<u8>, i32> {
        let vport = VportRef::decode(payload).map_err(|_| status::ERR_PARAM)?;
        if !self.vports.contains_key(&vport.vport_id) {
            return Err(status::ERR_PARAM);
        }
        f(&mut self.vports, vport.vport_id);
        Ok(Vec::new())
    }

    fn create_vport(&mut self, payload: &[u8]) -> Result<Vec<u8>, i32> {
        let req = CreateVportRequest::decode(payload).map_err(|_| status::ERR_PARAM)?;
        if self.vports.len() >= self.caps.max_vports as usize {
            return Err(status::ERR_NO_MEMORY);
        }

        let vport_id = self.next_vport_id;
        self.next_vport_id += 1;

        let mut chunks = Vec::new();
        for (queue_type, count, base) in [
            (QueueType::Tx, req.num_tx_q, QTAIL_BASE_TX),
            (QueueType::Rx, req.num_rx_q, QTAIL_BASE_RX),
            (QueueType::TxCompletion, req.num_tx_complq, QTAIL_BASE_TX_COMPL),
            (QueueType::RxBuffer, req.num_rx_bufq, QTAIL_BASE_RX_BUF),
        ] {
            if count == 0 {
                continue;
            }
            let start = self.next_queue_id;
            self.next_queue_id += count as u32;
            chunks.push(QueueRegChunk {
                queue_type,
                start_queue_id: start,
                num_queues: count,
                qtail_reg_start: base + start as u64 * QTAIL_SPACING as u64,
                qtail_reg_spacing: QTAIL_SPACING,
            });
        }

        self.vports.insert(
            vport_id,
            ModelVport {
                request: req,
                enabled: false,
                configured_txqs: 0,
                configured_rxqs: 0,
            },
        );

        Ok(CreateVportResponse {
            vport_id,
            granted: req,
            max_mtu: DEFAULT_MAX_MTU,
            default_mac_addr: [0x02, 0x00, 0x00, 0x00, 0x00, vport_id as u8],
            chunks,
        }
        .encode())
    }
}
