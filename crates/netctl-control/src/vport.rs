//! Virtual port lifecycle: creation, teardown, enable/disable and queue configuration.
//!
//! Every operation here is a command round-trip. The port table only changes after firmware
//! acknowledged the command, so a failed command leaves the adapter exactly as it was.

use netctl_virtchnl::{
    ConfigRxQueues, ConfigTxQueues, CreateVportRequest, CreateVportResponse, EventKind,
    EventMessage, MailboxTransport, Opcode, QueueModel, QueueRegChunk, QueueType, RxQueueInfo,
    TxQueueInfo, VportRef,
};
use tracing::{debug, info, warn};

use crate::adapter::{Adapter, NegotiationState};
use crate::config::{RX_BUFQ_PER_GRP, TX_COMPLQ_PER_GRP};
use crate::engine::CommandInfo;
use crate::error::{CtlError, Result};
use crate::registry::DeviceId;

/// Ethernet header, VLAN tag and two extra tags.
pub const ETH_OVERHEAD: u16 = 14 + 4 + 4 * 2;
pub const MAX_FRAME_SIZE: u16 = 9728;

/// Queue counts for one port, per queue class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueCounts {
    pub num_tx_q: u16,
    pub num_tx_complq: u16,
    pub num_rx_q: u16,
    pub num_rx_bufq: u16,
}

impl QueueCounts {
    /// `num_tx_q`/`num_rx_q` data queues, with companions sized for the given models.
    pub fn for_models(
        txq_model: QueueModel,
        rxq_model: QueueModel,
        num_tx_q: u16,
        num_rx_q: u16,
    ) -> Self {
        Self {
            num_tx_q,
            num_tx_complq: if txq_model.is_split() {
                num_tx_q.saturating_mul(TX_COMPLQ_PER_GRP)
            } else {
                0
            },
            num_rx_q,
            num_rx_bufq: if rxq_model.is_split() {
                num_rx_q.saturating_mul(RX_BUFQ_PER_GRP)
            } else {
                0
            },
        }
    }

    fn validate(&self, txq_model: QueueModel, rxq_model: QueueModel) -> Result<()> {
        if self.num_tx_q == 0 || self.num_rx_q == 0 {
            return Err(CtlError::InvalidConfig(
                "a vport needs at least one tx and one rx queue".into(),
            ));
        }
        if !txq_model.is_split() && self.num_tx_complq != 0 {
            return Err(CtlError::InvalidConfig(format!(
                "{} tx completion queues requested under the single queue model",
                self.num_tx_complq
            )));
        }
        if !rxq_model.is_split() && self.num_rx_bufq != 0 {
            return Err(CtlError::InvalidConfig(format!(
                "{} rx buffer queues requested under the single queue model",
                self.num_rx_bufq
            )));
        }
        if txq_model.is_split() && self.num_tx_complq == 0 {
            return Err(CtlError::InvalidConfig(
                "split tx model needs at least one completion queue".into(),
            ));
        }
        if rxq_model.is_split() && self.num_rx_bufq == 0 {
            return Err(CtlError::InvalidConfig(
                "split rx model needs at least one buffer queue".into(),
            ));
        }
        Ok(())
    }
}

/// Queue ids and tail registers of one queue class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueRegion {
    pub start_qid: u32,
    pub num_queues: u16,
    pub qtail_start: u64,
    pub qtail_spacing: u32,
}

impl QueueRegion {
    /// Rejects empty chunks and chunks whose last queue id or tail register does not fit.
    fn from_chunk(chunk: &QueueRegChunk) -> Result<Self> {
        let region = Self {
            start_qid: chunk.start_queue_id,
            num_queues: chunk.num_queues,
            qtail_start: chunk.qtail_reg_start,
            qtail_spacing: chunk.qtail_reg_spacing,
        };
        let last = chunk.num_queues.checked_sub(1).ok_or_else(|| {
            CtlError::protocol(format!("empty {:?} chunk", chunk.queue_type))
        })?;
        if region.queue_id(last).is_none() || region.tail_register(last).is_none() {
            return Err(CtlError::protocol(format!(
                "{:?} chunk at queue {:#x} / tail {:#x} overflows",
                chunk.queue_type, chunk.start_queue_id, chunk.qtail_reg_start
            )));
        }
        Ok(region)
    }

    /// Tail register offset of the `i`th queue in the region.
    pub fn tail_register(&self, i: u16) -> Option<u64> {
        if i >= self.num_queues {
            return None;
        }
        (i as u64)
            .checked_mul(self.qtail_spacing as u64)
            .and_then(|off| self.qtail_start.checked_add(off))
    }

    pub fn queue_id(&self, i: u16) -> Option<u32> {
        if i >= self.num_queues {
            return None;
        }
        self.start_qid.checked_add(i as u32)
    }
}

/// Where each queue class of a port lives. Companion regions exist only under the split
/// model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLayout {
    pub tx: QueueRegion,
    pub rx: QueueRegion,
    pub tx_compl: Option<QueueRegion>,
    pub rx_buf: Option<QueueRegion>,
}

impl ChunkLayout {
    /// Build the layout from a creation reply, checking every required class is present
    /// exactly once and sized as granted.
    pub fn from_response(resp: &CreateVportResponse) -> Result<Self> {
        let granted = &resp.granted;
        let mut tx = None;
        let mut rx = None;
        let mut tx_compl = None;
        let mut rx_buf = None;

        for chunk in &resp.chunks {
            let (slot, expected, allowed) = match chunk.queue_type {
                QueueType::Tx => (&mut tx, granted.num_tx_q, true),
                QueueType::Rx => (&mut rx, granted.num_rx_q, true),
                QueueType::TxCompletion => (
                    &mut tx_compl,
                    granted.num_tx_complq,
                    granted.txq_model.is_split(),
                ),
                QueueType::RxBuffer => (
                    &mut rx_buf,
                    granted.num_rx_bufq,
                    granted.rxq_model.is_split(),
                ),
            };
            if !allowed {
                return Err(CtlError::protocol(format!(
                    "{:?} chunk under the single queue model",
                    chunk.queue_type
                )));
            }
            if slot.is_some() {
                return Err(CtlError::protocol(format!(
                    "duplicate {:?} chunk",
                    chunk.queue_type
                )));
            }
            if chunk.num_queues != expected {
                return Err(CtlError::protocol(format!(
                    "{:?} chunk holds {} queues, {} granted",
                    chunk.queue_type, chunk.num_queues, expected
                )));
            }
            *slot = Some(QueueRegion::from_chunk(chunk)?);
        }

        let missing = |ty: QueueType| CtlError::protocol(format!("missing {ty:?} chunk"));
        let layout = Self {
            tx: tx.ok_or_else(|| missing(QueueType::Tx))?,
            rx: rx.ok_or_else(|| missing(QueueType::Rx))?,
            tx_compl,
            rx_buf,
        };
        if granted.txq_model.is_split() && layout.tx_compl.is_none() {
            return Err(missing(QueueType::TxCompletion));
        }
        if granted.rxq_model.is_split() && layout.rx_buf.is_none() {
            return Err(missing(QueueType::RxBuffer));
        }
        Ok(layout)
    }
}

/// Opaque token for host-side per-port state. Only stored, never interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostDataHandle(pub u64);

/// A port carved out of an adapter. Only created from a successful creation reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualPort {
    adapter: DeviceId,
    vport_id: u32,
    sw_idx: u16,
    txq_model: QueueModel,
    rxq_model: QueueModel,
    counts: QueueCounts,
    max_mtu: u16,
    max_pkt_len: u16,
    default_mac_addr: [u8; 6],
    chunks: ChunkLayout,
    devarg_id: Option<u16>,
    dev_data: Option<HostDataHandle>,
    enabled: bool,
    link_up: bool,
    link_speed_mbps: u32,
}

impl VirtualPort {
    fn from_response(adapter: DeviceId, sw_idx: u16, resp: &CreateVportResponse) -> Result<Self> {
        let chunks = ChunkLayout::from_response(resp)?;
        let granted = resp.granted;
        Ok(Self {
            adapter,
            vport_id: resp.vport_id,
            sw_idx,
            txq_model: granted.txq_model,
            rxq_model: granted.rxq_model,
            counts: QueueCounts {
                num_tx_q: granted.num_tx_q,
                num_tx_complq: granted.num_tx_complq,
                num_rx_q: granted.num_rx_q,
                num_rx_bufq: granted.num_rx_bufq,
            },
            max_mtu: resp.max_mtu,
            max_pkt_len: resp
                .max_mtu
                .saturating_add(ETH_OVERHEAD)
                .min(MAX_FRAME_SIZE),
            default_mac_addr: resp.default_mac_addr,
            chunks,
            devarg_id: None,
            dev_data: None,
            enabled: false,
            link_up: false,
            link_speed_mbps: 0,
        })
    }

    /// Owning adapter. A key into the registry, not a reference.
    pub fn adapter(&self) -> DeviceId {
        self.adapter
    }

    /// Firmware-assigned id.
    pub fn vport_id(&self) -> u32 {
        self.vport_id
    }

    /// Index in the owning adapter's port table.
    pub fn sw_idx(&self) -> u16 {
        self.sw_idx
    }

    pub fn txq_model(&self) -> QueueModel {
        self.txq_model
    }

    pub fn rxq_model(&self) -> QueueModel {
        self.rxq_model
    }

    pub fn counts(&self) -> QueueCounts {
        self.counts
    }

    pub fn max_mtu(&self) -> u16 {
        self.max_mtu
    }

    pub fn max_pkt_len(&self) -> u16 {
        self.max_pkt_len
    }

    pub fn default_mac_addr(&self) -> [u8; 6] {
        self.default_mac_addr
    }

    pub fn chunks(&self) -> &ChunkLayout {
        &self.chunks
    }

    /// Port id from the startup port list, if the port was created from it.
    pub fn devarg_id(&self) -> Option<u16> {
        self.devarg_id
    }

    pub fn dev_data(&self) -> Option<HostDataHandle> {
        self.dev_data
    }

    pub fn set_dev_data(&mut self, handle: Option<HostDataHandle>) {
        self.dev_data = handle;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn link_up(&self) -> bool {
        self.link_up
    }

    pub fn link_speed_mbps(&self) -> u32 {
        self.link_speed_mbps
    }
}

impl<T: MailboxTransport> Adapter<T> {
    /// Default queue counts for a new port under the adapter's configured models.
    pub fn default_queue_counts(&self) -> QueueCounts {
        QueueCounts::for_models(
            self.txq_model,
            self.rxq_model,
            self.config.num_tx_q,
            self.config.num_rx_q,
        )
    }

    /// Create a port under the adapter's queue models with default counts.
    pub fn create_default_vport(&mut self) -> Result<u16> {
        let counts = self.default_queue_counts();
        self.create_vport(counts, self.txq_model, self.rxq_model)
    }

    /// Ask firmware for a new port and record it in the first free table slot.
    ///
    /// Returns the slot index. On any failure the table is unchanged.
    pub fn create_vport(
        &mut self,
        counts: QueueCounts,
        txq_model: QueueModel,
        rxq_model: QueueModel,
    ) -> Result<u16> {
        let caps = match (&self.caps, self.state) {
            (Some(caps), NegotiationState::Ready) => *caps,
            _ => {
                return Err(CtlError::protocol(
                    "vport creation before capability negotiation",
                ))
            }
        };
        let sw_idx = self
            .vports
            .iter()
            .position(Option::is_none)
            .ok_or_else(|| {
                CtlError::ResourceExhausted(format!(
                    "all {} vport slots in use",
                    self.max_vport_nb
                ))
            })?;
        counts.validate(txq_model, rxq_model)?;
        for (what, requested, limit) in [
            ("tx queues", counts.num_tx_q, caps.max_tx_q),
            ("rx queues", counts.num_rx_q, caps.max_rx_q),
            ("tx completion queues", counts.num_tx_complq, caps.max_tx_complq),
            ("rx buffer queues", counts.num_rx_bufq, caps.max_rx_bufq),
        ] {
            if requested > limit {
                return Err(CtlError::ResourceExhausted(format!(
                    "{requested} {what} requested, firmware allows {limit}"
                )));
            }
        }

        let request = CreateVportRequest {
            txq_model,
            rxq_model,
            num_tx_q: counts.num_tx_q,
            num_tx_complq: counts.num_tx_complq,
            num_rx_q: counts.num_rx_q,
            num_rx_bufq: counts.num_rx_bufq,
        };
        let args = request.encode();
        let resp = self.engine.execute(CommandInfo::new(
            Opcode::CreateVport,
            &args,
            self.config.mailbox_buf_size,
        ))?;
        let resp = CreateVportResponse::decode(&resp)
            .map_err(|e| CtlError::protocol(format!("bad vport creation reply: {e}")))?;

        let port = Self::check_granted(&request, &resp)
            .and_then(|()| VirtualPort::from_response(self.id, sw_idx as u16, &resp));
        let port = match port {
            Ok(port) => port,
            Err(err) => {
                warn!(adapter = %self.id, vport_id = resp.vport_id, %err, "discarding malformed vport");
                self.release_orphan(resp.vport_id);
                return Err(err);
            }
        };

        info!(
            adapter = %self.id,
            vport_id = port.vport_id,
            sw_idx,
            num_tx_q = port.counts.num_tx_q,
            num_rx_q = port.counts.num_rx_q,
            max_mtu = port.max_mtu,
            "vport created"
        );
        self.vports[sw_idx] = Some(port);
        self.cur_vport_nb += 1;
        Ok(sw_idx as u16)
    }

    /// Create every port listed in the configuration, or a single default port if the list is
    /// empty. Returns the table indexes in list order.
    ///
    /// All or nothing: if one creation fails, the ports this call already created are
    /// destroyed again before the error is returned. Ports that cannot be destroyed (the
    /// failure was a timeout, or the destroy itself fails) stay in the table tagged with their
    /// [`VirtualPort::devarg_id`], so [`Adapter::vports`] still finds them.
    pub fn create_requested_vports(&mut self) -> Result<Vec<u16>> {
        let requested = self.config.requested_vports.clone();
        if requested.is_empty() {
            return Ok(vec![self.create_default_vport()?]);
        }

        let mut created = Vec::with_capacity(requested.len());
        for devarg_id in requested {
            match self.create_default_vport() {
                Ok(idx) => {
                    if let Some(port) = self.vport_mut(idx) {
                        port.devarg_id = Some(devarg_id);
                    }
                    created.push(idx);
                }
                Err(err) => {
                    warn!(adapter = %self.id, devarg_id, %err, "requested vport failed, rolling back");
                    self.roll_back_vports(&created, &err);
                    return Err(err);
                }
            }
        }
        Ok(created)
    }

    fn roll_back_vports(&mut self, created: &[u16], cause: &CtlError) {
        // The slot still holds the lost command; nothing can be issued until the caller
        // clears it.
        if matches!(cause, CtlError::Timeout { .. }) {
            warn!(count = created.len(), "timed out, leaving created vports in place");
            return;
        }
        for &idx in created.iter().rev() {
            match self.destroy_vport(idx) {
                Ok(_) => {}
                Err(err @ CtlError::Timeout { .. }) => {
                    warn!(sw_idx = idx, %err, "rollback destroy lost, clearing slot");
                    self.engine.clear();
                    return;
                }
                Err(err) => warn!(sw_idx = idx, %err, "rollback destroy failed, vport kept"),
            }
        }
    }

    /// Destroy the port at `idx` and release its slot. Returns the removed port.
    pub fn destroy_vport(&mut self, idx: u16) -> Result<VirtualPort> {
        let vport_id = self.port_id(idx)?;
        let args = VportRef { vport_id }.encode();
        self.engine
            .execute(CommandInfo::new(Opcode::DestroyVport, &args, 0))?;

        let port = self.vports[idx as usize]
            .take()
            .ok_or(CtlError::NoSuchVport(idx))?;
        self.cur_vport_nb -= 1;
        info!(adapter = %self.id, vport_id, sw_idx = idx, "vport destroyed");
        Ok(port)
    }

    pub fn enable_vport(&mut self, idx: u16) -> Result<()> {
        self.set_vport_enabled(idx, true)
    }

    pub fn disable_vport(&mut self, idx: u16) -> Result<()> {
        self.set_vport_enabled(idx, false)
    }

    fn set_vport_enabled(&mut self, idx: u16, enable: bool) -> Result<()> {
        let vport_id = self.port_id(idx)?;
        let op = if enable {
            Opcode::EnableVport
        } else {
            Opcode::DisableVport
        };
        let args = VportRef { vport_id }.encode();
        self.engine.execute(CommandInfo::new(op, &args, 0))?;

        if let Some(port) = self.vport_mut(idx) {
            port.enabled = enable;
        }
        debug!(vport_id, enable, "vport state changed");
        Ok(())
    }

    /// Configure transmit queues of the port at `idx` in a single message.
    ///
    /// Batches larger than [`Adapter::max_txq_per_msg`] are refused; split them first.
    pub fn configure_tx_queues(&mut self, idx: u16, queues: &[TxQueueInfo]) -> Result<()> {
        let port = self.vport(idx).ok_or(CtlError::NoSuchVport(idx))?;
        check_batch("tx", queues.len(), self.max_txq_per_msg)?;
        for q in queues {
            if q.model != port.txq_model {
                return Err(CtlError::InvalidConfig(format!(
                    "tx queue {} uses {:?}, vport uses {:?}",
                    q.queue_id, q.model, port.txq_model
                )));
            }
        }

        let vport_id = port.vport_id;
        let args = ConfigTxQueues {
            vport_id,
            queues: queues.to_vec(),
        }
        .encode();
        self.engine
            .execute(CommandInfo::new(Opcode::ConfigTxQueues, &args, 0))?;
        debug!(vport_id, count = queues.len(), "tx queues configured");
        Ok(())
    }

    /// Configure receive queues of the port at `idx` in a single message.
    ///
    /// Batches larger than [`Adapter::max_rxq_per_msg`] are refused; split them first.
    pub fn configure_rx_queues(&mut self, idx: u16, queues: &[RxQueueInfo]) -> Result<()> {
        let port = self.vport(idx).ok_or(CtlError::NoSuchVport(idx))?;
        check_batch("rx", queues.len(), self.max_rxq_per_msg)?;
        for q in queues {
            if q.model != port.rxq_model {
                return Err(CtlError::InvalidConfig(format!(
                    "rx queue {} uses {:?}, vport uses {:?}",
                    q.queue_id, q.model, port.rxq_model
                )));
            }
            if q.max_pkt_size > port.max_pkt_len as u32 {
                return Err(CtlError::InvalidConfig(format!(
                    "rx queue {} max packet size {} exceeds {}",
                    q.queue_id, q.max_pkt_size, port.max_pkt_len
                )));
            }
        }

        let vport_id = port.vport_id;
        let args = ConfigRxQueues {
            vport_id,
            queues: queues.to_vec(),
        }
        .encode();
        self.engine
            .execute(CommandInfo::new(Opcode::ConfigRxQueues, &args, 0))?;
        debug!(vport_id, count = queues.len(), "rx queues configured");
        Ok(())
    }

    /// Apply one firmware notification to the port table.
    pub fn handle_event(&mut self, event: &EventMessage) {
        match event.kind {
            EventKind::LinkChange => {
                let port = self
                    .vports
                    .iter_mut()
                    .flatten()
                    .find(|p| p.vport_id == event.vport_id);
                match port {
                    Some(port) => {
                        port.link_up = event.link_up;
                        port.link_speed_mbps = event.link_speed_mbps;
                        info!(
                            vport_id = event.vport_id,
                            link_up = event.link_up,
                            link_speed_mbps = event.link_speed_mbps,
                            "link state changed"
                        );
                    }
                    None => warn!(vport_id = event.vport_id, "link event for unknown vport"),
                }
            }
            EventKind::ResetStart | EventKind::ResetFinish => {
                warn!(kind = ?event.kind, vport_id = event.vport_id, "firmware reset event ignored");
            }
            EventKind::Unknown(kind) => debug!(kind, "unsupported event"),
        }
    }

    /// Apply every notification collected by inline servicing. Returns how many were handled.
    pub fn process_pending_events(&mut self) -> usize {
        let events = self.engine.take_events();
        for event in &events {
            self.handle_event(event);
        }
        events.len()
    }

    fn port_id(&self, idx: u16) -> Result<u32> {
        self.vport(idx)
            .map(VirtualPort::vport_id)
            .ok_or(CtlError::NoSuchVport(idx))
    }

    fn check_granted(request: &CreateVportRequest, resp: &CreateVportResponse) -> Result<()> {
        let granted = &resp.granted;
        if granted.txq_model != request.txq_model || granted.rxq_model != request.rxq_model {
            return Err(CtlError::protocol(format!(
                "firmware granted {:?}/{:?} queue models, requested {:?}/{:?}",
                granted.txq_model, granted.rxq_model, request.txq_model, request.rxq_model
            )));
        }
        let counts = QueueCounts {
            num_tx_q: granted.num_tx_q,
            num_tx_complq: granted.num_tx_complq,
            num_rx_q: granted.num_rx_q,
            num_rx_bufq: granted.num_rx_bufq,
        };
        counts
            .validate(granted.txq_model, granted.rxq_model)
            .map_err(|e| CtlError::protocol(format!("unusable grant: {e}")))?;
        if counts.num_tx_q > request.num_tx_q || counts.num_rx_q > request.num_rx_q {
            return Err(CtlError::protocol("firmware granted more queues than requested"));
        }
        Ok(())
    }

    /// Best effort: firmware created a port we refuse to track, so hand it back.
    ///
    /// The caller only sees the original error, so a lost completion is cleared here rather
    /// than leaving the slot held by a command nobody knows about.
    fn release_orphan(&self, vport_id: u32) {
        let args = VportRef { vport_id }.encode();
        match self
            .engine
            .execute(CommandInfo::new(Opcode::DestroyVport, &args, 0))
        {
            Ok(_) => debug!(vport_id, "released discarded vport"),
            Err(err @ CtlError::Timeout { .. }) => {
                warn!(vport_id, %err, "no reply releasing discarded vport, clearing slot");
                self.engine.clear();
            }
            Err(err) => warn!(vport_id, %err, "failed to release discarded vport"),
        }
    }
}

fn check_batch(dir: &str, len: usize, limit: usize) -> Result<()> {
    if len == 0 {
        return Err(CtlError::InvalidConfig(format!("empty {dir} queue batch")));
    }
    if len > limit {
        return Err(CtlError::ResourceExhausted(format!(
            "{len} {dir} queues exceed the per-message limit of {limit}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(chunks: Vec<QueueRegChunk>) -> CreateVportResponse {
        CreateVportResponse {
            vport_id: 7,
            granted: CreateVportRequest {
                txq_model: QueueModel::Split,
                rxq_model: QueueModel::Single,
                num_tx_q: 2,
                num_tx_complq: 2,
                num_rx_q: 4,
                num_rx_bufq: 0,
            },
            max_mtu: 9000,
            default_mac_addr: [2, 0, 0, 0, 0, 7],
            chunks,
        }
    }

    fn chunk(queue_type: QueueType, start: u32, n: u16) -> QueueRegChunk {
        QueueRegChunk {
            queue_type,
            start_queue_id: start,
            num_queues: n,
            qtail_reg_start: 0x1000 * start as u64,
            qtail_reg_spacing: 0x1000,
        }
    }

    #[test]
    fn default_counts_follow_models() {
        let split = QueueCounts::for_models(QueueModel::Split, QueueModel::Split, 16, 16);
        assert_eq!(
            split,
            QueueCounts {
                num_tx_q: 16,
                num_tx_complq: 16,
                num_rx_q: 16,
                num_rx_bufq: 32
            }
        );
        let single = QueueCounts::for_models(QueueModel::Single, QueueModel::Single, 4, 8);
        assert_eq!(single.num_tx_complq, 0);
        assert_eq!(single.num_rx_bufq, 0);
    }

    #[test]
    fn companions_under_single_model_are_invalid() {
        let counts = QueueCounts {
            num_tx_q: 4,
            num_tx_complq: 4,
            num_rx_q: 4,
            num_rx_bufq: 0,
        };
        assert!(matches!(
            counts.validate(QueueModel::Single, QueueModel::Single),
            Err(CtlError::InvalidConfig(_))
        ));
        counts
            .validate(QueueModel::Split, QueueModel::Single)
            .unwrap();
    }

    #[test]
    fn layout_from_well_formed_reply() {
        let resp = response(vec![
            chunk(QueueType::Tx, 0, 2),
            chunk(QueueType::TxCompletion, 2, 2),
            chunk(QueueType::Rx, 4, 4),
        ]);
        let layout = ChunkLayout::from_response(&resp).unwrap();
        assert_eq!(layout.tx.start_qid, 0);
        assert_eq!(layout.rx.queue_id(3), Some(7));
        assert_eq!(layout.rx.queue_id(4), None);
        assert_eq!(layout.tx_compl.unwrap().tail_register(1), Some(0x3000));
        assert!(layout.rx_buf.is_none());
    }

    #[test]
    fn layout_rejects_missing_duplicate_and_unexpected_chunks() {
        let missing_compl = response(vec![chunk(QueueType::Tx, 0, 2), chunk(QueueType::Rx, 4, 4)]);
        let duplicate = response(vec![
            chunk(QueueType::Tx, 0, 2),
            chunk(QueueType::Tx, 0, 2),
            chunk(QueueType::TxCompletion, 2, 2),
            chunk(QueueType::Rx, 4, 4),
        ]);
        let unexpected = response(vec![
            chunk(QueueType::Tx, 0, 2),
            chunk(QueueType::TxCompletion, 2, 2),
            chunk(QueueType::Rx, 4, 4),
            chunk(QueueType::RxBuffer, 8, 8),
        ]);
        let short = response(vec![
            chunk(QueueType::Tx, 0, 1),
            chunk(QueueType::TxCompletion, 2, 2),
            chunk(QueueType::Rx, 4, 4),
        ]);
        for resp in [missing_compl, duplicate, unexpected, short] {
            assert!(matches!(
                ChunkLayout::from_response(&resp),
                Err(CtlError::ProtocolViolation(_))
            ));
        }
    }

    #[test]
    fn layout_rejects_chunks_that_overflow() {
        let mut high_qid = chunk(QueueType::Tx, u32::MAX, 2);
        high_qid.qtail_reg_start = 0;
        let mut high_tail = chunk(QueueType::Tx, 0, 2);
        high_tail.qtail_reg_start = u64::MAX;
        let mut wide_spacing = chunk(QueueType::Tx, 0, 2);
        wide_spacing.qtail_reg_start = u64::MAX - 0x800;

        for tx in [high_qid, high_tail, wide_spacing] {
            let resp = response(vec![
                tx,
                chunk(QueueType::TxCompletion, 2, 2),
                chunk(QueueType::Rx, 4, 4),
            ]);
            assert!(matches!(
                ChunkLayout::from_response(&resp),
                Err(CtlError::ProtocolViolation(_))
            ));
        }

        // The last queue may sit exactly at the top of the range.
        let mut top = chunk(QueueType::Tx, u32::MAX - 1, 2);
        top.qtail_reg_start = u64::MAX - 0x1000;
        let resp = response(vec![
            top,
            chunk(QueueType::TxCompletion, 2, 2),
            chunk(QueueType::Rx, 4, 4),
        ]);
        let layout = ChunkLayout::from_response(&resp).unwrap();
        assert_eq!(layout.tx.queue_id(1), Some(u32::MAX));
        assert_eq!(layout.tx.tail_register(1), Some(u64::MAX));
        assert_eq!(layout.tx.tail_register(2), None);
    }

    #[test]
    fn accessors_do_not_wrap() {
        let region = QueueRegion {
            start_qid: u32::MAX,
            num_queues: 2,
            qtail_start: u64::MAX,
            qtail_spacing: 0x1000,
        };
        assert_eq!(region.queue_id(0), Some(u32::MAX));
        assert_eq!(region.queue_id(1), None);
        assert_eq!(region.tail_register(0), Some(u64::MAX));
        assert_eq!(region.tail_register(1), None);
    }

    #[test]
    fn max_pkt_len_is_capped() {
        let chunks = vec![
            chunk(QueueType::Tx, 0, 2),
            chunk(QueueType::TxCompletion, 2, 2),
            chunk(QueueType::Rx, 4, 4),
        ];
        let id = DeviceId::new(0, 1, 0, 0);

        let mut jumbo = response(chunks.clone());
        jumbo.max_mtu = 9800;
        let port = VirtualPort::from_response(id, 0, &jumbo).unwrap();
        assert_eq!(port.max_pkt_len(), MAX_FRAME_SIZE);

        let mut small = response(chunks);
        small.max_mtu = 1500;
        let port = VirtualPort::from_response(id, 3, &small).unwrap();
        assert_eq!(port.max_pkt_len(), 1526);
        assert_eq!(port.sw_idx(), 3);
        assert_eq!(port.adapter(), id);
        assert!(!port.is_enabled());
    }
}
