use std::sync::Arc;

use netctl_virtchnl::{
    max_queues_per_msg, Capabilities, MailboxTransport, QueueModel, RxQueueInfo, TxQueueInfo,
    VersionInfo,
};
use tracing::info;

use crate::config::AdapterConfig;
use crate::engine::{CommandEngine, CompletionPath};
use crate::registry::DeviceId;
use crate::vport::VirtualPort;
use crate::Result;

/// Startup progress. Port operations require [`NegotiationState::Ready`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    Fresh,
    VersionChecked,
    Ready,
}

/// One physical device function and the virtual ports carved out of it.
///
/// All mutation goes through command round-trips on the adapter's [`CommandEngine`]. The
/// port table is only touched from the issuing context (`&mut self`).
pub struct Adapter<T> {
    pub(crate) id: DeviceId,
    pub(crate) config: AdapterConfig,
    pub(crate) engine: CommandEngine<T>,
    pub(crate) state: NegotiationState,
    pub(crate) version: Option<VersionInfo>,
    pub(crate) caps: Option<Capabilities>,
    pub(crate) txq_model: QueueModel,
    pub(crate) rxq_model: QueueModel,
    pub(crate) vports: Vec<Option<VirtualPort>>,
    pub(crate) max_vport_nb: u16,
    pub(crate) cur_vport_nb: u16,
    pub(crate) max_rxq_per_msg: usize,
    pub(crate) max_txq_per_msg: usize,
}

impl<T: MailboxTransport> Adapter<T> {
    pub fn new(id: DeviceId, transport: Arc<T>, config: AdapterConfig) -> Result<Self> {
        config.validate()?;

        let engine = CommandEngine::new(transport, &config);
        let max_rxq_per_msg = max_queues_per_msg(config.mailbox_buf_size, RxQueueInfo::LEN);
        let max_txq_per_msg = max_queues_per_msg(config.mailbox_buf_size, TxQueueInfo::LEN);
        info!(
            adapter = %id,
            txq_model = ?config.txq_model,
            rxq_model = ?config.rxq_model,
            max_rxq_per_msg,
            max_txq_per_msg,
            "adapter created"
        );

        Ok(Self {
            id,
            txq_model: config.txq_model,
            rxq_model: config.rxq_model,
            config,
            engine,
            state: NegotiationState::Fresh,
            version: None,
            caps: None,
            vports: Vec::new(),
            max_vport_nb: 0,
            cur_vport_nb: 0,
            max_rxq_per_msg,
            max_txq_per_msg,
        })
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    pub fn engine(&self) -> &CommandEngine<T> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut CommandEngine<T> {
        &mut self.engine
    }

    /// Handle for the context that delivers completions (interrupt handler or event loop).
    pub fn completion_path(&self) -> CompletionPath<T> {
        self.engine.completion_path()
    }

    /// Recover the command slot after a timeout.
    pub fn clear_command(&self) {
        self.engine.clear();
    }

    pub fn negotiation_state(&self) -> NegotiationState {
        self.state
    }

    pub fn version(&self) -> Option<VersionInfo> {
        self.version
    }

    pub fn caps(&self) -> Option<&Capabilities> {
        self.caps.as_ref()
    }

    pub fn txq_model(&self) -> QueueModel {
        self.txq_model
    }

    pub fn rxq_model(&self) -> QueueModel {
        self.rxq_model
    }

    pub fn max_vport_nb(&self) -> u16 {
        self.max_vport_nb
    }

    pub fn cur_vport_nb(&self) -> u16 {
        self.cur_vport_nb
    }

    pub fn max_rxq_per_msg(&self) -> usize {
        self.max_rxq_per_msg
    }

    pub fn max_txq_per_msg(&self) -> usize {
        self.max_txq_per_msg
    }

    pub fn vport(&self, idx: u16) -> Option<&VirtualPort> {
        self.vports.get(idx as usize).and_then(Option::as_ref)
    }

    pub fn vport_mut(&mut self, idx: u16) -> Option<&mut VirtualPort> {
        self.vports.get_mut(idx as usize).and_then(Option::as_mut)
    }

    /// Live ports in slot order.
    pub fn vports(&self) -> impl Iterator<Item = &VirtualPort> {
        self.vports.iter().flatten()
    }

    pub fn find_vport(&self, vport_id: u32) -> Option<&VirtualPort> {
        self.vports().find(|v| v.vport_id() == vport_id)
    }
}
