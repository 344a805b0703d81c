use std::time::Duration;

use netctl_virtchnl::{QueueModel, MAX_MAILBOX_PAYLOAD};
use serde::Deserialize;

use crate::engine::CompletionMode;
use crate::error::{CtlError, Result};

/// Hard upper bound on virtual ports per adapter.
pub const MAX_VPORT_NUM: u16 = 8;

pub const DEFAULT_TXQ_NUM: u16 = 16;
pub const DEFAULT_RXQ_NUM: u16 = 16;

/// Completion queues per tx queue group under the split model.
pub const TX_COMPLQ_PER_GRP: u16 = 1;
/// Buffer queues per rx queue group under the split model.
pub const RX_BUFQ_PER_GRP: u16 = 2;

pub const DEFAULT_MBX_BUF_SIZE: usize = MAX_MAILBOX_PAYLOAD;

/// Smallest mailbox buffer that can still carry a vport creation reply with a few chunks.
pub const MIN_MBX_BUF_SIZE: usize = 256;

/// Per-adapter settings.
///
/// Deserializable from any serde format; missing fields take their defaults. Environment
/// overrides are applied by [`AdapterConfig::from_env`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdapterConfig {
    /// Upper bound on ports; the effective bound is also limited by firmware capabilities.
    pub max_vports: u16,
    pub txq_model: QueueModel,
    pub rxq_model: QueueModel,
    pub num_tx_q: u16,
    pub num_rx_q: u16,
    pub mailbox_buf_size: usize,
    pub cmd_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub completion_mode: CompletionMode,
    /// Port ids to create at startup, see [`parse_vport_list`].
    pub requested_vports: Vec<u16>,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            max_vports: MAX_VPORT_NUM,
            txq_model: QueueModel::Split,
            rxq_model: QueueModel::Split,
            num_tx_q: DEFAULT_TXQ_NUM,
            num_rx_q: DEFAULT_RXQ_NUM,
            mailbox_buf_size: DEFAULT_MBX_BUF_SIZE,
            // 200 polls of 10ms.
            cmd_timeout_ms: 2000,
            poll_interval_ms: 10,
            completion_mode: CompletionMode::Inline,
            requested_vports: Vec::new(),
        }
    }
}

impl AdapterConfig {
    /// Defaults overlaid with `NETCTL_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Overlay values produced by `lookup` (keyed by environment variable name).
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(v) = lookup("NETCTL_MAX_VPORTS") {
            self.max_vports = parse_num("NETCTL_MAX_VPORTS", &v)?;
        }
        if let Some(v) = lookup("NETCTL_TXQ_MODEL") {
            self.txq_model = parse_queue_model("NETCTL_TXQ_MODEL", &v)?;
        }
        if let Some(v) = lookup("NETCTL_RXQ_MODEL") {
            self.rxq_model = parse_queue_model("NETCTL_RXQ_MODEL", &v)?;
        }
        if let Some(v) = lookup("NETCTL_NUM_TXQ") {
            self.num_tx_q = parse_num("NETCTL_NUM_TXQ", &v)?;
        }
        if let Some(v) = lookup("NETCTL_NUM_RXQ") {
            self.num_rx_q = parse_num("NETCTL_NUM_RXQ", &v)?;
        }
        if let Some(v) = lookup("NETCTL_MBX_BUF_SIZE") {
            self.mailbox_buf_size = parse_num("NETCTL_MBX_BUF_SIZE", &v)?;
        }
        if let Some(v) = lookup("NETCTL_CMD_TIMEOUT_MS") {
            self.cmd_timeout_ms = parse_num("NETCTL_CMD_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("NETCTL_POLL_INTERVAL_MS") {
            self.poll_interval_ms = parse_num("NETCTL_POLL_INTERVAL_MS", &v)?;
        }
        if let Some(v) = lookup("NETCTL_COMPLETION_MODE") {
            self.completion_mode = match v.trim() {
                "inline" => CompletionMode::Inline,
                "deferred" => CompletionMode::Deferred,
                other => {
                    return Err(CtlError::InvalidConfig(format!(
                        "NETCTL_COMPLETION_MODE: unknown mode {other:?}"
                    )))
                }
            };
        }
        if let Some(v) = lookup("NETCTL_VPORTS") {
            self.requested_vports = parse_vport_list(&v)?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_vports == 0 || self.max_vports > MAX_VPORT_NUM {
            return Err(CtlError::InvalidConfig(format!(
                "max_vports must be in 1..={MAX_VPORT_NUM}, got {}",
                self.max_vports
            )));
        }
        if self.num_tx_q == 0 || self.num_rx_q == 0 {
            return Err(CtlError::InvalidConfig(
                "queue counts must be non-zero".into(),
            ));
        }
        if !(MIN_MBX_BUF_SIZE..=MAX_MAILBOX_PAYLOAD).contains(&self.mailbox_buf_size) {
            return Err(CtlError::InvalidConfig(format!(
                "mailbox_buf_size must be in {MIN_MBX_BUF_SIZE}..={MAX_MAILBOX_PAYLOAD}, got {}",
                self.mailbox_buf_size
            )));
        }
        if self.cmd_timeout_ms == 0 || self.poll_interval_ms > self.cmd_timeout_ms {
            return Err(CtlError::InvalidConfig(format!(
                "poll interval {}ms must not exceed command timeout {}ms (which must be non-zero)",
                self.poll_interval_ms, self.cmd_timeout_ms
            )));
        }
        if self.requested_vports.len() > self.max_vports as usize {
            return Err(CtlError::InvalidConfig(format!(
                "{} vports requested but max_vports is {}",
                self.requested_vports.len(),
                self.max_vports
            )));
        }
        let mut seen = [false; MAX_VPORT_NUM as usize];
        for &id in &self.requested_vports {
            match seen.get_mut(id as usize) {
                Some(slot) if !*slot => *slot = true,
                Some(_) => {
                    return Err(CtlError::InvalidConfig(format!(
                        "vport {id} requested twice"
                    )))
                }
                None => {
                    return Err(CtlError::InvalidConfig(format!(
                        "vport {id} out of range (max {})",
                        MAX_VPORT_NUM - 1
                    )))
                }
            }
        }
        Ok(())
    }

    pub fn cmd_timeout(&self) -> Duration {
        Duration::from_millis(self.cmd_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Parse a port list such as `0,2-4` or `[0,2-4]` into sorted ids.
///
/// Ids must be below [`MAX_VPORT_NUM`]; ranges are inclusive; duplicates are rejected.
pub fn parse_vport_list(s: &str) -> Result<Vec<u16>> {
    let s = s.trim();
    let s = s
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(s);

    let mut seen = [false; MAX_VPORT_NUM as usize];
    for item in s.split(',').map(str::trim).filter(|item| !item.is_empty()) {
        let (lo, hi) = match item.split_once('-') {
            Some((lo, hi)) => (parse_vport_id(lo)?, parse_vport_id(hi)?),
            None => {
                let id = parse_vport_id(item)?;
                (id, id)
            }
        };
        if lo > hi {
            return Err(CtlError::InvalidConfig(format!(
                "invalid vport range {item:?}"
            )));
        }
        for id in lo..=hi {
            let slot = &mut seen[id as usize];
            if *slot {
                return Err(CtlError::InvalidConfig(format!(
                    "vport {id} listed twice"
                )));
            }
            *slot = true;
        }
    }

    Ok((0..MAX_VPORT_NUM).filter(|&id| seen[id as usize]).collect())
}

fn parse_vport_id(s: &str) -> Result<u16> {
    let id: u16 = s
        .trim()
        .parse()
        .map_err(|_| CtlError::InvalidConfig(format!("invalid vport id {s:?}")))?;
    if id >= MAX_VPORT_NUM {
        return Err(CtlError::InvalidConfig(format!(
            "vport {id} out of range (max {})",
            MAX_VPORT_NUM - 1
        )));
    }
    Ok(id)
}

fn parse_num<N: std::str::FromStr>(key: &str, v: &str) -> Result<N> {
    v.trim()
        .parse()
        .map_err(|_| CtlError::InvalidConfig(format!("{key}: invalid number {v:?}")))
}

fn parse_queue_model(key: &str, v: &str) -> Result<QueueModel> {
    match v.trim() {
        "split" => Ok(QueueModel::Split),
        "single" => Ok(QueueModel::Single),
        other => Err(CtlError::InvalidConfig(format!(
            "{key}: unknown queue model {other:?}"
        ))),
    }
}
