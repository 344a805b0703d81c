#![allow(dead_code)]

use std::sync::Arc;

use netctl_control::{Adapter, AdapterConfig, CompletionMode, DeviceId};
use netctl_fw_model::FirmwareModel;

pub const ADAPTER_ID: DeviceId = DeviceId::new(0, 0x3b, 0, 0);

/// `RUST_LOG=netctl_control=debug cargo test` shows the round-trips.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Defaults with short timing so lost completions fail fast.
pub fn fast_config(mode: CompletionMode) -> AdapterConfig {
    AdapterConfig {
        cmd_timeout_ms: 100,
        poll_interval_ms: 1,
        completion_mode: mode,
        ..AdapterConfig::default()
    }
}

pub fn new_adapter(fw: &Arc<FirmwareModel>, config: AdapterConfig) -> Adapter<FirmwareModel> {
    init_tracing();
    Adapter::new(ADAPTER_ID, fw.clone(), config).expect("valid config")
}

/// An inline-mode adapter that has finished negotiation.
pub fn ready_adapter(fw: &Arc<FirmwareModel>) -> Adapter<FirmwareModel> {
    let mut adapter = new_adapter(fw, fast_config(CompletionMode::Inline));
    adapter.init().expect("negotiation");
    adapter
}
