//! Commands issued on one thread, completions delivered by another.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use common::{fast_config, new_adapter};
use netctl_control::{CompletionMode, ErrorKind};
use netctl_fw_model::{Fault, FirmwareModel};
use netctl_virtchnl::{EventMessage, Opcode};

struct Poller {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Poller {
    fn spawn(
        path: netctl_control::CompletionPath<FirmwareModel>,
        events: mpsc::Sender<EventMessage>,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let handle = thread::spawn({
            let stop = stop.clone();
            move || {
                path.poll_loop(&stop, Duration::from_millis(1), |event| {
                    let _ = events.send(event);
                })
            }
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.join().unwrap();
        }
    }
}

#[test]
fn full_lifecycle_with_completion_thread() {
    let fw = Arc::new(FirmwareModel::new());
    let mut adapter = new_adapter(&fw, fast_config(CompletionMode::Deferred));
    let (tx, rx) = mpsc::channel();
    let _poller = Poller::spawn(adapter.completion_path(), tx);

    adapter.init().unwrap();
    let idx = adapter.create_default_vport().unwrap();
    adapter.enable_vport(idx).unwrap();
    let vport_id = adapter.vport(idx).unwrap().vport_id();

    fw.push_event(EventMessage::link_change(vport_id, true, 25_000));
    let event = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    adapter.handle_event(&event);
    assert!(adapter.vport(idx).unwrap().link_up());
    assert_eq!(adapter.vport(idx).unwrap().link_speed_mbps(), 25_000);

    // Nothing was queued for inline processing.
    assert_eq!(adapter.process_pending_events(), 0);

    adapter.disable_vport(idx).unwrap();
    adapter.destroy_vport(idx).unwrap();
    assert!(fw.vport_ids().is_empty());
}

#[test]
fn deferred_mode_without_a_poller_times_out() {
    let fw = Arc::new(FirmwareModel::new());
    let mut adapter = new_adapter(&fw, fast_config(CompletionMode::Deferred));

    let err = adapter.check_api_version().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    // The reply is still sitting in the mailbox.
    assert_eq!(fw.pending_replies(), 1);

    adapter.clear_command();
    let (tx, _rx) = mpsc::channel();
    let path = adapter.completion_path();
    // The stale reply now has nothing to match and is dropped as a violation.
    assert!(matches!(
        path.service_once(),
        netctl_control::Serviced::ProtocolViolation {
            received: Opcode::Version,
            released: None
        }
    ));

    let _poller = Poller::spawn(path, tx);
    adapter.init().unwrap();
}

#[test]
fn lost_completion_with_poller_times_out_and_recovers() {
    let fw = Arc::new(FirmwareModel::new());
    let mut adapter = new_adapter(&fw, fast_config(CompletionMode::Deferred));
    let (tx, _rx) = mpsc::channel();
    let _poller = Poller::spawn(adapter.completion_path(), tx);
    adapter.init().unwrap();

    fw.inject_fault(Fault::DropReply);
    assert_eq!(
        adapter.create_default_vport().unwrap_err().kind(),
        ErrorKind::Timeout
    );
    assert_eq!(
        adapter.create_default_vport().unwrap_err().kind(),
        ErrorKind::Busy
    );

    adapter.clear_command();
    assert_eq!(adapter.create_default_vport().unwrap(), 0);
}

#[test]
fn switching_to_deferred_after_negotiation() {
    let fw = Arc::new(FirmwareModel::new());
    let mut adapter = new_adapter(&fw, fast_config(CompletionMode::Inline));
    adapter.init().unwrap();

    adapter
        .engine_mut()
        .set_mode(CompletionMode::Deferred);
    let (tx, _rx) = mpsc::channel();
    let _poller = Poller::spawn(adapter.completion_path(), tx);

    adapter.create_default_vport().unwrap();
    assert_eq!(adapter.cur_vport_nb(), 1);
}
