//! System mode publisher serialized through a worker thread
//!
//! Instead of a lock, every mode change is itself an asynchronous callback on
//! a private single-slot interface. All changes run one after another on the
//! same worker, which then publishes the public interface from that thread.

use crate::sys_data::{SystemMode, SystemModeData};
use crate::worker::WorkerThread;
use async_callback::{callback_interface, Dispatcher, Result, TransportAllocator, UserData};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

callback_interface! {
    /// Published on every system mode change, from the serializing worker
    pub SystemModeChangedNoLockCb: SystemModeData, 2
}

callback_interface! {
    SetSystemModeCb: SystemMode, 1
}

/// State touched only from the serializing worker
struct NoLockState {
    mode: AtomicU32,
    changed: SystemModeChangedNoLockCb,
}

/// Runs on the serializing worker
fn set_system_mode_private(mode: &SystemMode, user_data: Option<&UserData>) {
    let Some(state) = user_data.and_then(|u| u.downcast_ref::<NoLockState>()) else {
        log::error!("SysDataNoLock private handler called without its state");
        return;
    };

    let previous = state.mode.swap(mode.as_raw(), Ordering::Relaxed);
    let data = SystemModeData {
        previous: SystemMode::from_raw(previous).unwrap_or_default(),
        current: *mode,
    };

    log::debug!("SysDataNoLock mode {} -> {}", data.previous, data.current);
    state.changed.invoke(&data);
}

/// Lock-free system mode publisher
pub struct SysDataNoLock {
    state: Arc<NoLockState>,
    set_mode: SetSystemModeCb,
    worker: Dispatcher,
}

impl SysDataNoLock {
    /// Create the publisher; mode changes will run on `worker`
    pub fn new(transport: &Arc<TransportAllocator>, worker: &Arc<WorkerThread>) -> Result<Self> {
        let state = Arc::new(NoLockState {
            mode: AtomicU32::new(SystemMode::default().as_raw()),
            changed: SystemModeChangedNoLockCb::new(transport),
        });

        let set_mode = SetSystemModeCb::new(transport);
        let worker = worker.dispatcher();
        let user_data: UserData = state.clone();
        set_mode.register(set_system_mode_private, Some(Arc::clone(&worker)), Some(user_data))?;

        Ok(Self {
            state,
            set_mode,
            worker,
        })
    }

    /// The public mode changed interface
    pub fn system_mode_changed(&self) -> &SystemModeChangedNoLockCb {
        &self.state.changed
    }

    /// Last mode applied by the worker
    pub fn system_mode(&self) -> SystemMode {
        SystemMode::from_raw(self.state.mode.load(Ordering::Relaxed)).unwrap_or_default()
    }

    /// Queue a mode change; subscribers are notified from the worker
    pub fn set_system_mode(&self, mode: SystemMode) -> bool {
        self.set_mode.invoke(&mode)
    }

    /// Stop accepting mode changes
    pub fn terminate(&self) {
        self.set_mode
            .unregister(set_system_mode_private, Some(&self.worker));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::thread;

    fn record(data: &SystemModeData, user_data: Option<&UserData>) {
        let log = user_data
            .and_then(|u| u.downcast_ref::<Mutex<Vec<(SystemModeData, String)>>>())
            .unwrap();
        let name = thread::current().name().unwrap_or_default().to_string();
        log.lock().unwrap().push((*data, name));
    }

    #[test]
    fn test_mode_changes_run_on_worker() {
        let transport = Arc::new(TransportAllocator::with_defaults().unwrap());
        let worker = WorkerThread::new("Thread1");
        worker.create().unwrap();

        let sys_data = SysDataNoLock::new(&transport, &worker).unwrap();
        let log = Arc::new(Mutex::new(Vec::<(SystemModeData, String)>::new()));
        let user_data: UserData = log.clone();
        sys_data
            .system_mode_changed()
            .register(record, None, Some(user_data))
            .unwrap();

        assert!(sys_data.set_system_mode(SystemMode::Starting));
        assert!(sys_data.set_system_mode(SystemMode::Normal));

        worker.exit().unwrap();
        assert_eq!(sys_data.system_mode(), SystemMode::Normal);

        let seen = log.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].0.previous, SystemMode::Starting);
        assert_eq!(seen[1].0.current, SystemMode::Normal);
        assert!(seen.iter().all(|(_, thread)| thread == "Thread1"));

        sys_data.terminate();
        assert!(!sys_data.set_system_mode(SystemMode::Service));
        assert_eq!(transport.outstanding_blocks(), 0);
    }
}
