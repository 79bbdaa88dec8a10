//! Walkthrough of synchronous and asynchronous callbacks
//!
//! Publishes an integer and a string, drives both system mode publishers,
//! then drains the workers and unregisters everything.

use crate::config::DemoSettings;
use crate::sys_data::{SysData, SystemMode, SystemModeData};
use crate::sys_data_no_lock::SysDataNoLock;
use crate::worker::WorkerThread;
use anyhow::{Context, Result};
use async_callback::{callback_interface, Elements, TransportAllocator, UserData};
use std::sync::Arc;
use std::thread;

/// Maximum registrations on the demo interfaces
const MAX_REGISTER: usize = 3;

callback_interface! {
    /// Integer test interface
    pub TestCb: i32, MAX_REGISTER
}

callback_interface! {
    /// Character array test interface
    pub TestStrCb: [u8], MAX_REGISTER
}

/// User data attached to the second integer subscriber
struct TestData {
    id: i32,
}

fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S%.3f").to_string()
}

fn thread_name() -> String {
    thread::current().name().unwrap_or("<unnamed>").to_string()
}

fn test_callback1(value: &i32, _user_data: Option<&UserData>) {
    println!("[{} {}] TestCallback1: {}", timestamp(), thread_name(), value);
}

fn test_callback2(value: &i32, user_data: Option<&UserData>) {
    let id = user_data
        .and_then(|u| u.downcast_ref::<TestData>())
        .map(|data| data.id);
    println!(
        "[{} {}] TestCallback2: {}, id= {}",
        timestamp(),
        thread_name(),
        value,
        id.map_or_else(|| "none".to_string(), |id| id.to_string())
    );
}

fn test_str_callback(text: Elements<'_, u8>, _user_data: Option<&UserData>) {
    println!(
        "[{} {}] TestStrCallback: {}",
        timestamp(),
        thread_name(),
        text.as_str().unwrap_or("<invalid utf-8>")
    );
}

fn sys_data_callback(data: &SystemModeData, _user_data: Option<&UserData>) {
    println!(
        "[{} {}] SysDataCallback: {} -> {}",
        timestamp(),
        thread_name(),
        data.previous,
        data.current
    );
}

fn sys_data_no_lock_callback(data: &SystemModeData, _user_data: Option<&UserData>) {
    println!(
        "[{} {}] SysDataNoLockCallback: {} -> {}",
        timestamp(),
        thread_name(),
        data.previous,
        data.current
    );
}

/// Run the walkthrough against `transport`
pub fn run(settings: &DemoSettings, transport: &Arc<TransportAllocator>) -> Result<()> {
    let worker1 = WorkerThread::new("Thread1");
    let worker2 = WorkerThread::new("Thread2");
    worker1.create()?;
    worker2.create()?;

    let thread1 = worker1.dispatcher();
    let thread2 = worker2.dispatcher();

    let test_cb = TestCb::new(transport);
    let test_str_cb = TestStrCb::new(transport);
    let sys_data = SysData::new(transport);
    let sys_data_no_lock = SysDataNoLock::new(transport, &worker1)
        .context("Failed to set up SysDataNoLock")?;

    // Synchronous, then asynchronous on both workers
    let test_data: UserData = Arc::new(TestData {
        id: settings.user_id,
    });
    test_cb.register(test_callback1, None, None)?;
    test_cb.register(test_callback1, Some(Arc::clone(&thread1)), None)?;
    test_cb.register(test_callback2, Some(Arc::clone(&thread2)), Some(test_data))?;

    test_cb.invoke(&settings.value);

    test_str_cb.register(test_str_callback, Some(Arc::clone(&thread1)), None)?;
    test_str_cb
        .invoke(settings.message.as_bytes())
        .with_context(|| format!("Failed to publish message {:?}", settings.message))?;

    sys_data
        .system_mode_changed()
        .register(sys_data_callback, Some(Arc::clone(&thread1)), None)?;

    if sys_data
        .system_mode_changed()
        .is_registered(sys_data_callback, Some(&thread1))
    {
        sys_data.set_system_mode(SystemMode::Starting);
        sys_data.set_system_mode(SystemMode::Normal);
    }

    sys_data_no_lock
        .system_mode_changed()
        .register(sys_data_no_lock_callback, Some(Arc::clone(&thread2)), None)?;
    sys_data_no_lock.set_system_mode(SystemMode::Starting);
    sys_data_no_lock.set_system_mode(SystemMode::Normal);

    // Thread1 feeds Thread2 through SysDataNoLock, so drain it first
    worker1.exit()?;
    worker2.exit()?;

    for worker in [&worker1, &worker2] {
        log::info!("{} ran {} callbacks", worker.name(), worker.delivered());
    }
    log::info!(
        "Final modes: SysData {}, SysDataNoLock {}",
        sys_data.system_mode(),
        sys_data_no_lock.system_mode()
    );

    let removed = [
        test_cb.unregister(test_callback1, None),
        test_cb.unregister(test_callback1, Some(&thread1)),
        test_cb.unregister(test_callback2, Some(&thread2)),
        sys_data
            .system_mode_changed()
            .unregister(sys_data_callback, Some(&thread1)),
        sys_data_no_lock
            .system_mode_changed()
            .unregister(sys_data_no_lock_callback, Some(&thread2)),
        test_str_cb.unregister(test_str_callback, Some(&thread1)),
    ];
    log::debug!(
        "Unregistered {} of {} subscriptions",
        removed.iter().filter(|&&r| r).count(),
        removed.len()
    );

    sys_data_no_lock.terminate();
    sys_data.terminate();
    test_cb.terminate();
    test_str_cb.terminate();

    Ok(())
}
