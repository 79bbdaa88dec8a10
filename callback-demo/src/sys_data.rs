//! System mode publisher guarded by its own lock

use async_callback::{callback_interface, CallbackArg, TransportAllocator};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Operating mode of the system
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemMode {
    #[default]
    Starting,
    Normal,
    Service,
    SysInop,
}

impl SystemMode {
    pub fn as_raw(self) -> u32 {
        match self {
            SystemMode::Starting => 0,
            SystemMode::Normal => 1,
            SystemMode::Service => 2,
            SystemMode::SysInop => 3,
        }
    }

    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(SystemMode::Starting),
            1 => Some(SystemMode::Normal),
            2 => Some(SystemMode::Service),
            3 => Some(SystemMode::SysInop),
            _ => None,
        }
    }
}

impl fmt::Display for SystemMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SystemMode::Starting => "STARTING",
            SystemMode::Normal => "NORMAL",
            SystemMode::Service => "SERVICE",
            SystemMode::SysInop => "SYS_INOP",
        };
        f.write_str(name)
    }
}

impl CallbackArg for SystemMode {
    const SIZE: usize = u32::SIZE;

    fn encode(&self, buf: &mut [u8]) {
        self.as_raw().encode(buf);
    }

    // Unknown values can only come from a corrupted payload
    fn decode(buf: &[u8]) -> Self {
        SystemMode::from_raw(u32::decode(buf)).unwrap_or(SystemMode::SysInop)
    }
}

/// Argument of the system mode changed interfaces
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SystemModeData {
    pub previous: SystemMode,
    pub current: SystemMode,
}

impl CallbackArg for SystemModeData {
    const SIZE: usize = 2 * SystemMode::SIZE;

    fn encode(&self, buf: &mut [u8]) {
        let (previous, current) = buf.split_at_mut(SystemMode::SIZE);
        self.previous.encode(previous);
        self.current.encode(current);
    }

    fn decode(buf: &[u8]) -> Self {
        let (previous, current) = buf.split_at(SystemMode::SIZE);
        Self {
            previous: SystemMode::decode(previous),
            current: SystemMode::decode(current),
        }
    }
}

callback_interface! {
    /// Published on every system mode change
    pub SystemModeChangedCb: SystemModeData, 2
}

/// Publishes mode changes while holding the mode lock
///
/// Subscribers therefore observe changes in the order they were made, at the
/// cost of running synchronous subscribers under the lock.
pub struct SysData {
    mode: Mutex<SystemMode>,
    changed: SystemModeChangedCb,
}

impl SysData {
    pub fn new(transport: &Arc<TransportAllocator>) -> Self {
        Self {
            mode: Mutex::new(SystemMode::default()),
            changed: SystemModeChangedCb::new(transport),
        }
    }

    /// The public mode changed interface
    pub fn system_mode_changed(&self) -> &SystemModeChangedCb {
        &self.changed
    }

    pub fn system_mode(&self) -> SystemMode {
        *self.mode.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Change the mode and notify every subscriber
    pub fn set_system_mode(&self, mode: SystemMode) -> bool {
        let mut current = self.mode.lock().unwrap_or_else(PoisonError::into_inner);

        let data = SystemModeData {
            previous: *current,
            current: mode,
        };
        *current = mode;

        log::debug!("SysData mode {} -> {}", data.previous, data.current);
        self.changed.invoke(&data)
    }

    pub fn terminate(&self) {
        self.changed.terminate();
    }
}
