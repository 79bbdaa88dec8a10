//! Worker thread destination context
//!
//! Each worker owns a named thread and a FIFO queue. Asynchronous callbacks
//! registered with a worker's dispatcher are queued as envelopes and invoked
//! on that thread in arrival order.

use async_callback::{target_invoke, Dispatch, Dispatcher, Envelope};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

/// Errors from worker thread lifecycle operations
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Failed to spawn worker thread '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker thread '{0}' panicked")]
    Panicked(String),
}

/// Messages carried by the worker queue
enum ThreadMsg {
    Dispatch(Envelope),
    Exit,
}

/// A named thread that invokes queued callbacks
pub struct WorkerThread {
    name: String,
    sender: Mutex<Option<Sender<ThreadMsg>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    delivered: Arc<AtomicU64>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl WorkerThread {
    /// Create a worker; the thread starts with [`create`](Self::create)
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            sender: Mutex::new(None),
            thread: Mutex::new(None),
            delivered: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start the thread. Calling it on a running worker does nothing.
    pub fn create(&self) -> Result<(), WorkerError> {
        let mut thread_slot = lock(&self.thread);
        if thread_slot.is_some() {
            return Ok(());
        }

        let (tx, rx) = mpsc::channel();
        let name = self.name.clone();
        let delivered = Arc::clone(&self.delivered);

        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || process(&name, rx, &delivered))
            .map_err(|source| WorkerError::Spawn {
                name: self.name.clone(),
                source,
            })?;

        *lock(&self.sender) = Some(tx);
        *thread_slot = Some(handle);

        log::info!("Worker thread '{}' created", self.name);
        Ok(())
    }

    /// Check if the thread is accepting callbacks
    pub fn is_running(&self) -> bool {
        lock(&self.sender).is_some()
    }

    /// Callbacks invoked on this worker so far
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Handle for registering callbacks that run on this worker
    pub fn dispatcher(self: &Arc<Self>) -> Dispatcher {
        Arc::clone(self) as Dispatcher
    }

    /// Queue an exit message and wait for the thread to finish
    ///
    /// Callbacks queued before the exit message still run. Anything queued
    /// behind it is dropped, which returns its transport memory.
    pub fn exit(&self) -> Result<(), WorkerError> {
        let Some(sender) = lock(&self.sender).take() else {
            return Ok(());
        };

        // The receiver only disappears if the thread already died
        let _ = sender.send(ThreadMsg::Exit);
        drop(sender);

        let Some(handle) = lock(&self.thread).take() else {
            return Ok(());
        };

        if handle.thread().id() == thread::current().id() {
            log::warn!("Worker thread '{}' asked to exit itself; not joining", self.name);
            return Ok(());
        }

        handle
            .join()
            .map_err(|_| WorkerError::Panicked(self.name.clone()))?;

        log::info!(
            "Worker thread '{}' exited after {} callbacks",
            self.name,
            self.delivered()
        );
        Ok(())
    }
}

impl Dispatch for WorkerThread {
    fn dispatch(&self, envelope: Envelope) -> bool {
        let sender = lock(&self.sender);
        let Some(sender) = sender.as_ref() else {
            log::warn!(
                "Worker thread '{}' is not running, refusing {}",
                self.name,
                envelope.handler_id()
            );
            return false;
        };

        sender.send(ThreadMsg::Dispatch(envelope)).is_ok()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for WorkerThread {
    fn drop(&mut self) {
        if !self.is_running() {
            return;
        }
        if let Err(e) = self.exit() {
            log::error!("{}", e);
        }
    }
}

/// Thread body: invoke queued callbacks until the exit message arrives
fn process(name: &str, rx: Receiver<ThreadMsg>, delivered: &AtomicU64) {
    log::debug!("Worker thread '{}' processing", name);

    while let Ok(msg) = rx.recv() {
        match msg {
            ThreadMsg::Dispatch(envelope) => {
                target_invoke(envelope);
                delivered.fetch_add(1, Ordering::Relaxed);
            }
            ThreadMsg::Exit => {
                let discarded = rx.try_iter().count();
                if discarded > 0 {
                    log::warn!(
                        "Worker thread '{}' discarded {} queued messages on exit",
                        name,
                        discarded
                    );
                }
                break;
            }
        }
    }

    log::debug!("Worker thread '{}' stopped", name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_callback::{Handler, Multicast, TransportAllocator, UserData};

    fn record_thread(_data: &[u8], user_data: Option<&UserData>) {
        let log = user_data
            .and_then(|u| u.downcast_ref::<Mutex<Vec<String>>>())
            .unwrap();
        let name = thread::current().name().unwrap_or_default().to_string();
        log.lock().unwrap().push(name);
    }

    #[test]
    fn test_worker_runs_callbacks_on_its_thread() {
        let transport = Arc::new(TransportAllocator::with_defaults().unwrap());
        let worker = WorkerThread::new("Thread1");
        worker.create().unwrap();
        assert!(worker.is_running());

        let log = Arc::new(Mutex::new(Vec::<String>::new()));
        let user_data: UserData = log.clone();

        let mc = Multicast::new("Test", 1, Arc::clone(&transport));
        mc.register(Handler::raw(record_thread), Some(worker.dispatcher()), Some(user_data))
            .unwrap();

        for _ in 0..3 {
            assert!(mc.invoke(&[1, 2]));
        }

        worker.exit().unwrap();
        assert!(!worker.is_running());
        assert_eq!(worker.delivered(), 3);
        assert_eq!(*log.lock().unwrap(), vec!["Thread1"; 3]);
        assert_eq!(transport.outstanding_blocks(), 0);
    }

    #[test]
    fn test_stopped_worker_refuses_envelopes() {
        let transport = Arc::new(TransportAllocator::with_defaults().unwrap());
        let worker = WorkerThread::new("Idle");

        let mc = Multicast::new("Test", 1, Arc::clone(&transport));
        mc.register(Handler::raw(record_thread), Some(worker.dispatcher()), None)
            .unwrap();

        // Never created
        assert!(!mc.invoke(&[1]));
        assert_eq!(transport.outstanding_blocks(), 0);

        worker.create().unwrap();
        worker.exit().unwrap();
        assert!(!mc.invoke(&[1]));
        assert_eq!(transport.outstanding_blocks(), 0);
    }

    #[test]
    fn test_create_and_exit_are_idempotent() {
        let worker = WorkerThread::new("Twice");
        worker.create().unwrap();
        worker.create().unwrap();
        worker.exit().unwrap();
        worker.exit().unwrap();
        assert_eq!(worker.delivered(), 0);
    }
}
