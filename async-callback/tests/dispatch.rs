//! End-to-end delivery through a channel-backed destination thread

use async_callback::{
    callback_interface, target_invoke, Dispatch, Dispatcher, Elements, Envelope, Handler,
    HandlerId, Multicast, PoolConfig, TransportAllocator, TransportConfig, UserData,
};
use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, JoinHandle};

struct ChannelDispatcher {
    name: String,
    tx: Mutex<Sender<Envelope>>,
}

impl Dispatch for ChannelDispatcher {
    fn dispatch(&self, envelope: Envelope) -> bool {
        self.tx.lock().unwrap().send(envelope).is_ok()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn channel_dispatcher(name: &str) -> (Dispatcher, Receiver<Envelope>) {
    let (tx, rx) = mpsc::channel();
    let dispatcher: Dispatcher = Arc::new(ChannelDispatcher {
        name: name.to_string(),
        tx: Mutex::new(tx),
    });
    (dispatcher, rx)
}

/// Destination context: runs until every sender is gone and the queue is empty
fn run_worker(name: &str, rx: Receiver<Envelope>) -> JoinHandle<()> {
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            for envelope in rx {
                target_invoke(envelope);
            }
        })
        .unwrap()
}

fn user_data<T: Any + Send + Sync>(value: &Arc<T>) -> UserData {
    value.clone()
}

fn record<T: Send + 'static>(user_data: Option<&UserData>, item: T) {
    let log = user_data
        .and_then(|u| u.downcast_ref::<Mutex<Vec<T>>>())
        .expect("handler registered without a log");
    log.lock().unwrap().push(item);
}

fn thread_name() -> String {
    thread::current().name().unwrap_or("<unnamed>").to_string()
}

fn transport() -> Arc<TransportAllocator> {
    let _ = env_logger::builder().is_test(true).try_init();
    Arc::new(TransportAllocator::with_defaults().unwrap())
}

callback_interface! {
    ValueCb: i32, 2
}

callback_interface! {
    TextCb: [u8], 2
}

fn on_value(value: &i32, user_data: Option<&UserData>) {
    record(user_data, (*value, thread_name()));
}

fn on_value_copy(value: &i32, user_data: Option<&UserData>) {
    record(user_data, (*value, thread_name()));
}

#[test]
fn test_sync_and_async_delivery_of_one_value() {
    let transport = transport();
    let (dispatcher, rx) = channel_dispatcher("worker");
    let worker = run_worker("worker", rx);

    let sync_log = Arc::new(Mutex::new(Vec::<(i32, String)>::new()));
    let async_log = Arc::new(Mutex::new(Vec::<(i32, String)>::new()));

    let cb = ValueCb::new(&transport);
    cb.register(on_value, None, Some(user_data(&sync_log))).unwrap();
    cb.register(on_value_copy, Some(Arc::clone(&dispatcher)), Some(user_data(&async_log)))
        .unwrap();

    assert!(cb.invoke(&42));

    // Synchronous handler already ran on this thread
    let seen = sync_log.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, 42);
    assert_ne!(seen[0].1, "worker");

    cb.terminate();
    drop(dispatcher);
    worker.join().unwrap();

    let seen = async_log.lock().unwrap().clone();
    assert_eq!(seen, vec![(42, "worker".to_string())]);
    assert_eq!(transport.outstanding_blocks(), 0);
}

fn on_bytes(data: &[u8], user_data: Option<&UserData>) {
    record(user_data, data.to_vec());
}

#[test]
fn test_async_copy_is_independent_of_caller_buffer() {
    let transport = transport();
    let (dispatcher, rx) = channel_dispatcher("worker");
    let log = Arc::new(Mutex::new(Vec::<Vec<u8>>::new()));

    let mc = Multicast::new("Bytes", 1, Arc::clone(&transport));
    mc.register(Handler::raw(on_bytes), Some(Arc::clone(&dispatcher)), Some(user_data(&log)))
        .unwrap();

    let mut data = vec![1u8, 2, 3, 4];
    assert!(mc.invoke(&data));
    data.fill(0);
    drop(data);

    // Destination only starts after the caller has overwritten and freed its buffer
    mc.terminate();
    drop(dispatcher);
    run_worker("worker", rx).join().unwrap();

    assert_eq!(*log.lock().unwrap(), vec![vec![1u8, 2, 3, 4]]);
    assert_eq!(transport.outstanding_blocks(), 0);
}

#[test]
fn test_each_async_registration_owns_its_copy() {
    let transport = transport();
    let (dispatcher, rx) = channel_dispatcher("worker");
    let first = Arc::new(Mutex::new(Vec::<Vec<u8>>::new()));
    let second = Arc::new(Mutex::new(Vec::<Vec<u8>>::new()));

    let mc = Multicast::new("Bytes", 2, Arc::clone(&transport));
    mc.register(Handler::raw(on_bytes), Some(Arc::clone(&dispatcher)), Some(user_data(&first)))
        .unwrap();
    mc.register(Handler::raw(on_bytes), Some(Arc::clone(&dispatcher)), Some(user_data(&second)))
        .unwrap();

    assert!(mc.invoke(&[7, 7, 7]));

    let mut envelopes: Vec<Envelope> = rx.try_iter().collect();
    assert_eq!(envelopes.len(), 2);
    envelopes[0].payload_mut().fill(0xFF);

    for envelope in envelopes {
        target_invoke(envelope);
    }

    assert_eq!(*first.lock().unwrap(), vec![vec![0xFF, 0xFF, 0xFF]]);
    assert_eq!(*second.lock().unwrap(), vec![vec![7u8, 7, 7]]);
    assert_eq!(transport.outstanding_blocks(), 0);
}

static REENTRANT_CALLS: AtomicUsize = AtomicUsize::new(0);

fn on_reenter(data: &[u8], user_data: Option<&UserData>) {
    let calls = REENTRANT_CALLS.fetch_add(1, Ordering::SeqCst);
    if calls > 0 {
        return;
    }

    let interface = user_data
        .and_then(|u| u.downcast_ref::<Weak<Multicast>>())
        .and_then(Weak::upgrade)
        .expect("interface dropped");
    assert!(interface.invoke(data));
}

#[test]
fn test_sync_handler_may_invoke_same_interface() {
    let mc = Arc::new(Multicast::new("Reentrant", 1, transport()));
    let weak = Arc::new(Arc::downgrade(&mc));

    mc.register(Handler::raw(on_reenter), None, Some(user_data(&weak)))
        .unwrap();

    assert!(mc.invoke(&[1]));
    assert_eq!(REENTRANT_CALLS.load(Ordering::SeqCst), 2);
}

fn on_text(text: Elements<'_, u8>, user_data: Option<&UserData>) {
    let line = text.as_str().unwrap_or("<binary>").to_string();
    record(user_data, (line, thread_name()));
}

#[test]
fn test_text_array_delivered_on_worker() {
    let transport = transport();
    let (dispatcher, rx) = channel_dispatcher("console");
    let worker = run_worker("console", rx);
    let log = Arc::new(Mutex::new(Vec::<(String, String)>::new()));

    let cb = TextCb::new(&transport);
    cb.register(on_text, Some(Arc::clone(&dispatcher)), Some(user_data(&log)))
        .unwrap();

    let message = String::from("Hello World!");
    assert!(cb.invoke(message.as_bytes()).unwrap());
    drop(message);

    cb.terminate();
    drop(dispatcher);
    worker.join().unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec![("Hello World!".to_string(), "console".to_string())]
    );
    assert_eq!(transport.outstanding_blocks(), 0);
}

#[test]
fn test_closed_destination_refuses_and_releases() {
    let transport = Arc::new(
        TransportAllocator::new(&TransportConfig::new().with_pools(vec![PoolConfig::new(32, 4)]))
            .unwrap(),
    );
    let (dispatcher, rx) = channel_dispatcher("gone");
    drop(rx);

    let cb = ValueCb::new(&transport);
    cb.register(on_value, Some(dispatcher), None).unwrap();

    // Every attempt draws from and returns to the pool
    for value in 0..10 {
        assert!(!cb.invoke(&value));
    }
    assert_eq!(transport.outstanding_blocks(), 0);
    assert_eq!(transport.stats()[0].allocations, 20);
}

static CHURN_CALLS: AtomicUsize = AtomicUsize::new(0);

fn on_churn(_data: &[u8], _user_data: Option<&UserData>) {
    CHURN_CALLS.fetch_add(1, Ordering::SeqCst);
}

fn on_steady(data: &[u8], user_data: Option<&UserData>) {
    record(user_data, data.to_vec());
}

#[test]
fn test_register_and_unregister_while_another_thread_invokes() {
    const ROUNDS: usize = 500;

    // Room for every async delivery even if the worker falls behind
    let transport = Arc::new(
        TransportAllocator::new(
            &TransportConfig::new().with_pools(vec![PoolConfig::new(32, 2 * ROUNDS)]),
        )
        .unwrap(),
    );
    let (dispatcher, rx) = channel_dispatcher("worker");
    let worker = run_worker("worker", rx);
    let steady = Arc::new(Mutex::new(Vec::<Vec<u8>>::new()));

    let mc = Multicast::new("Churn", 3, Arc::clone(&transport));
    mc.register(Handler::raw(on_steady), None, Some(user_data(&steady)))
        .unwrap();

    thread::scope(|s| {
        s.spawn(|| {
            for _ in 0..ROUNDS {
                mc.register(Handler::raw(on_churn), None, None).unwrap();
                mc.register(Handler::raw(on_churn), Some(Arc::clone(&dispatcher)), None)
                    .unwrap();
                assert!(mc.unregister(HandlerId::of(on_churn), None));
                assert!(mc.unregister(HandlerId::of(on_churn), Some(&dispatcher)));
            }
        });

        s.spawn(|| {
            for _ in 0..ROUNDS {
                assert!(mc.invoke(&[9, 9]));
            }
        });
    });

    // Every invoke reached the steady subscriber exactly once
    assert_eq!(steady.lock().unwrap().len(), ROUNDS);
    assert_eq!(mc.registered_count(), 1);
    assert!(mc.is_registered(HandlerId::of(on_steady), None));

    mc.terminate();
    drop(dispatcher);
    worker.join().unwrap();

    assert!(CHURN_CALLS.load(Ordering::SeqCst) <= 2 * ROUNDS);
    assert_eq!(transport.outstanding_blocks(), 0);
}
