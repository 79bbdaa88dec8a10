//! Concurrent publishing against a bounded transport
//!
//! Publishes from a `rayon` pool into one interface with a synchronous and an
//! asynchronous subscriber. Exhaustion is reported rather than fatal, so the
//! run measures how many asynchronous deliveries the transport could carry.

use crate::worker::WorkerThread;
use anyhow::{Context, Result};
use async_callback::{
    callback_interface, ExhaustionPolicy, PoolStats, TransportAllocator, TransportConfig, UserData,
};
use rayon::prelude::*;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

callback_interface! {
    StressCb: u64, 2
}

/// Running totals kept by the subscribers
#[derive(Default)]
struct Counters {
    sync_calls: AtomicU64,
    async_calls: AtomicU64,
}

fn counters(user_data: Option<&UserData>) -> Option<&Counters> {
    user_data.and_then(|u| u.downcast_ref::<Counters>())
}

fn on_sync(_value: &u64, user_data: Option<&UserData>) {
    if let Some(counters) = counters(user_data) {
        counters.sync_calls.fetch_add(1, Ordering::Relaxed);
    }
}

fn on_async(_value: &u64, user_data: Option<&UserData>) {
    if let Some(counters) = counters(user_data) {
        counters.async_calls.fetch_add(1, Ordering::Relaxed);
    }
}

/// Outcome of a stress run
#[derive(Debug, Clone, Serialize)]
pub struct StressReport {
    pub iterations: u64,
    pub sync_calls: u64,
    pub async_delivered: u64,
    /// Invokes where the asynchronous subscriber could not get transport memory
    pub async_dropped: u64,
    pub elapsed_ms: i64,
    pub pools: Vec<PoolStats>,
}

/// Publish `iterations` values concurrently
pub fn run(transport_config: &TransportConfig, iterations: u64) -> Result<StressReport> {
    let config = transport_config
        .clone()
        .with_exhaustion_policy(ExhaustionPolicy::Report);
    let transport = Arc::new(
        TransportAllocator::new(&config).context("Failed to create stress transport")?,
    );

    let worker = WorkerThread::new("Stress");
    worker.create()?;

    let totals = Arc::new(Counters::default());
    let cb = StressCb::new(&transport);
    let user_data: UserData = totals.clone();
    cb.register(on_sync, None, Some(Arc::clone(&user_data)))?;
    cb.register(on_async, Some(worker.dispatcher()), Some(user_data))?;

    log::info!("Stress: publishing {} values", iterations);
    let started = chrono::Utc::now();

    (0..iterations).into_par_iter().for_each(|value| {
        cb.invoke(&value);
    });

    cb.terminate();
    worker.exit()?;
    let elapsed = chrono::Utc::now() - started;

    let sync_calls = totals.sync_calls.load(Ordering::Relaxed);
    let async_delivered = totals.async_calls.load(Ordering::Relaxed);

    if transport.outstanding_blocks() != 0 {
        log::warn!(
            "Stress: {} transport blocks still outstanding",
            transport.outstanding_blocks()
        );
    }

    Ok(StressReport {
        iterations,
        sync_calls,
        async_delivered,
        async_dropped: sync_calls - async_delivered,
        elapsed_ms: elapsed.num_milliseconds(),
        pools: transport.stats(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_callback::PoolConfig;

    #[test]
    fn test_stress_accounts_for_every_value() {
        let report = run(&TransportConfig::default(), 500).unwrap();

        assert_eq!(report.iterations, 500);
        assert_eq!(report.sync_calls, 500);
        assert_eq!(report.async_delivered + report.async_dropped, 500);
        assert!(report.pools.iter().all(|p| p.used_blocks() == 0));
    }

    #[test]
    fn test_stress_with_tiny_transport_drops_instead_of_faulting() {
        let config = TransportConfig::new().with_pools(vec![PoolConfig::new(32, 4)]);
        let report = run(&config, 200).unwrap();

        assert_eq!(report.sync_calls, 200);
        assert!(report.async_delivered >= 1);
        assert_eq!(report.pools[0].failures, report.async_dropped);
    }
}
