use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::probe::{BulkCheckResult, ProbeKind, ProbeOptions, ProbeTarget, Prober};
use crate::crypto::PublicKey;

pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServerStatus {
    #[default]
    Unknown,
    Online,
    Offline,
}

/// Running record for one monitored server
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerRecord {
    pub status: ServerStatus,
    pub last_check: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub latency: Option<Duration>,
    pub last_error: Option<String>,
}

impl ServerRecord {
    fn apply(&mut self, result: &BulkCheckResult, at: DateTime<Utc>) {
        self.last_check = Some(at);
        match &result.outcome {
            Ok(report) => {
                self.status = ServerStatus::Online;
                self.consecutive_failures = 0;
                self.latency = Some(report.latency);
                self.last_error = None;
            }
            Err(e) => {
                self.status = ServerStatus::Offline;
                self.consecutive_failures += 1;
                self.latency = None;
                self.last_error = Some(e.to_string());
            }
        }
    }
}

/// Periodic status probes over a fixed set of servers.
///
/// At most one sweep runs at a time. Timer ticks that land on an in-flight
/// sweep are skipped; [`Monitor::sweep`] waits its turn instead.
#[derive(Debug, Clone)]
pub struct Monitor {
    prober: Prober,
    targets: Arc<Vec<ProbeTarget>>,
    options: ProbeOptions,
    records: Arc<RwLock<HashMap<PublicKey, ServerRecord>>>,
    sweep_lock: Arc<Mutex<()>>,
}

impl Monitor {
    pub fn new(prober: Prober, targets: Vec<ProbeTarget>, options: ProbeOptions) -> Self {
        let records = targets
            .iter()
            .map(|target| (target.public_key, ServerRecord::default()))
            .collect();
        Self {
            prober,
            targets: Arc::new(targets),
            options: ProbeOptions {
                kind: ProbeKind::Status,
                ..options
            },
            records: Arc::new(RwLock::new(records)),
            sweep_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Snapshot of every record, in target order
    pub fn records(&self) -> Vec<(ProbeTarget, ServerRecord)> {
        let records = self.records.read();
        self.targets
            .iter()
            .map(|target| {
                let record = records.get(&target.public_key).cloned().unwrap_or_default();
                (target.clone(), record)
            })
            .collect()
    }

    pub fn record(&self, public_key: &PublicKey) -> Option<ServerRecord> {
        self.records.read().get(public_key).cloned()
    }

    /// Run one sweep, waiting for any in-flight sweep to finish first
    pub async fn sweep(&self) {
        let _guard = self.sweep_lock.lock().await;
        self.run_sweep().await;
    }

    /// Run one sweep unless one is already in flight
    pub async fn try_sweep(&self) -> bool {
        let Ok(_guard) = self.sweep_lock.try_lock() else {
            tracing::debug!("monitor sweep still in flight, skipping tick");
            return false;
        };
        self.run_sweep().await;
        true
    }

    async fn run_sweep(&self) {
        let results = self.prober.bulk_check(&self.targets, &self.options).await;
        let now = Utc::now();
        let mut records = self.records.write();
        for result in &results {
            let record = records.entry(result.target.public_key).or_default();
            let was = record.status;
            record.apply(result, now);
            if was != record.status {
                tracing::info!("{} is now {:?}", result.target.label, record.status);
            }
        }
    }

    /// Sweep once, then keep sweeping every `interval` in the background
    pub async fn start(self, interval: Duration) -> MonitorHandle {
        self.sweep().await;

        let (shutdown_tx, mut shutdown_rx) = watch::channel(());
        let monitor = self.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        monitor.try_sweep().await;
                    }
                    _ = shutdown_rx.changed() => {
                        tracing::debug!("monitor stopping");
                        break;
                    }
                }
            }
        });

        MonitorHandle {
            monitor: self,
            shutdown_tx,
            task,
        }
    }
}

/// Controls a running monitor
#[derive(Debug)]
pub struct MonitorHandle {
    monitor: Monitor,
    shutdown_tx: watch::Sender<()>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn records(&self) -> Vec<(ProbeTarget, ServerRecord)> {
        self.monitor.records()
    }

    pub fn record(&self, public_key: &PublicKey) -> Option<ServerRecord> {
        self.monitor.record(public_key)
    }

    /// Force an out-of-band sweep
    pub async fn check_now(&self) {
        self.monitor.sweep().await;
    }

    /// Cancel the interval and wait for the background task to exit
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.task.await {
            tracing::error!("monitor task failed: {}", e);
        }
    }
}
