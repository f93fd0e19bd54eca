//! Recurring classification task.
//!
//! While campaigns are displayed, the ticker re-runs [`classify`] against the
//! loader's current snapshot once per period with a fresh wall-clock read
//! and publishes the result on a `watch` channel. Ticks never fetch; only
//! `now` changes. `now` is clamped so it never goes backwards.
//!
//! The task has an explicit start/stop contract. It also stops itself when
//! the campaign set is empty.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::classifier::{classify, partition, Buckets};
use crate::loader::CampaignLoader;

/// Source of the current Unix time in seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        chrono::Utc::now().timestamp().max(0) as u64
    }
}

/// Latest published classification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub now: u64,
    pub buckets: Buckets,
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct ClassificationTicker {
    loader: Arc<CampaignLoader>,
    clock: Arc<dyn Clock>,
    period: Duration,
    last_now: Arc<AtomicU64>,
    tx: Arc<watch::Sender<Arc<Classification>>>,
    running: Mutex<Option<Running>>,
}

impl ClassificationTicker {
    pub fn new(loader: Arc<CampaignLoader>, clock: Arc<dyn Clock>, period: Duration) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(Classification::default()));
        Self {
            loader,
            clock,
            period,
            last_now: Arc::new(AtomicU64::new(0)),
            tx: Arc::new(tx),
            running: Mutex::new(None),
        }
    }

    #[cfg(test)]
    pub fn subscribe(&self) -> watch::Receiver<Arc<Classification>> {
        self.tx.subscribe()
    }

    pub fn latest(&self) -> Arc<Classification> {
        self.tx.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .map(|r| !r.handle.is_finished())
            .unwrap_or(false)
    }

    /// Spawn the tick loop unless it is already running. Returns whether a
    /// new loop was started.
    pub fn start(&self) -> bool {
        let mut running = self.running.lock();
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return false;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(tick_loop(
            self.loader.clone(),
            self.clock.clone(),
            self.period,
            self.last_now.clone(),
            self.tx.clone(),
            cancel.clone(),
        ));
        *running = Some(Running { cancel, handle });
        info!("Classification ticker started ({:?} period)", self.period);
        true
    }

    pub fn stop(&self) {
        if let Some(running) = self.running.lock().take() {
            running.cancel.cancel();
            info!("Classification ticker stopped");
        }
    }

    /// Classify immediately instead of waiting for the next tick.
    pub fn publish_now(&self) {
        publish(&self.loader, self.clock.as_ref(), &self.last_now, &self.tx);
    }
}

impl Drop for ClassificationTicker {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.cancel.cancel();
        }
    }
}

async fn tick_loop(
    loader: Arc<CampaignLoader>,
    clock: Arc<dyn Clock>,
    period: Duration,
    last_now: Arc<AtomicU64>,
    tx: Arc<watch::Sender<Arc<Classification>>>,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        if !publish(&loader, clock.as_ref(), &last_now, &tx) {
            info!("No campaigns to display, ticker stopping");
            break;
        }
    }
    debug!("Tick loop exited");
}

/// Returns `false` when there was nothing to classify.
fn publish(
    loader: &CampaignLoader,
    clock: &dyn Clock,
    last_now: &AtomicU64,
    tx: &watch::Sender<Arc<Classification>>,
) -> bool {
    let records = loader.snapshot();
    let read = clock.now();
    let now = last_now.fetch_max(read, Ordering::SeqCst).max(read);

    let classification = Classification {
        now,
        buckets: partition(classify(&records, now)),
    };
    tx.send_replace(Arc::new(classification));
    !records.is_empty()
}
