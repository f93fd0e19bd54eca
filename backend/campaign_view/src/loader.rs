//! Campaign record loader.
//!
//! Owns the in-memory campaign set. Only [`CampaignLoader::load_all`]
//! replaces it, and only with a complete, ascending-id list; readers get an
//! `Arc` snapshot and never see a half-updated collection.
//!
//! Loads never overlap. A reload requested while another is running waits
//! for it, then reuses its result if that load began after the request was
//! made. Otherwise it runs its own, so a caller always observes ledger state
//! at least as new as the moment it asked.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::{StreamExt, TryStreamExt};
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::campaign::CampaignRecord;
use crate::errors::{GatewayError, Result, ViewError};
use crate::ledger::LedgerGateway;

pub type CampaignSet = Arc<Vec<CampaignRecord>>;

pub struct CampaignLoader {
    gateway: Arc<dyn LedgerGateway>,
    concurrency: usize,
    records: RwLock<CampaignSet>,
    reload: Mutex<()>,
    /// Monotonic counter of reload requests.
    requested: AtomicU64,
    /// Highest request number answered by a successful load.
    covered: AtomicU64,
}

impl CampaignLoader {
    pub fn new(gateway: Arc<dyn LedgerGateway>, concurrency: usize) -> Self {
        Self {
            gateway,
            concurrency: concurrency.max(1),
            records: RwLock::new(Arc::new(Vec::new())),
            reload: Mutex::new(()),
            requested: AtomicU64::new(0),
            covered: AtomicU64::new(0),
        }
    }

    /// Current campaign set.
    pub fn snapshot(&self) -> CampaignSet {
        self.records.read().clone()
    }

    pub fn find(&self, id: u64) -> Option<CampaignRecord> {
        self.records.read().iter().find(|c| c.id == id).cloned()
    }

    /// Fetch every campaign and atomically replace the current set.
    ///
    /// On failure the previous set is left untouched.
    pub async fn load_all(&self) -> Result<CampaignSet> {
        let ticket = self.requested.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = self.reload.lock().await;

        if self.covered.load(Ordering::SeqCst) >= ticket {
            debug!("Reload request {ticket} coalesced into a newer load");
            return Ok(self.snapshot());
        }

        let started_at = self.requested.load(Ordering::SeqCst);
        info!("Loading campaigns (request {ticket})");

        let records = match fetch_all(self.gateway.as_ref(), self.concurrency).await {
            Ok(records) => Arc::new(records),
            Err(e) => {
                error!("Campaign load failed, keeping previous view: {e}");
                return Err(ViewError::Load(e));
            }
        };

        *self.records.write() = records.clone();
        self.covered.store(started_at, Ordering::SeqCst);
        info!("Loaded {} campaigns", records.len());
        Ok(records)
    }
}

/// Read the count, then records `1..=count` in ascending id order.
///
/// Up to `concurrency` record reads run at once; `buffered` yields them in
/// request order regardless of completion order. The first failure aborts
/// the whole load.
async fn fetch_all(
    gateway: &dyn LedgerGateway,
    concurrency: usize,
) -> std::result::Result<Vec<CampaignRecord>, GatewayError> {
    let count = gateway.campaign_count().await?;
    debug!("Ledger reports {count} campaigns");

    futures::stream::iter(1..=count)
        .map(|id| gateway.campaign(id))
        .buffered(concurrency)
        .try_collect()
        .await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::mock_ledger::{record, MockLedger};

    fn loader_over(ledger: &Arc<MockLedger>, concurrency: usize) -> CampaignLoader {
        CampaignLoader::new(ledger.clone(), concurrency)
    }

    fn ids(set: &CampaignSet) -> Vec<u64> {
        set.iter().map(|c| c.id).collect()
    }

    #[tokio::test]
    async fn loads_all_records_in_id_order() {
        let ledger = Arc::new(MockLedger::with_campaigns(
            (1..=5).map(|id| record(id, 10, 0)).collect(),
        ));
        let loader = loader_over(&ledger, 1);

        let set = loader.load_all().await.unwrap();
        assert_eq!(ids(&set), vec![1, 2, 3, 4, 5]);
        assert_eq!(ids(&loader.snapshot()), vec![1, 2, 3, 4, 5]);
        assert_eq!(ledger.calls().record, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_fetches_keep_ascending_order() {
        let ledger = Arc::new(MockLedger::with_campaigns(
            (1..=4).map(|id| record(id, 10, 0)).collect(),
        ));
        ledger.delay_record(1, Duration::from_millis(300));
        ledger.delay_record(2, Duration::from_millis(200));
        ledger.delay_record(3, Duration::from_millis(100));
        let loader = loader_over(&ledger, 4);

        let set = loader.load_all().await.unwrap();
        assert_eq!(ids(&set), vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn empty_ledger_yields_empty_set() {
        let ledger = Arc::new(MockLedger::with_campaigns(vec![]));
        let loader = loader_over(&ledger, 4);
        assert!(loader.load_all().await.unwrap().is_empty());
        assert_eq!(ledger.calls().record, 0);
    }

    #[tokio::test]
    async fn failed_load_keeps_previous_view() {
        let ledger = Arc::new(MockLedger::with_campaigns(
            (1..=5).map(|id| record(id, 10, 0)).collect(),
        ));
        let loader = loader_over(&ledger, 2);
        let before = loader.load_all().await.unwrap();

        ledger.set_campaigns((1..=5).map(|id| record(id, 10, 7)).collect());
        ledger.fail_record(Some(3));

        let err = loader.load_all().await.unwrap_err();
        assert!(matches!(err, ViewError::Load(_)));
        assert_eq!(*loader.snapshot(), *before);
        assert!(Arc::ptr_eq(&loader.snapshot(), &before));
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_reloads_never_run_concurrently() {
        let ledger = Arc::new(MockLedger::with_campaigns(
            (1..=3).map(|id| record(id, 10, 0)).collect(),
        ));
        // Keep each load busy in its record phase, not just its count call.
        ledger.delay_record(3, Duration::from_secs(5));
        let gate = ledger.gate_count();
        let loader = Arc::new(loader_over(&ledger, 2));

        let first = tokio::spawn({
            let loader = loader.clone();
            async move { loader.load_all().await }
        });
        while ledger.calls().count == 0 {
            tokio::task::yield_now().await;
        }

        let second = tokio::spawn({
            let loader = loader.clone();
            async move { loader.load_all().await }
        });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(ledger.calls().count, 1, "second load must wait");

        // The second load began before the first one started, so it runs its
        // own fetch once the first finishes.
        gate.notify_one();
        first.await.unwrap().unwrap();
        while ledger.calls().count < 2 {
            tokio::task::yield_now().await;
        }
        gate.notify_one();
        second.await.unwrap().unwrap();

        assert_eq!(ledger.calls().count, 2);
        assert_eq!(ledger.max_loads_in_flight(), 1);
    }

    #[tokio::test]
    async fn waiting_reloads_coalesce() {
        let ledger = Arc::new(MockLedger::with_campaigns(vec![record(1, 10, 0)]));
        let gate = ledger.gate_count();
        let loader = Arc::new(loader_over(&ledger, 2));

        let spawn_load = |loader: Arc<CampaignLoader>| tokio::spawn(async move { loader.load_all().await });

        let first = spawn_load(loader.clone());
        while ledger.calls().count == 0 {
            tokio::task::yield_now().await;
        }
        let second = spawn_load(loader.clone());
        let third = spawn_load(loader.clone());
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        gate.notify_one();
        first.await.unwrap().unwrap();
        while ledger.calls().count < 2 {
            tokio::task::yield_now().await;
        }
        gate.notify_one();
        second.await.unwrap().unwrap();
        third.await.unwrap().unwrap();

        // Whichever of the two waiters ran second found its request covered.
        assert_eq!(ledger.calls().count, 2);
    }
}
