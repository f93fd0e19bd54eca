//! Per-campaign donor panels.
//!
//! Each panel lazily fetches its donor list on the first toggle-to-visible,
//! then flips visibility locally until the entry is invalidated. At most one
//! fetch per campaign is in flight; toggles that arrive meanwhile are no-ops.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::campaign::DonorEntry;
use crate::errors::{Result, ViewError};
use crate::ledger::LedgerGateway;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DonorPanelState {
    /// Ledger order.
    pub entries: Vec<DonorEntry>,
    pub visible: bool,
    pub loaded: bool,
}

#[derive(Debug, Default)]
struct Panel {
    state: DonorPanelState,
    fetching: bool,
    /// Bumped on every invalidation so a fetch that started earlier can tell
    /// its result is stale.
    generation: u64,
}

pub struct DonorPanelCache {
    gateway: Arc<dyn LedgerGateway>,
    panels: Mutex<HashMap<u64, Panel>>,
}

impl DonorPanelCache {
    pub fn new(gateway: Arc<dyn LedgerGateway>) -> Self {
        Self {
            gateway,
            panels: Mutex::new(HashMap::new()),
        }
    }

    /// Flip a loaded panel, or fetch and show an unloaded one.
    ///
    /// A failed fetch leaves the panel hidden and not loaded.
    pub async fn toggle(&self, campaign_id: u64) -> Result<DonorPanelState> {
        let mut generation = {
            let mut panels = self.panels.lock();
            let panel = panels.entry(campaign_id).or_default();
            if panel.state.loaded {
                panel.state.visible = !panel.state.visible;
                return Ok(panel.state.clone());
            }
            if panel.fetching {
                debug!("Donor fetch for campaign {campaign_id} already in flight");
                return Ok(panel.state.clone());
            }
            panel.fetching = true;
            panel.generation
        };
        let _fetching = FetchingFlag {
            cache: self,
            campaign_id,
        };

        loop {
            let fetched = self.gateway.donors(campaign_id).await;

            let mut panels = self.panels.lock();
            let Some(panel) = panels.get_mut(&campaign_id) else {
                // The campaign disappeared in a reload while we were fetching.
                return Err(ViewError::UnknownCampaign(campaign_id));
            };

            let entries = match fetched {
                Ok(entries) => entries,
                Err(source) => {
                    warn!("Donor fetch for campaign {campaign_id} failed: {source}");
                    return Err(ViewError::DonorFetch {
                        campaign_id,
                        source,
                    });
                }
            };

            if panel.generation != generation {
                debug!("Donor list for campaign {campaign_id} invalidated mid-fetch, refetching");
                generation = panel.generation;
                continue;
            }

            panel.state = DonorPanelState {
                entries,
                visible: true,
                loaded: true,
            };
            info!(
                "Loaded {} donors for campaign {campaign_id}",
                panel.state.entries.len()
            );
            return Ok(panel.state.clone());
        }
    }

    /// Drop the cached list; the next toggle refetches.
    pub fn invalidate(&self, campaign_id: u64) {
        if let Some(panel) = self.panels.lock().get_mut(&campaign_id) {
            panel.state = DonorPanelState::default();
            panel.generation += 1;
            debug!("Donor panel for campaign {campaign_id} invalidated");
        }
    }

    /// Forget panels whose campaign is no longer in the loaded set.
    pub fn retain(&self, campaign_ids: &HashSet<u64>) {
        self.panels
            .lock()
            .retain(|id, _| campaign_ids.contains(id));
    }

    #[cfg(test)]
    pub fn state(&self, campaign_id: u64) -> DonorPanelState {
        self.panels
            .lock()
            .get(&campaign_id)
            .map(|p| p.state.clone())
            .unwrap_or_default()
    }

    pub fn states(&self) -> HashMap<u64, DonorPanelState> {
        self.panels
            .lock()
            .iter()
            .map(|(id, p)| (*id, p.state.clone()))
            .collect()
    }
}

/// Clears a panel's `fetching` flag when its toggle finishes, including when
/// the toggle is dropped mid-fetch. Must be dropped after the panels lock.
struct FetchingFlag<'a> {
    cache: &'a DonorPanelCache,
    campaign_id: u64,
}

impl Drop for FetchingFlag<'_> {
    fn drop(&mut self) {
        if let Some(panel) = self.cache.panels.lock().get_mut(&self.campaign_id) {
            panel.fetching = false;
        }
    }
}
