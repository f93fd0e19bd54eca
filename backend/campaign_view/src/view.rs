//! Campaign view engine.
//!
//! Wires the loader, classifier ticker, donor panels and action coordinator
//! together and turns their state into presentation cards.
//!
//! ```text
//!  refresh() ─► CampaignLoader ─► ticker (every tick) ─► snapshot()
//!                     │                                      ▲
//!                     └────────► DonorPanelCache ────────────┘
//!  donate()/withdraw()/create_campaign()
//!      └─► spawned task: ActionCoordinator ─► (confirmed) ─► invalidate panel ─► refresh()
//! ```
//!
//! Mutating actions run on their own task, so a caller that goes away
//! mid-confirmation does not stop the action, its invalidation or its reload.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::account::AccountId;
use crate::amount::{progress_percent, Wei};
use crate::campaign::{Bucket, ClassifiedCampaign, DonorEntry};
use crate::classifier::format_time_left;
use crate::coordinator::{ActionCoordinator, ActionKey, ActionStatus};
use crate::donors::{DonorPanelCache, DonorPanelState};
use crate::errors::{Result, TransactionError, ViewError};
use crate::ledger::{LedgerGateway, NewCampaign, PendingTransaction};
use crate::loader::{CampaignLoader, CampaignSet};
use crate::session::SessionContext;
use crate::ticker::{ClassificationTicker, Clock};

// ─────────────────────────────────────────────────────────
// Presentation shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct DonorRow {
    pub address: AccountId,
    pub short_address: String,
    pub amount_eth: String,
}

impl From<&DonorEntry> for DonorRow {
    fn from(entry: &DonorEntry) -> Self {
        Self {
            address: entry.address,
            short_address: entry.address.short(),
            amount_eth: entry.amount.format_ether(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DonorPanelView {
    pub visible: bool,
    pub loaded: bool,
    pub donors: Vec<DonorRow>,
}

impl From<&DonorPanelState> for DonorPanelView {
    fn from(state: &DonorPanelState) -> Self {
        Self {
            visible: state.visible,
            loaded: state.loaded,
            donors: state.entries.iter().map(DonorRow::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CampaignCard {
    pub id: u64,
    pub title: String,
    pub story: String,
    pub fundraiser: AccountId,
    pub bucket: Bucket,
    pub raised_eth: String,
    pub goal_eth: String,
    /// One decimal, e.g. `"42.5"`.
    pub progress_percent: String,
    /// Progress bar width, capped at 100.
    pub progress_bar: f64,
    pub deadline: String,
    pub seconds_remaining: u64,
    pub time_left: String,
    pub status_label: String,
    pub ledger_active: bool,
    pub can_withdraw: bool,
    pub donor_panel: DonorPanelView,
}

#[derive(Debug, Clone, Serialize)]
pub struct ViewSnapshot {
    pub now: u64,
    pub account: Option<AccountId>,
    pub active: Vec<CampaignCard>,
    pub ended: Vec<CampaignCard>,
}

/// Outcome of a confirmed mutating action.
#[derive(Debug, Clone, Serialize)]
pub struct ActionReceipt {
    pub tx_hash: String,
    /// Whether the follow-up reload succeeded. On failure the previous view
    /// is still shown and `reload_error` says why.
    pub refreshed: bool,
    pub reload_error: Option<String>,
}

/// Campaign creation form, amounts in ether.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCampaignForm {
    pub title: String,
    pub goal: String,
    pub duration: u64,
    pub story: String,
}

// ─────────────────────────────────────────────────────────
// Engine
// ─────────────────────────────────────────────────────────

pub struct CampaignView {
    gateway: Arc<dyn LedgerGateway>,
    loader: Arc<CampaignLoader>,
    donors: DonorPanelCache,
    coordinator: ActionCoordinator,
    ticker: ClassificationTicker,
    session: Arc<SessionContext>,
}

impl CampaignView {
    pub fn new(
        gateway: Arc<dyn LedgerGateway>,
        session: Arc<SessionContext>,
        clock: Arc<dyn Clock>,
        tick_interval: std::time::Duration,
        load_concurrency: usize,
    ) -> Self {
        let loader = Arc::new(CampaignLoader::new(gateway.clone(), load_concurrency));
        Self {
            donors: DonorPanelCache::new(gateway.clone()),
            coordinator: ActionCoordinator::new(),
            ticker: ClassificationTicker::new(loader.clone(), clock, tick_interval),
            loader,
            gateway,
            session,
        }
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn ticker(&self) -> &ClassificationTicker {
        &self.ticker
    }

    pub fn records(&self) -> CampaignSet {
        self.loader.snapshot()
    }

    /// Reload every campaign from the ledger.
    ///
    /// On success, panels of vanished campaigns are dropped, the
    /// classification is republished and the ticker runs while there is
    /// something to show. On failure nothing changes.
    pub async fn refresh(&self) -> Result<CampaignSet> {
        let records = self.loader.load_all().await?;

        let ids: HashSet<u64> = records.iter().map(|c| c.id).collect();
        self.donors.retain(&ids);
        self.ticker.publish_now();

        if records.is_empty() {
            self.ticker.stop();
        } else {
            self.ticker.start();
        }
        Ok(records)
    }

    pub async fn toggle_donors(&self, campaign_id: u64) -> Result<DonorPanelState> {
        self.require_campaign(campaign_id)?;
        self.donors.toggle(campaign_id).await
    }

    pub async fn durations(&self) -> Result<Vec<u64>> {
        self.gateway.durations().await.map_err(ViewError::Gateway)
    }

    /// Donate `amount` ether to a campaign.
    pub async fn donate(
        self: &Arc<Self>,
        campaign_id: u64,
        amount: &str,
    ) -> Result<ActionReceipt> {
        let value = Wei::parse_ether(amount)?;
        if value.is_zero() {
            return Err(ViewError::InvalidAmount(
                "donation must be greater than zero".to_string(),
            ));
        }
        self.require_campaign(campaign_id)?;

        self.run_action(ActionKey::donate(campaign_id), move |gateway| async move {
            gateway.donate(campaign_id, value).await
        })
        .await
    }

    /// Withdraw a campaign's funds. Only its fundraiser may ask; the ledger
    /// enforces the real rule.
    pub async fn withdraw(self: &Arc<Self>, campaign_id: u64) -> Result<ActionReceipt> {
        let account = self.session.account().ok_or(ViewError::NoSession)?;
        let record = self
            .loader
            .find(campaign_id)
            .ok_or(ViewError::UnknownCampaign(campaign_id))?;
        if record.fundraiser != account {
            return Err(ViewError::NotFundraiser(campaign_id));
        }

        self.run_action(ActionKey::withdraw(campaign_id), move |gateway| async move {
            gateway.withdraw_funds(campaign_id).await
        })
        .await
    }

    pub async fn create_campaign(
        self: &Arc<Self>,
        form: CreateCampaignForm,
    ) -> Result<ActionReceipt> {
        let title = form.title.trim();
        let story = form.story.trim();
        if title.is_empty() || story.is_empty() || form.goal.trim().is_empty() {
            return Err(ViewError::InvalidCampaign("All fields are required".to_string()));
        }
        let goal = Wei::parse_ether(&form.goal)?;
        if goal.is_zero() {
            return Err(ViewError::InvalidAmount(
                "goal must be greater than zero".to_string(),
            ));
        }
        let durations = self.durations().await?;
        if !durations.contains(&form.duration) {
            return Err(ViewError::InvalidCampaign(format!(
                "duration {} is not one of {durations:?}",
                form.duration
            )));
        }

        let campaign = NewCampaign {
            title: title.to_string(),
            goal,
            duration: form.duration,
            story: story.to_string(),
            image_url: String::new(),
        };
        self.run_action(ActionKey::create(), move |gateway| async move {
            gateway.create_campaign(&campaign).await
        })
        .await
    }

    pub fn action_status(&self, key: ActionKey) -> ActionStatus {
        self.coordinator.status(key)
    }

    /// Cards for the latest classification.
    pub fn snapshot(&self) -> ViewSnapshot {
        let classification = self.ticker.latest();
        let account = self.session.account();
        let panels = self.donors.states();

        let card = |c: &ClassifiedCampaign| {
            let panel = panels.get(&c.record.id).cloned().unwrap_or_default();
            build_card(c, account, &panel)
        };

        ViewSnapshot {
            now: classification.now,
            account,
            active: classification.buckets.active.iter().map(card).collect(),
            ended: classification.buckets.ended.iter().map(card).collect(),
        }
    }

    /// Stop background work. Called when the view is torn down.
    pub fn shutdown(&self) {
        self.ticker.stop();
        info!("Campaign view shut down");
    }

    fn require_campaign(&self, campaign_id: u64) -> Result<()> {
        match self.loader.find(campaign_id) {
            Some(_) => Ok(()),
            None => Err(ViewError::UnknownCampaign(campaign_id)),
        }
    }

    /// Submit, confirm, invalidate the target's donor panel and reload, all
    /// on a spawned task. The caller only awaits the outcome.
    async fn run_action<S, Fut>(
        self: &Arc<Self>,
        key: ActionKey,
        submit: S,
    ) -> Result<ActionReceipt>
    where
        S: FnOnce(Arc<dyn LedgerGateway>) -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<Box<dyn PendingTransaction>, TransactionError>>
            + Send
            + 'static,
    {
        let view = Arc::clone(self);
        let task = tokio::spawn(async move {
            let tx_hash = view
                .coordinator
                .run(key, submit(view.gateway.clone()))
                .await?;
            if let Some(campaign_id) = key.campaign_id {
                view.donors.invalidate(campaign_id);
            }
            Ok::<_, ViewError>(view.after_confirmation(tx_hash).await)
        });
        task.await?
    }

    async fn after_confirmation(&self, tx_hash: String) -> ActionReceipt {
        match self.refresh().await {
            Ok(_) => ActionReceipt {
                tx_hash,
                refreshed: true,
                reload_error: None,
            },
            Err(e) => {
                error!("Reload after confirmed tx {tx_hash} failed: {e}");
                ActionReceipt {
                    tx_hash,
                    refreshed: false,
                    reload_error: Some(e.to_string()),
                }
            }
        }
    }
}

fn build_card(
    c: &ClassifiedCampaign,
    account: Option<AccountId>,
    panel: &DonorPanelState,
) -> CampaignCard {
    let record = &c.record;
    let percent = progress_percent(record.raised_amount, record.goal);
    let time_left = format_time_left(c.seconds_remaining);
    let status_label = match c.bucket {
        Bucket::Active => format!("Active - {time_left} left"),
        Bucket::Ended => "Ended".to_string(),
    };
    let deadline = i64::try_from(record.deadline)
        .ok()
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| {
            warn!("Campaign {} has an unrepresentable deadline", record.id);
            record.deadline.to_string()
        });

    CampaignCard {
        id: record.id,
        title: record.title.clone(),
        story: record.story.clone(),
        fundraiser: record.fundraiser,
        bucket: c.bucket,
        raised_eth: record.raised_amount.format_ether(),
        goal_eth: record.goal.format_ether(),
        progress_percent: format!("{percent:.1}"),
        progress_bar: percent.min(100.0),
        deadline,
        seconds_remaining: c.seconds_remaining,
        time_left,
        status_label,
        ledger_active: record.is_active,
        can_withdraw: c.bucket == Bucket::Ended && account == Some(record.fundraiser),
        donor_panel: DonorPanelView::from(panel),
    }
}
