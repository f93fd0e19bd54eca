//! Mutating action coordinator.
//!
//! Drives one ledger transaction through
//!
//! ```text
//! Idle ──► Submitting ──► Confirming ──► Succeeded ──► Idle
//!              └──────────────┴────────► Failed ────► Idle
//! ```
//!
//! and reports the ledger's verdict. There is no retry and no cancellation:
//! once submitted, an action runs until it succeeds or fails. Follow-up work
//! (cache invalidation, reload) is the caller's, and only starts after
//! [`ActionCoordinator::run`] has returned success.

use std::collections::HashMap;
use std::future::Future;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use crate::errors::{Result, TransactionError, ViewError};
use crate::ledger::PendingTransaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Donate,
    Withdraw,
    Create,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Donate => "donation",
            Self::Withdraw => "withdrawal",
            Self::Create => "campaign creation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionState {
    #[default]
    Idle,
    Submitting,
    Confirming,
    Succeeded,
    Failed,
}

impl ActionState {
    fn in_flight(&self) -> bool {
        matches!(self, Self::Submitting | Self::Confirming)
    }
}

/// What an action targets. Creation has no campaign id yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActionKey {
    pub kind: ActionKind,
    pub campaign_id: Option<u64>,
}

impl ActionKey {
    pub fn donate(campaign_id: u64) -> Self {
        Self {
            kind: ActionKind::Donate,
            campaign_id: Some(campaign_id),
        }
    }

    pub fn withdraw(campaign_id: u64) -> Self {
        Self {
            kind: ActionKind::Withdraw,
            campaign_id: Some(campaign_id),
        }
    }

    pub fn create() -> Self {
        Self {
            kind: ActionKind::Create,
            campaign_id: None,
        }
    }
}

/// Current state plus the outcome of the last completed action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActionStatus {
    pub state: ActionState,
    pub last_tx_hash: Option<String>,
    pub last_error: Option<String>,
}

#[derive(Default)]
pub struct ActionCoordinator {
    slots: Mutex<HashMap<ActionKey, ActionStatus>>,
    /// Every transition, in order.
    history: Mutex<Vec<(ActionKey, ActionState)>>,
}

impl ActionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self, key: ActionKey) -> ActionStatus {
        self.slots.lock().get(&key).cloned().unwrap_or_default()
    }

    #[cfg(test)]
    pub fn history(&self) -> Vec<(ActionKey, ActionState)> {
        self.history.lock().clone()
    }

    /// Submit through `submit`, wait for confirmation and return the tx hash.
    ///
    /// A second action with the same key is rejected while one is in
    /// flight. Actions with different keys (donate and withdraw on the same
    /// campaign) may overlap; the ledger arbitrates.
    pub async fn run<F>(&self, key: ActionKey, submit: F) -> Result<String>
    where
        F: Future<Output = std::result::Result<Box<dyn PendingTransaction>, TransactionError>>
            + Send,
    {
        {
            let mut slots = self.slots.lock();
            let slot = slots.entry(key).or_default();
            if slot.state.in_flight() {
                return Err(ViewError::ActionInFlight {
                    campaign_id: key.campaign_id.unwrap_or_default(),
                    kind: key.kind.as_str(),
                });
            }
            slot.state = ActionState::Submitting;
        }
        self.history.lock().push((key, ActionState::Submitting));

        let outcome = async {
            let pending = submit.await?;
            let hash = pending.hash().to_string();
            self.transition(key, ActionState::Confirming);
            info!("Awaiting confirmation of {} tx {hash}", key.kind.as_str());
            pending.wait().await?;
            Ok::<_, TransactionError>(hash)
        }
        .await;

        match outcome {
            Ok(hash) => {
                self.transition(key, ActionState::Succeeded);
                info!(
                    "{} {:?} confirmed ({hash})",
                    key.kind.as_str(),
                    key.campaign_id
                );
                self.finish(key, Some(hash.clone()), None);
                Ok(hash)
            }
            Err(e) => {
                self.transition(key, ActionState::Failed);
                warn!("{} {:?} failed: {e}", key.kind.as_str(), key.campaign_id);
                self.finish(key, None, Some(e.reason.clone()));
                Err(e.into())
            }
        }
    }

    fn transition(&self, key: ActionKey, state: ActionState) {
        self.slots.lock().entry(key).or_default().state = state;
        self.history.lock().push((key, state));
    }

    fn finish(&self, key: ActionKey, tx_hash: Option<String>, error: Option<String>) {
        let mut slots = self.slots.lock();
        let slot = slots.entry(key).or_default();
        slot.state = ActionState::Idle;
        slot.last_tx_hash = tx_hash;
        slot.last_error = error;
        drop(slots);
        self.history.lock().push((key, ActionState::Idle));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::amount::Wei;
    use crate::errors::TxStage;
    use crate::ledger::LedgerGateway;
    use crate::mock_ledger::{record, MockLedger};
    use ActionState::*;

    fn states_for(coordinator: &ActionCoordinator, key: ActionKey) -> Vec<ActionState> {
        coordinator
            .history()
            .into_iter()
            .filter(|(k, _)| *k == key)
            .map(|(_, s)| s)
            .collect()
    }

    #[tokio::test]
    async fn successful_donation_walks_every_state() {
        let ledger = MockLedger::with_campaigns(vec![record(1, 10, 0)]);
        let coordinator = ActionCoordinator::new();
        let key = ActionKey::donate(1);

        let hash = coordinator
            .run(key, ledger.donate(1, Wei(5)))
            .await
            .unwrap();

        assert!(hash.starts_with("0x"));
        assert_eq!(
            states_for(&coordinator, key),
            vec![Submitting, Confirming, Succeeded, Idle]
        );
        let status = coordinator.status(key);
        assert_eq!(status.state, Idle);
        assert_eq!(status.last_tx_hash, Some(hash));
        assert_eq!(ledger.campaign_snapshot(1).unwrap().raised_amount, Wei(5));
    }

    #[tokio::test]
    async fn rejected_submission_fails_without_confirming() {
        let ledger = MockLedger::with_campaigns(vec![record(1, 10, 0)]);
        ledger.reject_submissions(Some("user rejected transaction"));
        let coordinator = ActionCoordinator::new();
        let key = ActionKey::donate(1);

        let err = coordinator
            .run(key, ledger.donate(1, Wei(5)))
            .await
            .unwrap_err();

        match err {
            ViewError::Transaction(tx) => {
                assert_eq!(tx.stage, TxStage::Submission);
                assert_eq!(tx.reason, "user rejected transaction");
            }
            other => panic!("expected Transaction, got {other:?}"),
        }
        assert_eq!(states_for(&coordinator, key), vec![Submitting, Failed, Idle]);
        assert_eq!(
            coordinator.status(key).last_error.as_deref(),
            Some("user rejected transaction")
        );
    }

    #[tokio::test]
    async fn reverted_confirmation_reports_reason() {
        let ledger = MockLedger::with_campaigns(vec![record(1, 10, 0)]);
        ledger.revert_transactions(Some("Campaign has ended"));
        let coordinator = ActionCoordinator::new();
        let key = ActionKey::withdraw(1);

        let err = coordinator
            .run(key, ledger.withdraw_funds(1))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Campaign has ended"));
        assert_eq!(
            states_for(&coordinator, key),
            vec![Submitting, Confirming, Failed, Idle]
        );
    }

    #[tokio::test]
    async fn same_action_cannot_overlap_but_different_kinds_can() {
        let ledger = Arc::new(MockLedger::with_campaigns(vec![record(1, 10, 0)]));
        let gate = ledger.gate_confirmations();
        let coordinator = Arc::new(ActionCoordinator::new());

        let first = tokio::spawn({
            let (ledger, coordinator) = (ledger.clone(), coordinator.clone());
            async move {
                coordinator
                    .run(ActionKey::donate(1), ledger.donate(1, Wei(5)))
                    .await
            }
        });
        while coordinator.status(ActionKey::donate(1)).state != Confirming {
            tokio::task::yield_now().await;
        }

        let again = coordinator
            .run(ActionKey::donate(1), ledger.donate(1, Wei(5)))
            .await;
        assert!(matches!(again, Err(ViewError::ActionInFlight { campaign_id: 1, .. })));

        let withdraw = tokio::spawn({
            let (ledger, coordinator) = (ledger.clone(), coordinator.clone());
            async move {
                coordinator
                    .run(ActionKey::withdraw(1), ledger.withdraw_funds(1))
                    .await
            }
        });
        while coordinator.status(ActionKey::withdraw(1)).state != Confirming {
            tokio::task::yield_now().await;
        }

        gate.notify_one();
        gate.notify_one();
        first.await.unwrap().unwrap();
        withdraw.await.unwrap().unwrap();
    }
}
