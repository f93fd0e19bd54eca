//! In-memory [`LedgerGateway`] for tests.
//!
//! Mutating calls take effect only when their transaction is confirmed
//! (`wait()`), which mirrors how the real ledger behaves. Gates let a test
//! hold a read or a confirmation open to observe in-flight behaviour.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::account::AccountId;
use crate::amount::Wei;
use crate::campaign::{CampaignRecord, DonorEntry};
use crate::errors::{GatewayError, TransactionError};
use crate::ledger::{LedgerGateway, NewCampaign, PendingTransaction};

pub const ETH: u128 = 1_000_000_000_000_000_000;
pub const NOW: u64 = 1_700_000_000;

pub fn account(n: u8) -> AccountId {
    AccountId::from_bytes([n; 20])
}

/// Campaign owned by `account(id)`, ending one day after [`NOW`].
pub fn record(id: u64, goal_eth: u128, raised_eth: u128) -> CampaignRecord {
    CampaignRecord {
        id,
        title: format!("Campaign {id}"),
        story: format!("Story {id}"),
        fundraiser: account(id as u8),
        goal: Wei(goal_eth * ETH),
        raised_amount: Wei(raised_eth * ETH),
        deadline: NOW + 86_400,
        is_active: true,
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CallCounts {
    pub count: usize,
    pub record: usize,
    pub donors: usize,
    pub submissions: usize,
}

#[derive(Default)]
struct MockState {
    campaigns: Vec<CampaignRecord>,
    donors: HashMap<u64, Vec<DonorEntry>>,
    durations: Vec<u64>,
    fail_record: Option<u64>,
    fail_donors: bool,
    reject_submission: Option<String>,
    revert: Option<String>,
    record_delays: HashMap<u64, Duration>,
    calls: CallCounts,
    /// A load is in flight from its count call until its highest id is read.
    loads_in_flight: usize,
    max_loads_in_flight: usize,
    /// Highest id each in-flight load still has to read.
    open_loads: Vec<u64>,
}

impl MockState {
    fn finish_load_at(&mut self, id: u64) {
        if let Some(pos) = self.open_loads.iter().position(|&last| last == id) {
            self.open_loads.swap_remove(pos);
            self.loads_in_flight -= 1;
        }
    }
}

#[derive(Default)]
struct Gates {
    count: Option<Arc<Notify>>,
    donors: Option<Arc<Notify>>,
    confirm: Option<Arc<Notify>>,
}

#[derive(Default)]
pub struct MockLedger {
    state: Arc<Mutex<MockState>>,
    gates: Mutex<Gates>,
    /// Donor sent with every mocked `donate` call.
    pub sender: Mutex<Option<AccountId>>,
}

impl MockLedger {
    pub fn with_campaigns(campaigns: Vec<CampaignRecord>) -> Self {
        let ledger = Self::default();
        {
            let mut state = ledger.state.lock();
            state.campaigns = campaigns;
            state.durations = vec![86_400, 604_800, 2_592_000];
        }
        ledger
    }

    pub fn set_campaigns(&self, campaigns: Vec<CampaignRecord>) {
        self.state.lock().campaigns = campaigns;
    }

    pub fn set_donors(&self, id: u64, donors: Vec<DonorEntry>) {
        self.state.lock().donors.insert(id, donors);
    }

    pub fn fail_record(&self, id: Option<u64>) {
        self.state.lock().fail_record = id;
    }

    pub fn fail_donors(&self, fail: bool) {
        self.state.lock().fail_donors = fail;
    }

    pub fn reject_submissions(&self, reason: Option<&str>) {
        self.state.lock().reject_submission = reason.map(String::from);
    }

    pub fn revert_transactions(&self, reason: Option<&str>) {
        self.state.lock().revert = reason.map(String::from);
    }

    pub fn delay_record(&self, id: u64, delay: Duration) {
        self.state.lock().record_delays.insert(id, delay);
    }

    /// Hold every `campaignCount` call until the returned gate is notified.
    pub fn gate_count(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates.lock().count = Some(gate.clone());
        gate
    }

    pub fn gate_donors(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates.lock().donors = Some(gate.clone());
        gate
    }

    pub fn gate_confirmations(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates.lock().confirm = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> CallCounts {
        self.state.lock().calls
    }

    pub fn max_loads_in_flight(&self) -> usize {
        self.state.lock().max_loads_in_flight
    }

    pub fn campaign_snapshot(&self, id: u64) -> Option<CampaignRecord> {
        self.state.lock().campaigns.iter().find(|c| c.id == id).cloned()
    }

    fn transaction(&self, effect: Effect) -> Result<Box<dyn PendingTransaction>, TransactionError> {
        let mut state = self.state.lock();
        state.calls.submissions += 1;
        if let Some(reason) = &state.reject_submission {
            return Err(TransactionError::submission(reason.clone()));
        }
        Ok(Box::new(MockTransaction {
            hash: format!("0x{:064x}", state.calls.submissions),
            state: self.state.clone(),
            gate: self.gates.lock().confirm.clone(),
            effect,
        }))
    }
}

#[async_trait]
impl LedgerGateway for MockLedger {
    async fn campaign_count(&self) -> Result<u64, GatewayError> {
        {
            let mut state = self.state.lock();
            state.calls.count += 1;
            state.loads_in_flight += 1;
            state.max_loads_in_flight = state.max_loads_in_flight.max(state.loads_in_flight);
        }
        let gate = self.gates.lock().count.clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let mut state = self.state.lock();
        let count = state.campaigns.len() as u64;
        if count == 0 {
            state.loads_in_flight -= 1;
        } else {
            state.open_loads.push(count);
        }
        Ok(count)
    }

    async fn campaign(&self, id: u64) -> Result<CampaignRecord, GatewayError> {
        let delay = {
            let mut state = self.state.lock();
            state.calls.record += 1;
            state.record_delays.get(&id).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock();
        state.finish_load_at(id);
        if state.fail_record == Some(id) {
            return Err(GatewayError::Rpc {
                code: -32000,
                message: format!("record {id} unavailable"),
            });
        }
        state
            .campaigns
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| GatewayError::Decode(format!("no campaign {id}")))
    }

    async fn donors(&self, id: u64) -> Result<Vec<DonorEntry>, GatewayError> {
        self.state.lock().calls.donors += 1;
        let gate = self.gates.lock().donors.clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let state = self.state.lock();
        if state.fail_donors {
            return Err(GatewayError::Rpc {
                code: -32000,
                message: "donor lookup failed".to_string(),
            });
        }
        Ok(state.donors.get(&id).cloned().unwrap_or_default())
    }

    async fn durations(&self) -> Result<Vec<u64>, GatewayError> {
        Ok(self.state.lock().durations.clone())
    }

    async fn donate(
        &self,
        id: u64,
        value: Wei,
    ) -> Result<Box<dyn PendingTransaction>, TransactionError> {
        let donor = (*self.sender.lock()).unwrap_or_else(|| account(0xdd));
        self.transaction(Effect::Donate { id, donor, value })
    }

    async fn withdraw_funds(
        &self,
        id: u64,
    ) -> Result<Box<dyn PendingTransaction>, TransactionError> {
        self.transaction(Effect::Withdraw { id })
    }

    async fn create_campaign(
        &self,
        campaign: &NewCampaign,
    ) -> Result<Box<dyn PendingTransaction>, TransactionError> {
        self.transaction(Effect::Create(campaign.clone()))
    }
}

enum Effect {
    Donate { id: u64, donor: AccountId, value: Wei },
    Withdraw { id: u64 },
    Create(NewCampaign),
}

struct MockTransaction {
    hash: String,
    state: Arc<Mutex<MockState>>,
    gate: Option<Arc<Notify>>,
    effect: Effect,
}

#[async_trait]
impl PendingTransaction for MockTransaction {
    fn hash(&self) -> &str {
        &self.hash
    }

    async fn wait(self: Box<Self>) -> Result<(), TransactionError> {
        let MockTransaction {
            state, gate, effect, ..
        } = *self;
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let mut state = state.lock();
        if let Some(reason) = &state.revert {
            return Err(TransactionError::confirmation(reason.clone()));
        }
        match effect {
            Effect::Donate { id, donor, value } => {
                if let Some(c) = state.campaigns.iter_mut().find(|c| c.id == id) {
                    c.raised_amount = Wei(c.raised_amount.0 + value.0);
                }
                let donors = state.donors.entry(id).or_default();
                match donors.iter_mut().find(|d| d.address == donor) {
                    Some(existing) => existing.amount = Wei(existing.amount.0 + value.0),
                    None => donors.push(DonorEntry {
                        address: donor,
                        amount: value,
                    }),
                }
            }
            Effect::Withdraw { id } => {
                if let Some(c) = state.campaigns.iter_mut().find(|c| c.id == id) {
                    c.is_active = false;
                }
            }
            Effect::Create(campaign) => {
                let id = state.campaigns.len() as u64 + 1;
                state.campaigns.push(CampaignRecord {
                    id,
                    title: campaign.title,
                    story: campaign.story,
                    fundraiser: account(0xcc),
                    goal: campaign.goal,
                    raised_amount: Wei::ZERO,
                    deadline: NOW + campaign.duration,
                    is_active: true,
                });
            }
        }
        Ok(())
    }
}
