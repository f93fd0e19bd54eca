//! Campaign data as read from the ledger, plus the per-tick derived view.

use serde::{Deserialize, Serialize};

use crate::account::AccountId;
use crate::amount::Wei;

/// One campaign as stored by the ledger contract.
///
/// Ids are assigned by the ledger, 1-based and contiguous. `goal` and
/// `deadline` never change after creation; `raised_amount` only grows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignRecord {
    pub id: u64,
    pub title: String,
    pub story: String,
    pub fundraiser: AccountId,
    pub goal: Wei,
    pub raised_amount: Wei,
    /// Unix timestamp (seconds).
    pub deadline: u64,
    /// Ledger-side flag. Not used for bucketing.
    pub is_active: bool,
}

/// A single donation row returned by `getDonors`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonorEntry {
    pub address: AccountId,
    pub amount: Wei,
}

/// Display grouping of a campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Active,
    Ended,
}

/// A record paired with its classification at a given instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedCampaign {
    pub record: CampaignRecord,
    pub seconds_remaining: u64,
    pub bucket: Bucket,
}
