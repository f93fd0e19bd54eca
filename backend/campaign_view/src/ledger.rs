//! Call surface of the campaign contract, as seen from this service.
//!
//! [`LedgerGateway`] is the only way the engine touches the ledger. The
//! production implementation is [`crate::rpc::JsonRpcGateway`]; tests use
//! `MockLedger`.

use async_trait::async_trait;

use crate::account::AccountId;
use crate::amount::Wei;
use crate::campaign::{CampaignRecord, DonorEntry};
use crate::errors::{GatewayError, TransactionError};

/// Arguments for `createCampaign`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCampaign {
    pub title: String,
    pub goal: Wei,
    /// One of the values returned by `getDurations`, in seconds.
    pub duration: u64,
    pub story: String,
    pub image_url: String,
}

/// A submitted mutating call that has not been confirmed yet.
#[async_trait]
pub trait PendingTransaction: Send {
    fn hash(&self) -> &str;

    /// Resolve once the ledger has included (or rejected) the transaction.
    async fn wait(self: Box<Self>) -> Result<(), TransactionError>;
}

#[async_trait]
pub trait LedgerGateway: Send + Sync {
    async fn campaign_count(&self) -> Result<u64, GatewayError>;

    async fn campaign(&self, id: u64) -> Result<CampaignRecord, GatewayError>;

    /// Donors in ledger order.
    async fn donors(&self, id: u64) -> Result<Vec<DonorEntry>, GatewayError>;

    async fn durations(&self) -> Result<Vec<u64>, GatewayError>;

    async fn donate(
        &self,
        id: u64,
        value: Wei,
    ) -> Result<Box<dyn PendingTransaction>, TransactionError>;

    async fn withdraw_funds(&self, id: u64)
        -> Result<Box<dyn PendingTransaction>, TransactionError>;

    async fn create_campaign(
        &self,
        campaign: &NewCampaign,
    ) -> Result<Box<dyn PendingTransaction>, TransactionError>;
}

/// Zip the two index-aligned arrays `getDonors` returns.
pub fn pair_donors(
    addresses: Vec<AccountId>,
    amounts: Vec<Wei>,
) -> Result<Vec<DonorEntry>, GatewayError> {
    if addresses.len() != amounts.len() {
        return Err(GatewayError::Decode(format!(
            "getDonors returned {} addresses but {} amounts",
            addresses.len(),
            amounts.len()
        )));
    }
    Ok(addresses
        .into_iter()
        .zip(amounts)
        .map(|(address, amount)| DonorEntry { address, amount })
        .collect())
}
