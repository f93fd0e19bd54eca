//! Application-wide error types.

use thiserror::Error;

/// Failure talking to the ledger gateway on a read path.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Decode error: {0}")]
    Decode(String),
}

/// Where a mutating call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStage {
    Submission,
    Confirmation,
}

impl TxStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submission => "submission",
            Self::Confirmation => "confirmation",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Transaction {} failed: {reason}", stage.as_str())]
pub struct TransactionError {
    pub stage: TxStage,
    pub reason: String,
}

impl TransactionError {
    pub fn submission(reason: impl Into<String>) -> Self {
        Self {
            stage: TxStage::Submission,
            reason: reason.into(),
        }
    }

    pub fn confirmation(reason: impl Into<String>) -> Self {
        Self {
            stage: TxStage::Confirmation,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ViewError {
    #[error("Campaign load failed: {0}")]
    Load(#[source] GatewayError),

    #[error("Failed to fetch donors for campaign {campaign_id}: {source}")]
    DonorFetch {
        campaign_id: u64,
        #[source]
        source: GatewayError,
    },

    #[error("Ledger read failed: {0}")]
    Gateway(#[source] GatewayError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid account identifier: {0}")]
    InvalidAccount(String),

    #[error("Invalid campaign: {0}")]
    InvalidCampaign(String),

    #[error("Unknown campaign {0}")]
    UnknownCampaign(u64),

    #[error("Only the fundraiser of campaign {0} can withdraw its funds")]
    NotFundraiser(u64),

    #[error("No wallet connected")]
    NoSession,

    #[error("A {kind} for campaign {campaign_id} is already in progress")]
    ActionInFlight {
        campaign_id: u64,
        kind: &'static str,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Action task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, ViewError>;
