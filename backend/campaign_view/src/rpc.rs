//! JSON-RPC ledger gateway client.
//!
//! Every contract call is a JSON-RPC 2.0 request whose method is the
//! contract function name and whose first parameter names the contract.
//!
//! ## Resilience
//!
//! * Read calls back off exponentially on transport errors, rate limiting
//!   and soft RPC errors, up to [`MAX_BACKOFF_SECS`] seconds and
//!   [`MAX_READ_ATTEMPTS`] attempts.
//! * Mutating calls are sent exactly once. Only receipt polling is retried.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::account::AccountId;
use crate::amount::Wei;
use crate::campaign::{CampaignRecord, DonorEntry};
use crate::config::Config;
use crate::errors::{GatewayError, TransactionError};
use crate::ledger::{pair_donors, LedgerGateway, NewCampaign, PendingTransaction};

const MAX_BACKOFF_SECS: u64 = 60;
const INITIAL_BACKOFF_SECS: u64 = 2;
const MAX_READ_ATTEMPTS: u32 = 5;

// ─────────────────────────────────────────────────────────
// JSON-RPC response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RpcResponse {
    pub result: Option<Value>,
    pub error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

/// Integer that may arrive as a JSON number or a decimal string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireU64 {
    Number(u64),
    Text(String),
}

impl WireU64 {
    fn value(self) -> Result<u64, GatewayError> {
        match self {
            Self::Number(n) => Ok(n),
            Self::Text(s) => s
                .parse()
                .map_err(|_| GatewayError::Decode(format!("not an integer: {s:?}"))),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCampaign {
    pub title: String,
    pub fundraiser: String,
    pub goal: Wei,
    pub raised_amount: Wei,
    deadline: WireU64,
    pub story: String,
    pub is_active: bool,
}

impl RawCampaign {
    pub fn into_record(self, id: u64) -> Result<CampaignRecord, GatewayError> {
        let fundraiser: AccountId = self
            .fundraiser
            .parse()
            .map_err(|e| GatewayError::Decode(format!("campaign {id} fundraiser: {e}")))?;
        Ok(CampaignRecord {
            id,
            title: self.title,
            story: self.story,
            fundraiser,
            goal: self.goal,
            raised_amount: self.raised_amount,
            deadline: self.deadline.value()?,
            is_active: self.is_active,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReceipt {
    pub status: u8,
    pub revert_reason: Option<String>,
    pub block_number: Option<u64>,
}

// ─────────────────────────────────────────────────────────
// Gateway
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct JsonRpcGateway {
    client: Client,
    url: String,
    contract: AccountId,
    poll_interval: Duration,
    confirm_timeout: Duration,
}

impl JsonRpcGateway {
    pub fn new(client: Client, config: &Config) -> Self {
        Self {
            client,
            url: config.gateway_url.clone(),
            contract: config.contract_address,
            poll_interval: Duration::from_secs(config.tx_poll_interval_secs),
            confirm_timeout: Duration::from_secs(config.tx_confirm_timeout_secs),
        }
    }

    /// Send one request. No retry.
    async fn call(&self, method: &str, args: Value) -> Result<Value, GatewayError> {
        call_once(&self.client, &self.url, method, build_params(&self.contract, args)).await
    }

    /// Read call with exponential back-off on transient failures.
    async fn read<T: DeserializeOwned>(&self, method: &str, args: Value) -> Result<T, GatewayError> {
        let mut backoff = INITIAL_BACKOFF_SECS;
        let mut attempt = 1;

        loop {
            match self.call(method, args.clone()).await {
                Ok(value) => {
                    debug!("{method} ok (attempt {attempt})");
                    return Ok(serde_json::from_value(value)?);
                }
                Err(e) if attempt < MAX_READ_ATTEMPTS && is_transient(&e) => {
                    warn!("{method} failed (will retry in {backoff}s): {e}");
                    tokio::time::sleep(Duration::from_secs(backoff)).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF_SECS);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn submit(
        &self,
        method: &str,
        args: Value,
    ) -> Result<Box<dyn PendingTransaction>, TransactionError> {
        let value = self
            .call(method, args)
            .await
            .map_err(|e| TransactionError::submission(submission_reason(e)))?;
        let hash = value
            .as_str()
            .ok_or_else(|| TransactionError::submission(format!("{method} returned no tx hash")))?
            .to_string();

        info!("Submitted {method} tx {hash}");
        Ok(Box::new(JsonRpcTransaction {
            gateway: self.clone(),
            hash,
        }))
    }
}

#[async_trait]
impl LedgerGateway for JsonRpcGateway {
    async fn campaign_count(&self) -> Result<u64, GatewayError> {
        self.read::<WireU64>("campaignCount", json!([])).await?.value()
    }

    async fn campaign(&self, id: u64) -> Result<CampaignRecord, GatewayError> {
        let raw: RawCampaign = self.read("campaigns", json!([id])).await?;
        raw.into_record(id)
    }

    async fn donors(&self, id: u64) -> Result<Vec<DonorEntry>, GatewayError> {
        let (addresses, amounts): (Vec<String>, Vec<Wei>) =
            self.read("getDonors", json!([id])).await?;
        let addresses = addresses
            .iter()
            .map(|a| a.parse::<AccountId>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| GatewayError::Decode(format!("campaign {id} donors: {e}")))?;
        pair_donors(addresses, amounts)
    }

    async fn durations(&self) -> Result<Vec<u64>, GatewayError> {
        let raw: Vec<WireU64> = self.read("getDurations", json!([])).await?;
        raw.into_iter().map(WireU64::value).collect()
    }

    async fn donate(
        &self,
        id: u64,
        value: Wei,
    ) -> Result<Box<dyn PendingTransaction>, TransactionError> {
        self.submit("donate", json!({ "args": [id], "value": value }))
            .await
    }

    async fn withdraw_funds(
        &self,
        id: u64,
    ) -> Result<Box<dyn PendingTransaction>, TransactionError> {
        self.submit("withdrawFunds", json!({ "args": [id] })).await
    }

    async fn create_campaign(
        &self,
        campaign: &NewCampaign,
    ) -> Result<Box<dyn PendingTransaction>, TransactionError> {
        self.submit(
            "createCampaign",
            json!({
                "args": [
                    campaign.title,
                    campaign.goal,
                    campaign.duration,
                    campaign.story,
                    campaign.image_url,
                ]
            }),
        )
        .await
    }
}

/// Handle returned by a mutating call; polls `getTransactionReceipt`.
pub struct JsonRpcTransaction {
    gateway: JsonRpcGateway,
    hash: String,
}

#[async_trait]
impl PendingTransaction for JsonRpcTransaction {
    fn hash(&self) -> &str {
        &self.hash
    }

    async fn wait(self: Box<Self>) -> Result<(), TransactionError> {
        let timeout = self.gateway.confirm_timeout;
        match tokio::time::timeout(timeout, self.poll_receipt()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(TransactionError::confirmation(format!(
                "no receipt for {} after {}s",
                self.hash,
                timeout.as_secs()
            ))),
        }
    }
}

impl JsonRpcTransaction {
    async fn poll_receipt(&self) -> Result<(), TransactionError> {
        loop {
            match self
                .gateway
                .call("getTransactionReceipt", json!([self.hash]))
                .await
            {
                Ok(Value::Null) => debug!("tx {} pending", self.hash),
                Ok(value) => {
                    let receipt: RawReceipt = serde_json::from_value(value).map_err(|e| {
                        TransactionError::confirmation(format!("malformed receipt: {e}"))
                    })?;
                    return receipt_outcome(&self.hash, receipt);
                }
                Err(e) if is_transient(&e) => {
                    warn!("Receipt poll for {} failed, retrying: {e}", self.hash)
                }
                Err(e) => return Err(TransactionError::confirmation(e.to_string())),
            }
            tokio::time::sleep(self.gateway.poll_interval).await;
        }
    }
}

// ─────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────

async fn call_once(
    client: &Client,
    url: &str,
    method: &str,
    params: Value,
) -> Result<Value, GatewayError> {
    let resp = client
        .post(url)
        .json(&json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        }))
        .send()
        .await?;

    if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(GatewayError::Rpc {
            code: 429,
            message: "rate limited".to_string(),
        });
    }

    let body: RpcResponse = resp.json().await?;
    if let Some(err) = body.error {
        return Err(GatewayError::Rpc {
            code: err.code,
            message: err.message,
        });
    }
    Ok(body.result.unwrap_or(Value::Null))
}

/// `[{"to": <contract>, ...call}]`. Plain arrays become `{"args": [...]}`.
fn build_params(contract: &AccountId, call: Value) -> Value {
    let mut call = match call {
        Value::Object(map) => Value::Object(map),
        args => json!({ "args": args }),
    };
    call["to"] = json!(contract.to_string());
    json!([call])
}

fn is_transient(err: &GatewayError) -> bool {
    match err {
        GatewayError::Http(_) => true,
        // Malformed request, unknown method or bad params: retrying cannot help.
        GatewayError::Rpc { code, .. } => !matches!(code, -32600 | -32601 | -32602),
        GatewayError::Json(_) | GatewayError::Decode(_) => false,
    }
}

fn submission_reason(err: GatewayError) -> String {
    match err {
        GatewayError::Rpc { message, .. } => message,
        other => other.to_string(),
    }
}

fn receipt_outcome(hash: &str, receipt: RawReceipt) -> Result<(), TransactionError> {
    if receipt.status == 1 {
        info!(
            "Tx {hash} confirmed in block {}",
            receipt
                .block_number
                .map(|b| b.to_string())
                .unwrap_or_else(|| "?".to_string())
        );
        Ok(())
    } else {
        Err(TransactionError::confirmation(
            receipt
                .revert_reason
                .unwrap_or_else(|| "transaction reverted".to_string()),
        ))
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
