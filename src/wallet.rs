//! Wallet gateway client. The wallet *service* is an
//! external collaborator; this crate owns the client that builds, signs, and
//! sends the two requests it understands: a timestamp + method + path + body
//! HMAC-SHA256 signature attached as request headers.

use crate::config::WalletConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Mutex;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebitRequest {
    pub session_token: String,
    pub bet_amount: f64,
    pub currency: String,
    pub transaction_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CreditType {
    Win,
    Refund,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditRequest {
    pub session_token: String,
    pub win_amount: f64,
    pub currency: String,
    pub transaction_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub credit_type: Option<CreditType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum WalletStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletResult {
    pub status: WalletStatus,
    pub new_balance: f64,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WalletEnvelope {
    data: WalletResult,
}

#[async_trait]
pub trait WalletGateway: Send + Sync {
    async fn debit(&self, req: DebitRequest) -> Result<WalletResult>;
    async fn credit(&self, req: CreditRequest) -> Result<WalletResult>;
}

pub struct SignedHttpWalletGateway {
    http: Client,
    base_url: String,
    signature_secret: String,
}

impl SignedHttpWalletGateway {
    pub fn new(config: &WalletConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to build wallet http client")?;
        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            signature_secret: config.signature_secret.clone(),
        })
    }

    /// `HMAC-SHA256(secret, uppercase(method) || path || canonical_json(body) || timestamp)`.
    /// `serde_json`'s `preserve_order` feature keeps struct field order
    /// stable across runs so the signature is reproducible.
    fn sign(&self, method: &str, path: &str, body: &str, timestamp_ms: i64) -> Result<String> {
        let message = format!("{}{}{}{}", method.to_uppercase(), path, body, timestamp_ms);
        let mut mac = HmacSha256::new_from_slice(self.signature_secret.as_bytes())
            .context("invalid wallet signature secret")?;
        mac.update(message.as_bytes());
        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }

    async fn post_signed<T: Serialize>(&self, path: &str, body: &T) -> Result<WalletResult> {
        let canonical = serde_json::to_string(body).context("failed to serialize wallet request")?;
        let timestamp_ms = crate::clock::now_ms();
        let signature = self.sign("POST", path, &canonical, timestamp_ms)?;

        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .header("Content-Type", "application/json")
            .header("x-timestamp", timestamp_ms.to_string())
            .header("x-signature", signature)
            .body(canonical)
            .send()
            .await
            .context("wallet gateway request failed")?;

        let envelope: WalletEnvelope = response
            .error_for_status()
            .context("wallet gateway returned an error status")?
            .json()
            .await
            .context("failed to parse wallet gateway response")?;

        Ok(envelope.data)
    }
}

#[async_trait]
impl WalletGateway for SignedHttpWalletGateway {
    async fn debit(&self, req: DebitRequest) -> Result<WalletResult> {
        self.post_signed("/api/transactions/bet", &req).await
    }

    async fn credit(&self, req: CreditRequest) -> Result<WalletResult> {
        self.post_signed("/api/transactions/credit", &req).await
    }
}

/// Records every call it receives and replays scripted responses, in the
/// order they were pushed. Used by ledger/payout/circuit-breaker tests.
#[derive(Default)]
pub struct FakeWalletGateway {
    debit_responses: Mutex<Vec<Result<WalletResult>>>,
    credit_responses: Mutex<Vec<Result<WalletResult>>>,
    pub debit_calls: Mutex<Vec<DebitRequest>>,
    pub credit_calls: Mutex<Vec<CreditRequest>>,
}

impl FakeWalletGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_debit(&self, result: Result<WalletResult>) {
        self.debit_responses.lock().unwrap().push(result);
    }

    pub fn push_credit(&self, result: Result<WalletResult>) {
        self.credit_responses.lock().unwrap().push(result);
    }

    pub fn always_debit_success(&self, new_balance: f64) {
        self.push_debit(Ok(WalletResult {
            status: WalletStatus::Success,
            new_balance,
            message: None,
        }));
    }

    pub fn always_credit_success(&self, new_balance: f64) {
        self.push_credit(Ok(WalletResult {
            status: WalletStatus::Success,
            new_balance,
            message: None,
        }));
    }
}

#[async_trait]
impl WalletGateway for FakeWalletGateway {
    async fn debit(&self, req: DebitRequest) -> Result<WalletResult> {
        self.debit_calls.lock().unwrap().push(req);
        self.debit_responses
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| Err(anyhow::anyhow!("FakeWalletGateway: no scripted debit response")))
    }

    async fn credit(&self, req: CreditRequest) -> Result<WalletResult> {
        self.credit_calls.lock().unwrap().push(req);
        self.credit_responses
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| Err(anyhow::anyhow!("FakeWalletGateway: no scripted credit response")))
    }
}
