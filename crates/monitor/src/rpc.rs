//! Solana JSON-RPC balance source.

use crate::source::{BalanceSource, SourceError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

pub const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

// getBalance rejects malformed pubkeys with "invalid params".
const RPC_INVALID_PARAMS: i64 = -32602;

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<RpcResult>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcResult {
    value: u64,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL
}

/// Fetches account balances with the `getBalance` RPC call.
pub struct RpcBalanceSource {
    http: Client,
    url: String,
}

impl RpcBalanceSource {
    pub fn new(http: Client, url: String) -> Self {
        Self { http, url }
    }
}

#[async_trait]
impl BalanceSource for RpcBalanceSource {
    async fn balance(&self, address: &str) -> Result<f64, SourceError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "getBalance",
            "params": [address],
        });

        let resp = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SourceError::Unreachable(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(SourceError::Unreachable(format!(
                "RPC returned HTTP {}",
                resp.status()
            )));
        }

        let parsed: RpcResponse = resp
            .json()
            .await
            .map_err(|e| SourceError::Unreachable(e.to_string()))?;

        if let Some(err) = parsed.error {
            if err.code == RPC_INVALID_PARAMS {
                return Err(SourceError::InvalidAddress(address.to_string()));
            }
            return Err(SourceError::Unreachable(format!(
                "RPC error {}: {}",
                err.code, err.message
            )));
        }

        let result = parsed
            .result
            .ok_or_else(|| SourceError::Unreachable("empty RPC response".to_string()))?;
        Ok(lamports_to_sol(result.value))
    }
}
