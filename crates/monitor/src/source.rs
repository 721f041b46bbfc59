//! Balance source seam.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("balance source unreachable: {0}")]
    Unreachable(String),
    #[error("account address rejected by source: {0}")]
    InvalidAddress(String),
}

/// Where current balances come from. Production uses Solana JSON-RPC;
/// tests script the values.
#[async_trait]
pub trait BalanceSource: Send + Sync {
    /// Current balance of `address` in SOL.
    async fn balance(&self, address: &str) -> Result<f64, SourceError>;
}
