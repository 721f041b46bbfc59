//! Balance monitoring for bondwatch: fetch, persist, detect crossings.

pub mod checker;
pub mod rpc;
pub mod source;

pub use checker::{BalanceChecker, MonitorConfig, TickResult, TickSummary};
pub use rpc::{lamports_to_sol, RpcBalanceSource, LAMPORTS_PER_SOL};
pub use source::{BalanceSource, SourceError};
