//! Verification lifecycle and alert dispatch for bondwatch.

pub mod coordinator;
pub mod dispatcher;
pub mod ttl_cache;

#[cfg(test)]
pub(crate) mod testutil;

pub use coordinator::{
    ChannelSetup, Confirmation, OauthCompletion, VerificationCoordinator, VerifyError,
};
pub use dispatcher::{ChannelDelivery, DispatchReport, Dispatcher};
pub use ttl_cache::TtlCache;
