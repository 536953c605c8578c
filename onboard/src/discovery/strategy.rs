//! Discovery strategy contract

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::discovery::models::DiscoveryFinding;
use crate::errors::OnboardError;

/// One transport-specific probe for nearby unpaired devices.
///
/// Implementations must watch `cancel` and return early once it fires; the
/// session never aborts a running strategy.
#[async_trait]
pub trait DiscoveryStrategy: Send + Sync {
    /// Stable identifier used in logs
    fn id(&self) -> &str;

    /// Probe the transport once
    async fn discover(&self, cancel: CancellationToken) -> Result<Vec<DiscoveryFinding>, OnboardError>;
}
