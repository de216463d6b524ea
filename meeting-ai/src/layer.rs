//! The seam shared by every orchestrator layer.

use async_trait::async_trait;

use crate::types::operation::{Completion, OperationRequest};
use crate::Error;

/// One stage of the orchestrator's decorator stack.
///
/// Each layer owns an `Arc<dyn Layer>` to the next inner layer; the innermost
/// layer talks to the raw providers.
#[async_trait]
pub trait Layer: Send + Sync {
    async fn execute(&self, request: OperationRequest) -> Result<Completion, Error>;
}
