pub mod client;
pub mod error;
pub mod offline;
pub mod types;

use async_trait::async_trait;

pub use client::CompletionClient;
pub use error::CompletionError;
pub use offline::OfflineBackend;
pub use types::{CompletionRequest, CompletionResponse, Message, Usage};

/// Abstraction over the external completion service, so stage handlers can
/// run against the HTTP client, the offline backend, or a test mock.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(
        &self,
        req: &CompletionRequest,
    ) -> Result<CompletionResponse, CompletionError>;
}
