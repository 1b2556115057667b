use async_trait::async_trait;

use crate::errors::GatewayError;

/// Opaque text-generation capability: prompt in, text out.
///
/// Only implementations of this trait know a provider's wire format.
#[async_trait]
pub trait GenerationGateway: Send + Sync {
    /// Provider identifier (e.g. "gemini", "mock").
    fn name(&self) -> &str;

    /// Model identifier used for generation.
    fn model(&self) -> &str;

    /// Whether the gateway can currently serve requests.
    fn is_ready(&self) -> bool;

    async fn generate(&self, prompt: &str) -> Result<String, GatewayError>;
}
