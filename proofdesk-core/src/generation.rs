//! Text-generation seam.
//!
//! The review workflow only knows this trait; the provider client is built
//! once with its credentials and model and handed in as a dependency.

use async_trait::async_trait;

use crate::error::ReviewError;

/// Inputs for one generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub user_prompt: String,
    pub system_prompt: String,
    /// Editor-supplied additions, appended to the user prompt when non-empty.
    pub additions: String,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Produce description text, or fail with [`ReviewError::Upstream`].
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ReviewError>;
}
