use std::time::Duration;

use super::InferenceError;

/// Sampling parameters and deadline for a single inference call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferenceParams {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Caller-supplied deadline. Exceeding it yields `InferenceError::Timeout`.
    pub timeout: Duration,
}

/// Vision-capable model abstraction (allows mocking).
///
/// One call = one prompt + one image → raw text. Implementations must be
/// shareable across worker threads.
pub trait InferenceClient: Send + Sync {
    fn infer(
        &self,
        prompt: &str,
        image: &[u8],
        params: &InferenceParams,
    ) -> Result<String, InferenceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_trait_is_object_safe() {
        fn _assert_client(_: &dyn InferenceClient) {}
    }
}
