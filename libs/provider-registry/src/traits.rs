use async_trait::async_trait;
use sms_core::{SendSmsRequest, SendSmsResponse, SendVoiceRequest, SendVoiceResponse};
use sms_retry::Cancellation;

use crate::errors::ProviderError;

/// A delivery backend.
///
/// The registry hands every attempt the caller's [`Cancellation`]; long-running backends
/// should race their I/O against it. Requests arrive already validated and with the
/// registry's default template applied when the caller supplied none.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Unique registry key.
    fn name(&self) -> &str;

    async fn send_sms(
        &self,
        cancellation: &Cancellation,
        request: &SendSmsRequest,
    ) -> Result<SendSmsResponse, ProviderError>;

    async fn send_voice_call(
        &self,
        cancellation: &Cancellation,
        request: &SendVoiceRequest,
    ) -> Result<SendVoiceResponse, ProviderError>;
}
