//! SMS provider trait and selection from config.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{resolve_twilio_token, Config};
use crate::sms::error::SmsError;
use crate::sms::event::RxSms;
use crate::sms::twilio::TwilioProvider;

/// An SMS provider: sends messages and understands its own webhooks.
#[async_trait]
pub trait SmsProvider: Send + Sync {
    /// Provider id (e.g. "twilio").
    fn name(&self) -> &str;

    /// Send one SMS. Returns the provider's tracking id for later status updates.
    async fn send(&self, from: &str, to: &str, body: &str) -> Result<String, SmsError>;

    /// Decode a webhook form POST into an inbound message or a status update.
    fn decode_webhook(&self, form: &HashMap<String, String>) -> Result<RxSms, SmsError>;
}

/// Choose the provider named by `sms.provider`. Failure here is fatal at startup.
pub fn select_provider(config: &Config) -> Result<Arc<dyn SmsProvider>, SmsError> {
    let name = config
        .sms
        .provider
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(SmsError::NoProvider)?;
    match name.to_ascii_lowercase().as_str() {
        "twilio" => {
            let twilio = &config.sms.twilio;
            let account_sid = twilio
                .account_sid
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or(SmsError::MissingSetting {
                    provider: "twilio",
                    setting: "accountSid",
                })?;
            let auth_token = resolve_twilio_token(config).ok_or(SmsError::MissingSetting {
                provider: "twilio",
                setting: "authToken (or TWILIO_AUTH_TOKEN)",
            })?;
            Ok(Arc::new(TwilioProvider::new(
                account_sid,
                auth_token,
                twilio.status_callback_url.clone(),
                twilio.api_base.clone(),
            )))
        }
        _ => Err(SmsError::UnknownProvider(name.to_string())),
    }
}
