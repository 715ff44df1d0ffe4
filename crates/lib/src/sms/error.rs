//! SMS provider and webhook errors.

#[derive(Debug, thiserror::Error)]
pub enum SmsError {
    #[error("sms request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("sms api error: {0}")]
    Api(String),

    #[error("unsupported webhook payload: {0}")]
    Webhook(String),

    #[error("no SMS provider configured (set sms.provider)")]
    NoProvider,

    #[error("unknown SMS provider: {0}")]
    UnknownProvider(String),

    #[error("sms provider {provider} is missing {setting}")]
    MissingSetting {
        provider: &'static str,
        setting: &'static str,
    },
}
