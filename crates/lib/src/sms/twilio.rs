//! Twilio provider: send via the Messages API and decode Twilio webhooks.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

use crate::sms::error::SmsError;
use crate::sms::event::{RxSms, Sms, SmsStatus};
use crate::sms::provider::SmsProvider;

const TWILIO_API_BASE: &str = "https://api.twilio.com";

/// Subset of Twilio's Message resource returned by a create call.
#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: String,
    #[serde(default)]
    status: Option<String>,
}

pub struct TwilioProvider {
    account_sid: String,
    auth_token: String,
    /// Where Twilio should POST status updates for messages we send.
    status_callback: Option<String>,
    api_base: String,
    client: reqwest::Client,
}

impl TwilioProvider {
    pub fn new(
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        status_callback: Option<String>,
        api_base: Option<String>,
    ) -> Self {
        let api_base = api_base
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| TWILIO_API_BASE.to_string());
        Self {
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            status_callback: status_callback.filter(|s| !s.trim().is_empty()),
            api_base,
            client: reqwest::Client::new(),
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base, self.account_sid
        )
    }
}

fn field<'a>(form: &'a HashMap<String, String>, key: &'static str) -> Result<&'a str, SmsError> {
    form.get(key)
        .map(String::as_str)
        .ok_or_else(|| SmsError::Webhook(format!("missing {}", key)))
}

#[async_trait]
impl SmsProvider for TwilioProvider {
    fn name(&self) -> &str {
        "twilio"
    }

    async fn send(&self, from: &str, to: &str, body: &str) -> Result<String, SmsError> {
        let mut form = vec![("From", from), ("To", to), ("Body", body)];
        if let Some(ref callback) = self.status_callback {
            form.push(("StatusCallback", callback.as_str()));
        }
        let res = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(SmsError::Api(format!("{} {}", status, body)));
        }
        let data: MessageResource = res.json().await?;
        log::debug!(
            "twilio: queued {} ({})",
            data.sid,
            data.status.as_deref().unwrap_or("unknown")
        );
        Ok(data.sid)
    }

    /// Incoming SMS carry `Body`; status callbacks carry `MessageStatus` and no body.
    fn decode_webhook(&self, form: &HashMap<String, String>) -> Result<RxSms, SmsError> {
        if let Some(body) = form.get("Body") {
            return Ok(RxSms::Message(Sms {
                from: field(form, "From")?.to_string(),
                to: field(form, "To")?.to_string(),
                body: body.clone(),
            }));
        }
        if let Some(status) = form.get("MessageStatus") {
            let id = form
                .get("MessageSid")
                .or_else(|| form.get("SmsSid"))
                .ok_or_else(|| SmsError::Webhook("missing MessageSid".to_string()))?;
            return Ok(RxSms::Status {
                id: id.clone(),
                status: SmsStatus::parse(status),
            });
        }
        Err(SmsError::Webhook(
            "neither Body nor MessageStatus present".to_string(),
        ))
    }
}
