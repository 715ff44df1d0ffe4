//! SMS events delivered from the HTTP boundary to the gateway.

use std::fmt;
use tokio::sync::oneshot;

use crate::gateway::TranslateError;

/// A text message between two phone numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sms {
    pub from: String,
    pub to: String,
    pub body: String,
}

/// Provider delivery status for an outbound SMS.
///
/// Codes the gateway has no variant for arrive as `Unrecognized` so that the gateway,
/// not the webhook decoder, decides what an unexpected code means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmsStatus {
    Accepted,
    Scheduled,
    Canceled,
    Queued,
    Sending,
    Sent,
    Failed,
    Delivered,
    Undelivered,
    Receiving,
    Received,
    Read,
    PartiallyDelivered,
    Unrecognized(String),
}

impl SmsStatus {
    pub fn parse(code: &str) -> Self {
        match code.trim().to_ascii_lowercase().as_str() {
            "accepted" => Self::Accepted,
            "scheduled" => Self::Scheduled,
            "canceled" => Self::Canceled,
            "queued" => Self::Queued,
            "sending" => Self::Sending,
            "sent" => Self::Sent,
            "failed" => Self::Failed,
            "delivered" => Self::Delivered,
            "undelivered" => Self::Undelivered,
            "receiving" => Self::Receiving,
            "received" => Self::Received,
            "read" => Self::Read,
            "partially_delivered" => Self::PartiallyDelivered,
            _ => Self::Unrecognized(code.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Accepted => "accepted",
            Self::Scheduled => "scheduled",
            Self::Canceled => "canceled",
            Self::Queued => "queued",
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Delivered => "delivered",
            Self::Undelivered => "undelivered",
            Self::Receiving => "receiving",
            Self::Received => "received",
            Self::Read => "read",
            Self::PartiallyDelivered => "partially_delivered",
            Self::Unrecognized(code) => code,
        }
    }
}

impl fmt::Display for SmsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a webhook told us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RxSms {
    /// A new SMS arrived for one of our numbers.
    Message(Sms),
    /// Status change for an SMS we sent, keyed by the provider's tracking id.
    Status { id: String, status: SmsStatus },
}

/// Outcome the gateway posts back for one event.
pub type SmsOutcome = Result<(), TranslateError>;

/// One-shot reply slot; consumed by posting.
#[derive(Debug)]
pub struct Reply(oneshot::Sender<SmsOutcome>);

impl Reply {
    /// Post the outcome. A caller that stopped waiting is not an error.
    pub fn post(self, outcome: SmsOutcome) {
        let _ = self.0.send(outcome);
    }
}

/// An SMS event plus the slot its sender is waiting on.
#[derive(Debug)]
pub struct SmsEvent {
    pub rx: RxSms,
    pub reply: Reply,
}

impl SmsEvent {
    /// Event and the receiver its sender awaits. If the gateway drops the event
    /// without posting (its task died), the receiver errors.
    pub fn new(rx: RxSms) -> (Self, oneshot::Receiver<SmsOutcome>) {
        let (tx, outcome) = oneshot::channel();
        (
            Self {
                rx,
                reply: Reply(tx),
            },
            outcome,
        )
    }
}
