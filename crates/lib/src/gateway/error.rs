//! Gateway errors: per-message translation failures and task-fatal conditions.

use crate::sms::SmsError;

/// Why one message could not be translated.
#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    /// Not a failure: drop the message as if it never arrived.
    #[error("ignore this message")]
    Ignore,

    #[error("invalid phone number: {0}")]
    InvalidPhone(String),

    #[error("no phone number for {0}")]
    NoPhone(String),

    #[error("no local user has number {0}")]
    NoUser(String),

    #[error("body contains {0:?}, which XMPP cannot carry")]
    UnencodableBody(char),

    #[error("outbound XMPP queue closed")]
    OutboundClosed,
}

/// Conditions that end a gateway run. The supervisor restarts the task.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("unexpected SMS status: {0}")]
    UnexpectedStatus(String),

    #[error("converting XMPP to SMS: {0}")]
    Translate(#[source] TranslateError),

    #[error("sending SMS: {0}")]
    Send(#[from] SmsError),

    #[error("{0} queue closed")]
    QueueClosed(&'static str),
}
