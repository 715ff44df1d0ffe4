//! XMPP message value exchanged between the gateway and the XMPP boundary.

/// Namespace for message delivery receipts (XEP-0184).
pub const RECEIPTS_NS: &str = "urn:xmpp:receipts";

/// Message `type` attribute (RFC 6121). Unknown values are treated as `normal`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MessageKind {
    #[default]
    Normal,
    Chat,
    Groupchat,
    Headline,
    Error,
}

impl MessageKind {
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("chat") => Self::Chat,
            Some("groupchat") => Self::Groupchat,
            Some("headline") => Self::Headline,
            Some("error") => Self::Error,
            _ => Self::Normal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Chat => "chat",
            Self::Groupchat => "groupchat",
            Self::Headline => "headline",
            Self::Error => "error",
        }
    }
}

/// A `<message/>` stanza as the gateway sees it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmppMessage {
    pub id: Option<String>,
    pub from: String,
    pub to: String,
    pub kind: MessageKind,
    pub body: Option<String>,
    /// Sender asked for a delivery receipt (`<request xmlns='urn:xmpp:receipts'/>`).
    pub receipt_requested: bool,
    /// Set on receipt acknowledgments: id of the acknowledged message.
    pub receipt_for: Option<String>,
}

impl XmppMessage {
    /// New chat message with a fresh stanza id.
    pub fn chat(from: impl Into<String>, to: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: Some(new_stanza_id()),
            from: from.into(),
            to: to.into(),
            kind: MessageKind::Chat,
            body: Some(body.into()),
            receipt_requested: false,
            receipt_for: None,
        }
    }

    /// Receipt acknowledging `message`, addressed back to its sender.
    /// None when the message carried no id to acknowledge.
    pub fn receipt_for(message: &XmppMessage) -> Option<Self> {
        let acked = message.id.clone()?;
        Some(Self {
            id: Some(new_stanza_id()),
            from: message.to.clone(),
            to: message.from.clone(),
            kind: MessageKind::Chat,
            body: None,
            receipt_requested: false,
            receipt_for: Some(acked),
        })
    }
}

fn new_stanza_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
