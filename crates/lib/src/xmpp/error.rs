//! XMPP boundary errors.

#[derive(Debug, thiserror::Error)]
pub enum XmppError {
    #[error("xmpp i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("xmpp xml: {0}")]
    Xml(String),

    #[error("xmpp protocol: {0}")]
    Protocol(String),

    /// `stream:error` from the server, e.g. "not-authorized" for a bad shared secret.
    #[error("xmpp stream error: {0}")]
    Stream(String),

    #[error("xmpp stream closed by server")]
    Closed,

    #[error("gateway queue closed")]
    GatewayClosed,
}

impl From<quick_xml::Error> for XmppError {
    fn from(e: quick_xml::Error) -> Self {
        XmppError::Xml(e.to_string())
    }
}
