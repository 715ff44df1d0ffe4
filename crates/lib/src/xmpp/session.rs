//! Session traits: the XMPP boundary task talks to the server only through these.

use async_trait::async_trait;

use crate::xmpp::error::XmppError;
use crate::xmpp::message::XmppMessage;

/// An established component session.
#[async_trait]
pub trait XmppSession: Send {
    /// Next inbound message. `Ok(None)` once the server has closed the stream.
    /// Must be cancel-safe: the boundary task polls it inside `select!`.
    async fn recv(&mut self) -> Result<Option<XmppMessage>, XmppError>;

    /// Write one message to the server.
    async fn send(&mut self, msg: &XmppMessage) -> Result<(), XmppError>;

    /// Close the stream politely. Default does nothing.
    async fn close(&mut self) -> Result<(), XmppError> {
        Ok(())
    }
}

/// Opens sessions; called once per XMPP task run.
#[async_trait]
pub trait XmppConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn XmppSession>, XmppError>;
}
