//! SMS <-> XMPP translation.

use crate::gateway::error::TranslateError;
use crate::routing::AddressBook;
use crate::sms::Sms;
use crate::xmpp::{is_xml_char, MessageKind, XmppMessage};

/// Inbound SMS -> chat message from the sender's component JID to the local user it was sent to.
pub fn sms_to_xmpp(book: &AddressBook, sms: &Sms) -> Result<XmppMessage, TranslateError> {
    let from = book.remote_jid(&sms.from)?;
    let to = book.user_jid(&sms.to)?;
    if let Some(c) = sms.body.chars().find(|c| !is_xml_char(*c)) {
        return Err(TranslateError::UnencodableBody(c));
    }
    Ok(XmppMessage::chat(from, to, sms.body.clone()))
}

/// Inbound XMPP message -> SMS to send from a local user's number to a component JID's number.
///
/// Error and groupchat messages, anything without a body (chat states, receipt
/// acknowledgments), and messages from anyone but a local user are ignored rather
/// than treated as failures.
pub fn xmpp_to_sms(book: &AddressBook, msg: &XmppMessage) -> Result<Sms, TranslateError> {
    if matches!(msg.kind, MessageKind::Error | MessageKind::Groupchat) {
        return Err(TranslateError::Ignore);
    }
    let body = match msg.body {
        Some(ref body) if !body.trim().is_empty() => body.clone(),
        _ => return Err(TranslateError::Ignore),
    };
    let Some(from) = book.user_phone(&msg.from) else {
        return Err(TranslateError::Ignore);
    };
    Ok(Sms {
        from: from.to_string(),
        to: book.remote_phone(&msg.to)?,
        body,
    })
}

/// Receipt to hold until the SMS for `msg` is delivered, when one was requested.
pub fn pending_receipt(msg: &XmppMessage) -> Option<XmppMessage> {
    if !msg.receipt_requested {
        return None;
    }
    XmppMessage::receipt_for(msg)
}
