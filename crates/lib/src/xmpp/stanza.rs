//! Component stream framing: reading stanzas off the wire and writing them back.
//!
//! Only what a component needs: the stream header, the handshake, `message`, `iq`
//! (so requests can be refused) and `stream:error`.

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use sha1::{Digest, Sha1};
use tokio::io::AsyncBufRead;

use crate::xmpp::error::XmppError;
use crate::xmpp::message::{MessageKind, XmppMessage, RECEIPTS_NS};

pub const COMPONENT_NS: &str = "jabber:component:accept";
pub const STREAMS_NS: &str = "http://etherx.jabber.org/streams";
pub const STANZAS_NS: &str = "urn:ietf:params:xml:ns:xmpp-stanzas";
pub const STREAM_CLOSE: &str = "</stream:stream>";

/// Minimal owned XML element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Element>,
    pub text: String,
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> Result<Self, XmppError> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attrs = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| XmppError::Xml(e.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            attrs.push((key, value));
        }
        Ok(Self {
            name,
            attrs,
            children: Vec::new(),
            text: String::new(),
        })
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn local_name(&self) -> &str {
        self.name
            .rsplit_once(':')
            .map_or(self.name.as_str(), |(_, local)| local)
    }

    pub fn child(&self, local_name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.local_name() == local_name)
    }

    fn child_ns(&self, local_name: &str, ns: &str) -> Option<&Element> {
        self.children
            .iter()
            .find(|c| c.local_name() == local_name && c.attr("xmlns") == Some(ns))
    }
}

/// Top-level stanza read from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stanza {
    Message(XmppMessage),
    Iq(Element),
    Handshake,
    /// `stream:error` with its defined condition (e.g. "not-authorized").
    StreamError(String),
    Other(Element),
}

impl From<Element> for Stanza {
    fn from(el: Element) -> Self {
        match el.name.as_str() {
            "message" => Stanza::Message(message_from_element(&el)),
            "iq" => Stanza::Iq(el),
            "handshake" => Stanza::Handshake,
            "stream:error" => {
                let condition = el
                    .children
                    .iter()
                    .map(Element::local_name)
                    .find(|n| *n != "text")
                    .unwrap_or("undefined-condition")
                    .to_string();
                Stanza::StreamError(condition)
            }
            _ => Stanza::Other(el),
        }
    }
}

fn message_from_element(el: &Element) -> XmppMessage {
    XmppMessage {
        id: el.attr("id").map(str::to_string),
        from: el.attr("from").unwrap_or_default().to_string(),
        to: el.attr("to").unwrap_or_default().to_string(),
        kind: MessageKind::parse(el.attr("type")),
        body: el.child("body").map(|b| b.text.clone()),
        receipt_requested: el.child_ns("request", RECEIPTS_NS).is_some(),
        receipt_for: el
            .child_ns("received", RECEIPTS_NS)
            .map(|r| r.attr("id").unwrap_or_default().to_string()),
    }
}

/// Reads the server side of a component stream.
pub struct StanzaReader<R> {
    reader: Reader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin> StanzaReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: Reader::from_reader(inner),
            buf: Vec::new(),
        }
    }

    /// Read up to the server's `<stream:stream>` header; returns its stream id.
    pub async fn read_stream_header(&mut self) -> Result<String, XmppError> {
        loop {
            self.buf.clear();
            match self.reader.read_event_into_async(&mut self.buf).await? {
                Event::Start(e) if e.name().as_ref() == b"stream:stream" => {
                    let header = Element::from_start(&e)?;
                    return header.attr("id").map(str::to_string).ok_or_else(|| {
                        XmppError::Protocol("stream header without id".to_string())
                    });
                }
                Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::Text(_) => continue,
                Event::Eof => return Err(XmppError::Closed),
                other => {
                    return Err(XmppError::Protocol(format!(
                        "expected stream header, got {:?}",
                        other
                    )))
                }
            }
        }
    }

    /// Next top-level stanza. `Ok(None)` once the server closes the stream.
    pub async fn next_stanza(&mut self) -> Result<Option<Stanza>, XmppError> {
        loop {
            self.buf.clear();
            let (element, open) = match self.reader.read_event_into_async(&mut self.buf).await? {
                Event::Start(e) => (Element::from_start(&e)?, true),
                Event::Empty(e) => (Element::from_start(&e)?, false),
                Event::End(_) | Event::Eof => return Ok(None),
                // whitespace keepalives, comments
                _ => continue,
            };
            let element = if open {
                self.read_children(element).await?
            } else {
                element
            };
            return Ok(Some(Stanza::from(element)));
        }
    }

    async fn read_children(&mut self, root: Element) -> Result<Element, XmppError> {
        let mut stack = vec![root];
        loop {
            self.buf.clear();
            match self.reader.read_event_into_async(&mut self.buf).await? {
                Event::Start(e) => stack.push(Element::from_start(&e)?),
                Event::Empty(e) => {
                    let child = Element::from_start(&e)?;
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(child);
                    }
                }
                Event::Text(t) => {
                    let text = t.unescape()?;
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&text);
                    }
                }
                Event::CData(c) => {
                    let raw = c.into_inner();
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&String::from_utf8_lossy(&raw));
                    }
                }
                Event::End(_) => {
                    let done = stack
                        .pop()
                        .ok_or_else(|| XmppError::Protocol("unbalanced end tag".to_string()))?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(done),
                        None => return Ok(done),
                    }
                }
                Event::Eof => return Err(XmppError::Closed),
                _ => {}
            }
        }
    }
}

/// Opening of the client side of the component stream.
pub fn stream_header(component: &str) -> String {
    format!(
        "<?xml version='1.0'?><stream:stream xmlns='{}' xmlns:stream='{}' to='{}'>",
        COMPONENT_NS,
        STREAMS_NS,
        escape(component)
    )
}

/// Hex SHA-1 of stream id + shared secret (XEP-0114 section 3).
fn handshake_digest(stream_id: &str, secret: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(stream_id.as_bytes());
    hasher.update(secret.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

pub fn handshake(stream_id: &str, secret: &str) -> String {
    format!("<handshake>{}</handshake>", handshake_digest(stream_id, secret))
}

fn push_attr(out: &mut String, key: &str, value: &str) {
    out.push(' ');
    out.push_str(key);
    out.push_str("='");
    out.push_str(&escape(value));
    out.push('\'');
}

pub fn message_to_xml(msg: &XmppMessage) -> String {
    let mut out = String::from("<message");
    push_attr(&mut out, "from", &msg.from);
    push_attr(&mut out, "to", &msg.to);
    push_attr(&mut out, "type", msg.kind.as_str());
    if let Some(ref id) = msg.id {
        push_attr(&mut out, "id", id);
    }
    out.push('>');
    if let Some(ref body) = msg.body {
        out.push_str("<body>");
        // a literal CR would be normalized to LF by the receiving parser
        out.push_str(&escape(body).replace('\r', "&#13;"));
        out.push_str("</body>");
    }
    if msg.receipt_requested {
        out.push_str(&format!("<request xmlns='{}'/>", RECEIPTS_NS));
    }
    if let Some(ref acked) = msg.receipt_for {
        out.push_str(&format!("<received xmlns='{}'", RECEIPTS_NS));
        push_attr(&mut out, "id", acked);
        out.push_str("/>");
    }
    out.push_str("</message>");
    out
}

/// Characters XML 1.0 can carry at all, escaped or not.
pub fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r') || (c >= ' ' && c != '\u{FFFE}' && c != '\u{FFFF}')
}

/// `service-unavailable` answer to an iq request the component does not handle.
pub fn iq_error_reply(iq: &Element) -> String {
    let mut out = String::from("<iq type='error'");
    if let Some(to) = iq.attr("to") {
        push_attr(&mut out, "from", to);
    }
    if let Some(from) = iq.attr("from") {
        push_attr(&mut out, "to", from);
    }
    if let Some(id) = iq.attr("id") {
        push_attr(&mut out, "id", id);
    }
    out.push_str(&format!(
        "><error type='cancel'><service-unavailable xmlns='{}'/></error></iq>",
        STANZAS_NS
    ));
    out
}
