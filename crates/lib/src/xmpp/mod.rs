//! XMPP boundary: component session (XEP-0114) and the task relaying messages to and from the gateway.

mod component;
mod error;
mod message;
mod process;
mod session;
mod stanza;

pub use component::{ComponentConnector, ComponentSession};
pub use error::XmppError;
pub use message::{MessageKind, XmppMessage};
pub use process::run_xmpp;
pub use session::{XmppConnector, XmppSession};
pub use stanza::is_xml_char;
