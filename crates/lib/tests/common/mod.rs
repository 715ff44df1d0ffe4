//! In-memory stand-ins for the SMS provider and the XMPP server.

#![allow(dead_code)]

use async_trait::async_trait;
use lib::config::Config;
use lib::sms::{RxSms, Sms, SmsError, SmsProvider, TwilioProvider};
use lib::xmpp::{XmppConnector, XmppError, XmppMessage, XmppSession};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub const COMPONENT: &str = "sms.example.com";
pub const ALICE: &str = "alice@example.com";
pub const ALICE_PHONE: &str = "+15559998888";
pub const BOB_PHONE: &str = "+15551230000";

pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

pub fn test_config(http_port: u16) -> Config {
    let mut config = Config::default();
    config.http.port = http_port;
    config.xmpp.component_name = COMPONENT.to_string();
    config.xmpp.shared_secret = Some("secret".to_string());
    config.users.insert(ALICE.to_string(), ALICE_PHONE.to_string());
    config.supervisor.xmpp_cooldown_ms = 20;
    config
}

pub async fn within<F: std::future::Future>(f: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), f)
        .await
        .expect("timed out")
}

/// Records sends and hands out tracking ids T1, T2, ...; decodes Twilio-shaped webhooks.
pub struct FakeProvider {
    decoder: TwilioProvider,
    sent: mpsc::UnboundedSender<Sms>,
    count: AtomicUsize,
}

impl FakeProvider {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Sms>) {
        let (sent, rx) = mpsc::unbounded_channel();
        let provider = Self {
            decoder: TwilioProvider::new("AC0", "token", None, Some("http://127.0.0.1:1".to_string())),
            sent,
            count: AtomicUsize::new(0),
        };
        (Arc::new(provider), rx)
    }
}

#[async_trait]
impl SmsProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    async fn send(&self, from: &str, to: &str, body: &str) -> Result<String, SmsError> {
        let n = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.sent.send(Sms {
            from: from.to_string(),
            to: to.to_string(),
            body: body.to_string(),
        });
        Ok(format!("T{}", n))
    }

    fn decode_webhook(&self, form: &HashMap<String, String>) -> Result<RxSms, SmsError> {
        self.decoder.decode_webhook(form)
    }
}

/// Test side of one XMPP session: inject stanzas from the server, observe what the
/// component wrote. Dropping it closes the session.
pub struct Remote {
    pub inject: mpsc::UnboundedSender<XmppMessage>,
    pub sent: mpsc::UnboundedReceiver<XmppMessage>,
}

struct FakeSession {
    inject: mpsc::UnboundedReceiver<XmppMessage>,
    sent: mpsc::UnboundedSender<XmppMessage>,
}

#[async_trait]
impl XmppSession for FakeSession {
    async fn recv(&mut self) -> Result<Option<XmppMessage>, XmppError> {
        Ok(self.inject.recv().await)
    }

    async fn send(&mut self, msg: &XmppMessage) -> Result<(), XmppError> {
        self.sent.send(msg.clone()).map_err(|_| XmppError::Closed)
    }
}

/// Every connect yields a fresh session whose `Remote` is handed to the test.
/// With `refuse` set, connects fail instead.
pub struct FakeConnector {
    remotes: mpsc::UnboundedSender<Remote>,
    refuse: bool,
}

impl FakeConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Remote>) {
        let (remotes, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { remotes, refuse: false }), rx)
    }

    pub fn refusing() -> Arc<Self> {
        let (remotes, _) = mpsc::unbounded_channel();
        Arc::new(Self { remotes, refuse: true })
    }
}

#[async_trait]
impl XmppConnector for FakeConnector {
    async fn connect(&self) -> Result<Box<dyn XmppSession>, XmppError> {
        if self.refuse {
            return Err(XmppError::Io(std::io::ErrorKind::ConnectionRefused.into()));
        }
        let (inject_tx, inject_rx) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let remote = Remote {
            inject: inject_tx,
            sent: sent_rx,
        };
        if self.remotes.send(remote).is_err() {
            return Err(XmppError::Closed);
        }
        Ok(Box::new(FakeSession {
            inject: inject_rx,
            sent: sent_tx,
        }))
    }
}
