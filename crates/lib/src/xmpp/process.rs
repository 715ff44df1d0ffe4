//! The XMPP boundary task: one session per run, relaying in both directions.

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::queue::Queue;
use crate::shutdown::Shutdown;
use crate::xmpp::error::XmppError;
use crate::xmpp::message::XmppMessage;
use crate::xmpp::session::XmppConnector;

enum Step<'a> {
    Stop,
    Received(Result<Option<XmppMessage>, XmppError>),
    Deliver(Result<mpsc::Permit<'a, XmppMessage>, mpsc::error::SendError<()>>),
    Outbound(Option<XmppMessage>),
}

/// Connect, then relay until shutdown (`Ok`) or until the session fails or closes (`Err`).
///
/// At most one inbound message is held while the gateway is busy; outbound traffic keeps
/// flowing meanwhile, so a gateway blocked on the outbound queue cannot deadlock us.
pub async fn run_xmpp(
    connector: Arc<dyn XmppConnector>,
    inbound: mpsc::Sender<XmppMessage>,
    outbound: Queue<XmppMessage>,
    mut shutdown: Shutdown,
) -> Result<(), XmppError> {
    let mut session = tokio::select! {
        _ = shutdown.wait() => return Ok(()),
        session = connector.connect() => session?,
    };
    let mut outbound_rx = outbound.attach().await;
    let mut pending: Option<XmppMessage> = None;

    loop {
        let step = tokio::select! {
            _ = shutdown.wait() => Step::Stop,
            received = session.recv(), if pending.is_none() => Step::Received(received),
            permit = inbound.reserve(), if pending.is_some() => Step::Deliver(permit),
            msg = outbound_rx.recv() => Step::Outbound(msg),
        };

        match step {
            Step::Stop => {
                if let Err(e) = session.close().await {
                    log::debug!("xmpp: close on shutdown: {}", e);
                }
                log::info!("xmpp: stopped");
                return Ok(());
            }
            Step::Received(Ok(Some(msg))) => pending = Some(msg),
            Step::Received(Ok(None)) => return Err(XmppError::Closed),
            Step::Received(Err(e)) => return Err(e),
            Step::Deliver(Ok(permit)) => {
                if let Some(msg) = pending.take() {
                    permit.send(msg);
                }
            }
            Step::Deliver(Err(_)) | Step::Outbound(None) => return Err(XmppError::GatewayClosed),
            Step::Outbound(Some(msg)) => session.send(&msg).await?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown;
    use crate::xmpp::session::XmppSession;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    struct FakeSession {
        inject: mpsc::UnboundedReceiver<Result<XmppMessage, XmppError>>,
        sent: mpsc::UnboundedSender<XmppMessage>,
    }

    #[async_trait]
    impl XmppSession for FakeSession {
        async fn recv(&mut self) -> Result<Option<XmppMessage>, XmppError> {
            self.inject.recv().await.transpose()
        }

        async fn send(&mut self, msg: &XmppMessage) -> Result<(), XmppError> {
            self.sent.send(msg.clone()).map_err(|_| XmppError::Closed)
        }
    }

    #[derive(Default)]
    struct FakeConnector {
        sessions: Mutex<VecDeque<FakeSession>>,
    }

    #[async_trait]
    impl XmppConnector for FakeConnector {
        async fn connect(&self) -> Result<Box<dyn XmppSession>, XmppError> {
            match self.sessions.lock().unwrap().pop_front() {
                Some(session) => Ok(Box::new(session)),
                None => Err(XmppError::Io(std::io::ErrorKind::ConnectionRefused.into())),
            }
        }
    }

    struct Remote {
        inject: mpsc::UnboundedSender<Result<XmppMessage, XmppError>>,
        sent: mpsc::UnboundedReceiver<XmppMessage>,
    }

    fn connector_with_session() -> (Arc<FakeConnector>, Remote) {
        let (inject_tx, inject_rx) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let connector = FakeConnector::default();
        connector.sessions.lock().unwrap().push_back(FakeSession {
            inject: inject_rx,
            sent: sent_tx,
        });
        (
            Arc::new(connector),
            Remote {
                inject: inject_tx,
                sent: sent_rx,
            },
        )
    }

    fn msg(body: &str) -> XmppMessage {
        XmppMessage::chat("alice@example.com", "+15551230000@sms.example.com", body)
    }

    async fn within<F: std::future::Future>(f: F) -> F::Output {
        tokio::time::timeout(Duration::from_secs(5), f).await.unwrap()
    }

    #[tokio::test]
    async fn relays_both_directions() {
        let (connector, mut remote) = connector_with_session();
        let (inbound_tx, mut inbound_rx) = mpsc::channel(1);
        let outbound = Queue::new();
        let (_trigger, shutdown) = shutdown::channel();
        let task = tokio::spawn(run_xmpp(connector, inbound_tx, outbound.clone(), shutdown));

        remote.inject.send(Ok(msg("up"))).unwrap();
        assert_eq!(within(inbound_rx.recv()).await.unwrap().body.as_deref(), Some("up"));

        outbound.sender().send(msg("down")).await.unwrap();
        assert_eq!(within(remote.sent.recv()).await.unwrap().body.as_deref(), Some("down"));
        assert!(!task.is_finished());
    }

    #[tokio::test]
    async fn outbound_flows_while_gateway_is_busy() {
        let (connector, mut remote) = connector_with_session();
        // nobody drains inbound: one message fills it, the next stays pending
        let (inbound_tx, _inbound_rx) = mpsc::channel(1);
        let outbound = Queue::new();
        let (_trigger, shutdown) = shutdown::channel();
        let _task = tokio::spawn(run_xmpp(connector, inbound_tx, outbound.clone(), shutdown));

        remote.inject.send(Ok(msg("one"))).unwrap();
        remote.inject.send(Ok(msg("two"))).unwrap();
        remote.inject.send(Ok(msg("three"))).unwrap();

        outbound.sender().send(msg("receipt")).await.unwrap();
        assert_eq!(
            within(remote.sent.recv()).await.unwrap().body.as_deref(),
            Some("receipt")
        );
    }

    #[tokio::test]
    async fn closed_stream_ends_the_run() {
        let (connector, remote) = connector_with_session();
        let (inbound_tx, _inbound_rx) = mpsc::channel(1);
        let (_trigger, shutdown) = shutdown::channel();
        let task = tokio::spawn(run_xmpp(connector, inbound_tx, Queue::new(), shutdown));

        drop(remote);
        assert!(matches!(within(task).await.unwrap(), Err(XmppError::Closed)));
    }

    #[tokio::test]
    async fn session_error_ends_the_run() {
        let (connector, remote) = connector_with_session();
        let (inbound_tx, _inbound_rx) = mpsc::channel(1);
        let (_trigger, shutdown) = shutdown::channel();
        let task = tokio::spawn(run_xmpp(connector, inbound_tx, Queue::new(), shutdown));

        remote
            .inject
            .send(Err(XmppError::Stream("system-shutdown".to_string())))
            .unwrap();
        assert!(matches!(
            within(task).await.unwrap(),
            Err(XmppError::Stream(ref c)) if c == "system-shutdown"
        ));
    }

    #[tokio::test]
    async fn connect_failure_is_an_error() {
        let (inbound_tx, _inbound_rx) = mpsc::channel(1);
        let (_trigger, shutdown) = shutdown::channel();
        let result = run_xmpp(
            Arc::new(FakeConnector::default()),
            inbound_tx,
            Queue::new(),
            shutdown,
        )
        .await;
        assert!(matches!(result, Err(XmppError::Io(_))));
    }

    #[tokio::test]
    async fn shutdown_ends_the_run_cleanly() {
        let (connector, _remote) = connector_with_session();
        let (inbound_tx, _inbound_rx) = mpsc::channel(1);
        let (trigger, shutdown) = shutdown::channel();
        let task = tokio::spawn(run_xmpp(connector, inbound_tx, Queue::new(), shutdown));

        trigger.trigger();
        assert!(matches!(within(task).await.unwrap(), Ok(())));
    }

    #[tokio::test]
    async fn outbound_queue_survives_a_reconnect() {
        let (connector, remote) = connector_with_session();
        let (inbound_tx, _inbound_rx) = mpsc::channel(1);
        let outbound = Queue::new();
        let (_trigger, shutdown) = shutdown::channel();
        let first = tokio::spawn(run_xmpp(
            connector,
            inbound_tx.clone(),
            outbound.clone(),
            shutdown.clone(),
        ));
        drop(remote);
        assert!(within(first).await.unwrap().is_err());

        // queued while disconnected, delivered by the next session
        outbound.sender().send(msg("queued")).await.unwrap();
        let (connector, mut remote) = connector_with_session();
        let _second = tokio::spawn(run_xmpp(connector, inbound_tx, outbound, shutdown));
        assert_eq!(
            within(remote.sent.recv()).await.unwrap().body.as_deref(),
            Some("queued")
        );
    }
}
