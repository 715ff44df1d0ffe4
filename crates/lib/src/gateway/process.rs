//! The gateway loop: one event at a time from either boundary.

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::{GatewayConfig, UnknownStatusPolicy, XmppErrorPolicy};
use crate::gateway::error::{GatewayError, TranslateError};
use crate::gateway::receipts::ReceiptTable;
use crate::gateway::translate::{pending_receipt, sms_to_xmpp, xmpp_to_sms};
use crate::queue::Queue;
use crate::routing::AddressBook;
use crate::shutdown::Shutdown;
use crate::sms::{RxSms, Sms, SmsEvent, SmsOutcome, SmsProvider, SmsStatus};
use crate::xmpp::XmppMessage;

/// One gateway run. Build a new one per restart; the receipt table goes with it.
pub struct Gateway {
    book: Arc<AddressBook>,
    provider: Arc<dyn SmsProvider>,
    policy: GatewayConfig,
    receipts: ReceiptTable,
    outbound: mpsc::Sender<XmppMessage>,
}

impl Gateway {
    pub fn new(
        book: Arc<AddressBook>,
        provider: Arc<dyn SmsProvider>,
        policy: GatewayConfig,
        outbound: mpsc::Sender<XmppMessage>,
    ) -> Self {
        Self {
            book,
            provider,
            policy,
            receipts: ReceiptTable::new(),
            outbound,
        }
    }

    pub fn receipts(&self) -> &ReceiptTable {
        &self.receipts
    }

    /// Process events until shutdown (`Ok`) or a task-fatal condition (`Err`).
    pub async fn run(
        self,
        sms: Queue<SmsEvent>,
        xmpp_in: Queue<XmppMessage>,
        mut shutdown: Shutdown,
    ) -> Result<(), GatewayError> {
        let mut sms_rx = sms.attach().await;
        let mut xmpp_rx = xmpp_in.attach().await;
        log::info!("gateway: running");

        loop {
            tokio::select! {
                _ = shutdown.wait() => {
                    log::info!("gateway: stopping");
                    return Ok(());
                }
                event = sms_rx.recv() => match event {
                    Some(event) => self.handle_sms(event).await?,
                    None => return Err(GatewayError::QueueClosed("SMS")),
                },
                msg = xmpp_rx.recv() => match msg {
                    Some(msg) => self.handle_xmpp(msg).await?,
                    None => return Err(GatewayError::QueueClosed("inbound XMPP")),
                },
            }
        }
    }

    /// Every path posts exactly one outcome, except a fatal one: that drops the reply
    /// with the event and the HTTP caller sees the gateway as unavailable.
    async fn handle_sms(&self, event: SmsEvent) -> Result<(), GatewayError> {
        let SmsEvent { rx, reply } = event;
        match rx {
            RxSms::Message(sms) => {
                reply.post(self.forward_sms(&sms).await);
            }
            RxSms::Status { id, status } => match status {
                SmsStatus::Delivered => {
                    reply.post(self.deliver_receipt(&id).await);
                }
                SmsStatus::Unrecognized(code) => match self.policy.unknown_status {
                    UnknownStatusPolicy::Crash => {
                        return Err(GatewayError::UnexpectedStatus(code));
                    }
                    UnknownStatusPolicy::Ignore => {
                        log::warn!("gateway: ignoring unknown status {:?} for {}", code, id);
                        reply.post(Ok(()));
                    }
                },
                other => {
                    log::debug!("gateway: SMS {} is {}", id, other);
                    reply.post(Ok(()));
                }
            },
        }
        Ok(())
    }

    async fn forward_sms(&self, sms: &Sms) -> SmsOutcome {
        let msg = sms_to_xmpp(&self.book, sms)?;
        log::debug!("gateway: SMS {} -> {} becomes XMPP {} -> {}", sms.from, sms.to, msg.from, msg.to);
        self.outbound
            .send(msg)
            .await
            .map_err(|_| TranslateError::OutboundClosed)
    }

    async fn deliver_receipt(&self, id: &str) -> SmsOutcome {
        let Some(receipt) = self.receipts.take(id).await else {
            log::debug!("gateway: SMS {} delivered; no receipt pending", id);
            return Ok(());
        };
        log::debug!("gateway: SMS {} delivered; receipt to {}", id, receipt.to);
        self.outbound
            .send(receipt)
            .await
            .map_err(|_| TranslateError::OutboundClosed)
    }

    async fn handle_xmpp(&self, msg: XmppMessage) -> Result<(), GatewayError> {
        let sms = match xmpp_to_sms(&self.book, &msg) {
            Ok(sms) => sms,
            Err(TranslateError::Ignore) => {
                log::debug!("gateway: ignoring {} message from {}", msg.kind.as_str(), msg.from);
                return Ok(());
            }
            Err(e) => return self.xmpp_failure(GatewayError::Translate(e)),
        };
        let id = match self.provider.send(&sms.from, &sms.to, &sms.body).await {
            Ok(id) => id,
            Err(e) => return self.xmpp_failure(e.into()),
        };
        log::info!("gateway: sent SMS {} from {} to {}", id, sms.from, sms.to);

        if let Some(receipt) = pending_receipt(&msg) {
            self.receipts.put(id, receipt).await;
        }
        Ok(())
    }

    fn xmpp_failure(&self, err: GatewayError) -> Result<(), GatewayError> {
        match self.policy.xmpp_errors {
            XmppErrorPolicy::Crash => Err(err),
            XmppErrorPolicy::Drop => {
                log::warn!("gateway: dropping XMPP message: {}", err);
                Ok(())
            }
        }
    }
}
