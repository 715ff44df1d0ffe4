//! TCP component session (XEP-0114): handshake, reader task, writes.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::config::{resolve_shared_secret, Config};
use crate::xmpp::error::XmppError;
use crate::xmpp::message::XmppMessage;
use crate::xmpp::session::{XmppConnector, XmppSession};
use crate::xmpp::stanza::{
    handshake, iq_error_reply, message_to_xml, stream_header, Stanza, StanzaReader, STREAM_CLOSE,
};

type SharedWriter = Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>;

/// Connects to the XMPP server's component port.
pub struct ComponentConnector {
    addr: String,
    component: String,
    secret: String,
}

impl ComponentConnector {
    pub fn new(
        host: &str,
        port: u16,
        component: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            addr: format!("{}:{}", host.trim(), port),
            component: component.into(),
            secret: secret.into(),
        }
    }

    /// Build from config. None when no shared secret is configured.
    pub fn from_config(config: &Config) -> Option<Self> {
        let secret = resolve_shared_secret(config)?;
        Some(Self::new(
            &config.xmpp.host,
            config.xmpp.port,
            config.xmpp.component_name.trim(),
            secret,
        ))
    }
}

#[async_trait]
impl XmppConnector for ComponentConnector {
    async fn connect(&self) -> Result<Box<dyn XmppSession>, XmppError> {
        log::info!("xmpp: connecting to {} as {}", self.addr, self.component);
        let stream = TcpStream::connect(&self.addr).await?;
        let (read, write) = stream.into_split();
        let session = ComponentSession::open(read, write, &self.component, &self.secret).await?;
        Ok(Box::new(session))
    }
}

/// Authenticated component stream. Inbound stanzas are read by a background task.
pub struct ComponentSession {
    writer: SharedWriter,
    inbound: mpsc::Receiver<Result<XmppMessage, XmppError>>,
    reader_task: JoinHandle<()>,
}

impl ComponentSession {
    /// Open the stream and complete the handshake over an arbitrary byte stream.
    pub async fn open<R, W>(
        read: R,
        write: W,
        component: &str,
        secret: &str,
    ) -> Result<Self, XmppError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut reader = StanzaReader::new(BufReader::new(read));
        let boxed: Box<dyn AsyncWrite + Send + Unpin> = Box::new(write);
        let writer: SharedWriter = Arc::new(Mutex::new(boxed));

        write_raw(&writer, &stream_header(component)).await?;
        let stream_id = reader.read_stream_header().await?;
        write_raw(&writer, &handshake(&stream_id, secret)).await?;
        match reader.next_stanza().await? {
            Some(Stanza::Handshake) => {}
            Some(Stanza::StreamError(condition)) => return Err(XmppError::Stream(condition)),
            Some(other) => {
                return Err(XmppError::Protocol(format!(
                    "expected handshake, got {:?}",
                    other
                )))
            }
            None => return Err(XmppError::Closed),
        }
        log::info!("xmpp: component {} authenticated", component);

        let (tx, inbound) = mpsc::channel(16);
        let reader_task = tokio::spawn(read_stanzas(reader, writer.clone(), tx));
        Ok(Self {
            writer,
            inbound,
            reader_task,
        })
    }
}

impl Drop for ComponentSession {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

#[async_trait]
impl XmppSession for ComponentSession {
    async fn recv(&mut self) -> Result<Option<XmppMessage>, XmppError> {
        match self.inbound.recv().await {
            Some(Ok(msg)) => Ok(Some(msg)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    async fn send(&mut self, msg: &XmppMessage) -> Result<(), XmppError> {
        write_raw(&self.writer, &message_to_xml(msg)).await
    }

    async fn close(&mut self) -> Result<(), XmppError> {
        write_raw(&self.writer, STREAM_CLOSE).await
    }
}

async fn write_raw(writer: &SharedWriter, data: &str) -> Result<(), XmppError> {
    let mut w = writer.lock().await;
    w.write_all(data.as_bytes()).await?;
    w.flush().await?;
    Ok(())
}

/// Forward messages to the session; refuse iq requests; end on close or error.
async fn read_stanzas<R>(
    mut reader: StanzaReader<R>,
    writer: SharedWriter,
    tx: mpsc::Sender<Result<XmppMessage, XmppError>>,
) where
    R: AsyncBufRead + Unpin,
{
    loop {
        let item = match reader.next_stanza().await {
            Ok(Some(Stanza::Message(msg))) => Ok(msg),
            Ok(Some(Stanza::Iq(iq))) => {
                if !matches!(iq.attr("type"), Some("get") | Some("set")) {
                    continue;
                }
                match write_raw(&writer, &iq_error_reply(&iq)).await {
                    Ok(()) => continue,
                    Err(e) => Err(e),
                }
            }
            Ok(Some(Stanza::StreamError(condition))) => Err(XmppError::Stream(condition)),
            Ok(Some(other)) => {
                log::debug!("xmpp: ignoring stanza {:?}", other);
                continue;
            }
            Ok(None) => {
                log::info!("xmpp: server closed the stream");
                return;
            }
            Err(e) => Err(e),
        };
        let done = item.is_err();
        if tx.send(item).await.is_err() || done {
            return;
        }
    }
}
