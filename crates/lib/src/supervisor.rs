//! Supervisor: runs the gateway and both boundaries, restarting whichever ends.
//!
//! The queues between the tasks are created once here and outlive every restart.
//! The gateway and HTTP tasks restart immediately; the XMPP task waits a cool-down
//! first so a dead server is not hammered with reconnects.

use anyhow::{Context, Result};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::{Config, GatewayConfig, HttpConfig};
use crate::gateway::Gateway;
use crate::queue::Queue;
use crate::routing::AddressBook;
use crate::shutdown::{self, Shutdown, ShutdownTrigger};
use crate::sms::{bind_http, select_provider, serve_http, SmsEvent, SmsProvider, SmsState};
use crate::xmpp::{run_xmpp, ComponentConnector, XmppConnector, XmppMessage};

/// A run that lasted this long resets the restart count and the XMPP cool-down.
const STABLE_AFTER: Duration = Duration::from_secs(60);

/// How long tasks get to stop after shutdown before they are aborted.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Gateway,
    Http,
    Xmpp,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskKind::Gateway => "gateway",
            TaskKind::Http => "HTTP",
            TaskKind::Xmpp => "XMPP",
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct RestartPolicy {
    cooldown: Duration,
    max_cooldown: Duration,
    max_restarts: Option<u32>,
}

#[derive(Debug, Default)]
struct RestartState {
    consecutive: u32,
    next_cooldown: Option<Duration>,
}

impl RestartPolicy {
    /// Delay before restarting `kind` after a run that lasted `uptime`.
    /// None once the task has used up its consecutive restarts.
    fn next_delay(&self, kind: TaskKind, state: &mut RestartState, uptime: Duration) -> Option<Duration> {
        if uptime >= STABLE_AFTER {
            *state = RestartState::default();
        }
        if let Some(max) = self.max_restarts {
            if state.consecutive >= max {
                return None;
            }
        }
        state.consecutive += 1;
        if kind != TaskKind::Xmpp {
            return Some(Duration::ZERO);
        }
        let delay = state.next_cooldown.unwrap_or(self.cooldown);
        state.next_cooldown = Some((delay * 2).min(self.max_cooldown));
        Some(delay)
    }
}

/// One supervised task and its restart bookkeeping.
struct Slot {
    kind: TaskKind,
    handle: JoinHandle<Result<()>>,
    started: Instant,
    restarts: RestartState,
}

pub struct Supervisor {
    http: HttpConfig,
    policy: GatewayConfig,
    restart: RestartPolicy,
    book: Arc<AddressBook>,
    provider: Arc<dyn SmsProvider>,
    connector: Arc<dyn XmppConnector>,
    sms: Queue<SmsEvent>,
    xmpp_in: Queue<XmppMessage>,
    outbound: Queue<XmppMessage>,
}

impl Supervisor {
    pub fn new(
        config: &Config,
        provider: Arc<dyn SmsProvider>,
        connector: Arc<dyn XmppConnector>,
    ) -> Self {
        Self {
            http: config.http.clone(),
            policy: config.gateway,
            restart: RestartPolicy {
                cooldown: config.supervisor.xmpp_cooldown(),
                max_cooldown: config.supervisor.max_cooldown(),
                max_restarts: config.supervisor.max_restarts,
            },
            book: Arc::new(AddressBook::new(
                config.xmpp.component_name.trim(),
                &config.users,
            )),
            provider,
            connector,
            sms: Queue::new(),
            xmpp_in: Queue::new(),
            outbound: Queue::new(),
        }
    }

    /// Run until `shutdown` fires (`Ok`) or a task exhausts its restarts (`Err`).
    /// Fails before starting anything if the HTTP address cannot be bound.
    pub async fn run(self, mut shutdown: Shutdown) -> Result<()> {
        let listener = bind_http(&self.http).await?;
        if self.http.basic_auth().is_none() {
            log::warn!("http: no basic auth configured; webhooks are unauthenticated");
        }
        let (trigger, tasks) = shutdown::channel();

        let mut gateway = self.start(TaskKind::Gateway, Duration::ZERO, None, &tasks);
        let mut http = self.start(TaskKind::Http, Duration::ZERO, Some(listener), &tasks);
        let mut xmpp = self.start(TaskKind::Xmpp, Duration::ZERO, None, &tasks);

        loop {
            let (kind, outcome) = tokio::select! {
                _ = shutdown.wait() => break,
                r = &mut gateway.handle => (TaskKind::Gateway, r),
                r = &mut http.handle => (TaskKind::Http, r),
                r = &mut xmpp.handle => (TaskKind::Xmpp, r),
            };
            let slot = match kind {
                TaskKind::Gateway => &mut gateway,
                TaskKind::Http => &mut http,
                TaskKind::Xmpp => &mut xmpp,
            };
            match outcome {
                Ok(Ok(())) => log::warn!("{} task exited", kind),
                Ok(Err(e)) => log::error!("{} task failed: {:#}", kind, e),
                Err(e) if e.is_panic() => log::error!("{} task panicked", kind),
                Err(e) => log::error!("{} task ended: {}", kind, e),
            }

            let uptime = slot.started.elapsed();
            let Some(delay) = self.restart.next_delay(kind, &mut slot.restarts, uptime) else {
                log::error!(
                    "{} task failed {} times in a row; stopping",
                    kind,
                    slot.restarts.consecutive
                );
                let others = [gateway, http, xmpp]
                    .into_iter()
                    .filter(|s| s.kind != kind)
                    .collect();
                drain(&trigger, others).await;
                anyhow::bail!("{} task exceeded its restart limit", kind);
            };
            if delay.is_zero() {
                log::info!("restarting {} task", kind);
            } else {
                log::info!("restarting {} task in {:?}", kind, delay);
            }
            let restarts = std::mem::take(&mut slot.restarts);
            *slot = self.start(kind, delay, None, &tasks);
            slot.restarts = restarts;
        }

        log::info!("shutting down");
        drain(&trigger, vec![gateway, http, xmpp]).await;
        Ok(())
    }

    /// Spawn one run of `kind`, after `delay` unless shutdown comes first.
    fn start(
        &self,
        kind: TaskKind,
        delay: Duration,
        listener: Option<TcpListener>,
        shutdown: &Shutdown,
    ) -> Slot {
        let shutdown = shutdown.clone();
        let handle = match kind {
            TaskKind::Gateway => {
                let gateway = Gateway::new(
                    self.book.clone(),
                    self.provider.clone(),
                    self.policy,
                    self.outbound.sender(),
                );
                let queues = (self.sms.clone(), self.xmpp_in.clone());
                tokio::spawn(gateway_task(gateway, queues, delay, shutdown))
            }
            TaskKind::Http => {
                let state = SmsState {
                    provider: self.provider.clone(),
                    gateway_tx: self.sms.sender(),
                    auth: self.http.basic_auth(),
                };
                tokio::spawn(http_task(self.http.clone(), listener, state, delay, shutdown))
            }
            TaskKind::Xmpp => tokio::spawn(xmpp_task(
                self.connector.clone(),
                self.xmpp_in.sender(),
                self.outbound.clone(),
                delay,
                shutdown,
            )),
        };
        Slot {
            kind,
            handle,
            started: Instant::now() + delay,
            restarts: RestartState::default(),
        }
    }
}

async fn gateway_task(
    gateway: Gateway,
    (sms, xmpp_in): (Queue<SmsEvent>, Queue<XmppMessage>),
    delay: Duration,
    mut shutdown: Shutdown,
) -> Result<()> {
    if !cooldown(delay, &mut shutdown).await {
        return Ok(());
    }
    gateway.run(sms, xmpp_in, shutdown).await?;
    Ok(())
}

/// The first run serves on the listener bound at startup; restarts bind again.
async fn http_task(
    http: HttpConfig,
    listener: Option<TcpListener>,
    state: SmsState,
    delay: Duration,
    mut shutdown: Shutdown,
) -> Result<()> {
    if !cooldown(delay, &mut shutdown).await {
        return Ok(());
    }
    let listener = match listener {
        Some(listener) => listener,
        None => bind_http(&http).await?,
    };
    serve_http(listener, state, shutdown).await
}

async fn xmpp_task(
    connector: Arc<dyn XmppConnector>,
    inbound: mpsc::Sender<XmppMessage>,
    outbound: Queue<XmppMessage>,
    delay: Duration,
    mut shutdown: Shutdown,
) -> Result<()> {
    if !cooldown(delay, &mut shutdown).await {
        return Ok(());
    }
    run_xmpp(connector, inbound, outbound, shutdown).await?;
    Ok(())
}

/// False if shutdown fired during the wait.
async fn cooldown(delay: Duration, shutdown: &mut Shutdown) -> bool {
    if delay.is_zero() {
        return true;
    }
    tokio::select! {
        _ = shutdown.wait() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

/// Signal the tasks to stop and wait for them, aborting any that outlast the grace period.
async fn drain(trigger: &ShutdownTrigger, slots: Vec<Slot>) {
    trigger.trigger();
    let deadline = Instant::now() + SHUTDOWN_GRACE;
    for mut slot in slots {
        match tokio::time::timeout_at(deadline, &mut slot.handle).await {
            Ok(Ok(Ok(()))) => log::debug!("{} task stopped", slot.kind),
            Ok(Ok(Err(e))) => log::warn!("{} task failed while stopping: {:#}", slot.kind, e),
            Ok(Err(e)) => log::warn!("{} task ended while stopping: {}", slot.kind, e),
            Err(_) => {
                log::warn!("{} task did not stop in time; aborting", slot.kind);
                slot.handle.abort();
            }
        }
    }
}

/// Validate config, pick the SMS provider, and supervise until SIGINT/SIGTERM.
/// Configuration and provider errors are returned before any task starts.
pub async fn run(config: Config) -> Result<()> {
    config.validate()?;
    let provider = select_provider(&config).context("selecting SMS provider")?;
    let connector = ComponentConnector::from_config(&config)
        .context("xmpp.sharedSecret (or SMSXMPP_XMPP_SECRET) is required")?;
    log::info!(
        "starting: component {} via {}:{}, SMS provider {}",
        config.xmpp.component_name.trim(),
        config.xmpp.host,
        config.xmpp.port,
        provider.name()
    );

    let (trigger, shutdown) = shutdown::channel();
    tokio::spawn(async move {
        shutdown::signal().await;
        trigger.trigger();
    });

    Supervisor::new(&config, provider, Arc::new(connector))
        .run(shutdown)
        .await
}
