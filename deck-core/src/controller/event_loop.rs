//! ``src/controller/event_loop.rs``
//! ============================================================================
//! # Plugin runtime: connection lifecycle around the dispatcher
//!
//! `PluginBuilder` collects handlers and configuration; `PluginRuntime::run`
//! owns one connection from start to end:
//!
//! - queue the registration handshake before anything else
//! - spawn the single outbound writer
//! - read frames strictly in order, decode, dispatch
//! - feed timer-fired long presses back into dispatch
//! - on end of stream or shutdown, drain handler tasks and flush the writer

use std::{fmt::Display, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use futures::{Sink, Stream, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::dispatcher::Dispatcher;
use super::handlers::{ActionEventHandler, NoopPlugin, PluginHandler};
use super::key_timing::LongPressFired;
use super::registry::InstanceRegistry;
use super::routing::RoutingTable;
use super::sender::{Sender, run_writer};
use crate::config::{PluginConfig, ShutdownConfig};
use crate::error::{DeckError, DeckResult};
use crate::protocol::inbound::InboundEvent;
use crate::protocol::registration::{Info, Registration};

/// What one connection did, reported when it ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Text frames read from the transport.
    pub frames: u64,
    /// Frames or gestures that were dropped with an error.
    pub rejected: u64,
    /// Handler invocations scheduled.
    pub scheduled: u64,
    /// Whether every handler finished before the drain deadline.
    pub drained: bool,
}

pub struct PluginBuilder {
    plugin_uuid: String,
    register_event: String,
    info: Option<Info>,
    routes: Option<RoutingTable>,
    plugin: Arc<dyn PluginHandler>,
    registry: InstanceRegistry,
    drain_timeout: Option<Duration>,
    log_payloads: bool,
}

impl PluginBuilder {
    #[must_use]
    pub fn new<S1: Into<String>, S2: Into<String>>(plugin_uuid: S1, register_event: S2) -> Self {
        Self {
            plugin_uuid: plugin_uuid.into(),
            register_event: register_event.into(),
            info: None,
            routes: None,
            plugin: Arc::new(NoopPlugin),
            registry: InstanceRegistry::new(),
            drain_timeout: ShutdownConfig::default().drain_timeout,
            log_payloads: false,
        }
    }

    /// Apply timing overrides, drain deadline and payload logging.
    #[must_use]
    pub fn config(mut self, config: &PluginConfig) -> Self {
        self.registry
            .set_timing_overrides(config.key_timing.overrides.clone());
        self.drain_timeout = config.shutdown.drain_timeout;
        self.log_payloads = config.outbound.log_payloads;
        self
    }

    #[must_use]
    pub fn info(mut self, info: Info) -> Self {
        self.info = Some(info);
        self
    }

    /// Replace the standard routing table.
    #[must_use]
    pub fn routes(mut self, routes: RoutingTable) -> Self {
        self.routes = Some(routes);
        self
    }

    #[must_use]
    pub fn plugin<P: PluginHandler + 'static>(mut self, plugin: P) -> Self {
        self.plugin = Arc::new(plugin);
        self
    }

    /// Register an action handler.
    ///
    /// # Errors
    ///
    /// `MissingActionIdentifier` or `DuplicateRegistration`; both are fatal.
    pub fn action<H: ActionEventHandler + 'static>(mut self, handler: H) -> DeckResult<Self> {
        self.registry.register_action(handler)?;
        Ok(self)
    }

    /// Register an action handler the caller keeps a handle to.
    ///
    /// # Errors
    ///
    /// See [`Self::action`].
    pub fn shared_action<H: ActionEventHandler + 'static>(
        mut self,
        handler: Arc<H>,
    ) -> DeckResult<Self> {
        self.registry.register_shared(handler)?;
        Ok(self)
    }

    #[must_use]
    pub const fn drain_timeout(mut self, deadline: Option<Duration>) -> Self {
        self.drain_timeout = deadline;
        self
    }

    /// # Errors
    ///
    /// Only when the standard routing table fails to build.
    pub fn build(self) -> DeckResult<PluginRuntime> {
        let routes: RoutingTable = match self.routes {
            Some(routes) => routes,
            None => RoutingTable::standard()?,
        };

        let (sender, outbound) = Sender::channel(self.plugin_uuid.as_str());
        let sender: Sender = sender.with_payload_logging(self.log_payloads);

        let (dispatcher, long_presses) = Dispatcher::new(
            Arc::new(routes),
            Arc::new(self.registry),
            self.plugin,
            sender,
        );
        let dispatcher: Dispatcher = match self.info {
            Some(info) => dispatcher.with_info(info),
            None => dispatcher,
        };

        info!(
            uuid = %self.plugin_uuid,
            actions = dispatcher.registry().len(),
            "Plugin runtime built"
        );

        Ok(PluginRuntime {
            dispatcher: Arc::new(dispatcher),
            long_presses,
            outbound,
            registration: Registration::new(self.register_event, self.plugin_uuid),
            shutdown: CancellationToken::new(),
            drain_timeout: self.drain_timeout,
        })
    }
}

pub struct PluginRuntime {
    dispatcher: Arc<Dispatcher>,
    long_presses: mpsc::UnboundedReceiver<LongPressFired>,
    outbound: mpsc::UnboundedReceiver<String>,
    registration: Registration,
    shutdown: CancellationToken,
    drain_timeout: Option<Duration>,
}

impl PluginRuntime {
    #[must_use]
    pub fn builder<S1: Into<String>, S2: Into<String>>(
        plugin_uuid: S1,
        register_event: S2,
    ) -> PluginBuilder {
        PluginBuilder::new(plugin_uuid, register_event)
    }

    /// Outbound handle for code outside the handlers.
    #[must_use]
    pub fn sender(&self) -> Sender {
        self.dispatcher.sender().clone()
    }

    #[must_use]
    pub const fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Cancel this token to stop reading and shut down.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Serve one connection until the inbound stream ends or shutdown is
    /// requested.
    ///
    /// Bad frames and failing handlers are logged and skipped; they never
    /// end the connection.
    ///
    /// # Errors
    ///
    /// `ConnectionClosed` if the handshake cannot be queued, `Transport` when
    /// the outbound writer fails.
    pub async fn run<St, E, Si>(self, mut inbound: St, outbound: Si) -> DeckResult<RunSummary>
    where
        St: Stream<Item = Result<String, E>> + Unpin,
        E: Display,
        Si: Sink<String> + Unpin + Send + 'static,
        Si::Error: Display + Send + 'static,
    {
        let Self {
            dispatcher,
            mut long_presses,
            outbound: queued,
            registration,
            shutdown,
            drain_timeout,
        } = self;

        let started_at: DateTime<Utc> = Utc::now();
        let mut frames: u64 = 0;
        let mut rejected: u64 = 0;
        let mut scheduled: u64 = 0;

        dispatcher.sender().try_send(registration.clone())?;
        let writer_shutdown: CancellationToken = CancellationToken::new();
        let mut writer: JoinHandle<DeckResult<()>> =
            tokio::spawn(run_writer(queued, outbound, writer_shutdown.clone()));
        let mut writer_result: Option<DeckResult<()>> = None;

        info!(
            uuid = %registration.uuid,
            register_event = %registration.event,
            "Registration queued, reading events"
        );

        loop {
            tokio::select! {
                biased;

                () = shutdown.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }

                joined = &mut writer => {
                    let result: DeckResult<()> = joined
                        .unwrap_or_else(|e| Err(DeckError::Transport(e.to_string())));
                    error!("Outbound writer stopped early, shutting down");
                    writer_result = Some(result);
                    break;
                }

                Some(fired) = long_presses.recv() => {
                    match dispatcher.dispatch_long_press(fired) {
                        Ok(count) => scheduled += count as u64,
                        Err(_) => rejected += 1,
                    }
                }

                frame = inbound.next() => match frame {
                    Some(Ok(text)) => {
                        frames += 1;
                        let outcome: DeckResult<usize> = InboundEvent::decode(&text)
                            .inspect_err(DeckError::log)
                            .and_then(|raw: InboundEvent| dispatcher.dispatch(&raw));
                        match outcome {
                            Ok(count) => scheduled += count as u64,
                            Err(_) => rejected += 1,
                        }
                    }
                    Some(Err(e)) => {
                        rejected += 1;
                        DeckError::Transport(e.to_string()).log();
                    }
                    None => {
                        info!("Connection closed. Shutting down.");
                        break;
                    }
                },
            }
        }

        dispatcher.key_timing().cancel_all();
        let drained: bool = dispatcher.supervisor().shutdown(drain_timeout).await;

        let writer_result: DeckResult<()> = match writer_result {
            Some(result) => result,
            None => {
                writer_shutdown.cancel();
                writer
                    .await
                    .unwrap_or_else(|e| Err(DeckError::Transport(e.to_string())))
            }
        };

        let summary: RunSummary = RunSummary {
            started_at,
            finished_at: Utc::now(),
            frames,
            rejected,
            scheduled,
            drained,
        };
        debug!(?summary, "Connection finished");

        writer_result.map(|()| summary)
    }
}
