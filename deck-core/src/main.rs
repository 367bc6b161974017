//! src/main.rs
//! deck-echo: a counter plugin speaking line-delimited JSON on stdin/stdout

use std::env;

use ahash::RandomState;
use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Value, json};
use tokio::{
    io::{stdin, stdout},
    signal,
};
use tokio_util::{
    codec::{FramedRead, FramedWrite, LinesCodec},
    sync::CancellationToken,
};
use tracing::{info, warn};

use deck_core::{
    Logger, PluginConfig,
    controller::{
        ActionEventHandler, EventContext, HandlerResult, KeyTiming, PluginEventObserver,
        PluginRuntime, RunSummary,
    },
    protocol::{
        Info,
        inbound::{AppearanceEvent, KeyEvent},
        outbound::SetTitlePayload,
    },
};

const COUNTER_ACTION: &str = "org.deck.echo.counter";

#[tokio::main]
async fn main() -> Result<()> {
    let config: PluginConfig = PluginConfig::load(None)
        .await
        .context("Failed to load configuration")?;
    let _guard = Logger::init(&config.logging)
        .await
        .context("Failed to initialize logging")?;

    let uuid: String = env::var("DECK_PLUGIN_UUID").unwrap_or_else(|_| "deck-echo".to_string());
    let register_event: String =
        env::var("DECK_REGISTER_EVENT").unwrap_or_else(|_| "registerPlugin".to_string());

    let mut builder = PluginRuntime::builder(uuid, register_event)
        .action(Counter::default())
        .context("Failed to register counter action")?
        .config(&config);

    if let Ok(text) = env::var("DECK_INFO") {
        match Info::from_json(&text) {
            Ok(info) => builder = builder.info(info),
            Err(e) => warn!(error = %e, "Ignoring unparsable DECK_INFO"),
        }
    }

    let runtime: PluginRuntime = builder.build().context("Failed to build plugin runtime")?;
    let shutdown: CancellationToken = runtime.shutdown_token();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Interrupt received");
            shutdown.cancel();
        }
    });

    let inbound = FramedRead::new(stdin(), LinesCodec::new());
    let outbound = FramedWrite::new(stdout(), LinesCodec::new());

    let summary: RunSummary = runtime
        .run(inbound, outbound)
        .await
        .context("Plugin connection failed")?;

    info!(
        frames = summary.frames,
        rejected = summary.rejected,
        scheduled = summary.scheduled,
        drained = summary.drained,
        elapsed_ms = (summary.finished_at - summary.started_at).num_milliseconds(),
        "deck-echo exited cleanly"
    );
    Ok(())
}

/// Short press counts up, long press resets, double press acknowledges.
#[derive(Default)]
struct Counter {
    counts: DashMap<String, u64, RandomState>,
}

impl Counter {
    fn show(&self, cx: &EventContext, context: &str, count: u64) {
        cx.sender()
            .set_title(context, SetTitlePayload::new(count.to_string()));
    }

    fn store(&self, cx: &EventContext, context: &str, count: u64) {
        self.counts.insert(context.to_owned(), count);
        if let Some(settings) = json!({ "count": count }).as_object() {
            cx.sender().set_settings(context, settings.clone());
        }
        self.show(cx, context, count);
    }
}

impl PluginEventObserver for Counter {}

#[async_trait]
impl ActionEventHandler for Counter {
    fn action_id(&self) -> &str {
        COUNTER_ACTION
    }

    fn key_timing(&self) -> Option<KeyTiming> {
        Some(KeyTiming::default())
    }

    async fn on_will_appear(&self, cx: &EventContext, event: &AppearanceEvent) -> HandlerResult {
        let count: u64 = event
            .payload
            .settings
            .get("count")
            .and_then(Value::as_u64)
            .unwrap_or_default();
        self.counts.insert(event.target.context.clone(), count);
        self.show(cx, &event.target.context, count);
        Ok(())
    }

    async fn on_will_disappear(&self, _cx: &EventContext, event: &AppearanceEvent) -> HandlerResult {
        self.counts.remove(&event.target.context);
        Ok(())
    }

    async fn on_key_up(&self, cx: &EventContext, event: &KeyEvent) -> HandlerResult {
        let context: &str = &event.target.context;
        let next: u64 = self.counts.get(context).map_or(0, |count| *count) + 1;
        self.store(cx, context, next);
        Ok(())
    }

    async fn on_key_long_press(&self, cx: &EventContext, event: &KeyEvent) -> HandlerResult {
        info!(context = %event.target.context, "Counter reset");
        self.store(cx, &event.target.context, 0);
        Ok(())
    }

    async fn on_key_double_press(&self, cx: &EventContext, event: &KeyEvent) -> HandlerResult {
        cx.sender().show_ok(event.target.context.as_str());
        Ok(())
    }
}
