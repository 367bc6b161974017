//! Outbound sender shared by every handler.
//!
//! All sends funnel through one unbounded channel; a single writer task
//! drains it into the transport sink, so the connection only ever has one
//! writer no matter how many handler tasks send concurrently. Sending never
//! blocks and never fails loudly: a payload that cannot be encoded is logged
//! and dropped.

use std::sync::Arc;

use futures::{Sink, SinkExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{DeckError, DeckResult};
use crate::protocol::inbound::Settings;
use crate::protocol::outbound::{
    LogMessagePayload, OpenUrlPayload, OutboundMessage, SetFeedbackLayoutPayload,
    SetImagePayload, SetStatePayload, SetTitlePayload, SwitchToProfilePayload,
};
use crate::protocol::registration::Registration;

const SEND_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::send");

/// Anything the sender accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    /// JSON object carrying an `event` string; serialized before sending.
    Json(Value),
    /// Already serialized frame, sent verbatim.
    Text(String),
    /// Typed command, serialized with its own `event` tag.
    Message(OutboundMessage),
    /// Connection handshake.
    Registration(Registration),
}

impl Outgoing {
    /// Serialize into one wire frame.
    ///
    /// # Errors
    ///
    /// `InvalidSendPayload` for JSON that is not an object with a string
    /// `event` field.
    pub fn encode(self) -> DeckResult<String> {
        match self {
            Self::Json(value) => {
                let Value::Object(map) = &value else {
                    return Err(DeckError::invalid_send(format!(
                        "expected a JSON object, got {}",
                        json_kind(&value)
                    )));
                };
                if !map.get("event").is_some_and(Value::is_string) {
                    return Err(DeckError::invalid_send("object has no string `event` field"));
                }
                Ok(serde_json::to_string(&value)?)
            }
            Self::Text(text) => Ok(text),
            Self::Message(message) => Ok(serde_json::to_string(&message)?),
            Self::Registration(registration) => Ok(serde_json::to_string(&registration)?),
        }
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl From<Value> for Outgoing {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<Settings> for Outgoing {
    fn from(map: Settings) -> Self {
        Self::Json(Value::Object(map))
    }
}

impl From<String> for Outgoing {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Outgoing {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<OutboundMessage> for Outgoing {
    fn from(message: OutboundMessage) -> Self {
        Self::Message(message)
    }
}

impl From<Registration> for Outgoing {
    fn from(registration: Registration) -> Self {
        Self::Registration(registration)
    }
}

/// Cloneable handle used by handlers to emit commands.
#[derive(Debug, Clone)]
pub struct Sender {
    tx: mpsc::UnboundedSender<String>,
    plugin_uuid: Arc<str>,
    log_payloads: bool,
}

impl Sender {
    /// Create a sender and the receiving end the writer task drains.
    #[must_use]
    pub fn channel<S: Into<Arc<str>>>(plugin_uuid: S) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        let sender: Self = Self {
            tx,
            plugin_uuid: plugin_uuid.into(),
            log_payloads: false,
        };
        (sender, rx)
    }

    /// Debug-log every frame as it is queued.
    #[must_use]
    pub const fn with_payload_logging(mut self, enabled: bool) -> Self {
        self.log_payloads = enabled;
        self
    }

    #[must_use]
    pub fn plugin_uuid(&self) -> &str {
        &self.plugin_uuid
    }

    /// Queue a payload; failures are logged, never returned.
    pub fn send<P: Into<Outgoing>>(&self, payload: P) {
        if let Err(e) = self.try_send(payload) {
            error!(target: SEND_TARGET, error = %e, "outbound message dropped");
        }
    }

    /// Queue a payload and report why it could not be sent.
    ///
    /// # Errors
    ///
    /// `InvalidSendPayload` when encoding is refused, `ConnectionClosed` once
    /// the writer has stopped.
    pub fn try_send<P: Into<Outgoing>>(&self, payload: P) -> DeckResult<()> {
        let frame: String = payload.into().encode()?;
        if self.log_payloads {
            debug!(target: SEND_TARGET, frame = %frame, "queue frame");
        }
        self.tx
            .send(frame)
            .map_err(|_| DeckError::ConnectionClosed)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /* ------------------------- plugin commands ------------------------- */

    pub fn set_global_settings(&self, payload: Settings) {
        self.send(OutboundMessage::SetGlobalSettings {
            context: self.plugin_uuid.to_string(),
            payload,
        });
    }

    pub fn get_global_settings(&self) {
        self.send(OutboundMessage::GetGlobalSettings {
            context: self.plugin_uuid.to_string(),
        });
    }

    pub fn open_url<S: Into<String>>(&self, url: S) {
        self.send(OutboundMessage::OpenUrl {
            payload: OpenUrlPayload { url: url.into() },
        });
    }

    /// Write a line into the host application's own log.
    pub fn log_message<S: Into<String>>(&self, message: S) {
        self.send(OutboundMessage::LogMessage {
            payload: LogMessagePayload {
                message: message.into(),
            },
        });
    }

    pub fn switch_to_profile<S1: Into<String>, S2: Into<String>>(&self, device: S1, profile: S2) {
        self.send(OutboundMessage::SwitchToProfile {
            context: self.plugin_uuid.to_string(),
            device: device.into(),
            payload: SwitchToProfilePayload {
                profile: profile.into(),
            },
        });
    }

    /* ------------------------- action commands ------------------------- */

    pub fn set_settings<S: Into<String>>(&self, context: S, payload: Settings) {
        self.send(OutboundMessage::SetSettings {
            context: context.into(),
            payload,
        });
    }

    pub fn get_settings<S: Into<String>>(&self, context: S) {
        self.send(OutboundMessage::GetSettings {
            context: context.into(),
        });
    }

    pub fn set_title<S: Into<String>>(&self, context: S, payload: SetTitlePayload) {
        self.send(OutboundMessage::SetTitle {
            context: context.into(),
            payload,
        });
    }

    pub fn set_image<S: Into<String>>(&self, context: S, payload: SetImagePayload) {
        self.send(OutboundMessage::SetImage {
            context: context.into(),
            payload,
        });
    }

    pub fn set_feedback<S: Into<String>>(&self, context: S, payload: Settings) {
        self.send(OutboundMessage::SetFeedback {
            context: context.into(),
            payload,
        });
    }

    pub fn set_feedback_layout<S1: Into<String>, S2: Into<String>>(&self, context: S1, layout: S2) {
        self.send(OutboundMessage::SetFeedbackLayout {
            context: context.into(),
            payload: SetFeedbackLayoutPayload {
                layout: layout.into(),
            },
        });
    }

    pub fn show_alert<S: Into<String>>(&self, context: S) {
        self.send(OutboundMessage::ShowAlert {
            context: context.into(),
        });
    }

    pub fn show_ok<S: Into<String>>(&self, context: S) {
        self.send(OutboundMessage::ShowOk {
            context: context.into(),
        });
    }

    pub fn set_state<S: Into<String>>(&self, context: S, state: u32) {
        self.send(OutboundMessage::SetState {
            context: context.into(),
            payload: SetStatePayload { state },
        });
    }

    pub fn send_to_property_inspector<S1: Into<String>, S2: Into<String>>(
        &self,
        action: S1,
        context: S2,
        payload: Value,
    ) {
        self.send(OutboundMessage::SendToPropertyInspector {
            action: action.into(),
            context: context.into(),
            payload,
        });
    }

    pub fn send_to_plugin<S1: Into<String>, S2: Into<String>>(
        &self,
        action: S1,
        context: S2,
        payload: Value,
    ) {
        self.send(OutboundMessage::SendToPlugin {
            action: action.into(),
            context: context.into(),
            payload,
        });
    }
}

/// Drain queued frames into the transport until every [`Sender`] is dropped,
/// `shutdown` fires, or the sink fails. On shutdown, frames already queued
/// are still written.
///
/// # Errors
///
/// `Transport` with the sink's error once a write fails.
pub async fn run_writer<K, E>(
    mut rx: mpsc::UnboundedReceiver<String>,
    mut sink: K,
    shutdown: CancellationToken,
) -> DeckResult<()>
where
    K: Sink<String, Error = E> + Unpin,
    E: std::fmt::Display,
{
    loop {
        let frame: Option<String> = tokio::select! {
            frame = rx.recv() => frame,
            () = shutdown.cancelled() => {
                rx.close();
                rx.recv().await
            }
        };
        let Some(frame) = frame else {
            break;
        };

        if let Err(e) = sink.send(frame).await {
            error!(target: SEND_TARGET, error = %e, "transport write failed, stopping writer");
            rx.close();
            return Err(DeckError::Transport(e.to_string()));
        }
    }

    if let Err(e) = sink.close().await {
        debug!(target: SEND_TARGET, error = %e, "closing transport sink failed");
    }
    info!(target: SEND_TARGET, "outbound writer stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc as fmpsc;
    use futures::StreamExt;
    use serde_json::json;

    fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<Value> {
        let mut frames: Vec<Value> = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(serde_json::from_str(&frame).unwrap());
        }
        frames
    }

    #[test]
    fn test_accepts_object_text_and_typed_messages() {
        let (sender, mut rx) = Sender::channel("plugin-uuid");

        sender.send(json!({"event": "getSettings", "context": "ctx1"}));
        sender.send(r#"{"event":"showOk","context":"ctx1"}"#);
        sender.send(OutboundMessage::ShowAlert {
            context: "ctx2".into(),
        });

        let frames: Vec<Value> = drain(&mut rx);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0]["event"], "getSettings");
        assert_eq!(frames[1]["event"], "showOk");
        assert_eq!(frames[2], json!({"event": "showAlert", "context": "ctx2"}));
    }

    #[test]
    fn test_text_is_sent_verbatim() {
        let (sender, mut rx) = Sender::channel("plugin-uuid");
        let raw: &str = r#"{ "event" : "openUrl", "payload": {"url": "https://example.com"} }"#;
        sender.send(raw);
        assert_eq!(rx.try_recv().unwrap(), raw);
    }

    #[test]
    fn test_invalid_payloads_are_dropped_not_raised() {
        let (sender, mut rx) = Sender::channel("plugin-uuid");

        sender.send(json!(42));
        sender.send(json!(["event"]));
        sender.send(json!({"context": "no event"}));

        assert!(rx.try_recv().is_err());
        let err: DeckError = sender.try_send(json!(null)).unwrap_err();
        assert!(matches!(err, DeckError::InvalidSendPayload { .. }));
    }

    #[test]
    fn test_plugin_commands_use_plugin_uuid_as_context() {
        let (sender, mut rx) = Sender::channel("plugin-uuid");

        let mut settings: Settings = Settings::new();
        settings.insert("theme".into(), json!("dark"));
        sender.set_global_settings(settings);
        sender.get_global_settings();
        sender.switch_to_profile("D1", "Main");

        let frames: Vec<Value> = drain(&mut rx);
        assert_eq!(
            frames[0],
            json!({"event": "setGlobalSettings", "context": "plugin-uuid", "payload": {"theme": "dark"}})
        );
        assert_eq!(frames[1]["context"], "plugin-uuid");
        assert_eq!(frames[2]["device"], "D1");
    }

    #[test]
    fn test_send_after_writer_gone_reports_closed() {
        let (sender, rx) = Sender::channel("plugin-uuid");
        drop(rx);
        assert!(sender.is_closed());
        assert!(matches!(
            sender.try_send(OutboundMessage::ShowOk { context: "c".into() }),
            Err(DeckError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_writer_forwards_frames_in_order() {
        let (sender, rx) = Sender::channel("plugin-uuid");
        let (sink, mut out) = fmpsc::unbounded::<String>();

        let writer = tokio::spawn(run_writer(rx, sink, CancellationToken::new()));
        sender.show_ok("a");
        sender.show_alert("b");
        sender.set_state("c", 1);
        drop(sender);

        writer.await.unwrap().unwrap();

        let events: Vec<String> = out
            .by_ref()
            .map(|frame: String| {
                let value: Value = serde_json::from_str(&frame).unwrap();
                value["event"].as_str().unwrap().to_owned()
            })
            .collect()
            .await;
        assert_eq!(events, vec!["showOk", "showAlert", "setState"]);
    }

    #[tokio::test]
    async fn test_writer_flushes_queue_on_shutdown() {
        let (sender, rx) = Sender::channel("plugin-uuid");
        let (sink, out) = fmpsc::unbounded::<String>();
        let shutdown: CancellationToken = CancellationToken::new();

        sender.show_ok("a");
        sender.show_ok("b");
        shutdown.cancel();

        run_writer(rx, sink, shutdown).await.unwrap();

        let frames: Vec<String> = out.collect().await;
        assert_eq!(frames.len(), 2);
        assert!(sender.is_closed());
    }
}
