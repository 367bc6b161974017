//! src/controller/key_timing.rs
//! ============================================================================
//! # Key Timing Engine
//!
//! Turns the raw `keyDown` / `keyUp` pairs of one button into press gestures:
//!
//! - a key held for `long_press` becomes one long press, and the release
//!   that follows is swallowed;
//! - a release within `double_press` of the previous release becomes a
//!   double press;
//! - anything else is delivered unchanged.
//!
//! Timer-fired long presses leave the engine through the receiver returned
//! by [`KeyTimingEngine::new`], the same shape as the debouncer utilities.
//! Every mutation of a context's state happens under that context's mutex,
//! and a timer only fires while its watch id is still the armed one.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::{
    sync::mpsc,
    task::AbortHandle,
    time::{Instant, sleep},
};
use tracing::{debug, trace};

use super::routing::{DISPATCH_TARGET, HandlerMethod, KEY_DOUBLE_PRESS, KEY_DOWN, KEY_LONG_PRESS, KEY_UP};
use crate::protocol::inbound::KeyEvent;

/* ============================ KeyTiming ============================ */

/// Per action type press thresholds. A zero duration disables that gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyTiming {
    #[serde(with = "humantime_serde")]
    pub long_press: Duration,
    #[serde(with = "humantime_serde")]
    pub double_press: Duration,
}

impl Default for KeyTiming {
    fn default() -> Self {
        Self::new(Duration::from_millis(800), Duration::from_millis(500))
    }
}

impl KeyTiming {
    #[must_use]
    pub const fn new(long_press: Duration, double_press: Duration) -> Self {
        Self {
            long_press,
            double_press,
        }
    }

    #[must_use]
    pub const fn long_press_enabled(&self) -> bool {
        !self.long_press.is_zero()
    }

    #[must_use]
    pub const fn double_press_enabled(&self) -> bool {
        !self.double_press.is_zero()
    }
}

/* ============================ Gestures ============================= */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyGesture {
    Down,
    Up,
    LongPress,
    DoublePress,
}

impl KeyGesture {
    /// Route name the gesture is dispatched under.
    #[must_use]
    pub const fn event_name(self) -> &'static str {
        match self {
            Self::Down => KEY_DOWN,
            Self::Up => KEY_UP,
            Self::LongPress => KEY_LONG_PRESS,
            Self::DoublePress => KEY_DOUBLE_PRESS,
        }
    }

    #[must_use]
    pub const fn method(self) -> HandlerMethod {
        match self {
            Self::Down => HandlerMethod::OnKeyDown,
            Self::Up => HandlerMethod::OnKeyUp,
            Self::LongPress => HandlerMethod::OnKeyLongPress,
            Self::DoublePress => HandlerMethod::OnKeyDoublePress,
        }
    }
}

/// What to do with one raw key event right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDecision {
    /// Deliver the event as this gesture.
    Deliver(KeyGesture),
    /// Held back; a long press may follow on the engine's channel.
    Pending,
    /// Dropped.
    Suppressed,
}

/// Long press emitted by an expired watch.
#[derive(Debug, Clone, PartialEq)]
pub struct LongPressFired {
    pub event: KeyEvent,
}

/* ============================== State ============================== */

#[derive(Debug)]
struct Watch {
    id: u64,
    handle: AbortHandle,
}

#[derive(Debug, Default)]
struct KeyTimingState {
    watch: Option<Watch>,
    last_release: Option<Instant>,
    suppress_next_release: bool,
}

/* ============================= Engine ============================== */

#[derive(Debug)]
pub struct KeyTimingEngine {
    contexts: DashMap<String, Arc<Mutex<KeyTimingState>>, RandomState>,
    next_watch: AtomicU64,
    tx: mpsc::UnboundedSender<LongPressFired>,
}

impl KeyTimingEngine {
    /// Create the engine and the receiving end for timer-fired long presses.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LongPressFired>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let engine: Self = Self {
            contexts: DashMap::with_hasher(RandomState::new()),
            next_watch: AtomicU64::new(1),
            tx,
        };
        (engine, rx)
    }

    fn state(&self, context: &str) -> Arc<Mutex<KeyTimingState>> {
        if let Some(state) = self.contexts.get(context) {
            return Arc::clone(state.value());
        }
        Arc::clone(self.contexts.entry(context.to_owned()).or_default().value())
    }

    /// Classify a raw key-down. Must be called from inside a tokio runtime
    /// when long press is enabled.
    pub fn key_down(&self, timing: KeyTiming, event: &KeyEvent) -> KeyDecision {
        if !timing.long_press_enabled() {
            return KeyDecision::Deliver(KeyGesture::Down);
        }

        let context: &str = event.target.context.as_str();
        let state: Arc<Mutex<KeyTimingState>> = self.state(context);
        let mut guard = state.lock();

        if let Some(previous) = guard.watch.take() {
            trace!(target: DISPATCH_TARGET, context, "Re-arming long press watch");
            previous.handle.abort();
        }

        let id: u64 = self.next_watch.fetch_add(1, Ordering::Relaxed);
        let delay: Duration = timing.long_press;
        let timer_state: Arc<Mutex<KeyTimingState>> = Arc::clone(&state);
        let tx: mpsc::UnboundedSender<LongPressFired> = self.tx.clone();
        let fired: KeyEvent = event.clone();

        let task = tokio::spawn(async move {
            sleep(delay).await;

            {
                let mut guard = timer_state.lock();
                if guard.watch.as_ref().is_none_or(|watch: &Watch| watch.id != id) {
                    return;
                }
                guard.watch = None;
                guard.suppress_next_release = true;
            }

            debug!(
                target: DISPATCH_TARGET,
                context = %fired.target.context,
                "Long press detected"
            );
            if let Err(dropped) = tx.send(LongPressFired { event: fired }) {
                debug!(
                    target: DISPATCH_TARGET,
                    context = %dropped.0.event.target.context,
                    "Long press dropped, dispatcher is gone"
                );
            }
        });

        guard.watch = Some(Watch {
            id,
            handle: task.abort_handle(),
        });

        KeyDecision::Pending
    }

    /// Classify a raw key-up.
    pub fn key_up(&self, timing: KeyTiming, event: &KeyEvent) -> KeyDecision {
        let now: Instant = Instant::now();
        let state: Arc<Mutex<KeyTimingState>> = self.state(&event.target.context);
        let mut guard = state.lock();

        if let Some(watch) = guard.watch.take() {
            watch.handle.abort();
        }

        let decision: KeyDecision = if guard.suppress_next_release {
            guard.suppress_next_release = false;
            KeyDecision::Suppressed
        } else if timing.double_press_enabled()
            && guard
                .last_release
                .is_some_and(|last: Instant| now.duration_since(last) <= timing.double_press)
        {
            KeyDecision::Deliver(KeyGesture::DoublePress)
        } else {
            KeyDecision::Deliver(KeyGesture::Up)
        };

        guard.last_release = Some(now);
        decision
    }

    /// Number of contexts with an armed long press watch.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.contexts
            .iter()
            .filter(|entry| entry.value().lock().watch.is_some())
            .count()
    }

    /// Abort every armed watch. Used on shutdown.
    pub fn cancel_all(&self) {
        for entry in &self.contexts {
            if let Some(watch) = entry.value().lock().watch.take() {
                watch.handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::inbound::{ActionTarget, KeyPayload};

    fn key(context: &str) -> KeyEvent {
        KeyEvent {
            target: ActionTarget {
                action: "com.example.key".to_string(),
                context: context.to_string(),
                device: Some("dev1".to_string()),
            },
            payload: KeyPayload::default(),
        }
    }

    fn timing(long_ms: u64, double_ms: u64) -> KeyTiming {
        KeyTiming::new(
            Duration::from_millis(long_ms),
            Duration::from_millis(double_ms),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_held_key_yields_one_long_press_and_swallows_release() {
        let (engine, mut rx) = KeyTimingEngine::new();
        let timing: KeyTiming = timing(100, 500);

        assert_eq!(engine.key_down(timing, &key("ctx1")), KeyDecision::Pending);
        tokio::time::sleep(Duration::from_millis(200)).await;

        let fired: LongPressFired = rx.try_recv().unwrap();
        assert_eq!(fired.event.target.context, "ctx1");
        assert!(rx.try_recv().is_err());
        assert_eq!(engine.pending(), 0);

        assert_eq!(engine.key_up(timing, &key("ctx1")), KeyDecision::Suppressed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_press_cancels_watch() {
        let (engine, mut rx) = KeyTimingEngine::new();
        let timing: KeyTiming = timing(100, 500);

        engine.key_down(timing, &key("ctx1"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            engine.key_up(timing, &key("ctx1")),
            KeyDecision::Deliver(KeyGesture::Up)
        );

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(engine.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_long_press_forwards_key_down() {
        let (engine, _rx) = KeyTimingEngine::new();
        assert_eq!(
            engine.key_down(timing(0, 500), &key("ctx1")),
            KeyDecision::Deliver(KeyGesture::Down)
        );
        assert_eq!(engine.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_press_clock_resets_on_every_release() {
        let (engine, _rx) = KeyTimingEngine::new();
        let timing: KeyTiming = timing(0, 500);

        assert_eq!(
            engine.key_up(timing, &key("ctx1")),
            KeyDecision::Deliver(KeyGesture::Up)
        );
        tokio::time::advance(Duration::from_millis(300)).await;
        assert_eq!(
            engine.key_up(timing, &key("ctx1")),
            KeyDecision::Deliver(KeyGesture::DoublePress)
        );
        tokio::time::advance(Duration::from_millis(300)).await;
        assert_eq!(
            engine.key_up(timing, &key("ctx1")),
            KeyDecision::Deliver(KeyGesture::DoublePress)
        );
        tokio::time::advance(Duration::from_millis(600)).await;
        assert_eq!(
            engine.key_up(timing, &key("ctx1")),
            KeyDecision::Deliver(KeyGesture::Up)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_boundary_is_inclusive() {
        let (engine, _rx) = KeyTimingEngine::new();
        let timing: KeyTiming = timing(0, 500);

        engine.key_up(timing, &key("ctx1"));
        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(
            engine.key_up(timing, &key("ctx1")),
            KeyDecision::Deliver(KeyGesture::DoublePress)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_suppressed_release_still_starts_double_press_window() {
        let (engine, mut rx) = KeyTimingEngine::new();
        let timing: KeyTiming = timing(100, 500);

        engine.key_down(timing, &key("ctx1"));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(rx.try_recv().is_ok());
        assert_eq!(engine.key_up(timing, &key("ctx1")), KeyDecision::Suppressed);

        engine.key_down(timing, &key("ctx1"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            engine.key_up(timing, &key("ctx1")),
            KeyDecision::Deliver(KeyGesture::DoublePress)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_double_press_never_pairs() {
        let (engine, _rx) = KeyTimingEngine::new();
        let timing: KeyTiming = timing(0, 0);

        engine.key_up(timing, &key("ctx1"));
        assert_eq!(
            engine.key_up(timing, &key("ctx1")),
            KeyDecision::Deliver(KeyGesture::Up)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_contexts_are_independent() {
        let (engine, mut rx) = KeyTimingEngine::new();
        let timing: KeyTiming = timing(100, 500);

        engine.key_down(timing, &key("ctx1"));
        engine.key_down(timing, &key("ctx2"));
        assert_eq!(engine.pending(), 2);

        assert_eq!(
            engine.key_up(timing, &key("ctx2")),
            KeyDecision::Deliver(KeyGesture::Up)
        );
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(rx.try_recv().unwrap().event.target.context, "ctx1");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_aborts_watches() {
        let (engine, mut rx) = KeyTimingEngine::new();
        engine.key_down(timing(100, 500), &key("ctx1"));

        engine.cancel_all();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(rx.try_recv().is_err());
    }

    #[derive(Clone, Default)]
    struct LogBuf(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_press_without_receiver_is_logged_and_settles() {
        let buf: LogBuf = LogBuf::default();
        let writer: LogBuf = buf.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let (engine, rx) = KeyTimingEngine::new();
        drop(rx);
        let timing: KeyTiming = timing(100, 500);

        engine.key_down(timing, &key("ctx1"));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(engine.pending(), 0);
        assert_eq!(engine.key_up(timing, &key("ctx1")), KeyDecision::Suppressed);

        let output: String = String::from_utf8(buf.0.lock().clone()).unwrap();
        assert!(output.contains("Long press dropped"));
        assert!(output.contains("ctx1"));
    }

    #[test]
    fn test_timing_defaults_and_toml_durations() {
        assert_eq!(KeyTiming::default(), timing(800, 500));

        let parsed: KeyTiming = toml::from_str("long_press = \"1s 200ms\"").unwrap();
        assert_eq!(parsed, timing(1200, 500));
    }
}
