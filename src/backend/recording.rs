//! In-memory backend for dry runs and tests.
//!
//! Nothing reaches the OS. Every injection is appended to a bounded log
//! together with the (tokio) time it arrived, and a virtual cursor follows
//! the relative moves so cursor-dependent tools behave like the real thing.

use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use tokio::time::Instant;

use super::{BackendError, BackendInfo, InputBackend};
use crate::core::event::{Delta, InputEvent, MouseButton, Point, ScreenRect, ScrollAxis};

/// Entries kept before the oldest are dropped
pub const DEFAULT_LOG_LIMIT: usize = 4096;

/// One call the backend received
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Event { event: InputEvent, at: Instant },
    Clipboard { text: String, at: Instant },
}

impl Recorded {
    pub fn event(&self) -> Option<InputEvent> {
        match self {
            Recorded::Event { event, .. } => Some(*event),
            Recorded::Clipboard { .. } => None,
        }
    }

    pub fn at(&self) -> Instant {
        match self {
            Recorded::Event { at, .. } | Recorded::Clipboard { at, .. } => *at,
        }
    }
}

#[derive(Debug)]
struct Inner {
    log: VecDeque<Recorded>,
    log_limit: usize,
    /// Entries dropped from the front of `log`
    dropped: u64,
    cursor: Point,
    /// Scale applied to relative moves, like OS pointer acceleration
    pointer_gain: f64,
    rejected_keys: HashSet<u16>,
    rejected_buttons: HashSet<MouseButton>,
    reject_clipboard: bool,
    /// Calls accepted before the backend reports itself unavailable
    available_calls: Option<usize>,
    cursor_reads: usize,
}

impl Inner {
    fn admit(&mut self) -> Result<(), BackendError> {
        match self.available_calls.as_mut() {
            Some(0) => Err(BackendError::Unavailable("recording backend shut down".into())),
            Some(left) => {
                *left -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn push(&mut self, entry: Recorded) {
        while self.log.len() >= self.log_limit.max(1) {
            self.log.pop_front();
            self.dropped += 1;
        }
        self.log.push_back(entry);
    }

    fn refuse(&self, event: &InputEvent) -> Option<String> {
        match *event {
            InputEvent::Key { code, .. } if self.rejected_keys.contains(&code) => {
                Some(format!("key vk{code:02X} refused"))
            }
            InputEvent::Button { button, .. } if self.rejected_buttons.contains(&button) => {
                Some(format!("{} button refused", button.as_str()))
            }
            _ => None,
        }
    }
}

/// Recording backend
#[derive(Debug)]
pub struct RecordingBackend {
    bounds: Option<ScreenRect>,
    monitors: u32,
    inner: Mutex<Inner>,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingBackend {
    /// Recorder with a single 1920x1080 monitor and the cursor at the origin
    pub fn new() -> Self {
        let bounds = ScreenRect {
            left: 0,
            top: 0,
            width: 1920,
            height: 1080,
        };
        Self::with_screen(bounds, Point::default())
    }

    pub fn with_screen(bounds: ScreenRect, cursor: Point) -> Self {
        Self {
            bounds: Some(bounds),
            monitors: 1,
            inner: Mutex::new(Inner {
                log: VecDeque::new(),
                log_limit: DEFAULT_LOG_LIMIT,
                dropped: 0,
                cursor,
                pointer_gain: 1.0,
                rejected_keys: HashSet::new(),
                rejected_buttons: HashSet::new(),
                reject_clipboard: false,
                available_calls: None,
                cursor_reads: 0,
            }),
        }
    }

    pub fn with_monitors(mut self, monitors: u32) -> Self {
        self.monitors = monitors;
        self
    }

    /// Behave like a backend that cannot read the desktop size.
    pub fn without_screen(mut self) -> Self {
        self.bounds = None;
        self
    }

    /// Keep at most `limit` log entries, dropping the oldest.
    pub fn limit_log(&self, limit: usize) {
        let mut inner = self.lock();
        inner.log_limit = limit;
        while inner.log.len() > limit.max(1) {
            inner.log.pop_front();
            inner.dropped += 1;
        }
    }

    /// Scale every relative move by `gain` before it reaches the cursor.
    pub fn set_pointer_gain(&self, gain: f64) {
        self.lock().pointer_gain = gain;
    }

    /// Refuse every injection of `code` with [`BackendError::Rejected`].
    pub fn reject_key(&self, code: u16) {
        self.lock().rejected_keys.insert(code);
    }

    /// Refuse every press and release of `button`.
    pub fn reject_button(&self, button: MouseButton) {
        self.lock().rejected_buttons.insert(button);
    }

    /// Refuse clipboard writes.
    pub fn reject_clipboard(&self) {
        self.lock().reject_clipboard = true;
    }

    /// Accept `calls` more injections, then report the backend unavailable.
    pub fn fail_after(&self, calls: usize) {
        self.lock().available_calls = Some(calls);
    }

    pub fn log(&self) -> Vec<Recorded> {
        self.lock().log.iter().cloned().collect()
    }

    pub fn events(&self) -> Vec<InputEvent> {
        self.lock().log.iter().filter_map(Recorded::event).collect()
    }

    pub fn cursor(&self) -> Point {
        self.lock().cursor
    }

    /// Times the cursor position was queried through the backend trait
    pub fn cursor_reads(&self) -> usize {
        self.lock().cursor_reads
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, event: InputEvent) -> Result<(), BackendError> {
        let mut inner = self.lock();
        inner.admit()?;
        if let Some(reason) = inner.refuse(&event) {
            return Err(BackendError::Rejected(reason));
        }
        if let InputEvent::PointerMove(delta) = event {
            let gain = inner.pointer_gain;
            let scaled = Delta::new(
                (delta.dx as f64 * gain).round() as i32,
                (delta.dy as f64 * gain).round() as i32,
            );
            inner.cursor = inner.cursor.offset(scaled);
        }
        inner.push(Recorded::Event {
            event,
            at: Instant::now(),
        });
        Ok(())
    }
}

#[async_trait]
impl InputBackend for RecordingBackend {
    fn info(&self) -> BackendInfo {
        let inner = self.lock();
        BackendInfo {
            name: "DryRun".into(),
            driver: "none".into(),
            ready: true,
            details: format!("recorded={}, dropped={}", inner.log.len(), inner.dropped),
        }
    }

    async fn inject_move(&self, delta: Delta) -> Result<(), BackendError> {
        self.record(InputEvent::PointerMove(delta))
    }

    async fn inject_button(&self, button: MouseButton, down: bool) -> Result<(), BackendError> {
        self.record(InputEvent::Button { button, down })
    }

    async fn inject_key(&self, code: u16, down: bool) -> Result<(), BackendError> {
        self.record(InputEvent::Key { code, down })
    }

    async fn inject_text(&self, codepoint: char) -> Result<(), BackendError> {
        self.record(InputEvent::Text { codepoint })
    }

    async fn inject_scroll(&self, axis: ScrollAxis, amount: i32) -> Result<(), BackendError> {
        self.record(InputEvent::Scroll { axis, amount })
    }

    async fn set_clipboard(&self, text: &str) -> Result<(), BackendError> {
        let mut inner = self.lock();
        inner.admit()?;
        if inner.reject_clipboard {
            return Err(BackendError::Rejected("clipboard is locked".into()));
        }
        inner.push(Recorded::Clipboard {
            text: text.to_string(),
            at: Instant::now(),
        });
        Ok(())
    }

    async fn cursor_position(&self) -> Option<Point> {
        let mut inner = self.lock();
        inner.cursor_reads += 1;
        Some(inner.cursor)
    }

    async fn screen_bounds(&self) -> Option<ScreenRect> {
        self.bounds
    }

    async fn monitor_count(&self) -> Option<u32> {
        Some(self.monitors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn moves_update_virtual_cursor() {
        let backend = RecordingBackend::new();
        backend.inject_move(Delta::new(30, -5)).await.unwrap();
        backend.inject_move(Delta::new(-10, 15)).await.unwrap();
        assert_eq!(backend.cursor(), Point::new(20, 10));
        assert_eq!(backend.events().len(), 2);
    }

    #[tokio::test]
    async fn pointer_gain_scales_cursor_but_not_log() {
        let backend = RecordingBackend::new();
        backend.set_pointer_gain(1.5);
        backend.inject_move(Delta::new(40, -10)).await.unwrap();
        assert_eq!(backend.cursor(), Point::new(60, -15));
        assert_eq!(backend.events(), vec![InputEvent::PointerMove(Delta::new(40, -10))]);
    }

    #[tokio::test]
    async fn failure_injection() {
        let backend = RecordingBackend::new();
        backend.reject_key(0x41);
        assert!(matches!(backend.inject_key(0x41, true).await, Err(BackendError::Rejected(_))));
        assert!(backend.inject_key(0x42, true).await.is_ok());

        backend.reject_button(MouseButton::Middle);
        let err = backend.inject_button(MouseButton::Middle, true).await;
        assert!(matches!(err, Err(BackendError::Rejected(_))));

        backend.reject_clipboard();
        let err = backend.set_clipboard("x").await;
        assert!(matches!(err, Err(BackendError::Rejected(_))));

        backend.fail_after(1);
        assert!(backend.inject_text('x').await.is_ok());
        assert!(matches!(backend.inject_text('y').await, Err(BackendError::Unavailable(_))));
        assert_eq!(backend.events().len(), 2);
    }

    #[tokio::test]
    async fn log_keeps_only_the_newest_entries() {
        let backend = RecordingBackend::new();
        backend.limit_log(3);
        for ch in ['a', 'b', 'c', 'd', 'e'] {
            backend.inject_text(ch).await.unwrap();
        }
        assert_eq!(
            backend.events(),
            vec![
                InputEvent::Text { codepoint: 'c' },
                InputEvent::Text { codepoint: 'd' },
                InputEvent::Text { codepoint: 'e' },
            ]
        );
        assert_eq!(backend.info().details, "recorded=3, dropped=2");
    }
}
