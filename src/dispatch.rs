//! Tool dispatcher
//!
//! Turns one [`ToolCall`] into backend activity: validate, expand through the
//! codec, pace every event, inject, and fold the outcome into a single
//! [`ToolCallResult`].
//!
//! Calls that travel the pointer to an absolute position hold the pointer
//! lease from the cursor read until the result is built, so two paths never
//! interleave. Each path ends by reading the cursor back and steering it
//! onto the target with paced corrective moves.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::backend::{BackendInfo, InputBackend};
use crate::core::codec::{self, ExpandContext};
use crate::core::event::{Delta, InputEvent, MouseButton, Point, Primitive, ScreenRect};
use crate::core::pacer::{PointerTrack, RateConfig, RateConfigUpdate, RateLimiterRegistry};
use crate::core::request::ToolCall;
use crate::error::{InputError, InputResult};

/// Corrective rounds after a pointer path before the position is accepted
const MAX_POINTER_CORRECTIONS: usize = 4;

/// First primitive the backend refused during a call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureReport {
    pub index: usize,
    pub reason: String,
}

/// Virtual desktop as reported by `Desktop-Info`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DesktopReport {
    #[serde(flatten)]
    pub bounds: ScreenRect,
    pub monitors: Option<u32>,
}

/// Outcome of one tool call
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallResult {
    pub tool: &'static str,
    /// False when any primitive was rejected
    pub success: bool,
    pub message: String,
    /// Primitives carried out, rejected ones included
    pub completed: usize,
    pub total: usize,
    /// Events the backend accepted
    pub emitted: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_failure: Option<FailureReport>,
    pub cursor: Option<Point>,
    /// Virtual-key codes left pressed
    pub held_keys: Vec<u16>,
    pub held_buttons: Vec<MouseButton>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<RateConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desktop: Option<DesktopReport>,
}

/// Input state observed through this dispatcher
#[derive(Debug, Default)]
struct Tracked {
    /// Cursor as of the last read or accepted move
    cursor: Option<Point>,
    keys: BTreeSet<u16>,
    buttons: BTreeSet<MouseButton>,
}

impl Tracked {
    fn observe(&mut self, event: &InputEvent) {
        match *event {
            InputEvent::PointerMove(delta) => {
                self.cursor = Some(self.cursor.unwrap_or_default().offset(delta));
            }
            InputEvent::Button { button, down: true } => {
                self.buttons.insert(button);
            }
            InputEvent::Button {
                button,
                down: false,
            } => {
                self.buttons.remove(&button);
            }
            InputEvent::Key { code, down: true } => {
                self.keys.insert(code);
            }
            InputEvent::Key { code, down: false } => {
                self.keys.remove(&code);
            }
            InputEvent::Text { .. } | InputEvent::Scroll { .. } => {}
        }
    }
}

/// Running totals for one call
#[derive(Debug, Default)]
struct Progress {
    completed: usize,
    emitted: usize,
    first_failure: Option<FailureReport>,
    /// Latest cursor reading taken after the pointer stopped
    cursor: Option<Point>,
}

pub struct Dispatcher {
    backend: Arc<dyn InputBackend>,
    limiter: Arc<RateLimiterRegistry>,
    tracked: Mutex<Tracked>,
    pointer_lease: tokio::sync::Mutex<()>,
}

impl Dispatcher {
    pub fn new(backend: Arc<dyn InputBackend>, limiter: Arc<RateLimiterRegistry>) -> Self {
        Self {
            backend,
            limiter,
            tracked: Mutex::new(Tracked::default()),
            pointer_lease: tokio::sync::Mutex::new(()),
        }
    }

    pub fn backend(&self) -> &Arc<dyn InputBackend> {
        &self.backend
    }

    pub fn limiter(&self) -> &Arc<RateLimiterRegistry> {
        &self.limiter
    }

    fn tracked(&self) -> std::sync::MutexGuard<'_, Tracked> {
        self.tracked.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run one tool call to completion.
    ///
    /// Argument errors are returned before anything is injected. A rejected
    /// primitive is recorded and the sequence continues, except for a
    /// clipboard write, which ends the call before the paste. An unavailable
    /// backend or a cancelled `cancel` stops the call and the error carries
    /// the number of primitives completed.
    pub async fn invoke(
        &self,
        call: ToolCall,
        cancel: &CancellationToken,
    ) -> InputResult<ToolCallResult> {
        let bounds = self.backend.screen_bounds().await;
        call.validate(bounds)?;

        match &call {
            ToolCall::Info => return Ok(self.info(&call).await),
            ToolCall::DesktopInfo => return self.desktop(&call, bounds).await,
            ToolCall::ConfigureRate(update) => return self.configure(&call, update).await,
            _ => {}
        }

        let _lease = if call.moves_pointer() {
            Some(self.lease_pointer(cancel).await?)
        } else {
            None
        };
        let cursor = if call.moves_pointer() {
            self.cursor().await
        } else {
            self.tracked().cursor.unwrap_or_default()
        };
        let ctx = ExpandContext {
            cursor,
            max_step: self.limiter.max_step().await,
        };
        let primitives = codec::expand(&call, ctx)?;
        tracing::info!(
            tool = call.name(),
            primitives = primitives.len(),
            "dispatching tool call"
        );

        let progress = self.run(&primitives, cancel).await?;
        Ok(self.finish(&call, primitives.len(), progress).await)
    }

    async fn info(&self, call: &ToolCall) -> ToolCallResult {
        let rate = self.limiter.config().await;
        let info = self.backend.info();
        let mut result = self.finish(call, 0, Progress::default()).await;
        result.message = format!("{} backend, driver {}", info.name, info.driver);
        result.backend = Some(info);
        result.rate = Some(rate);
        result
    }

    async fn desktop(
        &self,
        call: &ToolCall,
        bounds: Option<ScreenRect>,
    ) -> InputResult<ToolCallResult> {
        let Some(bounds) = bounds else {
            return Err(InputError::BackendUnavailable {
                reason: format!("{} cannot read the desktop size", self.backend.info().name),
                completed: 0,
            });
        };
        let monitors = self.backend.monitor_count().await;
        let mut result = self.finish(call, 0, Progress::default()).await;
        result.message = format!(
            "virtual screen left={}, top={}, width={}, height={}, monitors={}",
            bounds.left,
            bounds.top,
            bounds.width,
            bounds.height,
            monitors.map_or_else(|| "unknown".to_string(), |m| m.to_string()),
        );
        result.desktop = Some(DesktopReport { bounds, monitors });
        Ok(result)
    }

    async fn configure(
        &self,
        call: &ToolCall,
        update: &RateConfigUpdate,
    ) -> InputResult<ToolCallResult> {
        let rate = if update.is_empty() {
            self.limiter.config().await
        } else {
            self.limiter.update(update).await?
        };
        let mut result = self.finish(call, 0, Progress::default()).await;
        result.message = if update.is_empty() {
            "no changes requested".to_string()
        } else {
            "rate limiter updated".to_string()
        };
        result.rate = Some(rate);
        Ok(result)
    }

    async fn lease_pointer(
        &self,
        cancel: &CancellationToken,
    ) -> InputResult<tokio::sync::MutexGuard<'_, ()>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(InputError::Cancelled { completed: 0 }),
            guard = self.pointer_lease.lock() => Ok(guard),
        }
    }

    async fn cursor(&self) -> Point {
        let reported = self.backend.cursor_position().await;
        let mut tracked = self.tracked();
        if let Some(p) = reported {
            tracked.cursor = Some(p);
        }
        tracked.cursor.unwrap_or_default()
    }

    async fn run(
        &self,
        primitives: &[Primitive],
        cancel: &CancellationToken,
    ) -> InputResult<Progress> {
        let mut track = PointerTrack::default();
        let mut progress = Progress::default();

        for (index, primitive) in primitives.iter().enumerate() {
            if !matches!(primitive, Primitive::Event(InputEvent::PointerMove(_))) {
                self.flush_pointer(&mut track, index, cancel, &mut progress)
                    .await?;
            }
            match primitive {
                Primitive::Event(event) => {
                    self.emit(*event, &mut track, index, cancel, &mut progress)
                        .await?;
                }
                Primitive::Wait(duration) => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            return Err(InputError::Cancelled {
                                completed: progress.completed,
                            });
                        }
                        _ = tokio::time::sleep(*duration) => {}
                    }
                }
                Primitive::SetClipboard(text) => {
                    if let Err(e) = self.backend.set_clipboard(text).await {
                        let err = InputError::from_backend(e, index, progress.completed);
                        self.record_failure(err, &mut progress)?;
                        // The paste that follows would insert stale contents.
                        progress.completed += 1;
                        return Ok(progress);
                    }
                }
                Primitive::Reach(target) => {
                    self.settle_pointer(*target, &mut track, index, cancel, &mut progress)
                        .await?;
                }
            }
            progress.completed += 1;
        }
        let last = primitives.len().saturating_sub(1);
        self.flush_pointer(&mut track, last, cancel, &mut progress)
            .await?;
        Ok(progress)
    }

    /// Emit the pointer displacement still held back by the pacer.
    async fn flush_pointer(
        &self,
        track: &mut PointerTrack,
        index: usize,
        cancel: &CancellationToken,
        progress: &mut Progress,
    ) -> InputResult<()> {
        while !track.is_settled() {
            self.emit(InputEvent::PointerMove(Delta::ZERO), track, index, cancel, progress)
                .await?;
        }
        Ok(())
    }

    /// Steer the pointer onto `target` with paced corrective moves.
    ///
    /// Relative moves drift under pointer acceleration, and other input can
    /// nudge the cursor mid-path. A backend that cannot report the cursor
    /// leaves the tracked position as is.
    async fn settle_pointer(
        &self,
        target: Point,
        track: &mut PointerTrack,
        index: usize,
        cancel: &CancellationToken,
        progress: &mut Progress,
    ) -> InputResult<()> {
        for round in 0..=MAX_POINTER_CORRECTIONS {
            let Some(actual) = self.backend.cursor_position().await else {
                return Ok(());
            };
            self.tracked().cursor = Some(actual);
            progress.cursor = Some(actual);
            let miss = match actual.delta_to(target) {
                Some(miss) if !miss.is_zero() => miss,
                _ => return Ok(()),
            };
            if round == MAX_POINTER_CORRECTIONS {
                tracing::warn!(%target, %actual, "pointer did not settle on target");
                return Ok(());
            }
            tracing::debug!(%target, %actual, "correcting pointer");
            let max_step = self.limiter.max_step().await;
            for step in codec::split_move(miss, max_step) {
                self.emit(InputEvent::PointerMove(step), track, index, cancel, progress)
                    .await?;
            }
            self.flush_pointer(track, index, cancel, progress).await?;
        }
        Ok(())
    }

    async fn emit(
        &self,
        event: InputEvent,
        track: &mut PointerTrack,
        index: usize,
        cancel: &CancellationToken,
        progress: &mut Progress,
    ) -> InputResult<()> {
        let paced = self
            .limiter
            .pace(event, track, cancel)
            .await
            .map_err(|_| InputError::Cancelled {
                completed: progress.completed,
            })?;
        if paced.is_noop() {
            return Ok(());
        }

        match self.backend.inject(&paced.event).await {
            Ok(()) => {
                tracing::debug!(
                    event = ?paced.event,
                    delay_ms = paced.delay.as_millis() as u64,
                    "emitted"
                );
                self.tracked().observe(&paced.event);
                progress.emitted += 1;
                Ok(())
            }
            Err(e) => {
                let err = InputError::from_backend(e, index, progress.completed);
                self.record_failure(err, progress)
            }
        }
    }

    fn record_failure(&self, err: InputError, progress: &mut Progress) -> InputResult<()> {
        if err.is_fatal() {
            tracing::error!("{err}");
            return Err(err);
        }
        tracing::warn!("{err}");
        if let InputError::BackendRejected { reason, index } = err {
            progress
                .first_failure
                .get_or_insert(FailureReport { index, reason });
        }
        Ok(())
    }

    async fn finish(&self, call: &ToolCall, total: usize, progress: Progress) -> ToolCallResult {
        let reported = match progress.cursor {
            Some(p) => Some(p),
            None => self.backend.cursor_position().await,
        };
        let tracked = self.tracked();
        let message = match &progress.first_failure {
            None => format!("{} of {total} primitives completed", progress.completed),
            Some(f) => format!(
                "{} of {total} primitives completed; first rejected at {}: {}",
                progress.completed, f.index, f.reason
            ),
        };
        ToolCallResult {
            tool: call.name(),
            success: progress.first_failure.is_none(),
            message,
            completed: progress.completed,
            total,
            emitted: progress.emitted,
            first_failure: progress.first_failure,
            cursor: reported.or(tracked.cursor),
            held_keys: tracked.keys.iter().copied().collect(),
            held_buttons: tracked.buttons.iter().copied().collect(),
            backend: None,
            rate: None,
            desktop: None,
        }
    }
}
