//! Rate limiter / pacer
//!
//! The [`RateLimiterRegistry`] owns one limiter per [`EventClass`]. Each
//! limiter is an async mutex around the class configuration and its pacing
//! state, so:
//!
//! - events of one class are released in lock arrival order (tokio's mutex
//!   is fair), and never closer together than `1 / max_hz`;
//! - classes never wait on each other;
//! - a configuration swap takes the same locks, so a paced event sees either
//!   the old or the new configuration in full.
//!
//! The lock is held across the pacing sleep and released before the caller
//! talks to the backend.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core::codec;
use crate::core::event::{Delta, EventClass, InputEvent};
use crate::error::{InputError, InputResult};

/// Velocity older than this is treated as a fresh start of motion
const VELOCITY_IDLE_RESET: Duration = Duration::from_millis(250);

/// Largest accepted pointer step in pixels
pub const MAX_STEP_LIMIT: u32 = 10_000;
/// Largest accepted frequency for any class
pub const MAX_HZ_LIMIT: f64 = 1_000.0;

/// Full rate-limiter configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RateConfig {
    /// Pointer ticks per second
    pub move_hz: f64,
    /// Max pixels per pointer tick, per axis
    pub max_delta: u32,
    /// Exponential smoothing factor in [0, 1)
    pub smooth: f64,
    /// Button presses per second
    pub cps: f64,
    /// Key presses and text codepoints per second
    pub kps: f64,
    /// Wheel notches per second
    pub scroll_hz: f64,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            move_hz: 120.0,
            max_delta: 60,
            smooth: 0.0,
            cps: 8.0,
            kps: 12.0,
            scroll_hz: 30.0,
        }
    }
}

impl RateConfig {
    pub fn validate(&self) -> InputResult<()> {
        for (name, hz) in [
            ("move_hz", self.move_hz),
            ("cps", self.cps),
            ("kps", self.kps),
            ("scroll_hz", self.scroll_hz),
        ] {
            if !hz.is_finite() || hz <= 0.0 || hz > MAX_HZ_LIMIT {
                return Err(InputError::ConfigurationInvalid(format!(
                    "{name} must be a positive frequency up to {MAX_HZ_LIMIT}, got {hz}"
                )));
            }
        }
        if self.max_delta == 0 || self.max_delta > MAX_STEP_LIMIT {
            return Err(InputError::ConfigurationInvalid(format!(
                "max_delta must be between 1 and {MAX_STEP_LIMIT}, got {}",
                self.max_delta
            )));
        }
        if !self.smooth.is_finite() || !(0.0..1.0).contains(&self.smooth) {
            return Err(InputError::ConfigurationInvalid(format!(
                "smooth must be in [0, 1), got {}",
                self.smooth
            )));
        }
        Ok(())
    }

    /// Merge a partial update; fields left `None` keep their value.
    pub fn apply(&self, update: &RateConfigUpdate) -> InputResult<RateConfig> {
        let max_delta = match update.max_delta {
            None => self.max_delta,
            Some(v) if v >= 1 && v <= MAX_STEP_LIMIT as i64 => v as u32,
            Some(v) => {
                return Err(InputError::ConfigurationInvalid(format!(
                    "max_delta must be between 1 and {MAX_STEP_LIMIT}, got {v}"
                )));
            }
        };
        let merged = RateConfig {
            move_hz: update.move_hz.unwrap_or(self.move_hz),
            max_delta,
            smooth: update.smooth.unwrap_or(self.smooth),
            cps: update.cps.unwrap_or(self.cps),
            kps: update.kps.unwrap_or(self.kps),
            scroll_hz: update.scroll_hz.unwrap_or(self.scroll_hz),
        };
        merged.validate()?;
        Ok(merged)
    }

    pub fn class(&self, class: EventClass) -> ClassConfig {
        match class {
            EventClass::Move => ClassConfig {
                max_hz: self.move_hz,
                max_step: Some(self.max_delta),
                smoothing: self.smooth,
            },
            EventClass::Click => ClassConfig::frequency(self.cps),
            EventClass::Key => ClassConfig::frequency(self.kps),
            EventClass::Scroll => ClassConfig::frequency(self.scroll_hz),
        }
    }
}

/// Partial configuration change; `None` leaves a field unchanged
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RateConfigUpdate {
    pub move_hz: Option<f64>,
    /// Signed so non-positive input is reported as invalid configuration
    pub max_delta: Option<i64>,
    pub smooth: Option<f64>,
    pub cps: Option<f64>,
    pub kps: Option<f64>,
    pub scroll_hz: Option<f64>,
}

impl RateConfigUpdate {
    pub fn is_empty(&self) -> bool {
        *self == RateConfigUpdate::default()
    }
}

/// Configuration one class is paced under
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassConfig {
    pub max_hz: f64,
    /// Pointer class only
    pub max_step: Option<u32>,
    pub smoothing: f64,
}

impl ClassConfig {
    fn frequency(max_hz: f64) -> Self {
        Self {
            max_hz,
            max_step: None,
            smoothing: 0.0,
        }
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.max_hz)
    }
}

/// An event released by the pacer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Paced {
    /// The event to inject, after clamping and smoothing
    pub event: InputEvent,
    /// Time spent waiting for the lock and the class interval
    pub delay: Duration,
    /// Moment the event was released
    pub ready_at: Instant,
    /// Configuration the event was paced under
    pub config: ClassConfig,
}

impl Paced {
    /// A pointer tick with nothing left to move; not meant for the backend.
    pub fn is_noop(&self) -> bool {
        matches!(self.event, InputEvent::PointerMove(d) if d.is_zero())
    }
}

/// Pacing was interrupted by cancellation. Class state is unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

/// Per-call pointer displacement not yet emitted.
///
/// Step clamping and smoothing defer part of a requested delta; the
/// remainder stays here until later ticks consume it.
#[derive(Debug, Clone, Copy, Default)]
pub struct PointerTrack {
    pending: Delta,
}

impl PointerTrack {
    pub fn pending(&self) -> Delta {
        self.pending
    }

    pub fn is_settled(&self) -> bool {
        self.pending.is_zero()
    }
}

#[derive(Debug)]
struct ClassState {
    config: ClassConfig,
    last_emit: Option<Instant>,
    /// Last emitted pointer delta, as floats for smoothing
    smoothed_velocity: (f64, f64),
}

impl ClassState {
    fn new(config: ClassConfig) -> Self {
        Self {
            config,
            last_emit: None,
            smoothed_velocity: (0.0, 0.0),
        }
    }

    fn next_slot(&self) -> Option<Instant> {
        self.last_emit.map(|at| at + self.config.min_interval())
    }

    /// Delta to emit this tick for `pending` outstanding displacement.
    ///
    /// The requested delta is the first `max_step` slice of `pending`. With
    /// smoothing `s`, the target is `s * velocity + (1 - s) * requested`,
    /// rounded, kept in the requested direction, at least one pixel on
    /// every moving axis and never beyond the requested delta.
    fn shape_pointer(&self, pending: Delta, now: Instant) -> Delta {
        let step = self.config.max_step.unwrap_or(MAX_STEP_LIMIT);
        let requested = codec::first_step(pending, step);
        let s = self.config.smoothing;
        if s <= 0.0 {
            return requested;
        }

        let idle = self
            .last_emit
            .is_none_or(|at| now.saturating_duration_since(at) > VELOCITY_IDLE_RESET);
        let (vx, vy) = if idle { (0.0, 0.0) } else { self.smoothed_velocity };

        let axis = |req: i32, v: f64| -> i32 {
            if req == 0 {
                return 0;
            }
            let sign = req.signum();
            let target = s * v + (1.0 - s) * req as f64;
            let magnitude = (target * sign as f64).round().max(1.0) as i64;
            magnitude.min(req.unsigned_abs() as i64) as i32 * sign
        };
        Delta::new(axis(requested.dx, vx), axis(requested.dy, vy))
    }
}

/// Pacing domain of one event class
#[derive(Debug)]
pub struct ClassLimiter {
    class: EventClass,
    state: Mutex<ClassState>,
}

impl ClassLimiter {
    fn new(class: EventClass, config: ClassConfig) -> Self {
        Self {
            class,
            state: Mutex::new(ClassState::new(config)),
        }
    }

    pub fn class(&self) -> EventClass {
        self.class
    }

    pub async fn config(&self) -> ClassConfig {
        self.state.lock().await.config
    }

    async fn lock(
        &self,
        cancel: &CancellationToken,
    ) -> Result<MutexGuard<'_, ClassState>, Cancelled> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Cancelled),
            guard = self.state.lock() => Ok(guard),
        }
    }
}

/// Owner of all per-class pacing state
#[derive(Debug)]
pub struct RateLimiterRegistry {
    pointer: ClassLimiter,
    click: ClassLimiter,
    key: ClassLimiter,
    scroll: ClassLimiter,
}

impl RateLimiterRegistry {
    pub fn new(config: RateConfig) -> InputResult<Self> {
        config.validate()?;
        Ok(Self {
            pointer: ClassLimiter::new(EventClass::Move, config.class(EventClass::Move)),
            click: ClassLimiter::new(EventClass::Click, config.class(EventClass::Click)),
            key: ClassLimiter::new(EventClass::Key, config.class(EventClass::Key)),
            scroll: ClassLimiter::new(EventClass::Scroll, config.class(EventClass::Scroll)),
        })
    }

    pub fn limiter(&self, class: EventClass) -> &ClassLimiter {
        match class {
            EventClass::Move => &self.pointer,
            EventClass::Click => &self.click,
            EventClass::Key => &self.key,
            EventClass::Scroll => &self.scroll,
        }
    }

    /// Consistent snapshot of every class's configuration.
    pub async fn config(&self) -> RateConfig {
        let pointer = self.pointer.state.lock().await;
        let click = self.click.state.lock().await;
        let key = self.key.state.lock().await;
        let scroll = self.scroll.state.lock().await;
        assemble(&pointer.config, &click.config, &key.config, &scroll.config)
    }

    /// Pointer step limit currently in force
    pub async fn max_step(&self) -> u32 {
        self.pointer.config().await.max_step.unwrap_or(MAX_STEP_LIMIT)
    }

    /// Atomically apply a partial update across all classes.
    ///
    /// Locks are taken in a fixed order (move, click, key, scroll). Invalid
    /// values reject the whole update and nothing changes.
    pub async fn update(&self, update: &RateConfigUpdate) -> InputResult<RateConfig> {
        let mut pointer = self.pointer.state.lock().await;
        let mut click = self.click.state.lock().await;
        let mut key = self.key.state.lock().await;
        let mut scroll = self.scroll.state.lock().await;

        let current = assemble(&pointer.config, &click.config, &key.config, &scroll.config);
        let next = current.apply(update)?;

        if next.smooth != current.smooth {
            pointer.smoothed_velocity = (0.0, 0.0);
        }
        pointer.config = next.class(EventClass::Move);
        click.config = next.class(EventClass::Click);
        key.config = next.class(EventClass::Key);
        scroll.config = next.class(EventClass::Scroll);

        tracing::info!(
            move_hz = next.move_hz,
            max_delta = next.max_delta,
            smooth = next.smooth,
            cps = next.cps,
            kps = next.kps,
            scroll_hz = next.scroll_hz,
            "rate limiter reconfigured"
        );
        Ok(next)
    }

    /// Wait until `event` may be emitted and return it, shaped.
    ///
    /// Pointer moves are added to `track` and one tick's worth is released;
    /// whatever the step limit or smoothing holds back stays in `track`.
    /// Call again with a zero move until the track settles. Other classes
    /// ignore `track`.
    ///
    /// On cancellation neither the class state nor `track` changes.
    pub async fn pace(
        &self,
        event: InputEvent,
        track: &mut PointerTrack,
        cancel: &CancellationToken,
    ) -> Result<Paced, Cancelled> {
        let started = Instant::now();
        let limiter = self.limiter(event.class());
        let mut state = limiter.lock(cancel).await?;

        let (shaped, pending) = match event {
            InputEvent::PointerMove(delta) => {
                let pending = track.pending + delta;
                let emitted = state.shape_pointer(pending, Instant::now());
                (InputEvent::PointerMove(emitted), Some((pending, emitted)))
            }
            other => (other, None),
        };

        let noop = matches!(shaped, InputEvent::PointerMove(d) if d.is_zero());
        if shaped.is_metered() && !noop {
            if let Some(slot) = state.next_slot() {
                if slot > Instant::now() {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(Cancelled),
                        _ = tokio::time::sleep_until(slot) => {}
                    }
                }
            }
            state.last_emit = Some(Instant::now());
        }

        if let Some((pending, emitted)) = pending {
            track.pending = pending - emitted;
            if !noop {
                state.smoothed_velocity = (emitted.dx as f64, emitted.dy as f64);
            }
        }

        let ready_at = Instant::now();
        Ok(Paced {
            event: shaped,
            delay: ready_at.saturating_duration_since(started),
            ready_at,
            config: state.config,
        })
    }
}

fn assemble(
    pointer: &ClassConfig,
    click: &ClassConfig,
    key: &ClassConfig,
    scroll: &ClassConfig,
) -> RateConfig {
    RateConfig {
        move_hz: pointer.max_hz,
        max_delta: pointer.max_step.unwrap_or(MAX_STEP_LIMIT),
        smooth: pointer.smoothing,
        cps: click.max_hz,
        kps: key.max_hz,
        scroll_hz: scroll.max_hz,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::event::MouseButton;

    fn registry(config: RateConfig) -> Arc<RateLimiterRegistry> {
        Arc::new(RateLimiterRegistry::new(config).unwrap())
    }

    async fn tick(reg: &RateLimiterRegistry, delta: Delta, track: &mut PointerTrack) -> Paced {
        let cancel = CancellationToken::new();
        reg.pace(InputEvent::PointerMove(delta), track, &cancel)
            .await
            .unwrap()
    }

    async fn drive_move(reg: &RateLimiterRegistry, delta: Delta) -> Vec<Paced> {
        let mut track = PointerTrack::default();
        let mut out = Vec::new();
        for step in codec::split_move(delta, reg.max_step().await) {
            out.push(tick(reg, step, &mut track).await);
        }
        while !track.is_settled() {
            out.push(tick(reg, Delta::ZERO, &mut track).await);
        }
        out
    }

    fn key_a(down: bool) -> InputEvent {
        InputEvent::Key { code: 0x41, down }
    }

    fn left(down: bool) -> InputEvent {
        InputEvent::Button {
            button: MouseButton::Left,
            down,
        }
    }

    fn pointer_deltas(paced: &[Paced]) -> Vec<Delta> {
        paced
            .iter()
            .filter_map(|p| match p.event {
                InputEvent::PointerMove(d) => Some(d),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn rejects_non_positive_values() {
        let base = RateConfig::default();
        let updates: [fn(&mut RateConfigUpdate); 6] = [
            |u| u.move_hz = Some(0.0),
            |u| u.cps = Some(-1.0),
            |u| u.kps = Some(f64::NAN),
            |u| u.max_delta = Some(0),
            |u| u.max_delta = Some(-5),
            |u| u.smooth = Some(1.0),
        ];
        for set in updates {
            let mut update = RateConfigUpdate::default();
            set(&mut update);
            let err = base.apply(&update).unwrap_err();
            assert_eq!(err.kind(), "ConfigurationInvalid", "{update:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn thousand_pixel_move_is_seventeen_paced_ticks() {
        let reg = registry(RateConfig::default());
        let paced = drive_move(&reg, Delta::new(1000, 0)).await;
        let deltas = pointer_deltas(&paced);
        assert_eq!(deltas.len(), 17);
        assert_eq!(deltas.iter().filter(|d| d.magnitude() == 60).count(), 16);
        assert_eq!(deltas[16], Delta::new(40, 0));
        assert_eq!(deltas.iter().copied().sum::<Delta>(), Delta::new(1000, 0));

        let interval = Duration::from_secs_f64(1.0 / 120.0);
        for pair in paced.windows(2) {
            assert!(pair[1].ready_at - pair[0].ready_at >= interval);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn smoothing_keeps_total_displacement() {
        let reg = registry(RateConfig {
            smooth: 0.7,
            max_delta: 25,
            ..RateConfig::default()
        });
        for delta in [Delta::new(1000, 0), Delta::new(-333, 517), Delta::new(3, -2)] {
            let paced = drive_move(&reg, delta).await;
            let deltas = pointer_deltas(&paced);
            assert_eq!(deltas.iter().copied().sum::<Delta>(), delta);
            assert!(deltas.iter().all(|d| d.magnitude() <= 25 && !d.is_zero()));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn smoothing_ramps_up_from_rest() {
        let reg = registry(RateConfig {
            smooth: 0.5,
            ..RateConfig::default()
        });
        let deltas = pointer_deltas(&drive_move(&reg, Delta::new(600, 0)).await);
        assert_eq!(deltas[0], Delta::new(30, 0));
        assert_eq!(deltas[1], Delta::new(45, 0));
        assert!(deltas.len() > 10);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_delta_is_split_not_truncated() {
        let reg = registry(RateConfig {
            max_delta: 10,
            ..RateConfig::default()
        });
        let mut track = PointerTrack::default();
        let first = tick(&reg, Delta::new(35, -7), &mut track).await;
        assert_eq!(first.event, InputEvent::PointerMove(Delta::new(10, -2)));
        assert_eq!(track.pending(), Delta::new(25, -5));

        let mut total = Delta::new(10, -2);
        while !track.is_settled() {
            let p = tick(&reg, Delta::ZERO, &mut track).await;
            if let InputEvent::PointerMove(d) = p.event {
                assert!(d.magnitude() <= 10);
                total = total + d;
            }
        }
        assert_eq!(total, Delta::new(35, -7));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_clicks_respect_cps() {
        let reg = registry(RateConfig::default());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let reg = Arc::clone(&reg);
            handles.push(tokio::spawn(async move {
                let cancel = CancellationToken::new();
                let mut track = PointerTrack::default();
                let mut stamps = Vec::new();
                for _ in 0..3 {
                    for down in [true, false] {
                        let p = reg.pace(left(down), &mut track, &cancel).await.unwrap();
                        if down {
                            stamps.push(p.ready_at);
                        }
                    }
                }
                stamps
            }));
        }
        let mut stamps = Vec::new();
        for h in handles {
            stamps.extend(h.await.unwrap());
        }
        stamps.sort();
        assert_eq!(stamps.len(), 12);
        for pair in stamps.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(125));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn classes_do_not_block_each_other() {
        let reg = registry(RateConfig {
            kps: 1.0,
            cps: 1.0,
            ..RateConfig::default()
        });
        let cancel = CancellationToken::new();
        let mut track = PointerTrack::default();
        let key = key_a(true);
        let click = left(true);

        reg.pace(key, &mut track, &cancel).await.unwrap();
        let p = reg.pace(click, &mut track, &cancel).await.unwrap();
        assert_eq!(p.delay, Duration::ZERO);

        let again = reg.pace(key, &mut track, &cancel).await.unwrap();
        assert!(again.delay >= Duration::from_millis(999));
    }

    #[tokio::test(start_paused = true)]
    async fn releases_follow_without_waiting() {
        let reg = registry(RateConfig {
            kps: 2.0,
            ..RateConfig::default()
        });
        let cancel = CancellationToken::new();
        let mut track = PointerTrack::default();
        reg.pace(key_a(true), &mut track, &cancel).await.unwrap();
        let up = reg.pace(key_a(false), &mut track, &cancel).await.unwrap();
        assert_eq!(up.delay, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn config_swap_never_mixes_values() {
        let slow = RateConfig {
            move_hz: 10.0,
            max_delta: 50,
            ..RateConfig::default()
        };
        let reg = registry(slow);
        let mover = {
            let reg = Arc::clone(&reg);
            tokio::spawn(async move { drive_move(&reg, Delta::new(2000, 0)).await })
        };
        tokio::time::sleep(Duration::from_millis(450)).await;
        let update = RateConfigUpdate {
            move_hz: Some(40.0),
            max_delta: Some(20),
            ..Default::default()
        };
        reg.update(&update).await.unwrap();

        let paced = mover.await.unwrap();
        let old = slow.class(EventClass::Move);
        let new = slow.apply(&update).unwrap().class(EventClass::Move);
        assert!(paced.iter().any(|p| p.config == old));
        assert!(paced.iter().any(|p| p.config == new));
        for p in &paced {
            assert!(p.config == old || p.config == new);
            if let InputEvent::PointerMove(d) = p.event {
                assert!(d.magnitude() <= p.config.max_step.unwrap());
            }
        }
        for pair in paced.windows(2) {
            assert!(pair[1].ready_at - pair[0].ready_at >= pair[1].config.min_interval());
        }
        assert_eq!(pointer_deltas(&paced).into_iter().sum::<Delta>(), Delta::new(2000, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_update_keeps_previous_config() {
        let reg = registry(RateConfig::default());
        let bad = RateConfigUpdate {
            move_hz: Some(200.0),
            cps: Some(0.0),
            ..Default::default()
        };
        assert!(reg.update(&bad).await.is_err());
        assert_eq!(reg.config().await, RateConfig::default());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_wait_leaves_state_untouched() {
        let reg = registry(RateConfig {
            kps: 1.0,
            ..RateConfig::default()
        });
        let cancel = CancellationToken::new();
        let mut track = PointerTrack::default();
        let key = key_a(true);
        let first = reg.pace(key, &mut track, &cancel).await.unwrap();

        let waiting = {
            let reg = Arc::clone(&reg);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let mut track = PointerTrack::default();
                reg.pace(key, &mut track, &cancel).await
            })
        };
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
        assert_eq!(waiting.await.unwrap(), Err(Cancelled));

        let fresh = CancellationToken::new();
        let next = reg.pace(key, &mut track, &fresh).await.unwrap();
        let gap = next.ready_at - first.ready_at;
        assert!(
            gap >= Duration::from_secs(1) && gap < Duration::from_millis(1100),
            "{gap:?}"
        );
    }
}
