//! Primitive input events and the geometry they carry.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Absolute screen position in pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Vector from `self` to `target`, or `None` if it does not fit in `i32`
    pub fn delta_to(self, target: Point) -> Option<Delta> {
        let dx = target.x.checked_sub(self.x)?;
        let dy = target.y.checked_sub(self.y)?;
        Some(Delta::new(dx, dy))
    }

    /// Position after a relative move, clamped to the `i32` plane
    pub fn offset(self, delta: Delta) -> Point {
        Point::new(self.x.saturating_add(delta.dx), self.y.saturating_add(delta.dy))
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.x, self.y)
    }
}

/// Relative pointer displacement in pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Delta {
    pub dx: i32,
    pub dy: i32,
}

impl Delta {
    pub const ZERO: Delta = Delta { dx: 0, dy: 0 };

    pub const fn new(dx: i32, dy: i32) -> Self {
        Self { dx, dy }
    }

    pub fn is_zero(self) -> bool {
        self.dx == 0 && self.dy == 0
    }

    /// Per-axis magnitude: the larger of `|dx|` and `|dy|`.
    ///
    /// Step limits are enforced per axis, so this is the norm every
    /// `max_step` comparison uses.
    pub fn magnitude(self) -> u32 {
        self.dx.unsigned_abs().max(self.dy.unsigned_abs())
    }
}

impl std::ops::Add for Delta {
    type Output = Delta;

    fn add(self, rhs: Delta) -> Delta {
        Delta::new(self.dx.saturating_add(rhs.dx), self.dy.saturating_add(rhs.dy))
    }
}

impl std::ops::Sub for Delta {
    type Output = Delta;

    fn sub(self, rhs: Delta) -> Delta {
        Delta::new(self.dx.saturating_sub(rhs.dx), self.dy.saturating_sub(rhs.dy))
    }
}

impl std::iter::Sum for Delta {
    fn sum<I: Iterator<Item = Delta>>(iter: I) -> Delta {
        iter.fold(Delta::ZERO, |acc, d| acc + d)
    }
}

/// Axis-aligned rectangle of the virtual desktop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScreenRect {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl ScreenRect {
    pub fn contains(&self, p: Point) -> bool {
        let right = self.left as i64 + self.width as i64;
        let bottom = self.top as i64 + self.height as i64;
        (p.x as i64) >= self.left as i64
            && (p.x as i64) < right
            && (p.y as i64) >= self.top as i64
            && (p.y as i64) < bottom
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "left" => Some(MouseButton::Left),
            "right" => Some(MouseButton::Right),
            "middle" => Some(MouseButton::Middle),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MouseButton::Left => "left",
            MouseButton::Right => "right",
            MouseButton::Middle => "middle",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollAxis {
    Vertical,
    Horizontal,
}

impl ScrollAxis {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "vertical" | "v" => Some(ScrollAxis::Vertical),
            "horizontal" | "h" => Some(ScrollAxis::Horizontal),
            _ => None,
        }
    }
}

/// One unit of input the backend accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    PointerMove(Delta),
    Button { button: MouseButton, down: bool },
    /// Windows virtual-key code transition
    Key { code: u16, down: bool },
    /// One Unicode scalar value, never a lone UTF-16 surrogate
    Text { codepoint: char },
    /// One wheel notch; `amount` is `1` or `-1`
    Scroll { axis: ScrollAxis, amount: i32 },
}

/// Rate-limiter domain an event is paced in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventClass {
    Move,
    Click,
    Key,
    Scroll,
}

impl EventClass {
    pub const ALL: [EventClass; 4] = [
        EventClass::Move,
        EventClass::Click,
        EventClass::Key,
        EventClass::Scroll,
    ];
}

impl InputEvent {
    pub fn class(&self) -> EventClass {
        match self {
            InputEvent::PointerMove(_) => EventClass::Move,
            InputEvent::Button { .. } => EventClass::Click,
            InputEvent::Key { .. } | InputEvent::Text { .. } => EventClass::Key,
            InputEvent::Scroll { .. } => EventClass::Scroll,
        }
    }

    /// Whether the event consumes a slot of its class's frequency budget.
    ///
    /// Releases are ordered with their class but not counted, so a click or
    /// a key tap costs one slot.
    pub fn is_metered(&self) -> bool {
        match self {
            InputEvent::Button { down, .. } | InputEvent::Key { down, .. } => *down,
            InputEvent::PointerMove(_)
            | InputEvent::Text { .. }
            | InputEvent::Scroll { .. } => true,
        }
    }
}

/// Codec output: an event, or an instruction the dispatcher carries out
/// around the events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Primitive {
    Event(InputEvent),
    /// Pause before the next primitive (key hold, tap interval)
    Wait(Duration),
    /// Opaque paste payload, written once and exempt from pacing
    SetClipboard(String),
    /// End of a pointer path: the cursor should now rest on this point
    Reach(Point),
}

impl From<InputEvent> for Primitive {
    fn from(event: InputEvent) -> Self {
        Primitive::Event(event)
    }
}
