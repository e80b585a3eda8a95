//! Validated tool requests.
//!
//! A [`ToolCall`] is built from raw MCP parameters by the server layer and
//! checked with [`ToolCall::validate`] before the codec sees it.

use std::time::Duration;

use crate::core::event::{MouseButton, Point, ScreenRect, ScrollAxis};
use crate::core::pacer::RateConfigUpdate;
use crate::error::{InputError, InputResult};

/// Longest text a single `Type-Tool` call accepts, in characters
pub const MAX_TEXT_CHARS: usize = 10_000;
/// Most keys a combo or shortcut may hold at once
pub const MAX_COMBO_KEYS: usize = 8;
pub const MAX_REPEAT: u32 = 100;
pub const MAX_CLICKS: u32 = 3;
pub const MAX_SCROLL_NOTCHES: u32 = 100;
/// Upper bound for `hold_ms` and `interval_ms`
pub const MAX_WAIT: Duration = Duration::from_secs(10);
/// Coordinate magnitude accepted when the desktop size is unknown
pub const MAX_COORDINATE: i32 = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeMethod {
    /// One `KEYEVENTF_UNICODE` injection per codepoint
    Unicode,
    /// Clipboard write followed by Ctrl+V
    Clipboard,
    /// Virtual-key down/up per character
    Vk,
}

impl TypeMethod {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "unicode" => Some(TypeMethod::Unicode),
            "clipboard" => Some(TypeMethod::Clipboard),
            "vk" => Some(TypeMethod::Vk),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TypeMethod::Unicode => "unicode",
            TypeMethod::Clipboard => "clipboard",
            TypeMethod::Vk => "vk",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMode {
    Tap,
    Down,
    Up,
    Hold,
}

impl KeyMode {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "tap" => Some(KeyMode::Tap),
            "down" => Some(KeyMode::Down),
            "up" => Some(KeyMode::Up),
            "hold" => Some(KeyMode::Hold),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            KeyMode::Tap => "tap",
            KeyMode::Down => "down",
            KeyMode::Up => "up",
            KeyMode::Hold => "hold",
        }
    }
}

/// One tool invocation with its arguments
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    Info,
    DesktopInfo,
    Move {
        to: Point,
    },
    Click {
        button: MouseButton,
        at: Option<Point>,
        clicks: u32,
    },
    Drag {
        from: Point,
        to: Point,
        button: MouseButton,
    },
    Scroll {
        /// Signed notch count; positive scrolls up or right
        amount: i32,
        axis: ScrollAxis,
        at: Option<Point>,
    },
    Type {
        text: String,
        method: TypeMethod,
        press_enter: bool,
    },
    Shortcut {
        keys: Vec<String>,
    },
    Key {
        mode: KeyMode,
        key: String,
        times: u32,
        interval: Duration,
        hold: Duration,
    },
    Combo {
        keys: Vec<String>,
        hold: Duration,
    },
    ConfigureRate(RateConfigUpdate),
}

impl ToolCall {
    /// MCP tool name this call was issued under
    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::Info => "Input-Info",
            ToolCall::DesktopInfo => "Desktop-Info",
            ToolCall::Move { .. } => "Move-Tool",
            ToolCall::Click { .. } => "Click-Tool",
            ToolCall::Drag { .. } => "Drag-Tool",
            ToolCall::Scroll { .. } => "Scroll-Tool",
            ToolCall::Type { .. } => "Type-Tool",
            ToolCall::Shortcut { .. } => "Shortcut-Tool",
            ToolCall::Key { .. } => "Key-Tool",
            ToolCall::Combo { .. } => "Combo-Tool",
            ToolCall::ConfigureRate(_) => "Input-RateLimiter-Config",
        }
    }

    /// Whether the call travels the pointer to an absolute position
    pub fn moves_pointer(&self) -> bool {
        match self {
            ToolCall::Move { .. } | ToolCall::Drag { .. } => true,
            ToolCall::Click { at, .. } | ToolCall::Scroll { at, .. } => at.is_some(),
            _ => false,
        }
    }

    /// Check argument shapes and ranges.
    ///
    /// `bounds` is the virtual desktop; when the backend cannot report it,
    /// coordinates only have to lie within [`MAX_COORDINATE`] of the origin.
    pub fn validate(&self, bounds: Option<ScreenRect>) -> InputResult<()> {
        let on_screen = |label: &str, p: Point| -> InputResult<()> {
            match bounds {
                Some(rect) if !rect.contains(p) => Err(InputError::InvalidArgument(format!(
                    "{label} {p} is outside the screen (left={}, top={}, width={}, height={})",
                    rect.left, rect.top, rect.width, rect.height
                ))),
                None if p.x.unsigned_abs() > MAX_COORDINATE as u32
                    || p.y.unsigned_abs() > MAX_COORDINATE as u32 =>
                {
                    Err(InputError::InvalidArgument(format!(
                        "{label} {p} is beyond ±{MAX_COORDINATE} and the screen size is unknown"
                    )))
                }
                _ => Ok(()),
            }
        };

        match self {
            ToolCall::Info | ToolCall::DesktopInfo => Ok(()),
            ToolCall::Move { to } => on_screen("target", *to),
            ToolCall::Click { at, clicks, .. } => {
                if !(1..=MAX_CLICKS).contains(clicks) {
                    return Err(InputError::InvalidArgument(format!(
                        "clicks must be between 1 and {MAX_CLICKS}, got {clicks}"
                    )));
                }
                at.map_or(Ok(()), |p| on_screen("click position", p))
            }
            ToolCall::Drag { from, to, .. } => {
                on_screen("drag start", *from)?;
                on_screen("drag end", *to)
            }
            ToolCall::Scroll { amount, at, .. } => {
                if *amount == 0 || amount.unsigned_abs() > MAX_SCROLL_NOTCHES {
                    return Err(InputError::InvalidArgument(format!(
                        "amount must be a non-zero notch count within \
                         ±{MAX_SCROLL_NOTCHES}, got {amount}"
                    )));
                }
                at.map_or(Ok(()), |p| on_screen("scroll position", p))
            }
            ToolCall::Type { text, .. } => {
                if text.is_empty() {
                    return Err(InputError::InvalidArgument("text must not be empty".into()));
                }
                let chars = text.chars().count();
                if chars > MAX_TEXT_CHARS {
                    return Err(InputError::InvalidArgument(format!(
                        "text has {chars} characters, limit is {MAX_TEXT_CHARS}"
                    )));
                }
                Ok(())
            }
            ToolCall::Shortcut { keys } => check_key_list(keys),
            ToolCall::Combo { keys, hold } => {
                check_key_list(keys)?;
                check_wait("hold_ms", *hold)
            }
            ToolCall::Key {
                key,
                times,
                interval,
                hold,
                ..
            } => {
                if key.trim().is_empty() {
                    return Err(InputError::InvalidArgument("key must not be empty".into()));
                }
                if !(1..=MAX_REPEAT).contains(times) {
                    return Err(InputError::InvalidArgument(format!(
                        "times must be between 1 and {MAX_REPEAT}, got {times}"
                    )));
                }
                check_wait("interval_ms", *interval)?;
                check_wait("hold_ms", *hold)
            }
            // Values are range-checked by the registry, which owns the rules.
            ToolCall::ConfigureRate(_) => Ok(()),
        }
    }
}

/// Split a `"ctrl+shift+t"` style shortcut into key names.
pub fn split_shortcut(shortcut: &str) -> Vec<String> {
    shortcut
        .split('+')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

fn check_key_list(keys: &[String]) -> InputResult<()> {
    if keys.is_empty() {
        return Err(InputError::InvalidArgument("keys must be a non-empty list".into()));
    }
    if keys.len() > MAX_COMBO_KEYS {
        return Err(InputError::InvalidArgument(format!(
            "at most {MAX_COMBO_KEYS} keys can be held together, got {}",
            keys.len()
        )));
    }
    if keys.iter().any(|k| k.trim().is_empty()) {
        return Err(InputError::InvalidArgument("key names must not be empty".into()));
    }
    Ok(())
}

fn check_wait(label: &str, wait: Duration) -> InputResult<()> {
    if wait > MAX_WAIT {
        return Err(InputError::InvalidArgument(format!(
            "{label} must be at most {}ms, got {}ms",
            MAX_WAIT.as_millis(),
            wait.as_millis()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCREEN: ScreenRect = ScreenRect {
        left: 0,
        top: 0,
        width: 1920,
        height: 1080,
    };

    fn move_to(x: i32, y: i32) -> ToolCall {
        ToolCall::Move {
            to: Point::new(x, y),
        }
    }

    #[test]
    fn off_screen_targets_are_invalid() {
        let call = move_to(2000, 10);
        let err = call.validate(Some(SCREEN)).unwrap_err();
        assert_eq!(err.kind(), "InvalidArgument");
        assert!(call.validate(None).is_ok());
    }

    #[test]
    fn unknown_screen_still_bounds_coordinates() {
        let call = move_to(i32::MAX, 0);
        assert_eq!(call.validate(None).unwrap_err().kind(), "InvalidArgument");

        let call = ToolCall::Click {
            button: MouseButton::Left,
            at: Some(Point::new(-5120, MAX_COORDINATE)),
            clicks: 1,
        };
        assert!(call.validate(None).is_ok());
    }

    #[test]
    fn only_absolute_targets_move_the_pointer() {
        assert!(move_to(1, 1).moves_pointer());
        let click = |at| ToolCall::Click {
            button: MouseButton::Left,
            at,
            clicks: 1,
        };
        assert!(click(Some(Point::new(3, 4))).moves_pointer());
        assert!(!click(None).moves_pointer());
        assert!(!ToolCall::DesktopInfo.moves_pointer());
    }

    #[test]
    fn drag_checks_both_ends() {
        let call = ToolCall::Drag {
            from: Point::new(10, 10),
            to: Point::new(10, 1080),
            button: MouseButton::Left,
        };
        assert!(call.validate(Some(SCREEN)).is_err());
    }

    #[test]
    fn empty_text_and_zero_scroll_are_rejected() {
        let text = ToolCall::Type {
            text: String::new(),
            method: TypeMethod::Unicode,
            press_enter: false,
        };
        assert!(text.validate(None).is_err());

        let scroll = ToolCall::Scroll {
            amount: 0,
            axis: ScrollAxis::Vertical,
            at: None,
        };
        assert!(scroll.validate(None).is_err());
    }

    #[test]
    fn key_repeat_and_waits_are_bounded() {
        let key = |times, hold_ms| ToolCall::Key {
            mode: KeyMode::Tap,
            key: "w".into(),
            times,
            interval: Duration::ZERO,
            hold: Duration::from_millis(hold_ms),
        };
        assert!(key(1, 0).validate(None).is_ok());
        assert!(key(0, 0).validate(None).is_err());
        assert!(key(MAX_REPEAT + 1, 0).validate(None).is_err());
        assert!(key(1, 10_001).validate(None).is_err());
    }

    #[test]
    fn combo_key_count_is_bounded() {
        let keys: Vec<String> = (0..9).map(|i| format!("f{}", i + 1)).collect();
        let call = ToolCall::Combo {
            keys,
            hold: Duration::ZERO,
        };
        assert!(call.validate(None).is_err());
        assert!(ToolCall::Shortcut { keys: vec![] }.validate(None).is_err());
    }

    #[test]
    fn shortcut_strings_split_on_plus() {
        assert_eq!(split_shortcut("ctrl + shift+T"), vec!["ctrl", "shift", "T"]);
        assert!(split_shortcut(" + ").is_empty());
    }
}
