//! Primitive event codec
//!
//! Expands a [`ToolCall`] into the ordered primitives the dispatcher paces
//! and injects. Expansion is pure: no clocks, no backend, no shared state.
//! Timing requirements appear as [`Primitive::Wait`] markers.

use std::time::Duration;

use crate::core::event::{Delta, InputEvent, MouseButton, Point, Primitive, ScrollAxis};
use crate::core::keymap::{self, VK_CONTROL, VK_RETURN, VK_SHIFT, VK_V};
use crate::core::request::{KeyMode, ToolCall, TypeMethod};
use crate::error::{InputError, InputResult};

/// Longest gap between the down and up of one tap
const MAX_TAP_PRESS: Duration = Duration::from_millis(250);

/// Inputs the codec needs beyond the call itself
#[derive(Debug, Clone, Copy)]
pub struct ExpandContext {
    /// Last known cursor position
    pub cursor: Point,
    /// Current pointer step limit in pixels per axis
    pub max_step: u32,
}

/// Expand a call into primitives.
///
/// `Input-Info`, `Desktop-Info` and `Input-RateLimiter-Config` expand to
/// nothing.
pub fn expand(call: &ToolCall, ctx: ExpandContext) -> InputResult<Vec<Primitive>> {
    let mut out = Vec::new();
    match call {
        ToolCall::Info | ToolCall::DesktopInfo | ToolCall::ConfigureRate(_) => {}
        ToolCall::Move { to } => out.extend(pointer_path(ctx.cursor, *to, ctx.max_step)?),
        ToolCall::Click { button, at, clicks } => {
            if let Some(at) = at {
                out.extend(pointer_path(ctx.cursor, *at, ctx.max_step)?);
            }
            for _ in 0..*clicks {
                out.extend(click(*button));
            }
        }
        ToolCall::Drag { from, to, button } => {
            let [press, release] = click(*button);
            out.extend(pointer_path(ctx.cursor, *from, ctx.max_step)?);
            out.push(press);
            out.extend(pointer_path(*from, *to, ctx.max_step)?);
            out.push(release);
        }
        ToolCall::Scroll { amount, axis, at } => {
            if let Some(at) = at {
                out.extend(pointer_path(ctx.cursor, *at, ctx.max_step)?);
            }
            out.extend(scroll(*axis, *amount));
        }
        ToolCall::Type {
            text,
            method,
            press_enter,
        } => {
            out.extend(type_text(text, *method)?);
            if *press_enter {
                out.extend(tap(VK_RETURN));
            }
        }
        ToolCall::Shortcut { keys } => out.extend(combo(&resolve_keys(keys)?, Duration::ZERO)),
        ToolCall::Combo { keys, hold } => out.extend(combo(&resolve_keys(keys)?, *hold)),
        ToolCall::Key {
            mode,
            key,
            times,
            interval,
            hold,
        } => {
            let code = resolve_key(key)?;
            out.extend(key_action(code, *mode, *times, *interval, *hold));
        }
    }
    Ok(out)
}

/// Split a relative move into steps of at most `max_step` pixels per axis.
///
/// Yields `ceil(D / max_step)` deltas where `D` is the per-axis magnitude.
/// Every delta but the last advances exactly `max_step` along the major
/// axis; the minor axis is distributed proportionally from rounded running
/// totals, so the deltas always sum to `delta`.
pub fn split_move(delta: Delta, max_step: u32) -> Vec<Delta> {
    let distance = delta.magnitude() as i128;
    if distance == 0 {
        return Vec::new();
    }
    let step = max_step.max(1) as i128;
    let count = (distance + step - 1) / step;

    let mut steps = Vec::with_capacity(count as usize);
    let mut prev = (0i128, 0i128);
    for k in 1..=count {
        let travelled = (k * step).min(distance);
        let cum = (
            scale(delta.dx as i128, travelled, distance),
            scale(delta.dy as i128, travelled, distance),
        );
        steps.push(Delta::new((cum.0 - prev.0) as i32, (cum.1 - prev.1) as i32));
        prev = cum;
    }
    steps
}

/// First step of [`split_move`] without building the whole sequence.
pub fn first_step(delta: Delta, max_step: u32) -> Delta {
    let distance = delta.magnitude() as i128;
    if distance <= max_step as i128 {
        return delta;
    }
    let travelled = max_step.max(1) as i128;
    Delta::new(
        scale(delta.dx as i128, travelled, distance) as i32,
        scale(delta.dy as i128, travelled, distance) as i32,
    )
}

/// `component * travelled / distance`, rounded half away from zero
fn scale(component: i128, travelled: i128, distance: i128) -> i128 {
    let num = component * travelled;
    if num >= 0 {
        (num + distance / 2) / distance
    } else {
        -((-num + distance / 2) / distance)
    }
}

/// Pointer moves from `from` to `to`, closed by a [`Primitive::Reach`]
/// marker for `to`.
pub fn pointer_path(from: Point, to: Point, max_step: u32) -> InputResult<Vec<Primitive>> {
    let delta = from.delta_to(to).ok_or_else(|| {
        InputError::InvalidArgument(format!(
            "cannot move from {from} to {to}: distance overflows"
        ))
    })?;
    let mut out: Vec<Primitive> = split_move(delta, max_step)
        .into_iter()
        .map(|d| InputEvent::PointerMove(d).into())
        .collect();
    out.push(Primitive::Reach(to));
    Ok(out)
}

/// Press and release of `button`
pub fn click(button: MouseButton) -> [Primitive; 2] {
    [true, false].map(|down| InputEvent::Button { button, down }.into())
}

pub fn tap(code: u16) -> [Primitive; 2] {
    [true, false].map(|down| key(code, down))
}

fn key(code: u16, down: bool) -> Primitive {
    InputEvent::Key { code, down }.into()
}

/// One notch per event; the sign of `amount` picks the direction.
pub fn scroll(axis: ScrollAxis, amount: i32) -> Vec<Primitive> {
    let unit = amount.signum();
    (0..amount.unsigned_abs())
        .map(|_| InputEvent::Scroll { axis, amount: unit }.into())
        .collect()
}

pub fn type_text(text: &str, method: TypeMethod) -> InputResult<Vec<Primitive>> {
    match method {
        // `chars` yields scalar values, so surrogate pairs stay whole.
        TypeMethod::Unicode => Ok(text
            .chars()
            .map(|codepoint| InputEvent::Text { codepoint }.into())
            .collect()),
        TypeMethod::Vk => {
            let mut out = Vec::with_capacity(text.len() * 2);
            for (index, ch) in text.chars().enumerate() {
                let (code, shift) =
                    keymap::char_code(ch).ok_or(InputError::UnmappableCharacter { ch, index })?;
                if shift {
                    out.push(key(VK_SHIFT, true));
                }
                out.extend(tap(code));
                if shift {
                    out.push(key(VK_SHIFT, false));
                }
            }
            Ok(out)
        }
        TypeMethod::Clipboard => {
            let mut out = vec![Primitive::SetClipboard(text.to_string())];
            out.extend(combo(&[VK_CONTROL, VK_V], Duration::ZERO));
            Ok(out)
        }
    }
}

/// Press `codes` in order, optionally hold, release in reverse.
pub fn combo(codes: &[u16], hold: Duration) -> Vec<Primitive> {
    let mut out: Vec<Primitive> = codes.iter().map(|&code| key(code, true)).collect();
    if !hold.is_zero() {
        out.push(Primitive::Wait(hold));
    }
    out.extend(codes.iter().rev().map(|&code| key(code, false)));
    out
}

pub fn key_action(
    code: u16,
    mode: KeyMode,
    times: u32,
    interval: Duration,
    hold: Duration,
) -> Vec<Primitive> {
    let down = || key(code, true);
    let up = || key(code, false);
    match mode {
        KeyMode::Down => vec![down()],
        KeyMode::Up => vec![up()],
        KeyMode::Hold => {
            let mut out = vec![down()];
            if !hold.is_zero() {
                out.push(Primitive::Wait(hold));
            }
            out.push(up());
            out
        }
        KeyMode::Tap => {
            let mut out = Vec::new();
            for i in 0..times.max(1) {
                out.push(down());
                if !interval.is_zero() {
                    out.push(Primitive::Wait(interval.min(MAX_TAP_PRESS)));
                }
                out.push(up());
                if !interval.is_zero() && i + 1 < times {
                    out.push(Primitive::Wait(interval));
                }
            }
            out
        }
    }
}

fn resolve_key(name: &str) -> InputResult<u16> {
    keymap::key_code(name)
        .ok_or_else(|| InputError::InvalidArgument(format!("unknown key name {name:?}")))
}

fn resolve_keys(names: &[String]) -> InputResult<Vec<u16>> {
    names.iter().map(|name| resolve_key(name)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ExpandContext {
        ExpandContext {
            cursor: Point::new(0, 0),
            max_step: 60,
        }
    }

    fn move_to(x: i32, y: i32) -> ToolCall {
        ToolCall::Move {
            to: Point::new(x, y),
        }
    }

    fn moves(prims: &[Primitive]) -> Vec<Delta> {
        prims
            .iter()
            .filter_map(|p| match p {
                Primitive::Event(InputEvent::PointerMove(d)) => Some(*d),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn long_horizontal_move_splits_into_full_steps_and_remainder() {
        let out = expand(&move_to(1000, 0), ctx()).unwrap();
        let steps = moves(&out);
        assert_eq!(steps.len(), 17);
        assert!(steps[..16].iter().all(|d| *d == Delta::new(60, 0)));
        assert_eq!(steps[16], Delta::new(40, 0));
        assert_eq!(steps.iter().copied().sum::<Delta>(), Delta::new(1000, 0));
    }

    #[test]
    fn diagonal_split_has_no_drift_and_respects_step() {
        for (delta, step) in [
            (Delta::new(997, -431), 60),
            (Delta::new(-13, 7), 5),
            (Delta::new(250, 250), 60),
            (Delta::new(1, -1), 1),
            (Delta::new(0, -1079), 7),
        ] {
            let steps = split_move(delta, step);
            let expected = (delta.magnitude() as usize).div_ceil(step as usize);
            assert_eq!(steps.len(), expected, "{delta:?} / {step}");
            assert!(steps.iter().all(|d| d.magnitude() <= step), "{delta:?} / {step}");
            assert_eq!(steps.iter().copied().sum::<Delta>(), delta);
        }
    }

    #[test]
    fn zero_move_only_marks_the_target() {
        assert!(split_move(Delta::ZERO, 60).is_empty());
        let ctx = ExpandContext {
            cursor: Point::new(5, 5),
            max_step: 60,
        };
        let out = expand(&move_to(5, 5), ctx).unwrap();
        assert_eq!(out, vec![Primitive::Reach(Point::new(5, 5))]);
    }

    #[test]
    fn paths_end_on_their_target() {
        let out = expand(&move_to(130, -20), ctx()).unwrap();
        assert_eq!(out.last(), Some(&Primitive::Reach(Point::new(130, -20))));
        assert_eq!(moves(&out).len(), 3);
    }

    #[test]
    fn overflowing_distance_is_invalid() {
        let ctx = ExpandContext {
            cursor: Point::new(-10, 0),
            max_step: 60,
        };
        let err = expand(&move_to(i32::MAX, 0), ctx).unwrap_err();
        assert_eq!(err.kind(), "InvalidArgument");
    }

    #[test]
    fn unicode_typing_is_one_event_per_codepoint() {
        let out = type_text("é", TypeMethod::Unicode).unwrap();
        assert_eq!(out, vec![Primitive::Event(InputEvent::Text { codepoint: 'é' })]);

        // U+1F600 is a surrogate pair in UTF-16 but a single event here.
        let out = type_text("a😀", TypeMethod::Unicode).unwrap();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn vk_typing_fails_on_unmapped_character() {
        let err = type_text("abé", TypeMethod::Vk).unwrap_err();
        assert_eq!(err, InputError::UnmappableCharacter { ch: 'é', index: 2 });
    }

    #[test]
    fn vk_typing_wraps_shifted_characters() {
        let out = type_text("A", TypeMethod::Vk).unwrap();
        assert_eq!(
            out,
            vec![
                key(VK_SHIFT, true),
                key(0x41, true),
                key(0x41, false),
                key(VK_SHIFT, false),
            ]
        );
    }

    #[test]
    fn clipboard_typing_is_one_paste() {
        let out = type_text("hello world", TypeMethod::Clipboard).unwrap();
        assert_eq!(out[0], Primitive::SetClipboard("hello world".into()));
        assert_eq!(out.len(), 5);
        assert_eq!(out[1], key(VK_CONTROL, true));
        assert_eq!(out[4], key(VK_CONTROL, false));
    }

    #[test]
    fn combo_releases_in_reverse_after_hold() {
        let call = ToolCall::Combo {
            keys: vec!["shift".into(), "w".into()],
            hold: Duration::from_millis(600),
        };
        let out = expand(&call, ctx()).unwrap();
        assert_eq!(
            out,
            vec![
                key(VK_SHIFT, true),
                key(0x57, true),
                Primitive::Wait(Duration::from_millis(600)),
                key(0x57, false),
                key(VK_SHIFT, false),
            ]
        );
    }

    #[test]
    fn unknown_key_in_combo_is_invalid() {
        let call = ToolCall::Shortcut {
            keys: vec!["ctrl".into(), "hyper".into()],
        };
        assert_eq!(expand(&call, ctx()).unwrap_err().kind(), "InvalidArgument");
    }

    #[test]
    fn hold_schedules_release() {
        let out = key_action(0x57, KeyMode::Hold, 1, Duration::ZERO, Duration::from_millis(500));
        assert_eq!(out.len(), 3);
        assert_eq!(out[1], Primitive::Wait(Duration::from_millis(500)));
    }

    #[test]
    fn tap_press_is_capped_and_trailing_wait_dropped() {
        let out = key_action(0x57, KeyMode::Tap, 2, Duration::from_millis(400), Duration::ZERO);
        assert_eq!(
            out,
            vec![
                key(0x57, true),
                Primitive::Wait(Duration::from_millis(250)),
                key(0x57, false),
                Primitive::Wait(Duration::from_millis(400)),
                key(0x57, true),
                Primitive::Wait(Duration::from_millis(250)),
                key(0x57, false),
            ]
        );
    }

    #[test]
    fn scroll_splits_into_unit_notches() {
        let out = scroll(ScrollAxis::Vertical, -3);
        assert_eq!(out.len(), 3);
        let notch: Primitive = InputEvent::Scroll {
            axis: ScrollAxis::Vertical,
            amount: -1,
        }
        .into();
        assert!(out.iter().all(|p| *p == notch));
    }

    #[test]
    fn drag_presses_at_start_and_releases_at_end() {
        let call = ToolCall::Drag {
            from: Point::new(100, 0),
            to: Point::new(100, 130),
            button: MouseButton::Left,
        };
        let out = expand(&call, ctx()).unwrap();
        let [press, release] = click(MouseButton::Left);
        let at = out.iter().position(|p| *p == press).unwrap();
        assert_eq!(moves(&out[..at]).into_iter().sum::<Delta>(), Delta::new(100, 0));
        assert_eq!(moves(&out[at..]).into_iter().sum::<Delta>(), Delta::new(0, 130));
        assert_eq!(out[at - 1], Primitive::Reach(Point::new(100, 0)));
        assert_eq!(out.last(), Some(&release));
    }

    #[test]
    fn press_enter_appends_a_tap() {
        let call = ToolCall::Type {
            text: "hi".into(),
            method: TypeMethod::Unicode,
            press_enter: true,
        };
        let out = expand(&call, ctx()).unwrap();
        assert_eq!(&out[2..], &tap(VK_RETURN));
    }
}
