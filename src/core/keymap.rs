//! Key name and character lookup into Windows virtual-key codes.
//!
//! See: https://learn.microsoft.com/windows/win32/inputdev/virtual-key-codes

pub const VK_SHIFT: u16 = 0x10;
pub const VK_CONTROL: u16 = 0x11;
pub const VK_RETURN: u16 = 0x0D;
pub const VK_V: u16 = 0x56;

/// Map a human-readable key name to a virtual-key code.
///
/// Accepts named keys (`enter`, `ctrl`, `pgdn`, ...), `f1`..`f24`, numpad
/// names, single letters, digits and US-layout punctuation, and raw codes
/// written as `vk41`, `vk_41` or `0x41`.
pub fn key_code(name: &str) -> Option<u16> {
    let key = name.trim().to_ascii_lowercase();
    if key.is_empty() {
        return None;
    }

    if let Some(hex) = key.strip_prefix("vk") {
        if !hex.is_empty() {
            return parse_hex_code(hex.trim_start_matches('_'));
        }
    }
    if let Some(hex) = key.strip_prefix("0x") {
        return parse_hex_code(hex);
    }

    if let Some(n) = key.strip_prefix('f').and_then(|n| n.parse::<u16>().ok()) {
        if (1..=24).contains(&n) {
            return Some(0x70 + n - 1);
        }
    }

    let code = match key.as_str() {
        // Editing and whitespace
        "enter" | "return" | "numpadenter" => VK_RETURN,
        "backspace" | "bs" => 0x08,
        "tab" => 0x09,
        "esc" | "escape" => 0x1B,
        "space" => 0x20,
        "insert" | "ins" => 0x2D,
        "delete" | "del" => 0x2E,

        // Locks and system
        "capslock" | "caps" => 0x14,
        "numlock" => 0x90,
        "scrolllock" => 0x91,
        "pause" | "break" => 0x13,
        "printscreen" | "prtsc" | "prtscr" => 0x2C,

        // Navigation
        "home" => 0x24,
        "end" => 0x23,
        "pageup" | "pgup" => 0x21,
        "pagedown" | "pgdn" => 0x22,
        "up" => 0x26,
        "down" => 0x28,
        "left" => 0x25,
        "right" => 0x27,

        // Modifiers
        "shift" => VK_SHIFT,
        "lshift" => 0xA0,
        "rshift" => 0xA1,
        "ctrl" | "control" => VK_CONTROL,
        "lctrl" => 0xA2,
        "rctrl" => 0xA3,
        "alt" => 0x12,
        "lalt" => 0xA4,
        "ralt" => 0xA5,
        "win" | "lwin" | "super" | "meta" => 0x5B,
        "rwin" => 0x5C,
        "apps" | "menu" => 0x5D,

        // Numpad
        "numpad*" | "multiply" | "kp_multiply" => 0x6A,
        "numpad+" | "add" | "kp_add" => 0x6B,
        "numpad-" | "subtract" | "kp_subtract" => 0x6D,
        "numpad." | "decimal" | "kp_decimal" => 0x6E,
        "numpad/" | "divide" | "kp_divide" => 0x6F,

        // OEM punctuation
        "semicolon" | "oem_1" => 0xBA,
        "equals" | "oem_plus" => 0xBB,
        "comma" | "oem_comma" => 0xBC,
        "minus" | "oem_minus" => 0xBD,
        "period" | "dot" | "oem_period" => 0xBE,
        "slash" | "oem_2" => 0xBF,
        "grave" | "backquote" | "oem_3" => 0xC0,
        "leftbracket" | "oem_4" => 0xDB,
        "backslash" | "pipe" | "oem_5" => 0xDC,
        "rightbracket" | "oem_6" => 0xDD,
        "apostrophe" | "quote" | "oem_7" => 0xDE,
        "oem_8" => 0xDF,

        other => {
            if let Some(digit) = numpad_digit(other) {
                return Some(0x60 + digit);
            }
            let mut chars = other.chars();
            return match (chars.next(), chars.next()) {
                (Some(ch), None) => char_code(ch).map(|(code, _)| code),
                _ => None,
            };
        }
    };
    Some(code)
}

fn parse_hex_code(hex: &str) -> Option<u16> {
    u16::from_str_radix(hex, 16).ok().filter(|code| *code > 0 && *code <= 0xFF)
}

fn numpad_digit(name: &str) -> Option<u16> {
    let digit = name
        .strip_prefix("numpad")
        .or_else(|| name.strip_prefix("num"))
        .or_else(|| name.strip_prefix("kp"))?;
    match digit.parse::<u16>() {
        Ok(d) if d <= 9 && digit.len() == 1 => Some(d),
        _ => None,
    }
}

/// Map a character to the virtual key that produces it on a US layout,
/// with a flag for whether Shift must be held.
///
/// Returns `None` for characters without a key on that layout (accented
/// letters, CJK, emoji, most control characters).
pub fn char_code(ch: char) -> Option<(u16, bool)> {
    let mapped = match ch {
        'a'..='z' => (ch.to_ascii_uppercase() as u16, false),
        'A'..='Z' => (ch as u16, true),
        '0'..='9' => (ch as u16, false),
        ' ' => (0x20, false),
        '\n' | '\r' => (VK_RETURN, false),
        '\t' => (0x09, false),

        ')' => (0x30, true),
        '!' => (0x31, true),
        '@' => (0x32, true),
        '#' => (0x33, true),
        '$' => (0x34, true),
        '%' => (0x35, true),
        '^' => (0x36, true),
        '&' => (0x37, true),
        '*' => (0x38, true),
        '(' => (0x39, true),

        ';' => (0xBA, false),
        ':' => (0xBA, true),
        '=' => (0xBB, false),
        '+' => (0xBB, true),
        ',' => (0xBC, false),
        '<' => (0xBC, true),
        '-' => (0xBD, false),
        '_' => (0xBD, true),
        '.' => (0xBE, false),
        '>' => (0xBE, true),
        '/' => (0xBF, false),
        '?' => (0xBF, true),
        '`' => (0xC0, false),
        '~' => (0xC0, true),
        '[' => (0xDB, false),
        '{' => (0xDB, true),
        '\\' => (0xDC, false),
        '|' => (0xDC, true),
        ']' => (0xDD, false),
        '}' => (0xDD, true),
        '\'' => (0xDE, false),
        '"' => (0xDE, true),

        _ => return None,
    };
    Some(mapped)
}
