//! IbInputSimulator loaded in-process
//!
//! The DLL exports a small C ABI (`IbSendInit`, `IbSendMouseMove`, ...) that
//! routes input through the selected driver. Cursor position, screen
//! geometry and the clipboard come straight from user32.

use async_trait::async_trait;
use std::ffi::c_void;
use std::os::windows::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use windows::Win32::Foundation::{HANDLE, HWND, POINT};
use windows::Win32::System::DataExchange::{
    CloseClipboard, EmptyClipboard, OpenClipboard, SetClipboardData,
};
use windows::Win32::System::LibraryLoader::{GetProcAddress, LoadLibraryW};
use windows::Win32::System::Memory::{
    GMEM_MOVEABLE, GlobalAlloc, GlobalFree, GlobalLock, GlobalUnlock,
};
use windows::Win32::UI::Input::KeyboardAndMouse::{
    INPUT, INPUT_0, INPUT_KEYBOARD, INPUT_MOUSE, KEYBDINPUT, KEYEVENTF_KEYUP, KEYEVENTF_UNICODE,
    MOUSEEVENTF_HWHEEL, MOUSEINPUT, VIRTUAL_KEY,
};
use windows::Win32::UI::WindowsAndMessaging::{
    GetCursorPos, GetSystemMetrics, SM_CMONITORS, SM_CXVIRTUALSCREEN, SM_CYVIRTUALSCREEN,
    SM_XVIRTUALSCREEN, SM_YVIRTUALSCREEN,
};
use windows::core::{PCSTR, PCWSTR, s};

use super::{BackendError, BackendInfo, Driver, InputBackend};
use crate::core::event::{Delta, MouseButton, Point, ScreenRect, ScrollAxis};

const INPUT_SIZE: i32 = std::mem::size_of::<INPUT>() as i32;
const WHEEL_DELTA: i32 = 120;
const CF_UNICODETEXT: u32 = 13;
/// `IbSendMouseMove` mode for relative motion
const MOVE_RELATIVE: u32 = 1;

type InitFn = unsafe extern "system" fn(u32, u32, *mut c_void) -> u32;
type DestroyFn = unsafe extern "system" fn();
type InputFn = unsafe extern "system" fn(u32, *const INPUT, i32) -> u32;
type MouseMoveFn = unsafe extern "system" fn(u32, u32, u32) -> bool;
type MouseClickFn = unsafe extern "system" fn(u32) -> bool;
type MouseWheelFn = unsafe extern "system" fn(i32) -> bool;
type KeybdFn = unsafe extern "system" fn(u16) -> bool;

/// Resolved DLL exports
struct Exports {
    destroy: DestroyFn,
    input: InputFn,
    mouse_move: MouseMoveFn,
    mouse_click: MouseClickFn,
    mouse_wheel: MouseWheelFn,
    key_down: KeybdFn,
    key_up: KeybdFn,
}

/// Backend calling IbInputSimulator.dll directly
pub struct IbsimDllBackend {
    dll: PathBuf,
    driver: Driver,
    api: Exports,
}

impl IbsimDllBackend {
    /// Load the DLL and initialise `driver`.
    ///
    /// The module stays loaded for the life of the process.
    pub fn load(dll: &Path, driver: Driver) -> anyhow::Result<Self> {
        let wide: Vec<u16> = dll.as_os_str().encode_wide().chain(std::iter::once(0)).collect();
        // SAFETY: `wide` is a NUL-terminated UTF-16 path that outlives the call.
        let module = unsafe { LoadLibraryW(PCWSTR(wide.as_ptr())) }
            .with_context(|| format!("failed to load {}", dll.display()))?;

        let resolve = |name: PCSTR| -> anyhow::Result<unsafe extern "system" fn() -> isize> {
            // SAFETY: `module` is a live module handle and `name` a static C string.
            unsafe { GetProcAddress(module, name) }.with_context(|| {
                // SAFETY: `s!` literals are NUL-terminated ASCII.
                let name = unsafe { name.to_string() }.unwrap_or_default();
                format!("{} does not export {name}", dll.display())
            })
        };

        // SAFETY: each export is transmuted to the signature IbInputSimulator
        // declares for it; all use the stdcall ("system") convention.
        let (init, api) = unsafe {
            let init: InitFn = std::mem::transmute(resolve(s!("IbSendInit"))?);
            let api = Exports {
                destroy: std::mem::transmute(resolve(s!("IbSendDestroy"))?),
                input: std::mem::transmute(resolve(s!("IbSendInput"))?),
                mouse_move: std::mem::transmute(resolve(s!("IbSendMouseMove"))?),
                mouse_click: std::mem::transmute(resolve(s!("IbSendMouseClick"))?),
                mouse_wheel: std::mem::transmute(resolve(s!("IbSendMouseWheel"))?),
                key_down: std::mem::transmute(resolve(s!("IbSendKeybdDown"))?),
                key_up: std::mem::transmute(resolve(s!("IbSendKeybdUp"))?),
            };
            (init, api)
        };

        // SAFETY: flags 0 and a null argument are valid for every send type.
        let rc = unsafe { init(driver.send_type(), 0, std::ptr::null_mut()) };
        if rc != 0 {
            bail!("IbSendInit failed with error {rc} (driver={})", driver.as_str());
        }

        Ok(Self {
            dll: dll.to_path_buf(),
            driver,
            api,
        })
    }

    fn send_inputs(&self, inputs: &[INPUT]) -> Result<(), BackendError> {
        // SAFETY: `inputs` is a valid slice of INPUT structs of INPUT_SIZE bytes.
        let sent = unsafe { (self.api.input)(inputs.len() as u32, inputs.as_ptr(), INPUT_SIZE) };
        if sent as usize != inputs.len() {
            return Err(BackendError::Rejected(format!(
                "IbSendInput accepted {sent} of {} inputs",
                inputs.len()
            )));
        }
        Ok(())
    }
}

impl Drop for IbsimDllBackend {
    fn drop(&mut self) {
        // SAFETY: init succeeded in `load`; destroy takes no arguments.
        unsafe { (self.api.destroy)() };
    }
}

fn check(ok: bool, what: &str) -> Result<(), BackendError> {
    if ok {
        Ok(())
    } else {
        Err(BackendError::Rejected(format!("{what} returned false")))
    }
}

/// `IbSendMouseClick` codes; these are the MOUSEEVENTF button flags
fn button_code(button: MouseButton, down: bool) -> u32 {
    match (button, down) {
        (MouseButton::Left, true) => 0x02,
        (MouseButton::Left, false) => 0x04,
        (MouseButton::Right, true) => 0x08,
        (MouseButton::Right, false) => 0x10,
        (MouseButton::Middle, true) => 0x20,
        (MouseButton::Middle, false) => 0x40,
    }
}

fn unicode_input(unit: u16, key_up: bool) -> INPUT {
    let flags = if key_up {
        KEYEVENTF_UNICODE | KEYEVENTF_KEYUP
    } else {
        KEYEVENTF_UNICODE
    };
    INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 {
            ki: KEYBDINPUT {
                wVk: VIRTUAL_KEY(0),
                wScan: unit,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

#[async_trait]
impl InputBackend for IbsimDllBackend {
    fn info(&self) -> BackendInfo {
        BackendInfo {
            name: "IBSimulatorDLL".into(),
            driver: self.driver.as_str().into(),
            ready: true,
            details: format!("dll={}", self.dll.display()),
        }
    }

    async fn inject_move(&self, delta: Delta) -> Result<(), BackendError> {
        // SAFETY: plain integer arguments; negative deltas are passed as their
        // two's complement bit pattern, which the DLL reinterprets as signed.
        let ok =
            unsafe { (self.api.mouse_move)(delta.dx as u32, delta.dy as u32, MOVE_RELATIVE) };
        check(ok, "IbSendMouseMove")
    }

    async fn inject_button(&self, button: MouseButton, down: bool) -> Result<(), BackendError> {
        // SAFETY: plain integer argument.
        let ok = unsafe { (self.api.mouse_click)(button_code(button, down)) };
        check(ok, "IbSendMouseClick")
    }

    async fn inject_key(&self, code: u16, down: bool) -> Result<(), BackendError> {
        // SAFETY: plain integer argument.
        let ok = unsafe {
            if down {
                (self.api.key_down)(code)
            } else {
                (self.api.key_up)(code)
            }
        };
        check(ok, if down { "IbSendKeybdDown" } else { "IbSendKeybdUp" })
    }

    async fn inject_text(&self, codepoint: char) -> Result<(), BackendError> {
        let mut units = [0u16; 2];
        let units = codepoint.encode_utf16(&mut units);
        let mut inputs: Vec<INPUT> = units.iter().map(|&u| unicode_input(u, false)).collect();
        inputs.extend(units.iter().map(|&u| unicode_input(u, true)));
        self.send_inputs(&inputs)
    }

    async fn inject_scroll(&self, axis: ScrollAxis, amount: i32) -> Result<(), BackendError> {
        match axis {
            ScrollAxis::Vertical => {
                // SAFETY: plain integer argument.
                let ok = unsafe { (self.api.mouse_wheel)(amount * WHEEL_DELTA) };
                check(ok, "IbSendMouseWheel")
            }
            ScrollAxis::Horizontal => {
                let input = INPUT {
                    r#type: INPUT_MOUSE,
                    Anonymous: INPUT_0 {
                        mi: MOUSEINPUT {
                            dx: 0,
                            dy: 0,
                            mouseData: (amount * WHEEL_DELTA) as u32,
                            dwFlags: MOUSEEVENTF_HWHEEL,
                            time: 0,
                            dwExtraInfo: 0,
                        },
                    },
                };
                self.send_inputs(&[input])
            }
        }
    }

    async fn set_clipboard(&self, text: &str) -> Result<(), BackendError> {
        let wide: Vec<u16> = text.encode_utf16().chain(std::iter::once(0)).collect();
        let bytes = wide.len() * std::mem::size_of::<u16>();
        let fail = |what: &str, e: windows::core::Error| {
            BackendError::Rejected(format!("{what}: {e}"))
        };

        // SAFETY: standard clipboard protocol. The global block is sized for
        // `wide`, filled while locked, and owned by the system once
        // SetClipboardData succeeds; otherwise it is freed here.
        unsafe {
            OpenClipboard(HWND::default()).map_err(|e| fail("OpenClipboard", e))?;
            let result = (|| {
                EmptyClipboard().map_err(|e| fail("EmptyClipboard", e))?;
                let mem = GlobalAlloc(GMEM_MOVEABLE, bytes).map_err(|e| fail("GlobalAlloc", e))?;
                let dst = GlobalLock(mem) as *mut u16;
                if dst.is_null() {
                    let _ = GlobalFree(mem);
                    return Err(BackendError::Rejected("GlobalLock failed".into()));
                }
                std::ptr::copy_nonoverlapping(wide.as_ptr(), dst, wide.len());
                let _ = GlobalUnlock(mem);
                if let Err(e) = SetClipboardData(CF_UNICODETEXT, HANDLE(mem.0)) {
                    let _ = GlobalFree(mem);
                    return Err(fail("SetClipboardData", e));
                }
                Ok(())
            })();
            let _ = CloseClipboard();
            result
        }
    }

    async fn cursor_position(&self) -> Option<Point> {
        let mut pt = POINT::default();
        // SAFETY: `pt` is a valid out pointer.
        unsafe { GetCursorPos(&mut pt) }.ok()?;
        Some(Point::new(pt.x, pt.y))
    }

    async fn screen_bounds(&self) -> Option<ScreenRect> {
        // SAFETY: GetSystemMetrics has no preconditions.
        let (left, top, width, height) = unsafe {
            (
                GetSystemMetrics(SM_XVIRTUALSCREEN),
                GetSystemMetrics(SM_YVIRTUALSCREEN),
                GetSystemMetrics(SM_CXVIRTUALSCREEN),
                GetSystemMetrics(SM_CYVIRTUALSCREEN),
            )
        };
        (width > 0 && height > 0).then(|| ScreenRect {
            left,
            top,
            width: width as u32,
            height: height as u32,
        })
    }

    async fn monitor_count(&self) -> Option<u32> {
        // SAFETY: GetSystemMetrics has no preconditions.
        let monitors = unsafe { GetSystemMetrics(SM_CMONITORS) };
        (monitors > 0).then_some(monitors as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn button_codes_match_mouseeventf_flags() {
        assert_eq!(button_code(MouseButton::Left, true), 0x02);
        assert_eq!(button_code(MouseButton::Right, false), 0x10);
        assert_eq!(button_code(MouseButton::Middle, true), 0x20);
    }

    #[test]
    fn astral_text_uses_surrogate_pair() {
        let mut units = [0u16; 2];
        assert_eq!('😀'.encode_utf16(&mut units).len(), 2);
        let input = unicode_input(units[0], true);
        // SAFETY: the keyboard arm was just written.
        let ki = unsafe { input.Anonymous.ki };
        assert_eq!(ki.wScan, 0xD83D);
        assert_eq!(ki.dwFlags, KEYEVENTF_UNICODE | KEYEVENTF_KEYUP);
    }
}
