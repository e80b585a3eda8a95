//! IbInputSimulator through its AutoHotkey v2 binding
//!
//! Each primitive runs as a short AutoHotkey script that loads the binding,
//! initialises the configured driver and performs one action. Startup cost
//! is tens of milliseconds per event, which the pacer's intervals absorb at
//! the default rates.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::process::Command as AsyncCommand;
use tokio::sync::OnceCell;

use super::{discovery, BackendError, BackendInfo, Driver, InputBackend};
use crate::config::Settings;
use crate::core::event::{Delta, MouseButton, Point, ScreenRect, ScrollAxis};

/// Upper bound for one script run
const SCRIPT_TIMEOUT: Duration = Duration::from_secs(6);

const PLAIN_HEADER: &str = "#Requires AutoHotkey v2.0\n\
                            #NoTrayIcon\n\
                            CoordMode \"Mouse\", \"Screen\"\n";

/// Prints the virtual screen origin and size, then the monitor count
const DESKTOP_SCRIPT: &str = "FileAppend SysGet(76) \",\" SysGet(77) \",\" SysGet(78) \",\" \
                              SysGet(79) \",\" SysGet(80), \"*\"\n";

static SCRIPT_SEQ: AtomicU64 = AtomicU64::new(0);

/// AutoHotkey-driven backend
pub struct IbsimAhkBackend {
    exe: Option<PathBuf>,
    include: Option<PathBuf>,
    dll: Option<PathBuf>,
    driver: Driver,
    desktop: OnceCell<(ScreenRect, u32)>,
}

impl IbsimAhkBackend {
    pub fn discover(settings: &Settings, dirs: &[PathBuf]) -> Self {
        Self {
            exe: discovery::find_autohotkey(settings.autohotkey_exe.as_deref()),
            include: discovery::find_ahk_include(dirs),
            dll: discovery::find_ibsim_dll(dirs),
            driver: settings.driver,
            desktop: OnceCell::new(),
        }
    }

    fn parts(&self) -> Option<(&Path, &Path, &Path)> {
        Some((self.exe.as_deref()?, self.include.as_deref()?, self.dll.as_deref()?))
    }

    /// Script prologue: load the binding and pick a send mode, falling back
    /// to SendInput and then to plain input mode.
    fn header(&self, include: &Path, dll: &Path) -> String {
        format!(
            "#Requires AutoHotkey v2.0\n\
             #NoTrayIcon\n\
             #DllLoad \"*i {dll}\"\n\
             #Include \"{include}\"\n\
             try {{\n\
             \x20   IbSendInit(\"{driver}\")\n\
             }} catch {{\n\
             \x20   try {{\n\
             \x20       IbSendInit(\"SendInput\")\n\
             \x20   }} catch {{\n\
             \x20       SendMode \"Input\"\n\
             \x20   }}\n\
             }}\n\
             CoordMode \"Mouse\", \"Screen\"\n",
            dll = dll.display(),
            include = include.display(),
            driver = self.driver.as_str(),
        )
    }

    /// Run `action` through the driver, retrying with plain input on error.
    async fn send(&self, action: &str) -> Result<(), BackendError> {
        let body = format!(
            "try {{\n\
             \x20   IbSendMode(1)\n\
             \x20   {action}\n\
             \x20   IbSendMode(0)\n\
             }} catch {{\n\
             \x20   SendMode \"Input\"\n\
             \x20   {action}\n\
             }}\n"
        );
        self.run(&body, true).await.map(|_| ())
    }

    /// Virtual desktop and monitor count, read once per backend.
    async fn desktop(&self) -> Option<(ScreenRect, u32)> {
        self.desktop
            .get_or_try_init(|| async {
                let out = self.run(DESKTOP_SCRIPT, false).await?;
                parse_desktop(&out).ok_or_else(|| {
                    BackendError::Rejected(format!("unexpected desktop metrics: {}", out.trim()))
                })
            })
            .await
            .inspect_err(|e| tracing::warn!("cannot read desktop metrics: {e}"))
            .ok()
            .copied()
    }

    /// Run a script and return its stdout.
    async fn run(&self, body: &str, with_driver: bool) -> Result<String, BackendError> {
        let Some((exe, include, dll)) = self.parts() else {
            return Err(BackendError::Unavailable(
                "AutoHotkey or IbInputSimulator binding not found".into(),
            ));
        };

        let mut script = if with_driver {
            self.header(include, dll)
        } else {
            PLAIN_HEADER.to_string()
        };
        script.push_str(body);
        script.push_str("ExitApp\n");

        let path = std::env::temp_dir().join(format!(
            "ibsim_{}_{}.ahk",
            std::process::id(),
            SCRIPT_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        tokio::fs::write(&path, script.as_bytes())
            .await
            .map_err(|e| BackendError::Rejected(format!("failed to write script: {e}")))?;

        let result = tokio::time::timeout(
            SCRIPT_TIMEOUT,
            AsyncCommand::new(exe)
                .arg("/ErrorStdOut")
                .arg(&path)
                .kill_on_drop(true)
                .output(),
        )
        .await;
        let _ = tokio::fs::remove_file(&path).await;

        let output = match result {
            Err(_) => {
                return Err(BackendError::Rejected(format!(
                    "AutoHotkey script timed out after {}s",
                    SCRIPT_TIMEOUT.as_secs()
                )));
            }
            Ok(Err(e)) => {
                return Err(BackendError::Unavailable(format!(
                    "failed to start {}: {e}",
                    exe.display()
                )));
            }
            Ok(Ok(output)) => output,
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            tracing::debug!("AutoHotkey script failed: {stdout}");
            return Err(BackendError::Rejected(format!(
                "AutoHotkey exited with {}: {}",
                output.status,
                stdout.trim()
            )));
        }
        Ok(stdout)
    }
}

#[async_trait]
impl InputBackend for IbsimAhkBackend {
    fn info(&self) -> BackendInfo {
        let show = |p: &Option<PathBuf>| {
            p.as_ref()
                .map_or("<missing>".to_string(), |p| p.display().to_string())
        };
        BackendInfo {
            name: "IBSimulatorAHK".into(),
            driver: self.driver.as_str().into(),
            ready: self.parts().is_some(),
            details: format!(
                "ahk={}, include={}, dll={}",
                show(&self.exe),
                show(&self.include),
                show(&self.dll)
            ),
        }
    }

    async fn inject_move(&self, delta: Delta) -> Result<(), BackendError> {
        self.send(&format!("MouseMove {}, {}, 0, \"R\"", delta.dx, delta.dy)).await
    }

    async fn inject_button(&self, button: MouseButton, down: bool) -> Result<(), BackendError> {
        let state = if down { "Down" } else { "Up" };
        self.send(&format!("Click \"{} {state}\"", button.as_str())).await
    }

    async fn inject_key(&self, code: u16, down: bool) -> Result<(), BackendError> {
        let state = if down { "down" } else { "up" };
        self.send(&format!("Send \"{{vk{code:02X} {state}}}\"")).await
    }

    async fn inject_text(&self, codepoint: char) -> Result<(), BackendError> {
        self.send(&format!("Send \"{{U+{:04X}}}\"", codepoint as u32)).await
    }

    async fn inject_scroll(&self, axis: ScrollAxis, amount: i32) -> Result<(), BackendError> {
        self.send(&format!("Send \"{{{} 1}}\"", wheel_key(axis, amount))).await
    }

    async fn set_clipboard(&self, text: &str) -> Result<(), BackendError> {
        let body = format!(
            "A_Clipboard := \"{}\"\nif !ClipWait(1)\n    ExitApp 1\n",
            quote(text)
        );
        self.run(&body, false).await.map(|_| ())
    }

    async fn cursor_position(&self) -> Option<Point> {
        let out = self
            .run("MouseGetPos &x, &y\nFileAppend x \",\" y, \"*\"\n", false)
            .await
            .ok()?;
        let nums = parse_ints(&out);
        match nums[..] {
            [x, y] => Some(Point::new(x, y)),
            _ => None,
        }
    }

    async fn screen_bounds(&self) -> Option<ScreenRect> {
        self.desktop().await.map(|(bounds, _)| bounds)
    }

    async fn monitor_count(&self) -> Option<u32> {
        self.desktop().await.map(|(_, monitors)| monitors)
    }
}

fn wheel_key(axis: ScrollAxis, amount: i32) -> &'static str {
    match (axis, amount > 0) {
        (ScrollAxis::Vertical, true) => "WheelUp",
        (ScrollAxis::Vertical, false) => "WheelDown",
        (ScrollAxis::Horizontal, true) => "WheelRight",
        (ScrollAxis::Horizontal, false) => "WheelLeft",
    }
}

/// Escape text for an AutoHotkey v2 double-quoted string.
fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '`' => out.push_str("``"),
            '"' => out.push_str("`\""),
            '\n' => out.push_str("`n"),
            '\r' => out.push_str("`r"),
            '\t' => out.push_str("`t"),
            other => out.push(other),
        }
    }
    out
}

fn parse_desktop(text: &str) -> Option<(ScreenRect, u32)> {
    match parse_ints(text)[..] {
        [left, top, width, height, monitors] if width > 0 && height > 0 && monitors > 0 => {
            let bounds = ScreenRect {
                left,
                top,
                width: width as u32,
                height: height as u32,
            };
            Some((bounds, monitors as u32))
        }
        _ => None,
    }
}

fn parse_ints(text: &str) -> Vec<i32> {
    text.trim()
        .split(',')
        .filter_map(|part| part.trim().parse().ok())
        .collect()
}
