//! Input backend abstraction
//!
//! The pacer and dispatcher talk to the OS through [`InputBackend`]. The
//! concrete injectors wrap IbInputSimulator, either by loading its DLL or by
//! driving its AutoHotkey binding; a recording backend serves dry runs and
//! tests.

pub mod discovery;
#[cfg(windows)]
mod ibsim_dll;
mod ibsim_ahk;
mod recording;

pub use recording::{DEFAULT_LOG_LIMIT, Recorded, RecordingBackend};

use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::config::Settings;
use crate::core::event::{Delta, InputEvent, MouseButton, Point, ScreenRect, ScrollAxis};

/// Identity and readiness of a backend
#[derive(Debug, Clone, Serialize)]
pub struct BackendInfo {
    pub name: String,
    pub driver: String,
    pub ready: bool,
    pub details: String,
}

/// Failure of one backend call
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BackendError {
    /// The backend is missing or uninitialized; nothing further will work.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    /// This event failed but the backend is still usable.
    #[error("backend rejected event: {0}")]
    Rejected(String),
}

/// Trait for input backend implementations
///
/// Every injection is fire-and-forget from the caller's point of view and
/// is only ever handed events that the pacer has released.
#[async_trait]
pub trait InputBackend: Send + Sync {
    fn info(&self) -> BackendInfo;

    /// Move the pointer by a relative delta
    async fn inject_move(&self, delta: Delta) -> Result<(), BackendError>;

    /// Press or release a mouse button at the current position
    async fn inject_button(&self, button: MouseButton, down: bool) -> Result<(), BackendError>;

    /// Press or release a virtual key
    async fn inject_key(&self, code: u16, down: bool) -> Result<(), BackendError>;

    /// Type one Unicode codepoint
    async fn inject_text(&self, codepoint: char) -> Result<(), BackendError>;

    /// Scroll one notch; `amount` is `1` (up/right) or `-1` (down/left)
    async fn inject_scroll(&self, axis: ScrollAxis, amount: i32) -> Result<(), BackendError>;

    /// Replace the clipboard with `text`
    async fn set_clipboard(&self, text: &str) -> Result<(), BackendError>;

    /// Current cursor position, if the backend can read it
    async fn cursor_position(&self) -> Option<Point>;

    /// Virtual desktop rectangle, if the backend can read it
    async fn screen_bounds(&self) -> Option<ScreenRect>;

    /// Number of attached monitors, if the backend can read it
    async fn monitor_count(&self) -> Option<u32> {
        None
    }

    /// Route a paced event to the matching injection call
    async fn inject(&self, event: &InputEvent) -> Result<(), BackendError> {
        match *event {
            InputEvent::PointerMove(delta) => self.inject_move(delta).await,
            InputEvent::Button { button, down } => self.inject_button(button, down).await,
            InputEvent::Key { code, down } => self.inject_key(code, down).await,
            InputEvent::Text { codepoint } => self.inject_text(codepoint).await,
            InputEvent::Scroll { axis, amount } => self.inject_scroll(axis, amount).await,
        }
    }
}

/// Backend selector (`WINDOWS_MCP_INPUT_BACKEND`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// IbInputSimulator DLL, strict
    IbsimDll,
    /// DLL first, AutoHotkey binding as fallback
    Ibsim,
    /// IbInputSimulator AutoHotkey v2 binding
    IbsimAhk,
    /// In-memory recorder, no OS input
    DryRun,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ibsim-dll" => Ok(BackendKind::IbsimDll),
            "ibsim" => Ok(BackendKind::Ibsim),
            "ibsim-ahk" => Ok(BackendKind::IbsimAhk),
            "dry-run" | "dryrun" => Ok(BackendKind::DryRun),
            other => Err(format!(
                "unsupported backend {other:?}; use ibsim-dll, ibsim, ibsim-ahk or dry-run"
            )),
        }
    }
}

/// IbInputSimulator send type (`WINDOWS_MCP_INPUT_DRIVER`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    AnyDriver,
    SendInput,
    Logitech,
    Razer,
    Dd,
    MouClassInputInjection,
    LogitechGHubNew,
}

impl Driver {
    /// Numeric send type passed to `IbSendInit`
    pub fn send_type(self) -> u32 {
        match self {
            Driver::AnyDriver => 0,
            Driver::SendInput => 1,
            Driver::Logitech => 2,
            Driver::Razer => 3,
            Driver::Dd => 4,
            Driver::MouClassInputInjection => 5,
            Driver::LogitechGHubNew => 6,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Driver::AnyDriver => "AnyDriver",
            Driver::SendInput => "SendInput",
            Driver::Logitech => "Logitech",
            Driver::Razer => "Razer",
            Driver::Dd => "DD",
            Driver::MouClassInputInjection => "MouClassInputInjection",
            Driver::LogitechGHubNew => "LogitechGHubNew",
        }
    }
}

impl FromStr for Driver {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anydriver" | "any" => Ok(Driver::AnyDriver),
            "sendinput" => Ok(Driver::SendInput),
            "logitech" => Ok(Driver::Logitech),
            "razer" => Ok(Driver::Razer),
            "dd" => Ok(Driver::Dd),
            "mouclassinputinjection" => Ok(Driver::MouClassInputInjection),
            "logitechghubnew" => Ok(Driver::LogitechGHubNew),
            other => Err(format!("unknown driver {other:?}")),
        }
    }
}

/// Create the backend selected by `settings`
pub fn create_backend(settings: &Settings) -> anyhow::Result<Arc<dyn InputBackend>> {
    let dirs = discovery::candidate_dirs(settings.ibsim_dir.as_deref());

    match settings.backend {
        BackendKind::DryRun => {
            tracing::info!("Using dry-run backend; no OS input will be injected");
            Ok(Arc::new(RecordingBackend::new()))
        }
        BackendKind::IbsimDll => load_dll(settings, &dirs),
        BackendKind::IbsimAhk => load_ahk(settings, &dirs),
        BackendKind::Ibsim => load_dll(settings, &dirs).or_else(|err| {
            tracing::warn!("DLL backend not ready ({err:#}); trying AutoHotkey binding");
            load_ahk(settings, &dirs)
        }),
    }
}

#[cfg(windows)]
fn load_dll(settings: &Settings, dirs: &[PathBuf]) -> anyhow::Result<Arc<dyn InputBackend>> {
    let Some(dll) = discovery::find_ibsim_dll(dirs) else {
        anyhow::bail!(
            "IbInputSimulator.dll not found; set IBSIM_DIR to the IbInputSimulator folder"
        );
    };
    let backend = ibsim_dll::IbsimDllBackend::load(&dll, settings.driver)?;
    tracing::info!("Using IbInputSimulator DLL backend ({})", dll.display());
    Ok(Arc::new(backend))
}

#[cfg(not(windows))]
fn load_dll(_settings: &Settings, _dirs: &[PathBuf]) -> anyhow::Result<Arc<dyn InputBackend>> {
    anyhow::bail!("the ibsim-dll backend is only available on Windows")
}

fn load_ahk(settings: &Settings, dirs: &[PathBuf]) -> anyhow::Result<Arc<dyn InputBackend>> {
    let backend = ibsim_ahk::IbsimAhkBackend::discover(settings, dirs);
    let info = backend.info();
    if !info.ready {
        anyhow::bail!(
            "IbInputSimulator AutoHotkey backend not ready ({}); \
             install AutoHotkey v2 and the Binding.AHK2 files",
            info.details
        );
    }
    tracing::info!("Using IbInputSimulator AutoHotkey backend ({})", info.details);
    Ok(Arc::new(backend))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_selector_parses() {
        assert_eq!("IBSIM-DLL".parse::<BackendKind>(), Ok(BackendKind::IbsimDll));
        assert_eq!("ibsim-ahk".parse::<BackendKind>(), Ok(BackendKind::IbsimAhk));
        assert_eq!("dry-run".parse::<BackendKind>(), Ok(BackendKind::DryRun));
        assert!("pyautogui".parse::<BackendKind>().is_err());
    }

    #[test]
    fn driver_names_map_to_send_types() {
        assert_eq!("AnyDriver".parse::<Driver>().map(Driver::send_type), Ok(0));
        assert_eq!("DD".parse::<Driver>().map(Driver::send_type), Ok(4));
        assert_eq!("LogitechGHubNew".parse::<Driver>().map(Driver::send_type), Ok(6));
        assert!("Corsair".parse::<Driver>().is_err());
    }

    #[tokio::test]
    async fn dry_run_backend_is_selectable() {
        let settings = Settings {
            backend: BackendKind::DryRun,
            ..Settings::default()
        };
        let backend = create_backend(&settings).unwrap();
        assert_eq!(backend.info().name, "DryRun");
        assert!(backend.info().ready);
    }
}
