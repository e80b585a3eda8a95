//! MCP server exposing the input tools
//!
//! Each tool turns its JSON parameters into a [`ToolCall`], hands it to the
//! [`Dispatcher`] together with the request's cancellation token, and
//! reports the outcome as pretty-printed JSON. Domain failures come back as
//! tool errors (`isError: true`) with a machine-readable `kind`; protocol
//! errors are reserved for malformed requests.
//!
//! Alongside the tools the server publishes read-only resources under
//! `mcp://windows/` and a few prompts that spell out common tool calls.

use std::sync::Arc;
use std::time::Duration;

use rmcp::{
    ErrorData as McpError, RoleServer, ServerHandler,
    handler::server::{router::prompt::PromptRouter, tool::ToolRouter, wrapper::Parameters},
    model::*,
    prompt, prompt_handler, prompt_router, schemars, serde,
    service::RequestContext,
    tool, tool_handler, tool_router,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::backend::InputBackend;
use crate::config;
use crate::core::event::{MouseButton, Point, ScrollAxis};
use crate::core::pacer::{RateConfig, RateConfigUpdate, RateLimiterRegistry};
use crate::core::request::{self, KeyMode, ToolCall, TypeMethod};
use crate::dispatch::{Dispatcher, ToolCallResult};
use crate::error::{InputError, InputResult};

pub const RESOURCE_DESKTOP: &str = "mcp://windows/desktop-info";
pub const RESOURCE_RATE: &str = "mcp://windows/rate";
pub const RESOURCE_INSTRUCTIONS: &str = "mcp://windows/instructions";
pub const RESOURCE_ENV: &str = "mcp://windows/env";

/// Usage notes sent with `initialize` and served as a resource
pub const INSTRUCTIONS: &str = "\
Mouse and keyboard input for Windows through IbInputSimulator.
All input is rate limited per class (pointer, clicks, keys, scroll); use
Input-Info to see the backend and limits and Input-RateLimiter-Config to
change them.

Parameter reference:
- Coordinates are absolute virtual-screen pixels; Desktop-Info reports the
  virtual screen origin and size.
- Buttons: \"left\" | \"right\" | \"middle\".
- Shortcuts: one string such as \"ctrl+c\" or \"win+r\".

Examples:
- Click-Tool: {\"x\": 345, \"y\": 211, \"button\": \"left\", \"clicks\": 2}
- Type-Tool: {\"text\": \"你好\"}
- Move-Tool: {\"x\": 1280, \"y\": 720}
- Drag-Tool: {\"from_x\": 500, \"from_y\": 400, \"to_x\": 960, \"to_y\": 540}
- Shortcut-Tool: {\"keys\": \"ctrl+c\"}
- Desktop-Info: {}
";

/// Parameters for Move-Tool
#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct MoveParams {
    /// Target X in screen pixels
    pub x: i32,
    /// Target Y in screen pixels
    pub y: i32,
}

/// Parameters for Click-Tool
#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct ClickParams {
    /// Mouse button: "left" (default), "right", "middle"
    #[serde(default = "default_button")]
    pub button: String,
    /// X to move to before clicking; omit to click in place
    #[serde(default)]
    pub x: Option<i32>,
    /// Y to move to before clicking; omit to click in place
    #[serde(default)]
    pub y: Option<i32>,
    /// 1 = single, 2 = double, 3 = triple click
    #[serde(default = "default_one")]
    pub clicks: i64,
}

/// Parameters for Drag-Tool
#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct DragParams {
    pub from_x: i32,
    pub from_y: i32,
    pub to_x: i32,
    pub to_y: i32,
    /// Mouse button held during the drag
    #[serde(default = "default_button")]
    pub button: String,
}

/// Parameters for Scroll-Tool
#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct ScrollParams {
    /// Wheel notches; positive scrolls up (vertical) or right (horizontal)
    pub amount: i64,
    /// "vertical" (default) or "horizontal"
    #[serde(default = "default_axis")]
    pub axis: String,
    /// Optional X to move to before scrolling
    #[serde(default)]
    pub x: Option<i32>,
    /// Optional Y to move to before scrolling
    #[serde(default)]
    pub y: Option<i32>,
}

/// Parameters for Type-Tool
#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct TypeParams {
    /// Text to type into the focused window
    pub text: String,
    /// "unicode" (default, any character), "clipboard" (paste), or "vk"
    /// (US-layout virtual keys, ASCII only)
    #[serde(default = "default_method")]
    pub method: String,
    /// Press Enter after the text
    #[serde(default)]
    pub press_enter: bool,
}

/// Parameters for Shortcut-Tool
#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct ShortcutParams {
    /// Keys joined by "+", e.g. "ctrl+c" or "ctrl+shift+esc"
    pub keys: String,
}

/// Parameters for Key-Tool
#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct KeyParams {
    /// "tap" (default), "down", "up" or "hold"
    #[serde(default = "default_mode")]
    pub mode: String,
    /// Key name ("enter", "a", "f5", "pgdn") or code ("vk41", "0x41")
    pub key: String,
    /// Number of taps (tap mode)
    #[serde(default = "default_one")]
    pub times: i64,
    /// Pause between taps in milliseconds
    #[serde(default)]
    pub interval_ms: i64,
    /// How long to hold the key in hold mode, in milliseconds
    #[serde(default)]
    pub hold_ms: i64,
}

/// Parameters for Combo-Tool
#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct ComboParams {
    /// Keys pressed in order and released in reverse
    pub keys: Vec<String>,
    /// How long to hold the full chord, in milliseconds
    #[serde(default)]
    pub hold_ms: i64,
}

/// Parameters for Input-RateLimiter-Config. Omitted fields keep their value.
#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct RateLimiterParams {
    /// Pointer ticks per second
    #[serde(default)]
    pub move_hz: Option<f64>,
    /// Max pointer pixels per tick, per axis
    #[serde(default)]
    pub max_delta: Option<i64>,
    /// Pointer smoothing factor in [0, 1); 0 disables smoothing
    #[serde(default)]
    pub smooth: Option<f64>,
    /// Mouse button presses per second
    #[serde(default)]
    pub cps: Option<f64>,
    /// Key presses (and typed characters) per second
    #[serde(default)]
    pub kps: Option<f64>,
    /// Wheel notches per second
    #[serde(default)]
    pub scroll_hz: Option<f64>,
}

/// Arguments of the Click-At prompt
#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct ClickAtArgs {
    /// Target X in screen pixels
    pub x: String,
    /// Target Y in screen pixels
    pub y: String,
    /// "left", "right" or "middle"
    #[serde(default)]
    pub button: Option<String>,
    /// Number of clicks
    #[serde(default)]
    pub clicks: Option<String>,
}

/// Arguments of the Type-Text prompt
#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct TypeTextArgs {
    pub text: String,
    /// "unicode", "clipboard" or "vk"
    #[serde(default)]
    pub method: Option<String>,
}

/// Arguments of the Send-Shortcut prompt
#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct SendShortcutArgs {
    /// Shortcut such as "ctrl+c" or "win+r"
    pub keys: String,
}

/// Arguments of the Drag-From-To prompt
#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct DragFromToArgs {
    /// Start point as "x,y"
    pub from: String,
    /// End point as "x,y"
    pub to: String,
}

fn default_button() -> String {
    "left".to_string()
}

fn default_axis() -> String {
    "vertical".to_string()
}

fn default_method() -> String {
    "unicode".to_string()
}

fn default_mode() -> String {
    "tap".to_string()
}

fn default_one() -> i64 {
    1
}

fn button(name: &str) -> InputResult<MouseButton> {
    MouseButton::parse(name).ok_or_else(|| {
        InputError::InvalidArgument(format!("button must be left, right or middle, got {name:?}"))
    })
}

fn count(label: &str, value: i64) -> InputResult<u32> {
    u32::try_from(value).map_err(|_| {
        InputError::InvalidArgument(format!("{label} must be a positive count, got {value}"))
    })
}

fn millis(label: &str, value: i64) -> InputResult<Duration> {
    u64::try_from(value)
        .map(Duration::from_millis)
        .map_err(|_| {
            InputError::InvalidArgument(format!("{label} must not be negative, got {value}"))
        })
}

/// Both coordinates or neither
fn optional_point(x: Option<i32>, y: Option<i32>) -> InputResult<Option<Point>> {
    match (x, y) {
        (Some(x), Some(y)) => Ok(Some(Point::new(x, y))),
        (None, None) => Ok(None),
        _ => Err(InputError::InvalidArgument(
            "x and y must be given together".into(),
        )),
    }
}

impl ClickParams {
    fn into_call(self) -> InputResult<ToolCall> {
        Ok(ToolCall::Click {
            button: button(&self.button)?,
            at: optional_point(self.x, self.y)?,
            clicks: count("clicks", self.clicks)?,
        })
    }
}

impl DragParams {
    fn into_call(self) -> InputResult<ToolCall> {
        Ok(ToolCall::Drag {
            from: Point::new(self.from_x, self.from_y),
            to: Point::new(self.to_x, self.to_y),
            button: button(&self.button)?,
        })
    }
}

impl ScrollParams {
    fn into_call(self) -> InputResult<ToolCall> {
        let axis = ScrollAxis::parse(&self.axis).ok_or_else(|| {
            InputError::InvalidArgument(format!(
                "axis must be vertical or horizontal, got {:?}",
                self.axis
            ))
        })?;
        let amount = i32::try_from(self.amount).map_err(|_| {
            InputError::InvalidArgument(format!("amount {} is out of range", self.amount))
        })?;
        Ok(ToolCall::Scroll {
            amount,
            axis,
            at: optional_point(self.x, self.y)?,
        })
    }
}

impl TypeParams {
    fn into_call(self) -> InputResult<ToolCall> {
        let method = TypeMethod::parse(&self.method).ok_or_else(|| {
            InputError::InvalidArgument(format!(
                "method must be unicode, clipboard or vk, got {:?}",
                self.method
            ))
        })?;
        Ok(ToolCall::Type {
            text: self.text,
            method,
            press_enter: self.press_enter,
        })
    }
}

impl KeyParams {
    fn into_call(self) -> InputResult<ToolCall> {
        let mode = KeyMode::parse(&self.mode).ok_or_else(|| {
            InputError::InvalidArgument(format!(
                "mode must be tap, down, up or hold, got {:?}",
                self.mode
            ))
        })?;
        Ok(ToolCall::Key {
            mode,
            key: self.key,
            times: count("times", self.times)?,
            interval: millis("interval_ms", self.interval_ms)?,
            hold: millis("hold_ms", self.hold_ms)?,
        })
    }
}

impl ComboParams {
    fn into_call(self) -> InputResult<ToolCall> {
        Ok(ToolCall::Combo {
            keys: self.keys,
            hold: millis("hold_ms", self.hold_ms)?,
        })
    }
}

impl From<RateLimiterParams> for RateConfigUpdate {
    fn from(p: RateLimiterParams) -> Self {
        RateConfigUpdate {
            move_hz: p.move_hz,
            max_delta: p.max_delta,
            smooth: p.smooth,
            cps: p.cps,
            kps: p.kps,
            scroll_hz: p.scroll_hz,
        }
    }
}

/// Error payload: message, stable kind, and how far the call got
fn error_body(err: &InputError) -> serde_json::Value {
    let details = match err {
        InputError::UnmappableCharacter { ch, index } => {
            json!({ "character": ch.to_string(), "index": index })
        }
        InputError::BackendUnavailable { completed, .. } | InputError::Cancelled { completed } => {
            json!({ "completed": completed })
        }
        InputError::BackendRejected { index, .. } => json!({ "index": index }),
        InputError::InvalidArgument(_) | InputError::ConfigurationInvalid(_) => {
            serde_json::Value::Null
        }
    };
    json!({
        "error": err.to_string(),
        "kind": err.kind(),
        "details": details,
    })
}

fn to_pretty(value: &impl serde::Serialize) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
}

fn pretty(value: &impl serde::Serialize) -> Content {
    Content::text(to_pretty(value))
}

/// Render a dispatcher outcome as a tool result.
///
/// A call with rejected primitives is flagged as an error but still carries
/// the full report.
pub fn render(tool: &str, outcome: InputResult<ToolCallResult>) -> CallToolResult {
    match outcome {
        Ok(result) if result.success => CallToolResult::success(vec![pretty(&result)]),
        Ok(result) => {
            tracing::warn!(tool, "{}", result.message);
            CallToolResult::error(vec![pretty(&result)])
        }
        Err(err) => {
            tracing::warn!(tool, kind = err.kind(), "{err}");
            CallToolResult::error(vec![pretty(&error_body(&err))])
        }
    }
}

/// Resources listed by `resources/list`
pub fn resource_catalog() -> Vec<Resource> {
    [
        (RESOURCE_DESKTOP, "Desktop Info", "Virtual screen and monitors"),
        (RESOURCE_RATE, "Input Rate", "Backend and rate limiter settings"),
        (RESOURCE_INSTRUCTIONS, "Server Instructions", "Usage tips and examples"),
        (RESOURCE_ENV, "Runtime Env", "Environment variables read at startup"),
    ]
    .into_iter()
    .map(|(uri, name, description)| {
        let mut raw = RawResource::new(uri, name);
        raw.description = Some(description.to_string());
        raw.mime_type = Some(if uri == RESOURCE_INSTRUCTIONS || uri == RESOURCE_ENV {
            "text/plain".to_string()
        } else {
            "application/json".to_string()
        });
        raw.no_annotation()
    })
    .collect()
}

/// One `NAME=value` line per recognised variable; unset ones stay empty.
pub fn env_report(lookup: impl Fn(&str) -> Option<String>) -> String {
    config::ENV_VARS
        .iter()
        .map(|var| format!("{var}={}", lookup(var).unwrap_or_default()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Split `"x,y"` (spaces and brackets allowed) into two integers.
fn parse_xy(raw: &str) -> Option<(i32, i32)> {
    let trimmed = raw.trim().trim_start_matches(['[', '(']).trim_end_matches([']', ')']);
    let (x, y) = trimmed.split_once(',')?;
    Some((x.trim().parse().ok()?, y.trim().parse().ok()?))
}

fn click_at_text(args: &ClickAtArgs) -> String {
    let button = args.button.as_deref().unwrap_or("left");
    let clicks = args.clicks.as_deref().unwrap_or("1");
    format!(
        "Use Click-Tool for driver-level clicking. Call Click-Tool with \
         {{\"x\": {}, \"y\": {}, \"button\": {}, \"clicks\": {}}}.",
        args.x.trim(),
        args.y.trim(),
        json!(button),
        clicks.trim(),
    )
}

fn type_text_text(args: &TypeTextArgs) -> String {
    let method = args.method.as_deref().unwrap_or("unicode");
    format!(
        "Use Type-Tool for text input. Call Type-Tool with {{\"text\": {}, \"method\": {}}}.",
        json!(args.text),
        json!(method),
    )
}

fn send_shortcut_text(args: &SendShortcutArgs) -> String {
    format!(
        "Use Shortcut-Tool for key combinations. Call Shortcut-Tool with {{\"keys\": {}}}.",
        json!(args.keys),
    )
}

fn drag_from_to_text(args: &DragFromToArgs) -> Result<String, McpError> {
    let point = |label: &str, raw: &str| {
        parse_xy(raw).ok_or_else(|| {
            McpError::invalid_params(format!("{label} must look like \"x,y\", got {raw:?}"), None)
        })
    };
    let (from_x, from_y) = point("from", &args.from)?;
    let (to_x, to_y) = point("to", &args.to)?;
    Ok(format!(
        "Use Drag-Tool for driver-level dragging. Call Drag-Tool with \
         {{\"from_x\": {from_x}, \"from_y\": {from_y}, \"to_x\": {to_x}, \"to_y\": {to_y}}}."
    ))
}

/// Windows input MCP server
///
/// Paced mouse and keyboard input through IbInputSimulator.
#[derive(Clone)]
pub struct InputServer {
    dispatcher: Arc<Dispatcher>,
    /// MCP tool router
    tool_router: ToolRouter<InputServer>,
    prompt_router: PromptRouter<InputServer>,
}

#[tool_router]
impl InputServer {
    pub fn new(backend: Arc<dyn InputBackend>, rate: RateConfig) -> anyhow::Result<Self> {
        let limiter = Arc::new(RateLimiterRegistry::new(rate)?);
        Ok(Self {
            dispatcher: Arc::new(Dispatcher::new(backend, limiter)),
            tool_router: Self::tool_router(),
            prompt_router: Self::prompt_router(),
        })
    }

    #[tool(
        name = "Input-Info",
        description = "Report the input backend, driver, readiness and the active rate limits."
    )]
    async fn input_info(
        &self,
        ctx: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        Ok(self.call(Ok(ToolCall::Info), ctx).await)
    }

    #[tool(
        name = "Desktop-Info",
        description = "Get virtual screen origin/size and monitor count."
    )]
    async fn desktop_info(
        &self,
        ctx: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        Ok(self.call(Ok(ToolCall::DesktopInfo), ctx).await)
    }

    #[tool(
        name = "Move-Tool",
        description = "Move the mouse pointer to absolute screen coordinates. \
                       Motion is split into rate-limited steps."
    )]
    async fn move_tool(
        &self,
        Parameters(params): Parameters<MoveParams>,
        ctx: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let call = ToolCall::Move {
            to: Point::new(params.x, params.y),
        };
        Ok(self.call(Ok(call), ctx).await)
    }

    #[tool(
        name = "Click-Tool",
        description = "Click a mouse button, optionally moving to (x, y) first. \
                       clicks=2 for a double click."
    )]
    async fn click_tool(
        &self,
        Parameters(params): Parameters<ClickParams>,
        ctx: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        Ok(self.call(params.into_call(), ctx).await)
    }

    #[tool(
        name = "Drag-Tool",
        description = "Press a mouse button at (from_x, from_y), move to (to_x, to_y) and release."
    )]
    async fn drag_tool(
        &self,
        Parameters(params): Parameters<DragParams>,
        ctx: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        Ok(self.call(params.into_call(), ctx).await)
    }

    #[tool(
        name = "Scroll-Tool",
        description = "Scroll the mouse wheel by a number of notches. \
                       Positive amounts scroll up or right."
    )]
    async fn scroll_tool(
        &self,
        Parameters(params): Parameters<ScrollParams>,
        ctx: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        Ok(self.call(params.into_call(), ctx).await)
    }

    #[tool(
        name = "Type-Tool",
        description = "Type text into the focused window. method=unicode handles any character, \
                       clipboard pastes long text, vk sends US-layout keys."
    )]
    async fn type_tool(
        &self,
        Parameters(params): Parameters<TypeParams>,
        ctx: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        Ok(self.call(params.into_call(), ctx).await)
    }

    #[tool(
        name = "Shortcut-Tool",
        description = "Press a keyboard shortcut such as \"ctrl+c\" or \"alt+f4\"."
    )]
    async fn shortcut_tool(
        &self,
        Parameters(params): Parameters<ShortcutParams>,
        ctx: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let call = ToolCall::Shortcut {
            keys: request::split_shortcut(&params.keys),
        };
        Ok(self.call(Ok(call), ctx).await)
    }

    #[tool(
        name = "Key-Tool",
        description = "Tap, press, release or hold a single key. \
                       Tap mode can repeat with an interval."
    )]
    async fn key_tool(
        &self,
        Parameters(params): Parameters<KeyParams>,
        ctx: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        Ok(self.call(params.into_call(), ctx).await)
    }

    #[tool(
        name = "Combo-Tool",
        description = "Press keys in order, optionally hold the chord for hold_ms, \
                       then release in reverse order."
    )]
    async fn combo_tool(
        &self,
        Parameters(params): Parameters<ComboParams>,
        ctx: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        Ok(self.call(params.into_call(), ctx).await)
    }

    #[tool(
        name = "Input-RateLimiter-Config",
        description = "Change rate limits at runtime. Omitted fields keep their value; \
                       invalid values reject the whole update."
    )]
    async fn rate_limiter_config(
        &self,
        Parameters(params): Parameters<RateLimiterParams>,
        ctx: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        Ok(self.call(Ok(ToolCall::ConfigureRate(params.into())), ctx).await)
    }
}

#[prompt_router]
impl InputServer {
    #[prompt(name = "Click-At", description = "Click at coordinates using Click-Tool.")]
    async fn click_at(
        &self,
        Parameters(args): Parameters<ClickAtArgs>,
        _ctx: RequestContext<RoleServer>,
    ) -> Result<Vec<PromptMessage>, McpError> {
        Ok(vec![PromptMessage::new_text(
            PromptMessageRole::User,
            click_at_text(&args),
        )])
    }

    #[prompt(name = "Type-Text", description = "Type text via driver-level injection.")]
    async fn type_text(
        &self,
        Parameters(args): Parameters<TypeTextArgs>,
        _ctx: RequestContext<RoleServer>,
    ) -> Result<Vec<PromptMessage>, McpError> {
        Ok(vec![PromptMessage::new_text(
            PromptMessageRole::User,
            type_text_text(&args),
        )])
    }

    #[prompt(
        name = "Send-Shortcut",
        description = "Send a keyboard shortcut like 'ctrl+c' or 'win+r'."
    )]
    async fn send_shortcut(
        &self,
        Parameters(args): Parameters<SendShortcutArgs>,
        _ctx: RequestContext<RoleServer>,
    ) -> Result<Vec<PromptMessage>, McpError> {
        Ok(vec![PromptMessage::new_text(
            PromptMessageRole::User,
            send_shortcut_text(&args),
        )])
    }

    #[prompt(name = "Drag-From-To", description = "Drag from one point to another.")]
    async fn drag_from_to(
        &self,
        Parameters(args): Parameters<DragFromToArgs>,
        _ctx: RequestContext<RoleServer>,
    ) -> Result<Vec<PromptMessage>, McpError> {
        Ok(vec![PromptMessage::new_text(
            PromptMessageRole::User,
            drag_from_to_text(&args)?,
        )])
    }
}

impl InputServer {
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    async fn call(
        &self,
        call: InputResult<ToolCall>,
        ctx: RequestContext<RoleServer>,
    ) -> CallToolResult {
        match call {
            Ok(call) => {
                let tool = call.name();
                render(tool, self.dispatcher.invoke(call, &ctx.ct).await)
            }
            Err(err) => render("input", Err(err)),
        }
    }

    /// Text of the resource at `uri`.
    ///
    /// Live resources run the matching info call; its failure is rendered
    /// like a tool error rather than failing the read.
    pub async fn resource_text(
        &self,
        uri: &str,
        cancel: &CancellationToken,
    ) -> Result<String, McpError> {
        let live = match uri {
            RESOURCE_RATE => ToolCall::Info,
            RESOURCE_DESKTOP => ToolCall::DesktopInfo,
            RESOURCE_INSTRUCTIONS => return Ok(INSTRUCTIONS.to_string()),
            RESOURCE_ENV => return Ok(env_report(|var| std::env::var(var).ok())),
            _ => {
                return Err(McpError::resource_not_found(
                    "resource_not_found",
                    Some(json!({ "uri": uri })),
                ));
            }
        };
        Ok(match self.dispatcher.invoke(live, cancel).await {
            Ok(result) => to_pretty(&result),
            Err(err) => to_pretty(&error_body(&err)),
        })
    }
}

#[tool_handler]
#[prompt_handler]
impl ServerHandler for InputServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder()
                .enable_prompts()
                .enable_resources()
                .enable_tools()
                .build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(INSTRUCTIONS.to_string()),
        }
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _ctx: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        Ok(ListResourcesResult::with_all_items(resource_catalog()))
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        ctx: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        let text = self.resource_text(&request.uri, &ctx.ct).await?;
        Ok(ReadResourceResult {
            contents: vec![ResourceContents::text(text, request.uri)],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;

    fn body(result: &CallToolResult) -> serde_json::Value {
        let text = result.content[0]
            .as_text()
            .map(|t| t.text.clone())
            .unwrap_or_default();
        serde_json::from_str(&text).unwrap()
    }

    fn dry_run_server() -> InputServer {
        InputServer::new(Arc::new(RecordingBackend::new()), RateConfig::default()).unwrap()
    }

    async fn read_json(server: &InputServer, uri: &str) -> serde_json::Value {
        let text = server
            .resource_text(uri, &CancellationToken::new())
            .await
            .unwrap();
        serde_json::from_str(&text).unwrap()
    }

    fn key_params(mode: &str, times: i64, interval_ms: i64) -> KeyParams {
        KeyParams {
            mode: mode.into(),
            key: "a".into(),
            times,
            interval_ms,
            hold_ms: 0,
        }
    }

    #[test]
    fn click_params_need_both_coordinates() {
        let params = ClickParams {
            button: "left".into(),
            x: Some(10),
            y: None,
            clicks: 1,
        };
        assert_eq!(params.into_call().unwrap_err().kind(), "InvalidArgument");

        let params = ClickParams {
            button: "Right".into(),
            x: Some(10),
            y: Some(20),
            clicks: 2,
        };
        assert_eq!(
            params.into_call().unwrap(),
            ToolCall::Click {
                button: MouseButton::Right,
                at: Some(Point::new(10, 20)),
                clicks: 2,
            }
        );
    }

    #[test]
    fn negative_durations_and_counts_are_invalid() {
        for params in [
            key_params("tap", 1, -5),
            key_params("tap", -1, 0),
            key_params("press", 1, 0),
        ] {
            assert_eq!(params.into_call().unwrap_err().kind(), "InvalidArgument");
        }
    }

    #[test]
    fn params_deserialize_with_defaults() {
        let params: TypeParams = serde_json::from_value(json!({ "text": "hi" })).unwrap();
        assert_eq!(params.method, "unicode");
        assert!(!params.press_enter);

        let params: ScrollParams = serde_json::from_value(json!({ "amount": -2 })).unwrap();
        assert_eq!(
            params.into_call().unwrap(),
            ToolCall::Scroll {
                amount: -2,
                axis: ScrollAxis::Vertical,
                at: None,
            }
        );

        let params: RateLimiterParams = serde_json::from_value(json!({ "cps": 4.0 })).unwrap();
        let update = RateConfigUpdate::from(params);
        assert_eq!(update.cps, Some(4.0));
        assert_eq!(update.move_hz, None);
    }

    #[test]
    fn errors_render_with_kind_and_progress() {
        let result = render("Type-Tool", Err(InputError::Cancelled { completed: 3 }));
        assert_eq!(result.is_error, Some(true));
        let json = body(&result);
        assert_eq!(json["kind"], "Cancelled");
        assert_eq!(json["details"]["completed"], 3);

        let err = InputError::UnmappableCharacter { ch: 'é', index: 1 };
        let result = render("Type-Tool", Err(err));
        assert_eq!(body(&result)["details"]["character"], "é");
    }

    #[test]
    fn prompts_spell_out_tool_arguments() {
        let click = ClickAtArgs {
            x: "345".into(),
            y: " 211".into(),
            button: None,
            clicks: Some("2".into()),
        };
        assert!(click_at_text(&click).contains(
            r#"{"x": 345, "y": 211, "button": "left", "clicks": 2}"#
        ));

        let typed = TypeTextArgs {
            text: "say \"hi\"".into(),
            method: None,
        };
        assert!(type_text_text(&typed).contains(r#""text": "say \"hi\"""#));

        let shortcut = SendShortcutArgs {
            keys: "win+r".into(),
        };
        assert!(send_shortcut_text(&shortcut).contains(r#"{"keys": "win+r"}"#));
    }

    #[test]
    fn drag_prompt_parses_points() {
        let args = DragFromToArgs {
            from: "[500, 400]".into(),
            to: "960,540".into(),
        };
        let text = drag_from_to_text(&args).unwrap();
        assert!(text.contains(r#""from_x": 500, "from_y": 400, "to_x": 960, "to_y": 540"#));

        let args = DragFromToArgs {
            from: "500".into(),
            to: "960,540".into(),
        };
        assert!(drag_from_to_text(&args).is_err());
    }

    #[test]
    fn resources_are_listed_under_windows_scheme() {
        let uris: Vec<String> = resource_catalog()
            .into_iter()
            .map(|r| r.raw.uri)
            .collect();
        assert_eq!(
            uris,
            [RESOURCE_DESKTOP, RESOURCE_RATE, RESOURCE_INSTRUCTIONS, RESOURCE_ENV]
        );
    }

    #[test]
    fn env_report_lists_every_variable() {
        let report = env_report(|var| (var == config::ENV_KPS).then(|| "20".to_string()));
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines.len(), config::ENV_VARS.len());
        assert_eq!(lines[0], "WINDOWS_MCP_INPUT_BACKEND=");
        assert!(lines.contains(&"WINDOWS_MCP_RATE_KPS=20"));
    }

    #[tokio::test]
    async fn resources_read_live_state() {
        let server = dry_run_server();
        let cancel = CancellationToken::new();

        let rate = read_json(&server, RESOURCE_RATE).await;
        assert_eq!(rate["backend"]["name"], "DryRun");
        assert_eq!(rate["rate"]["kps"], 12.0);

        let desktop = read_json(&server, RESOURCE_DESKTOP).await;
        assert_eq!(desktop["desktop"]["width"], 1920);
        assert_eq!(desktop["desktop"]["monitors"], 1);

        let text = server
            .resource_text(RESOURCE_INSTRUCTIONS, &cancel)
            .await
            .unwrap();
        assert!(text.contains("Desktop-Info"));

        let missing = server
            .resource_text("mcp://windows/active-window", &cancel)
            .await;
        assert!(missing.is_err());
    }
}
