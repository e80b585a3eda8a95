//! windows-input-mcp - paced Windows mouse and keyboard input over MCP
//!
//! This library provides an MCP (Model Context Protocol) server that lets
//! AI assistants drive the mouse and keyboard on Windows through
//! IbInputSimulator, with every event passing a per-class rate limiter.
//!
//! ## Pipeline
//!
//! - [`server`]: MCP tools, parameter parsing, JSON results
//! - [`dispatch`]: validation, expansion, pacing and injection of one call
//! - [`core`]: events, key names, the codec and the pacer
//! - [`backend`]: IbInputSimulator DLL, AutoHotkey binding, dry-run recorder

pub mod backend;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod error;
pub mod server;
