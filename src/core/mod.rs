//! Backend-independent input pipeline: events, key names, requests, the
//! codec that expands requests into events, and the pacer.

pub mod codec;
pub mod event;
pub mod keymap;
pub mod pacer;
pub mod request;
