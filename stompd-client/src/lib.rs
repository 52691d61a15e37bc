//! # stompd-client
//!
//! Client library for stompd.
//!
//! This crate provides:
//! - Blocking TCP client speaking the NUL-terminated STOMP 1.2 frame format
//! - High-level helpers for login, subscribe, publish, and disconnect
//! - Incremental frame reads that tolerate arbitrary TCP chunking

pub mod client;
pub mod error;

pub use client::Client;
pub use error::ClientError;
