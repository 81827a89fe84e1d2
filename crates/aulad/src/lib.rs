#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

//! aulad library - authorization core and HTTP API

pub mod api;
pub mod auth;
pub mod config;
pub mod control_db;
pub mod error;
pub mod permissions;
pub mod state;
