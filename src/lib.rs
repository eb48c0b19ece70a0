//! Update-delivery front end for a Telegram bot.
//!
//! Receives updates by long polling or by webhook, normalizes both into one
//! [`update::Update`] shape, and hands each to the handler pipeline through
//! the [`lifecycle::Lifecycle`] coordinator. A liveness endpoint answers
//! independently of bot state.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod database;
pub mod logging;

pub mod dispatch;
pub mod handlers;
pub mod session;
pub mod transport;
pub mod update;

pub mod lifecycle;
pub mod server;

pub mod heartbeat;
