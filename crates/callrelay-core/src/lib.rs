//! Core types, config, errors, and call session store for callrelay.

pub mod config;
pub mod error;
pub mod session;
pub mod session_store;
pub mod types;
