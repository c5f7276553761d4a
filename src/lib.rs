//! reminder-relay - Medication reminder delivery over Gmail
//!
//! This crate composes reminder emails, keeps a delegated Gmail OAuth grant
//! usable, and delivers through the Gmail API. Reminders that cannot reach
//! the provider are recorded as simulated instead of failing the caller.

pub mod app;
pub mod config;
pub mod domain;
pub mod providers;
pub mod services;
pub mod storage;

pub use app::App;
