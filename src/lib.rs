//! reading-session: client-side reading session lifecycle.
//!
//! This crate tracks one in-progress reading session against a remote
//! reading session API, with a local per-second ticker for smooth
//! feedback and periodic heartbeats that reconcile the local estimate
//! with the server's authoritative duration.
//!
//! # Features
//!
//! - Start, pause, resume and end with at most one session at a time
//! - Local ticking between heartbeats
//! - Server reconciliation of session and daily reading time
//! - Recovery of a session left open by a killed process
//! - Milestones reported on session end
//! - Observable state for UI subscribers

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Configuration and CLI.
pub mod config;
/// Error types.
pub mod error;
/// Session service client.
pub mod service;
/// Session lifecycle.
pub mod session;


pub use config::{Cli, Command, Config};
pub use error::{Result, SessionError};
pub use service::{HttpSessionService, Milestone, ReadingPosition, SessionService};
pub use session::{BookType, EndSessionResult, SessionManager, SessionState, format_duration};
