//! Reading session service boundary.
//!
//! The [`SessionService`] trait is everything the lifecycle manager needs
//! from the server. [`HttpSessionService`] implements it over REST.

mod http;

pub use http::HttpSessionService;

use crate::error::Result;
use crate::session::BookType;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where the reader currently is. All fields are opaque to this crate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingPosition {
    /// Reader-specific position (page number, CFI, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    /// Current chapter index.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter_index: Option<u32>,
    /// Pages read during this session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages_read: Option<u32>,
}

impl ReadingPosition {
    /// Position with only the reader location set.
    pub fn at(position: impl Into<String>) -> Self {
        Self {
            position: Some(position.into()),
            ..Self::default()
        }
    }

    /// Fill fields missing here from `fallback`.
    pub fn or(self, fallback: ReadingPosition) -> Self {
        Self {
            position: self.position.or(fallback.position),
            chapter_index: self.chapter_index.or(fallback.chapter_index),
            pages_read: self.pages_read.or(fallback.pages_read),
        }
    }
}

/// Reply to a session start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedSession {
    /// Server-assigned session id.
    pub session_id: i64,
    /// When the server opened the session.
    pub start_time: DateTime<Utc>,
}

/// Reply to a heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatAck {
    /// Server-confirmed session length.
    pub duration_seconds: u64,
    /// Total reading time today.
    pub today_duration: u64,
}

/// Achievement reported when a session ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    /// Milestone id.
    pub id: String,
    /// Human readable description.
    pub description: String,
}

/// Reply to a session end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndedSession {
    /// Final session length.
    pub duration_seconds: u64,
    /// Total reading time today.
    pub today_duration: u64,
    /// Achievements unlocked by this session.
    #[serde(default)]
    pub milestones_achieved: Vec<Milestone>,
}

/// A session the server still considers active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSession {
    /// Session id.
    pub session_id: i64,
    /// Book being read.
    pub book_id: i64,
    /// Content type.
    pub book_type: BookType,
    /// When the session began.
    pub start_time: DateTime<Utc>,
    /// Duration currently held by the server.
    #[serde(default)]
    pub duration_seconds: u64,
}

/// Reading time for the current day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodayDuration {
    /// Total reading time today in seconds.
    pub today_duration: u64,
}

/// Remote reading session API.
///
/// Implementations enforce their own timeouts; callers add none.
#[async_trait]
pub trait SessionService: Send + Sync {
    /// Open a new session for a book.
    async fn start(
        &self,
        book_id: i64,
        book_type: BookType,
        position: &ReadingPosition,
    ) -> Result<StartedSession>;

    /// Report progress and fetch authoritative durations.
    async fn heartbeat(&self, session_id: i64, position: &ReadingPosition) -> Result<HeartbeatAck>;

    /// Pause a session.
    async fn pause(&self, session_id: i64) -> Result<()>;

    /// Resume a paused session.
    async fn resume(&self, session_id: i64) -> Result<()>;

    /// Close a session.
    async fn end(&self, session_id: i64, position: &ReadingPosition) -> Result<EndedSession>;

    /// Session still open server-side for this user, if any.
    async fn active_session(&self) -> Result<Option<ActiveSession>>;

    /// Reading time for the current day.
    async fn today_duration(&self) -> Result<TodayDuration>;
}
