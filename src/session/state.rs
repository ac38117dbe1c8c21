//! Session state record observed by the UI.

use crate::service::Milestone;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of content being read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BookType {
    /// Ebook (EPUB, PDF, ...).
    Ebook,
    /// Magazine issue.
    Magazine,
}

impl BookType {
    /// Wire name of this content type.
    pub fn as_str(&self) -> &'static str {
        match self {
            BookType::Ebook => "ebook",
            BookType::Magazine => "magazine",
        }
    }
}

impl fmt::Display for BookType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The current reading session as known by this client.
///
/// `session_id` is set if and only if `is_active` is true. `today_duration`
/// is a per-day figure and survives the end of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionState {
    /// Server-assigned session id.
    pub session_id: Option<i64>,
    /// Book being read.
    pub book_id: Option<i64>,
    /// Content type of the book being read.
    pub book_type: Option<BookType>,
    /// Whether a session is active.
    pub is_active: bool,
    /// Whether the active session is paused.
    pub is_paused: bool,
    /// Best current estimate of the session length.
    pub duration_seconds: u64,
    /// Total reading time today, as last reported by the server.
    pub today_duration: u64,
    /// When the session began.
    pub start_time: Option<DateTime<Utc>>,
}

impl SessionState {
    /// Empty state, keeping the day total.
    pub fn idle(today_duration: u64) -> Self {
        Self {
            today_duration,
            ..Self::default()
        }
    }

    /// Whether the session is active and not paused.
    pub fn is_running(&self) -> bool {
        self.is_active && !self.is_paused
    }

    /// Whether this state tracks the given book.
    pub fn is_for_book(&self, book_id: i64, book_type: BookType) -> bool {
        self.is_active && self.book_id == Some(book_id) && self.book_type == Some(book_type)
    }

    /// Session duration as `HH:MM:SS` or `MM:SS`.
    pub fn formatted_duration(&self) -> String {
        format_duration(self.duration_seconds)
    }
}

/// Outcome of a successful `end_session`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndSessionResult {
    /// Server-confirmed session length.
    pub duration_seconds: u64,
    /// Total reading time today.
    pub today_duration: u64,
    /// Achievements unlocked by this session.
    pub milestones: Vec<Milestone>,
}

/// Format seconds as `HH:MM:SS`, or `MM:SS` under one hour.
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}
