use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recorded break reminder and what the user did with it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakLog {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub break_type: String,
    pub duration_seconds: u32,
    pub completed: bool,
    pub skipped: bool,
    pub snoozed: bool,
}

/// Outcome recorded against a pending break log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakOutcome {
    Completed,
    Skipped,
    Snoozed,
}

impl BreakOutcome {
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Skipped => "skipped",
            Self::Snoozed => "snoozed",
        }
    }
}
