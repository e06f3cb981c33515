use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::activity::ActivityState;
use crate::scheduler::{BreakCategory, NextBreak, SchedulerStatus};

/// Commands applied serially by the engine, in FIFO arrival order
///
/// Stays externally tagged: the bincode wire format is not self-describing
/// and cannot decode internally tagged enums.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineCommand {
    CompleteBreak,
    SnoozeBreak { minutes: u64 },
    SkipBreak,
    Pause { minutes: Option<u64> },
    Resume,
    StartSession,
    PauseSession,
    ResumeSession,
    EndSession,
    ReloadSettings,
    UpdateSetting { key: String, value: String },
    GetStatus,
    Shutdown,
}

/// Why a command was rejected
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("invalid command: {0}")]
    Invalid(String),
}

/// Events the engine emits towards its owner
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    Ready {
        version: String,
    },
    Metrics {
        mouse_velocity: f64,
        keys_per_min: u32,
        state: ActivityState,
        next_break: NextBreak,
    },
    StateChange {
        state: ActivityState,
    },
    BreakDue {
        category: BreakCategory,
        duration_seconds: u32,
        theme_color: String,
    },
    Status(SchedulerStatus),
    Error {
        message: String,
    },
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_survive_wire_codec() {
        // Payload-carrying variants must decode under the non-self-describing
        // codec, not just unit variants
        let commands = [
            EngineCommand::StartSession,
            EngineCommand::SnoozeBreak { minutes: 5 },
            EngineCommand::Pause { minutes: None },
            EngineCommand::UpdateSetting {
                key: String::from("timer_mode"),
                value: String::from("active"),
            },
        ];
        for command in commands {
            let bytes = bincode::serialize(&command).unwrap();
            let decoded: EngineCommand = bincode::deserialize(&bytes).unwrap();
            assert_eq!(decoded, command);
        }
    }
}
