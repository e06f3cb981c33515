pub mod activity;
pub mod command;
pub mod config;
pub mod engine;
pub mod input;
pub mod ipc;
pub mod probe;
pub mod scheduler;

pub use activity::{ActivityState, StateClassifier};
pub use command::{EngineCommand, EngineEvent};
pub use engine::Engine;
pub use input::ActivityAggregator;
pub use probe::{ForegroundProbe, NullProbe};
pub use scheduler::{BreakCategory, BreakConfig, BreakScheduler, SessionState, TimerMode};
