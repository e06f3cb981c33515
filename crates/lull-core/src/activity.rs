use serde::{Deserialize, Serialize};

use crate::probe::ForegroundProbe;

/// User activity state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityState {
    Active,
    Idle,
    /// Fullscreen or blocklisted app; reminders are suppressed
    Immersive,
}

impl ActivityState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Idle => "idle",
            Self::Immersive => "immersive",
        }
    }
}

type StateObserver = Box<dyn FnMut(ActivityState) + Send>;

/// Combines idle detection, the process blocklist, and the fullscreen probe
/// into a three-way state.
///
/// Immersive outranks Idle, which outranks Active.
pub struct StateClassifier {
    idle_threshold: f64,
    blocklist: Vec<String>,
    auto_detect_fullscreen: bool,
    probe: Box<dyn ForegroundProbe>,
    observer: Option<StateObserver>,
    current: ActivityState,
}

impl StateClassifier {
    #[must_use]
    pub fn new(
        idle_threshold: f64,
        blocklist: Vec<String>,
        auto_detect_fullscreen: bool,
        probe: Box<dyn ForegroundProbe>,
    ) -> Self {
        Self {
            idle_threshold,
            blocklist: blocklist.iter().map(|p| p.to_lowercase()).collect(),
            auto_detect_fullscreen,
            probe,
            observer: None,
            current: ActivityState::Idle,
        }
    }

    /// Register the observer invoked exactly once per state transition.
    pub fn on_state_change(&mut self, observer: StateObserver) {
        self.observer = Some(observer);
    }

    /// Classify the current activity state.
    ///
    /// Determination order: fullscreen (when enabled), then blocklisted
    /// foreground app, then idle threshold, else active. Probe failures
    /// degrade to "not immersive" rather than surfacing.
    pub fn classify(&mut self, time_since_input: f64) -> ActivityState {
        let new_state = if self.is_immersive() {
            ActivityState::Immersive
        } else if time_since_input >= self.idle_threshold {
            ActivityState::Idle
        } else {
            ActivityState::Active
        };

        if new_state != self.current {
            self.current = new_state;
            if let Some(observer) = self.observer.as_mut() {
                observer(new_state);
            }
        }

        new_state
    }

    #[must_use]
    pub const fn current_state(&self) -> ActivityState {
        self.current
    }

    fn is_immersive(&self) -> bool {
        if self.auto_detect_fullscreen && self.probe.is_fullscreen().unwrap_or(false) {
            return true;
        }
        let process = self.active_process().to_lowercase();
        !process.is_empty() && self.blocklist.contains(&process)
    }

    /// Foreground process name, empty if the probe has nothing to say.
    #[must_use]
    pub fn active_process(&self) -> String {
        self.probe.active_process_name().unwrap_or_default()
    }

    /// Whether the foreground window is fullscreen, false on probe failure.
    #[must_use]
    pub fn is_fullscreen(&self) -> bool {
        self.probe.is_fullscreen().unwrap_or(false)
    }

    pub fn set_idle_threshold(&mut self, seconds: f64) {
        self.idle_threshold = seconds;
    }

    pub fn set_auto_detect_fullscreen(&mut self, enabled: bool) {
        self.auto_detect_fullscreen = enabled;
    }

    /// Replace the blocklist; effective on the next classification.
    pub fn set_blocklist(&mut self, processes: Vec<String>) {
        self.blocklist = processes.iter().map(|p| p.to_lowercase()).collect();
    }

    pub fn add_to_blocklist(&mut self, process: &str) {
        let process = process.to_lowercase();
        if !self.blocklist.contains(&process) {
            self.blocklist.push(process);
        }
    }

    pub fn remove_from_blocklist(&mut self, process: &str) {
        let process = process.to_lowercase();
        self.blocklist.retain(|p| *p != process);
    }
}
