use lull_storage::Database;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Break categories in display order
///
/// The dense discriminants index the per-category accumulator arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakCategory {
    /// Eye rest, every ~20 minutes for 20 seconds
    Micro,
    /// Stretch break, every ~45 minutes for a few minutes
    Macro,
    /// Water nudge, no countdown of its own
    Hydration,
}

impl BreakCategory {
    pub const COUNT: usize = 3;

    /// All categories, accumulator order
    pub const ALL: [Self; Self::COUNT] = [Self::Micro, Self::Macro, Self::Hydration];

    /// Arbitration order for simultaneous eligibility
    pub const PRIORITY: [Self; Self::COUNT] = [Self::Macro, Self::Micro, Self::Hydration];

    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Micro => 0,
            Self::Macro => 1,
            Self::Hydration => 2,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Micro => "micro",
            Self::Macro => "macro",
            Self::Hydration => "hydration",
        }
    }
}

/// Immutable configuration snapshot for one break category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakConfig {
    pub interval_seconds: u32,
    pub duration_seconds: u32,
    pub theme_color: String,
}

/// Whether accumulators follow input activity or real time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimerMode {
    /// Accumulate only while the classifier reports real input activity
    ActiveTime,
    /// Accumulate unconditionally, idle and immersive included
    WallClock,
}

impl TimerMode {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::ActiveTime),
            "wall-clock" => Some(Self::WallClock),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ActiveTime => "active",
            Self::WallClock => "wall-clock",
        }
    }
}

/// Work session state, gating all accumulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Not tracking, waiting for an explicit start
    Idle,
    /// Session running, timers counting
    Active,
    /// Session paused, timers frozen in place
    Paused,
}

impl SessionState {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "idle" => Some(Self::Idle),
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Active => "active",
            Self::Paused => "paused",
        }
    }
}

/// Per-category view for status queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakStatus {
    pub category: BreakCategory,
    pub interval_seconds: u32,
    pub duration_seconds: u32,
    pub elapsed_seconds: u64,
    /// Floored so observers see a monotonic countdown
    pub remaining_seconds: u64,
    pub progress: f64,
    pub theme_color: String,
}

/// Full scheduler snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub session_state: SessionState,
    pub paused: bool,
    pub pending: Option<BreakCategory>,
    pub timer_mode: TimerMode,
    pub active_time_seconds: u64,
    pub breaks: Vec<BreakStatus>,
}

/// The category next in line, by minimum remaining time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextBreak {
    pub category: BreakCategory,
    pub remaining_seconds: u64,
    pub duration_seconds: u32,
    pub theme_color: String,
}

/// Callback invoked synchronously when arbitration selects a category
pub type BreakNotifier = Box<dyn FnMut(BreakCategory, &BreakConfig) + Send>;

fn default_configs() -> [BreakConfig; BreakCategory::COUNT] {
    [
        BreakConfig {
            interval_seconds: 1200,
            duration_seconds: 20,
            theme_color: String::from("#10B981"),
        },
        BreakConfig {
            interval_seconds: 2700,
            duration_seconds: 180,
            theme_color: String::from("#F59E0B"),
        },
        BreakConfig {
            interval_seconds: 1800,
            duration_seconds: 0,
            theme_color: String::from("#3B82F6"),
        },
    ]
}

/// Accumulates qualifying time per break category and decides which break
/// fires first.
///
/// All mutation happens on the engine task; commands and ticks are already
/// serialized there, so the scheduler itself carries no lock.
pub struct BreakScheduler {
    database: Arc<Database>,
    configs: [BreakConfig; BreakCategory::COUNT],
    accumulated: [f64; BreakCategory::COUNT],
    active_time_seconds: f64,
    timer_mode: TimerMode,
    session_state: SessionState,
    paused: bool,
    pause_until: Option<Instant>,
    pending: Option<BreakCategory>,
    notifier: Option<BreakNotifier>,
}

impl BreakScheduler {
    #[must_use]
    pub fn new(database: Arc<Database>) -> Self {
        let mut scheduler = Self {
            database,
            configs: default_configs(),
            accumulated: [0.0; BreakCategory::COUNT],
            active_time_seconds: 0.0,
            timer_mode: TimerMode::ActiveTime,
            session_state: SessionState::Idle,
            paused: false,
            pause_until: None,
            pending: None,
            notifier: None,
        };
        scheduler.load_settings();
        scheduler.load_timer_mode();
        scheduler.load_session_state();
        scheduler
    }

    /// Install the break-due callback.
    pub fn set_notifier(&mut self, notifier: BreakNotifier) {
        self.notifier = Some(notifier);
    }

    // ==================== Settings ====================

    fn setting_u32(&self, key: &str) -> Option<u32> {
        match self.database.get_setting(key) {
            Ok(Some(raw)) => match raw.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    log::warn!("Ignoring malformed setting {key}={raw}");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                log::warn!("Failed to read setting {key}: {e}");
                None
            }
        }
    }

    fn load_settings(&mut self) {
        let keys: [(BreakCategory, &str, Option<&str>); 3] = [
            (
                BreakCategory::Micro,
                "micro_break_interval",
                Some("micro_break_duration"),
            ),
            (
                BreakCategory::Macro,
                "macro_break_interval",
                Some("macro_break_duration"),
            ),
            (BreakCategory::Hydration, "hydration_interval", None),
        ];

        for (category, interval_key, duration_key) in keys {
            if let Some(interval) = self.setting_u32(interval_key) {
                self.configs[category.index()].interval_seconds = interval;
            }
            if let Some(duration) = duration_key.and_then(|k| self.setting_u32(k)) {
                self.configs[category.index()].duration_seconds = duration;
            }
        }
    }

    fn load_timer_mode(&mut self) {
        if let Ok(Some(raw)) = self.database.get_setting("timer_mode") {
            match TimerMode::parse(&raw) {
                Some(mode) => self.timer_mode = mode,
                None => log::warn!("Ignoring malformed timer_mode={raw}"),
            }
        }
    }

    fn load_session_state(&mut self) {
        if let Ok(Some(raw)) = self.database.get_setting("session_state") {
            match SessionState::parse(&raw) {
                Some(state) => self.session_state = state,
                None => log::warn!("Ignoring malformed session_state={raw}"),
            }
        }
    }

    fn save_session_state(&self) {
        // Best-effort persistence; the engine keeps running without it
        if let Err(e) = self
            .database
            .set_setting("session_state", self.session_state.as_str())
        {
            log::warn!("Failed to persist session state: {e}");
        }
    }

    /// Re-read break configs and timer mode from the settings store.
    pub fn reload_settings(&mut self) {
        let old_mode = self.timer_mode;
        self.load_settings();
        self.load_timer_mode();
        if old_mode != self.timer_mode {
            log::info!(
                "Timer mode changed: {} -> {}",
                old_mode.as_str(),
                self.timer_mode.as_str()
            );
        }
    }

    /// Reload settings while preserving accumulated progress for `category`.
    ///
    /// Smart recalculation: a user 15 minutes into a 20-minute interval that
    /// grows to 40 minutes now has 25 minutes remaining, not 40. If the new
    /// interval ends up below the accumulated time, the break triggers on the
    /// next update, which is the intended outcome.
    pub fn reload_and_reset(&mut self, category: BreakCategory) {
        let accumulated = self.accumulated[category.index()];
        let old_interval = self.configs[category.index()].interval_seconds;

        self.load_settings();

        let new_interval = self.configs[category.index()].interval_seconds;
        let remaining = (f64::from(new_interval) - accumulated).max(0.0);
        log::info!(
            "Recalculated {}: interval {old_interval}s -> {new_interval}s, \
             elapsed {:.0}s, remaining {remaining:.0}s",
            category.as_str(),
            accumulated,
        );
    }

    /// Reload settings and zero the category's accumulator.
    ///
    /// Only for completion-driven reconfiguration; interval edits go through
    /// [`reload_and_reset`](Self::reload_and_reset).
    pub fn reload_and_hard_reset(&mut self, category: BreakCategory) {
        self.load_settings();
        self.accumulated[category.index()] = 0.0;
        log::info!(
            "{} hard reset, interval {}s",
            category.as_str(),
            self.configs[category.index()].interval_seconds
        );
    }

    /// Update a category's config in place and persist the changed keys.
    pub fn update_config(
        &mut self,
        category: BreakCategory,
        interval: Option<u32>,
        duration: Option<u32>,
    ) {
        let config = &mut self.configs[category.index()];
        if let Some(interval) = interval {
            config.interval_seconds = interval;
        }
        if let Some(duration) = duration {
            config.duration_seconds = duration;
        }

        let keys: (Option<&str>, Option<&str>) = match category {
            BreakCategory::Micro => (Some("micro_break_interval"), Some("micro_break_duration")),
            BreakCategory::Macro => (Some("macro_break_interval"), Some("macro_break_duration")),
            BreakCategory::Hydration => (Some("hydration_interval"), None),
        };

        if let (Some(value), Some(key)) = (interval, keys.0) {
            if let Err(e) = self.database.set_setting(key, &value.to_string()) {
                log::warn!("Failed to persist {key}: {e}");
            }
        }
        if let (Some(value), Some(key)) = (duration, keys.1) {
            if let Err(e) = self.database.set_setting(key, &value.to_string()) {
                log::warn!("Failed to persist {key}: {e}");
            }
        }
    }

    // ==================== Tick ====================

    /// Advance the scheduler by `delta_seconds` of observed time.
    ///
    /// Returns the category that just became due, if any. The due-notifier
    /// runs synchronously before this returns.
    pub fn update(
        &mut self,
        is_active: bool,
        delta_seconds: f64,
        is_immersive: bool,
    ) -> Option<BreakCategory> {
        // Upstream clock anomalies get clamped, not raised
        let delta = delta_seconds.max(0.0);

        if self.is_paused() {
            return None;
        }
        if self.session_state != SessionState::Active {
            return None;
        }
        // A pending break freezes everything so reminders cannot stack up
        // while the user is away.
        if self.pending.is_some() {
            return None;
        }

        // Wall-clock mode counts real time unconditionally; that contract is
        // never suppressed by idle or immersive state.
        let should_accumulate = self.timer_mode == TimerMode::WallClock || is_active;
        if should_accumulate {
            self.active_time_seconds += delta;
            for acc in &mut self.accumulated {
                *acc += delta;
            }
        }

        // Immersive suppresses the popup, not the accumulation above
        if is_immersive && self.timer_mode != TimerMode::WallClock {
            return None;
        }

        let due = self.check_due();
        if let Some(category) = due {
            self.pending = Some(category);
            if let Some(notifier) = self.notifier.as_mut() {
                notifier(category, &self.configs[category.index()]);
            }
        }
        due
    }

    fn check_due(&self) -> Option<BreakCategory> {
        BreakCategory::PRIORITY.into_iter().find(|&category| {
            self.accumulated[category.index()]
                >= f64::from(self.configs[category.index()].interval_seconds)
        })
    }

    // ==================== Break responses ====================

    /// Mark a break as taken, resetting its accumulator.
    ///
    /// Completing a macro break also resets micro: the long break covers the
    /// eye-rest need.
    pub fn complete_break(&mut self, category: Option<BreakCategory>) {
        let Some(category) = category.or(self.pending) else {
            return;
        };

        self.accumulated[category.index()] = 0.0;
        if category == BreakCategory::Macro {
            self.accumulated[BreakCategory::Micro.index()] = 0.0;
        }
        self.active_time_seconds = 0.0;
        self.pending = None;
    }

    /// Push the pending break out by roughly `minutes` without discarding all
    /// prior progress.
    pub fn snooze_break(&mut self, minutes: u64) {
        if let Some(category) = self.pending {
            let interval = f64::from(self.configs[category.index()].interval_seconds);
            #[allow(clippy::cast_precision_loss)]
            let snooze_seconds = (minutes * 60) as f64;
            self.accumulated[category.index()] = (interval - snooze_seconds).max(0.0);
        }
        self.pending = None;
    }

    /// Dismiss the pending break; the next one waits a full interval.
    pub fn skip_break(&mut self) {
        if let Some(category) = self.pending {
            self.accumulated[category.index()] = 0.0;
        }
        self.pending = None;
    }

    // ==================== Legacy pause ====================

    /// Pause all reminders, indefinitely when `minutes` is `None`.
    ///
    /// Orthogonal to the session machine; an ad-hoc mute.
    pub fn pause(&mut self, minutes: Option<u64>) {
        self.paused = true;
        self.pause_until = minutes.map(|m| Instant::now() + Duration::from_secs(m * 60));
    }

    pub fn resume(&mut self) {
        self.paused = false;
        self.pause_until = None;
    }

    fn is_paused(&mut self) -> bool {
        if !self.paused {
            return false;
        }
        if self.pause_until.is_some_and(|until| Instant::now() >= until) {
            self.paused = false;
            self.pause_until = None;
            return false;
        }
        true
    }

    // ==================== Session control ====================

    /// Idle -> Active starts fresh and zeroes everything; Paused -> Active
    /// resumes where the timers left off.
    pub fn start_session(&mut self) {
        if self.session_state == SessionState::Idle {
            self.accumulated = [0.0; BreakCategory::COUNT];
            self.active_time_seconds = 0.0;
        }
        self.session_state = SessionState::Active;
        self.save_session_state();
        log::info!("Session started");
    }

    /// Active -> Paused; timers freeze in place.
    pub fn pause_session(&mut self) {
        if self.session_state == SessionState::Active {
            self.session_state = SessionState::Paused;
            self.save_session_state();
            log::info!("Session paused");
        }
    }

    /// Paused -> Active; timers continue from where they were.
    pub fn resume_session(&mut self) {
        if self.session_state == SessionState::Paused {
            self.session_state = SessionState::Active;
            self.save_session_state();
            log::info!("Session resumed");
        }
    }

    /// Any state -> Idle; zeroes everything and clears a pending break.
    pub fn end_session(&mut self) {
        self.accumulated = [0.0; BreakCategory::COUNT];
        self.active_time_seconds = 0.0;
        self.pending = None;
        self.session_state = SessionState::Idle;
        self.save_session_state();
        log::info!("Session ended, all timers reset");
    }

    // ==================== Queries ====================

    #[must_use]
    pub const fn session_state(&self) -> SessionState {
        self.session_state
    }

    #[must_use]
    pub const fn pending_break(&self) -> Option<BreakCategory> {
        self.pending
    }

    #[must_use]
    pub const fn timer_mode(&self) -> TimerMode {
        self.timer_mode
    }

    #[must_use]
    pub fn config(&self, category: BreakCategory) -> BreakConfig {
        self.configs[category.index()].clone()
    }

    /// Remaining seconds for a category, floored and clamped at zero.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn remaining_seconds(&self, category: BreakCategory) -> u64 {
        let interval = f64::from(self.configs[category.index()].interval_seconds);
        let remaining = (interval - self.accumulated[category.index()]).max(0.0);
        remaining.floor() as u64
    }

    /// Full snapshot for observers; returned by value so callers never alias
    /// the live accumulators.
    pub fn status(&mut self) -> SchedulerStatus {
        let paused = self.is_paused();
        let breaks = BreakCategory::ALL
            .into_iter()
            .map(|category| {
                let config = &self.configs[category.index()];
                let elapsed = self.accumulated[category.index()].max(0.0);
                let interval = f64::from(config.interval_seconds);
                let progress = if interval > 0.0 {
                    (elapsed / interval).min(1.0)
                } else {
                    1.0
                };
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let elapsed_seconds = elapsed as u64;
                BreakStatus {
                    category,
                    interval_seconds: config.interval_seconds,
                    duration_seconds: config.duration_seconds,
                    elapsed_seconds,
                    remaining_seconds: self.remaining_seconds(category),
                    progress,
                    theme_color: config.theme_color.clone(),
                }
            })
            .collect();

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let active_time_seconds = self.active_time_seconds.max(0.0) as u64;
        SchedulerStatus {
            session_state: self.session_state,
            paused,
            pending: self.pending,
            timer_mode: self.timer_mode,
            active_time_seconds,
            breaks,
        }
    }

    /// The category with the least remaining time.
    #[must_use]
    pub fn next_break(&self) -> NextBreak {
        let category = BreakCategory::ALL
            .into_iter()
            .min_by(|a, b| {
                self.remaining_seconds(*a)
                    .cmp(&self.remaining_seconds(*b))
            })
            .unwrap_or(BreakCategory::Micro);
        let config = &self.configs[category.index()];
        NextBreak {
            category,
            remaining_seconds: self.remaining_seconds(category),
            duration_seconds: config.duration_seconds,
            theme_color: config.theme_color.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler() -> BreakScheduler {
        let db = Arc::new(Database::new(None).unwrap());
        db.set_setting("timer_mode", "active").unwrap();
        let mut s = BreakScheduler::new(db);
        s.start_session();
        s
    }

    fn wall_clock_scheduler() -> BreakScheduler {
        // Seeded default is wall-clock
        let db = Arc::new(Database::new(None).unwrap());
        let mut s = BreakScheduler::new(db);
        s.start_session();
        s
    }

    #[test]
    fn test_accumulation_pauses_on_idle() {
        let mut s = scheduler();
        for _ in 0..5 {
            s.update(true, 1.0, false);
        }
        for _ in 0..3 {
            s.update(false, 1.0, false);
        }
        let status = s.status();
        assert_eq!(status.breaks[0].elapsed_seconds, 5);
        assert_eq!(status.active_time_seconds, 5);
    }

    #[test]
    fn test_wall_clock_never_pauses() {
        let mut s = wall_clock_scheduler();
        assert_eq!(s.timer_mode(), TimerMode::WallClock);
        s.update(false, 1.0, true);
        for b in s.status().breaks {
            assert_eq!(b.elapsed_seconds, 1);
        }
    }

    #[test]
    fn test_all_categories_accumulate_concurrently() {
        let mut s = scheduler();
        s.update(true, 7.0, false);
        for b in s.status().breaks {
            assert_eq!(b.elapsed_seconds, 7);
        }
    }

    #[test]
    fn test_break_due_and_pending_gating() {
        let mut s = scheduler();
        s.update_config(BreakCategory::Micro, Some(10), None);

        let due = s.update(true, 10.0, false);
        assert_eq!(due, Some(BreakCategory::Micro));
        assert_eq!(s.pending_break(), Some(BreakCategory::Micro));

        // Frozen until the user responds: no accumulation, no re-trigger
        for _ in 0..50 {
            assert_eq!(s.update(true, 1.0, false), None);
        }
        assert_eq!(s.status().breaks[0].elapsed_seconds, 10);

        s.complete_break(None);
        assert_eq!(s.pending_break(), None);
        assert_eq!(s.status().breaks[0].elapsed_seconds, 0);
    }

    #[test]
    fn test_priority_macro_over_micro() {
        let mut s = scheduler();
        s.update_config(BreakCategory::Micro, Some(10), None);
        s.update_config(BreakCategory::Macro, Some(10), None);

        let due = s.update(true, 10.0, false);
        assert_eq!(due, Some(BreakCategory::Macro));
    }

    #[test]
    fn test_macro_completion_resets_micro() {
        let mut s = scheduler();
        s.update_config(BreakCategory::Macro, Some(10), None);
        s.update(true, 10.0, false);
        assert_eq!(s.pending_break(), Some(BreakCategory::Macro));

        s.complete_break(None);
        let status = s.status();
        assert_eq!(status.breaks[BreakCategory::Micro.index()].elapsed_seconds, 0);
        // Hydration keeps its progress
        assert_eq!(
            status.breaks[BreakCategory::Hydration.index()].elapsed_seconds,
            10
        );
    }

    #[test]
    fn test_snooze_preserves_partial_progress() {
        let mut s = scheduler();
        s.update_config(BreakCategory::Micro, Some(1200), None);
        s.update(true, 1200.0, false);
        assert_eq!(s.pending_break(), Some(BreakCategory::Micro));

        s.snooze_break(5);
        assert_eq!(s.pending_break(), None);
        let status = s.status();
        assert_eq!(status.breaks[0].elapsed_seconds, 900);
        assert_eq!(status.breaks[0].remaining_seconds, 300);
    }

    #[test]
    fn test_snooze_clamps_at_zero() {
        let mut s = scheduler();
        s.update_config(BreakCategory::Micro, Some(60), None);
        s.update(true, 60.0, false);
        s.snooze_break(5); // 300s snooze against a 60s interval
        assert_eq!(s.status().breaks[0].elapsed_seconds, 0);
    }

    #[test]
    fn test_skip_resets_to_full_interval() {
        let mut s = scheduler();
        s.update_config(BreakCategory::Micro, Some(20), None);
        s.update(true, 20.0, false);
        s.skip_break();
        assert_eq!(s.pending_break(), None);
        assert_eq!(s.status().breaks[0].remaining_seconds, 20);
    }

    #[test]
    fn test_smart_recalculation_preserves_progress() {
        let db = Arc::new(Database::new(None).unwrap());
        db.set_setting("timer_mode", "active").unwrap();
        db.set_setting("micro_break_interval", "1200").unwrap();
        let mut s = BreakScheduler::new(db.clone());
        s.start_session();

        s.update(true, 900.0, false);

        db.set_setting("micro_break_interval", "1800").unwrap();
        s.reload_and_reset(BreakCategory::Micro);

        let status = s.status();
        assert_eq!(status.breaks[0].interval_seconds, 1800);
        assert_eq!(status.breaks[0].elapsed_seconds, 900);
        assert_eq!(status.breaks[0].remaining_seconds, 900);
    }

    #[test]
    fn test_hard_reset_zeroes_progress() {
        let db = Arc::new(Database::new(None).unwrap());
        db.set_setting("timer_mode", "active").unwrap();
        let mut s = BreakScheduler::new(db.clone());
        s.start_session();
        s.update(true, 300.0, false);

        s.reload_and_hard_reset(BreakCategory::Micro);
        assert_eq!(s.status().breaks[0].elapsed_seconds, 0);
    }

    #[test]
    fn test_immersive_suppresses_trigger_but_not_accumulation() {
        let mut s = scheduler();
        s.update_config(BreakCategory::Micro, Some(10), None);

        // Active input inside a fullscreen app: time still counts
        assert_eq!(s.update(true, 10.0, true), None);
        assert_eq!(s.pending_break(), None);
        assert_eq!(s.status().breaks[0].elapsed_seconds, 10);

        // Leaving immersive mode lets the overdue break fire
        assert_eq!(s.update(true, 0.0, false), Some(BreakCategory::Micro));
    }

    #[test]
    fn test_wall_clock_triggers_even_immersive() {
        let mut s = wall_clock_scheduler();
        s.update_config(BreakCategory::Micro, Some(10), None);
        assert_eq!(s.update(false, 10.0, true), Some(BreakCategory::Micro));
    }

    #[test]
    fn test_session_lifecycle_resets() {
        let mut s = scheduler();
        s.update(true, 60.0, false);

        s.pause_session();
        assert_eq!(s.session_state(), SessionState::Paused);
        s.update(true, 60.0, false); // frozen
        assert_eq!(s.status().breaks[0].elapsed_seconds, 60);

        s.resume_session();
        s.update(true, 5.0, false);
        assert_eq!(s.status().breaks[0].elapsed_seconds, 65);

        s.update_config(BreakCategory::Micro, Some(30), None);
        s.update(true, 0.0, false);
        assert!(s.pending_break().is_some());

        s.end_session();
        assert_eq!(s.session_state(), SessionState::Idle);
        assert_eq!(s.pending_break(), None);
        assert_eq!(s.status().breaks[0].elapsed_seconds, 0);
    }

    #[test]
    fn test_start_session_from_idle_zeroes() {
        let mut s = scheduler();
        s.update(true, 60.0, false);
        s.end_session();
        s.start_session();
        assert_eq!(s.status().breaks[0].elapsed_seconds, 0);
    }

    #[test]
    fn test_resume_from_paused_keeps_progress() {
        let mut s = scheduler();
        s.update(true, 42.0, false);
        s.pause_session();
        s.start_session(); // Paused -> Active resumes, no zeroing
        assert_eq!(s.status().breaks[0].elapsed_seconds, 42);
    }

    #[test]
    fn test_legacy_pause_blocks_updates() {
        let mut s = scheduler();
        s.pause(None);
        s.update(true, 30.0, false);
        assert_eq!(s.status().breaks[0].elapsed_seconds, 0);
        assert!(s.status().paused);

        s.resume();
        s.update(true, 30.0, false);
        assert_eq!(s.status().breaks[0].elapsed_seconds, 30);
    }

    #[test]
    fn test_session_state_persisted() {
        let db = Arc::new(Database::new(None).unwrap());
        let mut s = BreakScheduler::new(db.clone());
        s.start_session();
        assert_eq!(
            db.get_setting("session_state").unwrap().as_deref(),
            Some("active")
        );
        s.end_session();
        assert_eq!(
            db.get_setting("session_state").unwrap().as_deref(),
            Some("idle")
        );
    }

    #[test]
    fn test_session_state_restored_from_store() {
        let db = Arc::new(Database::new(None).unwrap());
        db.set_setting("session_state", "active").unwrap();
        let s = BreakScheduler::new(db);
        assert_eq!(s.session_state(), SessionState::Active);
    }

    #[test]
    fn test_malformed_settings_fall_back_to_defaults() {
        let db = Arc::new(Database::new(None).unwrap());
        db.set_setting("micro_break_interval", "soon").unwrap();
        db.set_setting("timer_mode", "quantum").unwrap();
        let s = BreakScheduler::new(db);
        assert_eq!(s.config(BreakCategory::Micro).interval_seconds, 1200);
        // Unparseable mode falls back to the built-in default
        assert_eq!(s.timer_mode(), TimerMode::ActiveTime);
    }

    #[test]
    fn test_negative_delta_clamped() {
        let mut s = scheduler();
        s.update(true, -5.0, false);
        assert_eq!(s.status().breaks[0].elapsed_seconds, 0);
    }

    #[test]
    fn test_notifier_invoked_synchronously() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();

        let mut s = scheduler();
        s.update_config(BreakCategory::Micro, Some(5), None);
        s.set_notifier(Box::new(move |category, config| {
            assert_eq!(category, BreakCategory::Micro);
            assert_eq!(config.interval_seconds, 5);
            fired_clone.fetch_add(1, Ordering::SeqCst);
        }));

        s.update(true, 5.0, false);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_next_break_picks_minimum_remaining() {
        let mut s = scheduler();
        s.update_config(BreakCategory::Hydration, Some(100), None);
        s.update(true, 50.0, false);
        let next = s.next_break();
        assert_eq!(next.category, BreakCategory::Hydration);
        assert_eq!(next.remaining_seconds, 50);
    }
}
