use anyhow::Result;
use lull_storage::models::BreakOutcome;
use lull_storage::Database;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::activity::{ActivityState, StateClassifier};
use crate::command::{CommandError, EngineCommand, EngineEvent};
use crate::input::ActivityAggregator;
use crate::ipc::StatusMirror;
use crate::probe::ForegroundProbe;
use crate::scheduler::{BreakCategory, BreakScheduler};

/// Coordinates aggregator, classifier and scheduler on one task.
///
/// Commands are drained and applied before each scheduler tick, never
/// interleaved with it; producers only ever enqueue. The loop keeps ticking
/// through notifier or command failures.
pub struct Engine {
    database: Arc<Database>,
    aggregator: Arc<ActivityAggregator>,
    classifier: StateClassifier,
    scheduler: BreakScheduler,
    commands: mpsc::UnboundedReceiver<EngineCommand>,
    events: mpsc::UnboundedSender<EngineEvent>,
    status_mirror: StatusMirror,
    shutdown: Arc<AtomicBool>,
    /// Break log row awaiting a user response; survives snoozes so a
    /// re-trigger does not create a duplicate entry
    pending_log: Arc<Mutex<Option<i64>>>,
}

impl Engine {
    /// Frame budget for one loop iteration
    const TARGET_FRAME_TIME: Duration = Duration::from_millis(100);
    /// How often a metrics snapshot goes out, independent of tick phase
    const METRICS_BROADCAST_INTERVAL: Duration = Duration::from_secs(1);
    /// Idle seconds after which metrics are forced to exactly zero
    const IDLE_ZERO_THRESHOLD: f64 = 1.0;
    /// Granularity at which the interruptible sleep re-checks shutdown
    const SHUTDOWN_CHECK_INTERVAL: Duration = Duration::from_millis(50);

    /// Assemble an engine from its collaborators.
    pub fn new(
        database: Arc<Database>,
        aggregator: Arc<ActivityAggregator>,
        probe: Box<dyn ForegroundProbe>,
        commands: mpsc::UnboundedReceiver<EngineCommand>,
        events: mpsc::UnboundedSender<EngineEvent>,
        status_mirror: StatusMirror,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        let idle_threshold = database
            .get_setting("idle_threshold")
            .ok()
            .flatten()
            .and_then(|raw| raw.parse::<f64>().ok())
            .unwrap_or(180.0);
        let blocklist = database
            .get_setting("blocklist_processes")
            .ok()
            .flatten()
            .and_then(|raw| serde_json::from_str::<Vec<String>>(&raw).ok())
            .unwrap_or_default();
        let auto_detect_fullscreen = database
            .get_setting("auto_detect_fullscreen")
            .ok()
            .flatten()
            .is_none_or(|raw| raw == "true");

        let mut classifier =
            StateClassifier::new(idle_threshold, blocklist, auto_detect_fullscreen, probe);
        let state_events = events.clone();
        classifier.on_state_change(Box::new(move |state| {
            let _ = state_events.send(EngineEvent::StateChange { state });
        }));

        let mut scheduler = BreakScheduler::new(database.clone());
        let pending_log = Arc::new(Mutex::new(None));
        let notifier_events = events.clone();
        let notifier_db = database.clone();
        let notifier_log = pending_log.clone();
        scheduler.set_notifier(Box::new(move |category, config| {
            let _ = notifier_events.send(EngineEvent::BreakDue {
                category,
                duration_seconds: config.duration_seconds,
                theme_color: config.theme_color.clone(),
            });

            // Fresh triggers open a log entry; a snooze re-trigger reuses
            // the one still waiting for its outcome.
            let mut slot = notifier_log.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_none() {
                match notifier_db.log_break(category.as_str(), config.duration_seconds) {
                    Ok(id) => *slot = Some(id),
                    Err(e) => log::warn!("Failed to log break: {e}"),
                }
            }
        }));

        Self {
            database,
            aggregator,
            classifier,
            scheduler,
            commands,
            events,
            status_mirror,
            shutdown,
            pending_log,
        }
    }

    /// Run until the shutdown flag is observed.
    ///
    /// # Errors
    ///
    /// Currently infallible in practice; the signature leaves room for setup
    /// failures and matches the caller's `?` chain.
    pub async fn run(&mut self) -> Result<()> {
        self.emit(EngineEvent::Ready {
            version: env!("CARGO_PKG_VERSION").to_string(),
        });
        self.publish_status();

        let mut last_tick = Instant::now();
        let mut bucket = 0.0f64;
        let mut last_broadcast = Instant::now();

        while !self.shutdown.load(Ordering::SeqCst) {
            let now = Instant::now();
            let delta = now.duration_since(last_tick).as_secs_f64();
            last_tick = now;
            bucket += delta;

            // Drain the queue before ticking; each command applies fully
            // before the next and before any accumulation
            while let Ok(command) = self.commands.try_recv() {
                if let Err(e) = self.apply_command(command) {
                    log::warn!("Rejected command: {e}");
                    self.emit(EngineEvent::Error {
                        message: e.to_string(),
                    });
                }
            }

            if bucket >= 1.0 {
                self.tick(bucket);
                bucket = 0.0;
            }

            if last_broadcast.elapsed() >= Self::METRICS_BROADCAST_INTERVAL {
                self.broadcast_metrics();
                last_broadcast = Instant::now();
            }

            let remaining = Self::TARGET_FRAME_TIME.saturating_sub(now.elapsed());
            self.sleep_interruptible(remaining).await;
        }

        self.emit(EngineEvent::Shutdown);
        log::info!("Engine loop stopped");
        Ok(())
    }

    fn tick(&mut self, delta_seconds: f64) {
        let (velocity, keys) = self.aggregator.fresh_metrics(Self::IDLE_ZERO_THRESHOLD);
        log::debug!("tick: velocity={velocity:.1} px/s, keys={keys}/min");

        let since_input = self.aggregator.time_since_last_input();
        let state = self.classifier.classify(since_input);

        // Input during a fullscreen app is still active work; immersive only
        // suppresses the popup inside the scheduler
        let is_active = state != ActivityState::Idle;
        let is_immersive = state == ActivityState::Immersive;
        self.scheduler.update(is_active, delta_seconds, is_immersive);
    }

    fn broadcast_metrics(&mut self) {
        let (mouse_velocity, keys_per_min) =
            self.aggregator.fresh_metrics(Self::IDLE_ZERO_THRESHOLD);
        let event = EngineEvent::Metrics {
            mouse_velocity,
            keys_per_min,
            state: self.classifier.current_state(),
            next_break: self.scheduler.next_break(),
        };
        self.emit(event);
        self.status_mirror.set(self.scheduler.status());
    }

    fn apply_command(&mut self, command: EngineCommand) -> Result<(), CommandError> {
        log::debug!("Applying command: {command:?}");
        match command {
            EngineCommand::CompleteBreak => {
                self.scheduler.complete_break(None);
                self.finish_break_log(BreakOutcome::Completed);
                self.publish_status();
            }
            EngineCommand::SnoozeBreak { minutes } => {
                self.scheduler.snooze_break(minutes);
                // Outcome stays open: the snoozed break will re-trigger
                self.mark_break_log(BreakOutcome::Snoozed);
                self.publish_status();
            }
            EngineCommand::SkipBreak => {
                self.scheduler.skip_break();
                self.finish_break_log(BreakOutcome::Skipped);
                self.publish_status();
            }
            EngineCommand::Pause { minutes } => self.scheduler.pause(minutes),
            EngineCommand::Resume => self.scheduler.resume(),
            EngineCommand::StartSession => {
                self.scheduler.start_session();
                self.publish_status();
            }
            EngineCommand::PauseSession => {
                self.scheduler.pause_session();
                self.publish_status();
            }
            EngineCommand::ResumeSession => {
                self.scheduler.resume_session();
                self.publish_status();
            }
            EngineCommand::EndSession => {
                self.scheduler.end_session();
                self.publish_status();
            }
            EngineCommand::ReloadSettings => self.scheduler.reload_settings(),
            EngineCommand::UpdateSetting { key, value } => {
                self.update_setting(&key, &value)?;
            }
            EngineCommand::GetStatus => self.publish_status(),
            EngineCommand::Shutdown => self.shutdown.store(true, Ordering::SeqCst),
        }
        Ok(())
    }

    /// Persist a setting and route the change to whichever component it
    /// configures. Interval and duration edits go through smart
    /// recalculation so accumulated progress survives.
    fn update_setting(&mut self, key: &str, value: &str) -> Result<(), CommandError> {
        if key.is_empty() {
            return Err(CommandError::Invalid(String::from("empty setting key")));
        }

        // Validate payloads that components will consume before persisting;
        // a rejected command must leave the settings store untouched
        let blocklist = if key == "blocklist_processes" {
            Some(
                serde_json::from_str::<Vec<String>>(value)
                    .map_err(|e| CommandError::Invalid(format!("bad blocklist: {e}")))?,
            )
        } else {
            None
        };
        let idle_threshold = if key == "idle_threshold" {
            Some(value.parse::<f64>().map_err(|_| {
                CommandError::Invalid(format!("bad idle_threshold: {value}"))
            })?)
        } else {
            None
        };

        if let Err(e) = self.database.set_setting(key, value) {
            log::warn!("Failed to persist setting {key}: {e}");
        }

        match key {
            "micro_break_interval" | "micro_break_duration" => {
                self.scheduler.reload_and_reset(BreakCategory::Micro);
                self.publish_status();
            }
            "macro_break_interval" | "macro_break_duration" => {
                self.scheduler.reload_and_reset(BreakCategory::Macro);
                self.publish_status();
            }
            "hydration_interval" => {
                self.scheduler.reload_and_reset(BreakCategory::Hydration);
                self.publish_status();
            }
            "timer_mode" => {
                self.scheduler.reload_settings();
                self.publish_status();
            }
            "idle_threshold" => {
                if let Some(seconds) = idle_threshold {
                    self.classifier.set_idle_threshold(seconds);
                }
            }
            "auto_detect_fullscreen" => {
                self.classifier.set_auto_detect_fullscreen(value == "true");
            }
            "blocklist_processes" => {
                if let Some(processes) = blocklist {
                    self.classifier.set_blocklist(processes);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn publish_status(&mut self) {
        let status = self.scheduler.status();
        self.status_mirror.set(status.clone());
        self.emit(EngineEvent::Status(status));
    }

    /// Record the outcome and close the pending log entry.
    fn finish_break_log(&self, outcome: BreakOutcome) {
        let id = self
            .pending_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(id) = id {
            if let Err(e) = self.database.update_break_log(id, outcome) {
                log::warn!("Failed to update break log: {e}");
            }
        }
    }

    /// Record the outcome but keep the entry open (snooze).
    fn mark_break_log(&self, outcome: BreakOutcome) {
        let slot = self.pending_log.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(id) = *slot {
            if let Err(e) = self.database.update_break_log(id, outcome) {
                log::warn!("Failed to update break log: {e}");
            }
        }
    }

    fn emit(&self, event: EngineEvent) {
        if self.events.send(event).is_err() {
            log::debug!("Event receiver dropped");
        }
    }

    /// Sleep `duration` in short chunks so a shutdown request is observed
    /// within [`Self::SHUTDOWN_CHECK_INTERVAL`] regardless of frame budget.
    async fn sleep_interruptible(&self, duration: Duration) {
        let mut remaining = duration;
        while !remaining.is_zero() && !self.shutdown.load(Ordering::SeqCst) {
            let chunk = remaining.min(Self::SHUTDOWN_CHECK_INTERVAL);
            tokio::time::sleep(chunk).await;
            remaining = remaining.saturating_sub(chunk);
        }
    }
}
