use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Trailing window for the smoothed trend metrics, in seconds
const METRICS_WINDOW_SECS: f64 = 60.0;

/// Pointer moves at or below this distance are jitter and do not count
const JITTER_DISTANCE: f64 = 5.0;

/// Upper bound on buffered samples per channel
///
/// Events past the cap evict the oldest sample, so memory stays fixed even
/// under pathological input rates.
const BUFFER_CAPACITY: usize = 8192;

#[derive(Debug, Clone, Copy)]
struct MoveSample {
    at: f64,
    distance: f64,
}

/// Buffered event state, all touched under one lock
///
/// Timestamps are seconds since the aggregator was created.
struct Buffers {
    moves: VecDeque<MoveSample>,
    keys: VecDeque<f64>,
    last_input: f64,
}

impl Buffers {
    fn push_move(&mut self, sample: MoveSample) {
        if self.moves.len() == BUFFER_CAPACITY {
            self.moves.pop_front();
        }
        self.moves.push_back(sample);
    }

    fn push_key(&mut self, at: f64) {
        if self.keys.len() == BUFFER_CAPACITY {
            self.keys.pop_front();
        }
        self.keys.push_back(at);
    }

    fn purge_before(&mut self, cutoff: f64) {
        while self.moves.front().is_some_and(|s| s.at < cutoff) {
            self.moves.pop_front();
        }
        while self.keys.front().is_some_and(|&t| t < cutoff) {
            self.keys.pop_front();
        }
    }

    /// Velocity over the samples at or after `cutoff`: total distance / span.
    /// Needs at least two samples to have a span at all.
    fn velocity_since(&self, cutoff: f64) -> f64 {
        let mut total = 0.0;
        let mut first: Option<f64> = None;
        let mut last = 0.0;
        let mut count = 0usize;

        for s in self.moves.iter().filter(|s| s.at >= cutoff) {
            total += s.distance;
            first.get_or_insert(s.at);
            last = s.at;
            count += 1;
        }

        match first {
            Some(start) if count >= 2 && last > start => total / (last - start),
            _ => 0.0,
        }
    }

    fn keys_since(&self, cutoff: f64) -> usize {
        self.keys.iter().filter(|&&t| t >= cutoff).count()
    }
}

/// Aggregates raw pointer/keyboard events into an activity signal.
///
/// Producers (the input listener thread) and the engine task share this
/// through an `Arc`; every append and read takes the same mutex.
///
/// Two kinds of read exist and must not be mixed up:
/// - [`fresh_metrics`](Self::fresh_metrics) applies force-zero and is the
///   only read the engine may gate decisions on;
/// - [`mouse_velocity`](Self::mouse_velocity) /
///   [`keys_per_minute`](Self::keys_per_minute) are smoothed 60-second
///   averages for trend display only.
pub struct ActivityAggregator {
    start: Instant,
    buffers: Mutex<Buffers>,
}

impl ActivityAggregator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            buffers: Mutex::new(Buffers {
                moves: VecDeque::with_capacity(BUFFER_CAPACITY),
                keys: VecDeque::with_capacity(BUFFER_CAPACITY),
                last_input: 0.0,
            }),
        }
    }

    fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    fn lock(&self) -> MutexGuard<'_, Buffers> {
        self.buffers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a pointer movement by its delta.
    ///
    /// Movements at or below the jitter threshold are dropped entirely: they
    /// neither enter the window nor refresh the last-input time, so micro
    /// tremor cannot keep the activity timer alive.
    pub fn record_pointer_move(&self, dx: f64, dy: f64) {
        self.record_pointer_move_at(dx, dy, self.now());
    }

    /// Record a keystroke. Only the timestamp is kept, never the key.
    pub fn record_key(&self) {
        self.record_key_at(self.now());
    }

    /// Record a mouse button press.
    pub fn record_click(&self) {
        self.touch_at(self.now());
    }

    /// Record a scroll event.
    pub fn record_scroll(&self) {
        self.touch_at(self.now());
    }

    /// Seconds since the last qualifying input event.
    #[must_use]
    pub fn time_since_last_input(&self) -> f64 {
        let now = self.now();
        let buffers = self.lock();
        (now - buffers.last_input).max(0.0)
    }

    /// Authoritative metrics read with force-zero applied.
    ///
    /// If the user has been idle longer than `idle_threshold`, stale samples
    /// are purged and the result is exactly `(0.0, 0)` no matter what the
    /// buffers held. Otherwise velocity and key rate come from the samples
    /// inside the threshold window only.
    #[must_use]
    pub fn fresh_metrics(&self, idle_threshold: f64) -> (f64, u32) {
        self.fresh_metrics_at(idle_threshold, self.now())
    }

    /// Smoothed mouse velocity over the full 60-second window.
    ///
    /// Trend display only; never use this to gate break eligibility.
    #[must_use]
    pub fn mouse_velocity(&self) -> f64 {
        let now = self.now();
        let mut buffers = self.lock();
        buffers.purge_before(now - METRICS_WINDOW_SECS);
        buffers.velocity_since(now - METRICS_WINDOW_SECS)
    }

    /// Smoothed keystrokes per minute over the full 60-second window.
    ///
    /// Trend display only; never use this to gate break eligibility.
    #[must_use]
    pub fn keys_per_minute(&self) -> u32 {
        let now = self.now();
        let mut buffers = self.lock();
        buffers.purge_before(now - METRICS_WINDOW_SECS);
        u32::try_from(buffers.keys_since(now - METRICS_WINDOW_SECS)).unwrap_or(u32::MAX)
    }

    fn record_pointer_move_at(&self, dx: f64, dy: f64, now: f64) {
        let distance = dx.hypot(dy);
        if distance <= JITTER_DISTANCE {
            return;
        }

        let mut buffers = self.lock();
        buffers.push_move(MoveSample { at: now, distance });
        buffers.last_input = now;
    }

    fn record_key_at(&self, now: f64) {
        let mut buffers = self.lock();
        buffers.push_key(now);
        buffers.last_input = now;
    }

    fn touch_at(&self, now: f64) {
        let mut buffers = self.lock();
        buffers.last_input = now;
    }

    fn fresh_metrics_at(&self, idle_threshold: f64, now: f64) -> (f64, u32) {
        let mut buffers = self.lock();
        let cutoff = now - idle_threshold;

        if now - buffers.last_input > idle_threshold {
            // Force zero: clear stale samples so no later read can decay
            // a windowed average out of them.
            buffers.purge_before(cutoff);
            return (0.0, 0);
        }

        let velocity = buffers.velocity_since(cutoff);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let keys = (buffers.keys_since(cutoff) as f64 * (60.0 / idle_threshold)).round() as u32;
        (velocity, keys)
    }
}

impl Default for ActivityAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_force_zero_after_idle() {
        let agg = ActivityAggregator::new();

        // Burst of very fast movement around t=10s
        for i in 0..20 {
            agg.record_pointer_move_at(1900.0, 0.0, 10.0 + f64::from(i) * 0.05);
        }
        agg.record_key_at(10.9);

        // Still fresh at t=11.5 (last input 0.6s ago)
        let (velocity, keys) = agg.fresh_metrics_at(1.0, 11.5);
        assert!(velocity > 0.0);
        assert!(keys > 0);

        // 1.5s of silence: exactly zero, regardless of buffered magnitude
        let (velocity, keys) = agg.fresh_metrics_at(1.0, 12.4);
        assert_eq!((velocity, keys), (0.0, 0));
    }

    #[test]
    fn test_force_zero_at_boundary() {
        let agg = ActivityAggregator::new();
        agg.record_pointer_move_at(38000.0, 0.0, 5.0);
        agg.record_pointer_move_at(38000.0, 0.0, 5.1);

        // 1.1s since last input with a 1.0s threshold still zeroes
        let (velocity, keys) = agg.fresh_metrics_at(1.0, 6.2);
        assert_eq!((velocity, keys), (0.0, 0));
    }

    #[test]
    fn test_force_zero_purges_stale_samples() {
        let agg = ActivityAggregator::new();
        agg.record_pointer_move_at(500.0, 0.0, 1.0);
        agg.record_pointer_move_at(500.0, 0.0, 1.2);
        assert_eq!(agg.fresh_metrics_at(1.0, 3.0), (0.0, 0));

        // A later in-window read must not resurrect the old burst
        agg.record_pointer_move_at(10.0, 0.0, 3.1);
        agg.record_pointer_move_at(10.0, 0.0, 3.3);
        let (velocity, _) = agg.fresh_metrics_at(1.0, 3.4);
        assert!(velocity < 200.0, "stale samples leaked into velocity");
    }

    #[test]
    fn test_jitter_does_not_refresh_last_input() {
        let agg = ActivityAggregator::new();
        agg.record_pointer_move_at(100.0, 0.0, 1.0);

        // Sub-threshold tremor long after the real movement
        agg.record_pointer_move_at(1.0, 1.0, 5.0);
        agg.record_pointer_move_at(0.5, -0.5, 5.5);

        let buffers = agg.lock();
        assert!((buffers.last_input - 1.0).abs() < f64::EPSILON);
        assert_eq!(buffers.moves.len(), 1);
    }

    #[test]
    fn test_clicks_and_scrolls_always_count() {
        let agg = ActivityAggregator::new();
        agg.touch_at(4.0);
        let buffers = agg.lock();
        assert!((buffers.last_input - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_key_rate_extrapolates_to_per_minute() {
        let agg = ActivityAggregator::new();
        // 3 keys inside a 1-second window => 180/min
        agg.record_key_at(10.1);
        agg.record_key_at(10.4);
        agg.record_key_at(10.8);
        let (_, keys) = agg.fresh_metrics_at(1.0, 10.9);
        assert_eq!(keys, 180);
    }

    #[test]
    fn test_velocity_needs_two_samples() {
        let agg = ActivityAggregator::new();
        agg.record_pointer_move_at(50.0, 0.0, 2.0);
        let (velocity, _) = agg.fresh_metrics_at(1.0, 2.5);
        assert!((velocity - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_buffer_capacity_bounded() {
        let agg = ActivityAggregator::new();
        for i in 0..(BUFFER_CAPACITY + 100) {
            agg.record_key_at(i as f64 * 0.001);
        }
        assert_eq!(agg.lock().keys.len(), BUFFER_CAPACITY);
    }
}
