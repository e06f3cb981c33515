use std::sync::Arc;
use std::thread;

use lull_core::ActivityAggregator;
use rdev::{listen, Event, EventType};

/// Spawn the global input listener on its own OS thread.
///
/// `rdev::listen` blocks for the lifetime of the process, so it cannot live
/// on the tokio runtime. The callback only ever enqueues into the aggregator.
pub fn spawn(aggregator: Arc<ActivityAggregator>) {
    thread::spawn(move || {
        // rdev reports absolute pointer coordinates; the aggregator wants
        // per-event deltas, so remember the previous position.
        let mut last_position: Option<(f64, f64)> = None;

        let callback = move |event: Event| match event.event_type {
            EventType::MouseMove { x, y } => {
                if let Some((px, py)) = last_position {
                    aggregator.record_pointer_move(x - px, y - py);
                }
                last_position = Some((x, y));
            }
            EventType::KeyPress(_) => aggregator.record_key(),
            EventType::ButtonPress(_) => aggregator.record_click(),
            EventType::Wheel { .. } => aggregator.record_scroll(),
            _ => {}
        };

        // ListenError does not implement std::error::Error
        if let Err(e) = listen(callback) {
            log::error!("Input listener failed: {e:?}");
        }
    });
}
