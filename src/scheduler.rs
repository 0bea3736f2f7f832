//! Event scheduler - edge-triggered firing of pattern events
//!
//! The core compares the current cycle position against the position each
//! event saw on the previous tick and fires on the crossing edge, exactly
//! once per cycle. Wraparound at the 1.0 -> 0.0 boundary is handled
//! explicitly: a coarse tick can jump from 0.97 to 0.01 and must neither
//! skip events in the tail of the old cycle nor events scheduled right
//! after the new cycle's start.
//!
//! The core is driven by `tick(now_ms)` calls and owns no timer of its
//! own; the bridge supplies the cadence (and tests supply simulated time).

use crate::clock::CycleClock;
use crate::pattern::{PatternEvent, PatternTable};

/// One event crossing produced by a tick.
#[derive(Debug, Clone)]
pub struct FiredEvent {
    pub index: usize,
    pub event: PatternEvent,
    pub cycle_position: f64,
}

/// Edge-crossing state machine over a pattern table.
pub struct SchedulerCore {
    clock: CycleClock,
    table: PatternTable,
    last_seen: Vec<f64>,
    wrap_eps: f64,
}

impl SchedulerCore {
    /// The wrap window is derived from the tick cadence: two tick widths
    /// as a cycle fraction, kept within a sane range. A fixed window
    /// would miss fires at fast tempos and double up at slow ones.
    pub fn new(clock: CycleClock, table: PatternTable, tick_interval_ms: f64) -> Self {
        let wrap_eps = (2.0 * tick_interval_ms / clock.cycle_ms()).clamp(1e-4, 0.25);
        let len = table.len();
        Self {
            clock,
            table,
            last_seen: vec![0.0; len],
            wrap_eps,
        }
    }

    pub fn position(&self, now_ms: f64) -> f64 {
        self.clock.position(now_ms)
    }

    pub fn cycle_ms(&self) -> f64 {
        self.clock.cycle_ms()
    }

    pub fn wrap_epsilon(&self) -> f64 {
        self.wrap_eps
    }

    pub fn table(&self) -> &PatternTable {
        &self.table
    }

    /// Start playback at `now_ms`.
    ///
    /// Resets every event's last-seen position to the current one and
    /// immediately fires events sitting at (or within the wrap window
    /// ahead of) the start position, so a kick on beat zero sounds the
    /// moment play begins. Events ahead only across the cycle boundary
    /// are left for the wrap tick, which fires them exactly once.
    pub fn begin(&mut self, now_ms: f64) -> Vec<FiredEvent> {
        let pos = self.clock.position(now_ms);
        for slot in &mut self.last_seen {
            *slot = pos;
        }

        let mut fired = Vec::new();
        for (i, ev) in self.table.events().iter().enumerate() {
            let ahead = ev.time - pos;
            if (0.0..self.wrap_eps).contains(&ahead) {
                self.last_seen[i] = ev.time;
                fired.push(FiredEvent {
                    index: i,
                    event: ev.clone(),
                    cycle_position: pos,
                });
            }
        }
        fired
    }

    /// Advance to `now_ms`, returning the events whose scheduled time was
    /// crossed since the previous tick.
    pub fn tick(&mut self, now_ms: f64) -> Vec<FiredEvent> {
        let current = self.clock.position(now_ms);

        let mut fired = Vec::new();
        for (i, ev) in self.table.events().iter().enumerate() {
            if crossed(self.last_seen[i], current, ev.time, self.wrap_eps) {
                fired.push(FiredEvent {
                    index: i,
                    event: ev.clone(),
                    cycle_position: current,
                });
            }
        }

        // Every slot moves to the new position only after the whole scan,
        // so all events were compared against the same snapshot.
        for slot in &mut self.last_seen {
            *slot = current;
        }
        // An event fired early (still ahead of the position) keeps its
        // own time as the watermark so it cannot fire twice this cycle.
        for f in &fired {
            let t = self.table.events()[f.index].time;
            if t > current && t < self.wrap_eps {
                self.last_seen[f.index] = t;
            }
        }

        fired
    }
}

/// Did the position pass `time` while moving from `last` to `current`?
///
/// Strictly edge-triggered: an unchanged position never fires. When the
/// tick wrapped the cycle boundary (`current < last`), events in the tail
/// of the old cycle, the covered head of the new one, and events within
/// `eps` of the start all count as crossed.
fn crossed(last: f64, current: f64, time: f64, eps: f64) -> bool {
    if current > last {
        last < time && time <= current
    } else if current < last {
        time > last || time <= current || time < eps
    } else {
        false
    }
}
