//! Transport event emission (spec §6 "Event emission (consumed by UI)").

use crate::time::BbtPosition;

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    TransportStart { at_tick: u64 },
    TransportStop,
    TransportPause { at_tick: u64 },
    BarChange { bar: u64 },
    BpmChange { bpm: f64 },
    /// Internal scheduling opportunity, consumed by the content scheduler's
    /// real-time automation pass (spec §4.1 "scheduler event").
    SchedulerTick { time: f64, tick: u64 },
    /// Emitted just before wrapping back to the loop start (spec §4.1).
    Loop {
        from_tick: u64,
        to_tick: u64,
        next_loop_start_time: f64,
    },
    LoopRestart {
        time: f64,
        tick: u64,
        step: u64,
    },
    PositionUpdate { position: BbtPosition },
}
