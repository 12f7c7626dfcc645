//! Position tracker (spec §4.3): a pure function of `current_tick`, memoized
//! on tick equality so UI polling doesn't recompute BBT on every frame.

use crate::config::SchedulerConfig;
use crate::time::{tick_to_bbt, ticks_to_steps_f64, BbtPosition};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub tick: u64,
    pub step: u64,
    pub step_float: f64,
    pub bar: u64,
    pub beat: u32,
    pub sixteenth: u32,
    pub sub_sixteenth: f64,
}

impl Position {
    pub fn bbt_string(&self) -> String {
        format!("{}:{}:{}", self.bar, self.beat, self.sixteenth)
    }

    pub fn display_string(&self) -> String {
        format!("{:0>3}:{}:{}", self.bar, self.beat, self.sixteenth)
    }

    fn from_tick(tick: u64, cfg: &SchedulerConfig) -> Self {
        let BbtPosition {
            bar,
            beat,
            sixteenth,
            sub_sixteenth,
        } = tick_to_bbt(tick, cfg);
        let step_float = ticks_to_steps_f64(tick, cfg);
        Self {
            tick,
            step: step_float as u64,
            step_float,
            bar,
            beat,
            sixteenth,
            sub_sixteenth,
        }
    }
}

/// Caches the last tick→BBT conversion; recomputes only when the tick
/// actually advances.
#[derive(Debug, Default)]
pub struct PositionTracker {
    cached: Option<Position>,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self { cached: None }
    }

    pub fn update(&mut self, tick: u64, cfg: &SchedulerConfig) -> Position {
        if let Some(p) = self.cached {
            if p.tick == tick {
                return p;
            }
        }
        let pos = Position::from_tick(tick, cfg);
        self.cached = Some(pos);
        pos
    }

    pub fn current(&self) -> Option<Position> {
        self.cached
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memoizes_on_repeated_tick() {
        let cfg = SchedulerConfig::default();
        let mut tracker = PositionTracker::new();
        let a = tracker.update(100, &cfg);
        let b = tracker.update(100, &cfg);
        assert_eq!(a, b);
    }

    #[test]
    fn advances_on_new_tick() {
        let cfg = SchedulerConfig::default();
        let mut tracker = PositionTracker::new();
        tracker.update(0, &cfg);
        let p = tracker.update(cfg.ticks_per_step as u64, &cfg);
        assert_eq!(p.step, 1);
        assert_eq!(p.sixteenth, 2);
    }

    #[test]
    fn display_string_pads_bar() {
        let cfg = SchedulerConfig::default();
        let mut tracker = PositionTracker::new();
        let p = tracker.update(0, &cfg);
        assert_eq!(p.display_string(), "001:1:1");
    }
}
