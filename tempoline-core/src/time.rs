//! Pure tick/step/BBT/seconds conversions (spec §3, §4.3).
//!
//! Nothing here owns state; every function is a total, side-effect-free
//! mapping so the transport and position tracker can memoize on tick
//! equality without worrying about these functions drifting.

use crate::config::SchedulerConfig;

/// Bar:Beat:Sixteenth musical position, 1-based bar/beat/sixteenth per spec §3.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BbtPosition {
    pub bar: u64,
    pub beat: u32,
    pub sixteenth: u32,
    pub sub_sixteenth: f64,
}

impl BbtPosition {
    /// `"B:b:s"` format used for diagnostics.
    pub fn bbt_string(&self) -> String {
        format!("{}:{}:{}", self.bar, self.beat, self.sixteenth)
    }

    /// Bar left-padded to width 3 for the UI status line.
    pub fn display_string(&self) -> String {
        format!("{:0>3}:{}:{}", self.bar, self.beat, self.sixteenth)
    }
}

const STEPS_PER_BAR: u32 = 16;
const STEPS_PER_BEAT: u32 = 4;

/// Convert an absolute tick count to a BBT position.
pub fn tick_to_bbt(tick: u64, cfg: &SchedulerConfig) -> BbtPosition {
    let ticks_per_step = cfg.ticks_per_step as u64;
    let ticks_per_beat = ticks_per_step * STEPS_PER_BEAT as u64;
    let ticks_per_bar = ticks_per_step * STEPS_PER_BAR as u64;

    let bar = tick / ticks_per_bar;
    let rem_in_bar = tick % ticks_per_bar;
    let beat = rem_in_bar / ticks_per_beat;
    let rem_in_beat = rem_in_bar % ticks_per_beat;
    let sixteenth = rem_in_beat / ticks_per_step;
    let rem_in_sixteenth = rem_in_beat % ticks_per_step;

    BbtPosition {
        bar: bar + 1,
        beat: beat as u32 + 1,
        sixteenth: sixteenth as u32 + 1,
        sub_sixteenth: rem_in_sixteenth as f64 / ticks_per_step as f64,
    }
}

/// Invert [`tick_to_bbt`]. Round-trips exactly for every tick produced by it
/// (spec §3, P7).
pub fn bbt_to_tick(bbt: &BbtPosition, cfg: &SchedulerConfig) -> u64 {
    let ticks_per_step = cfg.ticks_per_step as u64;
    let ticks_per_beat = ticks_per_step * STEPS_PER_BEAT as u64;
    let ticks_per_bar = ticks_per_step * STEPS_PER_BAR as u64;

    let bar_ticks = (bbt.bar - 1) * ticks_per_bar;
    let beat_ticks = (bbt.beat as u64 - 1) * ticks_per_beat;
    let sixteenth_ticks = (bbt.sixteenth as u64 - 1) * ticks_per_step;
    let sub_ticks = (bbt.sub_sixteenth * ticks_per_step as f64).round() as u64;

    bar_ticks + beat_ticks + sixteenth_ticks + sub_ticks
}

#[inline]
pub fn ticks_to_steps(ticks: u64, cfg: &SchedulerConfig) -> u64 {
    ticks / cfg.ticks_per_step as u64
}

#[inline]
pub fn ticks_to_steps_f64(ticks: u64, cfg: &SchedulerConfig) -> f64 {
    ticks as f64 / cfg.ticks_per_step as f64
}

#[inline]
pub fn steps_to_ticks(steps: u64, cfg: &SchedulerConfig) -> u64 {
    steps * cfg.ticks_per_step as u64
}

/// `steps_to_seconds(n) = n * 60 / (bpm * 4)` (spec P8): one step is a 16th
/// note, one quarter note is `60 / bpm` seconds, and there are 4 steps per
/// quarter note.
#[inline]
pub fn steps_to_seconds(steps: f64, bpm: f64) -> f64 {
    steps * 60.0 / (bpm * 4.0)
}

/// Inverse of [`steps_to_seconds`].
#[inline]
pub fn seconds_to_steps(seconds: f64, bpm: f64) -> f64 {
    seconds * bpm * 4.0 / 60.0
}

#[inline]
pub fn seconds_per_tick(bpm: f64, ppq: u32) -> f64 {
    60.0 / (bpm * ppq as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> SchedulerConfig {
        SchedulerConfig::default()
    }

    #[test]
    fn bbt_round_trip_identity() {
        let cfg = cfg();
        for tick in (0..10_000u64).step_by(7) {
            let bbt = tick_to_bbt(tick, &cfg);
            assert_eq!(bbt_to_tick(&bbt, &cfg), tick, "round trip failed for {tick}");
        }
    }

    #[test]
    fn tick_zero_is_bar_one_beat_one_sixteenth_one() {
        let bbt = tick_to_bbt(0, &cfg());
        assert_eq!(bbt.bar, 1);
        assert_eq!(bbt.beat, 1);
        assert_eq!(bbt.sixteenth, 1);
        assert_eq!(bbt.sub_sixteenth, 0.0);
    }

    #[test]
    fn one_bar_advances_bar_number() {
        let cfg = cfg();
        let bbt = tick_to_bbt(cfg.ticks_per_bar() as u64, &cfg);
        assert_eq!(bbt.bar, 2);
        assert_eq!(bbt.beat, 1);
        assert_eq!(bbt.sixteenth, 1);
    }

    #[test]
    fn steps_to_seconds_matches_spec_formula() {
        let bpm = 120.0;
        assert_eq!(steps_to_seconds(1.0, bpm), 0.125);
        assert_eq!(steps_to_seconds(16.0, bpm), 2.0);
    }

    #[test]
    fn steps_seconds_round_trip() {
        let bpm = 133.0;
        for n in [0.0, 1.0, 4.0, 16.5, 100.0] {
            let s = steps_to_seconds(n, bpm);
            let back = seconds_to_steps(s, bpm);
            assert!((back - n).abs() < 1e-9);
        }
    }

    #[test]
    fn display_string_pads_bar_to_width_3() {
        let bbt = BbtPosition { bar: 7, beat: 2, sixteenth: 3, sub_sixteenth: 0.0 };
        assert_eq!(bbt.display_string(), "007:2:3");
        assert_eq!(bbt.bbt_string(), "7:2:3");
    }
}
