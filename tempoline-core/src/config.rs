//! Configuration constants for the scheduling core (spec §6).
//!
//! Passed by value into constructors rather than read from a global — there
//! is exactly one `SchedulerConfig` per session and nothing in this crate
//! reaches for ambient state to find it.

/// Debounce delays, in milliseconds, keyed by scheduling request priority.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DebounceConfig {
    pub idle_ms: u64,
    pub realtime_ms: u64,
    pub burst_ms: u64,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            idle_ms: 16,
            realtime_ms: 4,
            burst_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerConfig {
    /// Pulses per quarter note.
    pub ppq: u32,
    /// Ticks per 16th-note step.
    pub ticks_per_step: u32,
    /// Scheduler look-ahead window, in seconds.
    pub lookahead_seconds: f64,
    /// Minimum safe offset (in samples) for enqueue-in-the-past clamping.
    pub min_safe_offset_samples: u32,
    pub debounce: DebounceConfig,
    /// Graceful-stop fade for notes entirely past a loop boundary.
    pub loop_restart_fade_ms: f64,
    /// Graceful-stop fade applied to active audio sources on pause.
    pub pause_fade_ms: f64,
    /// Minimum early-release fade applied on same-pitch overlap.
    pub overlap_min_fade_ms: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            ppq: 96,
            ticks_per_step: 24,
            lookahead_seconds: 0.12,
            min_safe_offset_samples: 64,
            debounce: DebounceConfig::default(),
            loop_restart_fade_ms: 20.0,
            pause_fade_ms: 10.0,
            overlap_min_fade_ms: 2.0,
        }
    }
}

impl SchedulerConfig {
    pub fn ticks_per_bar(&self) -> u32 {
        self.ticks_per_step * 16
    }

    pub fn steps_per_bar(&self) -> u32 {
        16
    }
}

/// Default values for a continuous CC lane once playback passes its last
/// point (spec §4.7).
pub fn cc_default(cc_number: u8) -> f32 {
    match cc_number {
        7 => 127.0,
        10 => 64.0,
        11 => 127.0,
        74 => 64.0,
        71 => 0.0,
        1 => 0.0,
        _ => 0.0,
    }
}
