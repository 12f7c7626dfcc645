//! Tick-driven transport clock (spec §4.1): advances musical time on a
//! real-time look-ahead sweep, owns the event queue and position tracker,
//! and publishes transport/scheduler events to subscribers.
//!
//! The clock itself never sleeps or spawns a thread — unlike the teacher's
//! `MasterClock`, which runs its own timing thread, this transport is driven
//! synchronously by whatever real-time callback the host provides (spec §5:
//! "a real-time audio-driver callback thread … runs the transport look-ahead
//! sweep"). The subscriber-broadcast shape is still grounded on
//! `src/audio/clock.rs`'s `Vec<Sender<T>>` pattern, just invoked inline
//! instead of from a background loop.

use log::warn;

use crate::bus::Bus;
use crate::config::SchedulerConfig;
use crate::error::{Result, ScheduleError};
use crate::event_queue::{EventCallback, EventMetadata, EventQueue};
use crate::events::TransportEvent;
use crate::position::{Position, PositionTracker};
use crate::time::{self, seconds_per_tick};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Stopped,
    Playing,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopInfo {
    pub enabled: bool,
    pub start_step: u64,
    pub end_step: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportStatus {
    pub state: TransportState,
    pub bpm: f64,
    pub current_tick: u64,
    pub loop_info: LoopInfo,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("bpm", &self.bpm)
            .field("state", &self.state)
            .field("current_tick", &self.current_tick)
            .finish_non_exhaustive()
    }
}

pub struct Transport {
    cfg: SchedulerConfig,
    bpm: f64,
    seconds_per_tick: f64,
    sample_rate: f64,

    state: TransportState,
    current_tick: u64,
    next_tick_time: f64,

    loop_start_tick: u64,
    loop_end_tick: u64,
    loop_enabled: bool,

    queue: EventQueue,
    position: PositionTracker,
    pub events: Bus<TransportEvent>,
}

impl Transport {
    pub fn new(cfg: SchedulerConfig, bpm: f64, sample_rate: f64) -> Result<Self> {
        if bpm <= 0.0 {
            return Err(ScheduleError::InvalidBpm(bpm));
        }
        if cfg.ppq == 0 {
            return Err(ScheduleError::InvalidPpq(cfg.ppq));
        }
        let loop_end_tick = cfg.ticks_per_bar() as u64 * 4;
        Ok(Self {
            seconds_per_tick: seconds_per_tick(bpm, cfg.ppq),
            sample_rate,
            cfg,
            bpm,
            state: TransportState::Stopped,
            current_tick: 0,
            next_tick_time: 0.0,
            loop_start_tick: 0,
            loop_end_tick,
            loop_enabled: false,
            queue: EventQueue::new(),
            position: PositionTracker::new(),
            events: Bus::new(),
        })
    }

    fn min_safe_offset_seconds(&self) -> f64 {
        self.cfg.min_safe_offset_samples as f64 / self.sample_rate
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.cfg
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn current_tick(&self) -> u64 {
        self.current_tick
    }

    pub fn next_tick_time(&self) -> f64 {
        self.next_tick_time
    }

    pub fn seconds_per_tick(&self) -> f64 {
        self.seconds_per_tick
    }

    pub fn loop_enabled(&self) -> bool {
        self.loop_enabled
    }

    pub fn loop_bounds_ticks(&self) -> (u64, u64) {
        (self.loop_start_tick, self.loop_end_tick)
    }

    pub fn loop_info(&self) -> LoopInfo {
        LoopInfo {
            enabled: self.loop_enabled,
            start_step: time::ticks_to_steps(self.loop_start_tick, &self.cfg),
            end_step: time::ticks_to_steps(self.loop_end_tick, &self.cfg),
        }
    }

    pub fn status(&self) -> TransportStatus {
        TransportStatus {
            state: self.state,
            bpm: self.bpm,
            current_tick: self.current_tick,
            loop_info: self.loop_info(),
        }
    }

    /// `transport_start_time`: the audio time at which `current_tick == 0`
    /// would have fired, used by the note scheduler to place mid-playback
    /// insertions relative to the live tick (spec §4.5 "Immediate
    /// mid-playback insertion").
    pub fn transport_start_time(&self) -> f64 {
        self.next_tick_time - self.current_tick as f64 * self.seconds_per_tick
    }

    /// `stopped|paused → playing`. `at_time`, if given, overrides the
    /// earliest-safe start time computed from `audio_now`.
    pub fn start(&mut self, audio_now: f64, at_time: Option<f64>) {
        if self.state == TransportState::Stopped {
            self.current_tick = 0;
        }
        let earliest = audio_now + self.min_safe_offset_seconds();
        self.next_tick_time = match at_time {
            Some(t) => earliest.max(t),
            None => earliest,
        };
        self.state = TransportState::Playing;
        self.events.emit(TransportEvent::TransportStart {
            at_tick: self.current_tick,
        });
    }

    pub fn pause(&mut self) {
        if self.state != TransportState::Playing {
            return;
        }
        self.state = TransportState::Paused;
        self.events.emit(TransportEvent::TransportPause {
            at_tick: self.current_tick,
        });
    }

    pub fn stop(&mut self) {
        self.state = TransportState::Stopped;
        self.current_tick = 0;
        self.queue.clear();
        self.events.emit(TransportEvent::TransportStop);
    }

    /// Scheduled events retain their absolute audio times; nothing in the
    /// queue is reshifted (spec §4.1 `set_bpm`).
    pub fn set_bpm(&mut self, bpm: f64) -> Result<()> {
        if bpm <= 0.0 {
            return Err(ScheduleError::InvalidBpm(bpm));
        }
        self.bpm = bpm;
        self.seconds_per_tick = seconds_per_tick(bpm, self.cfg.ppq);
        self.events.emit(TransportEvent::BpmChange { bpm });
        Ok(())
    }

    pub fn set_loop_points(&mut self, start_step: u64, end_step: u64) -> Result<()> {
        let start_tick = time::steps_to_ticks(start_step, &self.cfg);
        let end_tick = time::steps_to_ticks(end_step, &self.cfg);
        if start_tick >= end_tick {
            return Err(ScheduleError::InvalidLoopPoints {
                start: start_tick,
                end: end_tick,
            });
        }
        self.loop_start_tick = start_tick;
        self.loop_end_tick = end_tick;
        Ok(())
    }

    pub fn set_loop_enabled(&mut self, enabled: bool) {
        self.loop_enabled = enabled;
    }

    /// Only valid while not advancing (spec §4.1 `set_position`); a call
    /// while playing is logged and ignored rather than treated as fatal.
    pub fn set_position(&mut self, step: u64) {
        if self.state == TransportState::Playing {
            warn!("set_position ignored while transport is playing");
            return;
        }
        self.current_tick = time::steps_to_ticks(step, &self.cfg);
    }

    pub fn position(&mut self) -> Position {
        self.position.update(self.current_tick, &self.cfg)
    }

    /// Returns an opaque sequence id; individual cancellation by id is not
    /// supported (spec §4.1 "handles are not required to be cancellable
    /// individually") — use [`Transport::clear_scheduled_events`].
    ///
    /// `now` is the caller's current audio-clock reading, used only to clamp
    /// enqueue-in-the-past requests forward (spec §4.1 "Failure", §7
    /// "Enqueue-in-past").
    pub fn schedule_event(
        &mut self,
        now: f64,
        audio_time: f64,
        metadata: EventMetadata,
        callback: EventCallback,
    ) -> u64 {
        let safe_floor = now + self.min_safe_offset_seconds();
        let clamped = if audio_time <= safe_floor {
            safe_floor
        } else {
            audio_time
        };
        self.queue.push(clamped, metadata, callback)
    }

    pub fn clear_scheduled_events(&mut self, filter: Option<&dyn Fn(&EventMetadata) -> bool>) -> usize {
        match filter {
            Some(f) => self.queue.cancel_matching(f),
            None => {
                let n = self.queue.len();
                self.queue.clear();
                n
            }
        }
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn queue_contains_note_id(&self, note_id: u64) -> bool {
        self.queue.contains_note_id(note_id)
    }

    pub fn snap_to_sample(&self, audio_time: f64) -> f64 {
        EventQueue::snap_to_sample(audio_time, self.sample_rate)
    }

    pub fn steps_to_seconds(&self, steps: f64) -> f64 {
        time::steps_to_seconds(steps, self.bpm)
    }

    pub fn seconds_to_steps(&self, seconds: f64) -> f64 {
        time::seconds_to_steps(seconds, self.bpm)
    }

    pub fn ticks_to_steps(&self, ticks: u64) -> u64 {
        time::ticks_to_steps(ticks, &self.cfg)
    }

    pub fn steps_to_ticks(&self, steps: u64) -> u64 {
        time::steps_to_ticks(steps, &self.cfg)
    }

    /// Advance as many ticks as fall within the look-ahead window of
    /// `audio_now` (spec §4.1 "Look-ahead algorithm"), dispatching due queue
    /// entries at each one. Returns the number of ticks advanced.
    pub fn tick(&mut self, audio_now: f64) -> u64 {
        if self.state != TransportState::Playing {
            return 0;
        }
        let horizon = audio_now + self.cfg.lookahead_seconds;
        let mut advanced = 0;
        while self.next_tick_time <= horizon {
            let prev_bar = time::tick_to_bbt(self.current_tick, &self.cfg).bar;

            self.events.emit(TransportEvent::SchedulerTick {
                time: self.next_tick_time,
                tick: self.current_tick,
            });
            self.queue.drain_due(self.next_tick_time);

            let pos = self.position.update(self.current_tick, &self.cfg);
            self.events.emit(TransportEvent::PositionUpdate {
                position: crate::time::BbtPosition {
                    bar: pos.bar,
                    beat: pos.beat,
                    sixteenth: pos.sixteenth,
                    sub_sixteenth: pos.sub_sixteenth,
                },
            });
            if pos.bar != prev_bar {
                self.events.emit(TransportEvent::BarChange { bar: pos.bar });
            }

            if self.loop_enabled && self.current_tick + 1 >= self.loop_end_tick {
                self.events.emit(TransportEvent::Loop {
                    from_tick: self.current_tick,
                    to_tick: 0,
                    next_loop_start_time: self.next_tick_time,
                });
                self.current_tick = 0;
                // Intentionally not reset to `audio_now`: the historical bug
                // (spec §4.1) this avoids shortened the second loop by one
                // lookahead window.
                self.next_tick_time += self.seconds_per_tick;
            } else {
                self.current_tick += 1;
                self.next_tick_time += self.seconds_per_tick;
            }
            advanced += 1;
        }
        advanced
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> Transport {
        Transport::new(SchedulerConfig::default(), 120.0, 48_000.0).unwrap()
    }

    #[test]
    fn rejects_non_positive_bpm() {
        assert_eq!(
            Transport::new(SchedulerConfig::default(), 0.0, 48_000.0).unwrap_err(),
            ScheduleError::InvalidBpm(0.0)
        );
    }

    #[test]
    fn start_clamps_to_min_safe_offset() {
        let mut t = transport();
        t.start(10.0, None);
        let expected = 10.0 + 64.0 / 48_000.0;
        assert!((t.next_tick_time() - expected).abs() < 1e-9);
    }

    #[test]
    fn pause_then_start_preserves_tick() {
        let mut t = transport();
        t.start(0.0, None);
        t.tick(100.0); // run far enough to advance many ticks
        let tick_before = t.current_tick();
        t.pause();
        t.start(200.0, None);
        assert_eq!(t.current_tick(), tick_before);
    }

    #[test]
    fn stop_clears_queue_and_resets_tick() {
        let mut t = transport();
        t.start(0.0, None);
        t.schedule_event(0.0, 5.0, EventMetadata::default(), Box::new(|| {}));
        t.stop();
        assert_eq!(t.current_tick(), 0);
        assert_eq!(t.queue_len(), 0);
        assert_eq!(t.state(), TransportState::Stopped);
    }

    #[test]
    fn set_loop_points_rejects_inverted_range() {
        let mut t = transport();
        assert!(t.set_loop_points(16, 0).is_err());
    }

    #[test]
    fn tick_advances_and_dispatches_due_events() {
        let mut t = transport();
        t.start(0.0, None);
        let fired = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let f2 = fired.clone();
        let at = t.next_tick_time();
        t.schedule_event(
            0.0,
            at,
            EventMetadata::default(),
            Box::new(move || f2.store(true, std::sync::atomic::Ordering::SeqCst)),
        );
        t.tick(at + 1.0);
        assert!(fired.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn loop_wraps_tick_without_resetting_next_tick_time() {
        let mut t = transport();
        t.set_loop_points(0, 1).unwrap(); // 1 step = ticks_per_step ticks
        t.set_loop_enabled(true);
        t.start(0.0, None);
        let before_wrap = t.next_tick_time();
        // Drive ticks until just past the loop boundary.
        t.tick(before_wrap + t.seconds_per_tick() * (t.config().ticks_per_step as f64 + 1.0));
        assert_eq!(t.current_tick(), 0);
        // next_tick_time kept advancing by seconds_per_tick each iteration,
        // never snapped back to the call's audio_now.
        assert!(t.next_tick_time() > before_wrap);
    }

    #[test]
    fn set_position_ignored_while_playing() {
        let mut t = transport();
        t.start(0.0, None);
        t.set_position(5);
        assert_eq!(t.current_tick(), 0);
    }
}
