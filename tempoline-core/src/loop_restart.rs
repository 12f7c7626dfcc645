//! Loop-restart handling (spec §4.8): reacts to `TransportEvent::Loop` by
//! stopping only the notes that sustain past the loop boundary, purging only
//! the queue entries that belonged to the stale future, and forcing a full
//! rebuild of the content scheduler — all without touching transport
//! position, which the tick sweep itself already wrapped.

use crate::audio_clip_scheduler::ActiveAudioSources;
use crate::automation_scheduler::{AutomationSinks, RealtimeAutomation};
use crate::collaborators::{ArrangementStore, AudioSourceRegistry, AutomationManager, InstrumentRegistry};
use crate::config::SchedulerConfig;
use crate::content_scheduler::{
    schedule_pattern_mode, schedule_song_mode, PlaybackMode, ScheduleMetrics, ScheduleRequest, SchedulePriority, ScheduleScope,
};
use crate::event_queue::EventMetadata;
use crate::events::TransportEvent;
use crate::transport::Transport;
use crate::voices::VoiceBookkeeper;

/// Prevents the reschedule this module triggers from itself re-entering
/// loop-restart handling (spec §4.8 step 1: "scheduler re-entry guard during
/// loop restart").
#[derive(Default)]
pub struct LoopRestartGuard {
    restarting: bool,
}

impl LoopRestartGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_restarting(&self) -> bool {
        self.restarting
    }
}

/// Stop every active note that lies entirely past `loop_end_step` with a
/// short fade, rather than an abrupt cut (spec §4.8 step 3). Notes that
/// merely sustain across the boundary are left alone — their note-off is
/// already queued and still fires on schedule.
fn stop_notes_past_loop_end(
    loop_end_step: f64,
    restart_time: f64,
    now: f64,
    fade_seconds: f64,
    instruments: &dyn InstrumentRegistry,
    voices: &mut VoiceBookkeeper,
    transport: &mut Transport,
) -> usize {
    let past = voices.notes_entirely_past_with_keys(loop_end_step);
    let mut stopped = 0;
    for (instrument_id, pitch, record) in past {
        voices.remove(&instrument_id, pitch);
        let Some(handle) = instruments.get(&instrument_id) else {
            continue;
        };
        let release_at = transport.snap_to_sample((restart_time - fade_seconds).max(now));
        let mut meta = EventMetadata::default();
        meta.instrument_id = Some(instrument_id.clone());
        meta.note_id = Some(record.note_id);
        transport.schedule_event(
            now,
            release_at,
            meta,
            Box::new(move || handle.release_note(pitch, release_at, None)),
        );
        stopped += 1;
    }
    stopped
}

/// Drop every queued event whose step lies at or past the loop boundary,
/// while retaining sustain-release note-offs for notes that already started
/// before it (spec §4.8 step 4).
fn purge_queue_past_loop_end(loop_end_step: f64, transport: &mut Transport) -> usize {
    transport.clear_scheduled_events(Some(&|meta: &EventMetadata| match meta.step {
        Some(step) => step >= loop_end_step,
        None => false,
    }))
}

/// React to a `TransportEvent::Loop` notification: selectively stop and
/// purge, then force a burst-priority full reschedule from the new loop
/// start (spec §4.8). Returns `None` (without doing anything) if a restart
/// is already in progress — the forced reschedule below never re-enters this
/// function itself, but a host driving `tick()` reentrantly from within an
/// event callback could otherwise double up the work.
#[allow(clippy::too_many_arguments)]
pub fn handle_loop_restart(
    guard: &mut LoopRestartGuard,
    mode: PlaybackMode,
    loop_start_step: f64,
    loop_end_step: f64,
    restart_time: f64,
    now: f64,
    overlap_min_fade_seconds: f64,
    cfg: &SchedulerConfig,
    transport: &mut Transport,
    store: &dyn ArrangementStore,
    instruments: &dyn InstrumentRegistry,
    automation: &dyn AutomationManager,
    audio_sources: &dyn AudioSourceRegistry,
    voices: &mut VoiceBookkeeper,
    realtime_automation: &mut RealtimeAutomation,
    active_audio: &mut ActiveAudioSources,
    automation_sinks: &AutomationSinks,
) -> Option<ScheduleMetrics> {
    if guard.is_restarting() {
        return None;
    }
    guard.restarting = true;

    let fade_seconds = cfg.loop_restart_fade_ms / 1000.0;
    stop_notes_past_loop_end(loop_end_step, restart_time, now, fade_seconds, instruments, voices, transport);
    purge_queue_past_loop_end(loop_end_step, transport);

    let request = ScheduleRequest {
        reason: Some("loop_restart".to_string()),
        force: true,
        scope: ScheduleScope::All,
        priority: SchedulePriority::Burst,
        base_audio_time: Some(restart_time),
        ..Default::default()
    };

    let metrics = match mode {
        PlaybackMode::Pattern => schedule_pattern_mode(
            &request,
            now,
            loop_start_step,
            overlap_min_fade_seconds,
            transport,
            store,
            instruments,
            automation,
            voices,
            realtime_automation,
            automation_sinks,
        ),
        PlaybackMode::Song => {
            let seconds_per_step = transport.steps_to_seconds(1.0);
            schedule_song_mode(
                now,
                loop_start_step,
                loop_start_step * seconds_per_step,
                transport.bpm(),
                overlap_min_fade_seconds,
                transport,
                store,
                instruments,
                audio_sources,
                automation_sinks.mixer,
                voices,
                active_audio,
            )
        }
    };

    transport.events.emit(TransportEvent::LoopRestart {
        time: restart_time,
        tick: 0,
        step: 0,
    });

    guard.restarting = false;
    Some(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Note, Pitch};
    use crate::voices::ActiveNoteRecord;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeInstrument {
        releases: Mutex<Vec<(Pitch, f64)>>,
    }

    impl crate::collaborators::InstrumentHandle for FakeInstrument {
        fn trigger_note(&self, _pitch: Pitch, _velocity: f32, _at_time: f64, _duration: f64, _ext: Option<&crate::model::ExtendedParams>) {}
        fn release_note(&self, pitch: Pitch, at_time: f64, _release_velocity: Option<f32>) {
            self.releases.lock().unwrap().push((pitch, at_time));
        }
        fn all_notes_off(&self, _at_time: f64, _fade_time: Option<f64>) {}
        fn stop_all(&self, _fade_time: Option<f64>) {}
        fn apply_automation(&self, _params: &crate::collaborators::ParamsMap, _at_time: f64) {}
        fn has_release_sustain(&self) -> bool {
            true
        }
    }

    struct FakeRegistry {
        handle: Arc<FakeInstrument>,
    }

    impl InstrumentRegistry for FakeRegistry {
        fn get(&self, _instrument_id: &str) -> Option<Arc<dyn crate::collaborators::InstrumentHandle>> {
            Some(self.handle.clone())
        }
    }

    fn record(note_id: u64, start_step: f64, end_step: f64) -> ActiveNoteRecord {
        ActiveNoteRecord {
            note_id,
            start_audio_time: 0.0,
            end_audio_time: 10.0,
            start_step,
            end_step,
            source_note: Note::new(note_id, 60, start_step, end_step - start_step, 1.0),
        }
    }

    fn transport() -> Transport {
        Transport::new(SchedulerConfig::default(), 120.0, 48_000.0).unwrap()
    }

    #[test]
    fn stops_only_notes_entirely_past_loop_end() {
        let mut t = transport();
        t.start(0.0, None);
        let inst = Arc::new(FakeInstrument::default());
        let registry = FakeRegistry { handle: inst.clone() };
        let mut voices = VoiceBookkeeper::new();
        voices.upsert("synth", 60, record(1, 14.0, 22.0)); // sustains across loop_end=16
        voices.upsert("synth", 61, record(2, 18.0, 20.0)); // entirely past loop_end=16

        let stopped = stop_notes_past_loop_end(16.0, 1.0, 0.0, 0.020, &registry, &mut voices, &mut t);
        assert_eq!(stopped, 1);
        assert_eq!(voices.len(), 1);
        assert!(voices.get("synth", 60).is_some());
        assert!(voices.get("synth", 61).is_none());
    }

    #[test]
    fn purge_drops_only_entries_at_or_past_loop_end() {
        let mut t = transport();
        t.start(0.0, None);
        let mut meta_before = EventMetadata::default();
        meta_before.step = Some(4.0);
        let mut meta_after = EventMetadata::default();
        meta_after.step = Some(20.0);
        let mut meta_untagged = EventMetadata::default();
        meta_untagged.step = None;

        t.schedule_event(0.0, 1.0, meta_before, Box::new(|| {}));
        t.schedule_event(0.0, 1.0, meta_after, Box::new(|| {}));
        t.schedule_event(0.0, 1.0, meta_untagged, Box::new(|| {}));

        let removed = purge_queue_past_loop_end(16.0, &mut t);
        assert_eq!(removed, 1);
        assert_eq!(t.queue_len(), 2);
    }

    #[test]
    fn reentrant_restart_is_ignored() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut guard = LoopRestartGuard { restarting: true };
        assert!(guard.is_restarting());
        // A second call while already restarting must be a no-op; we can't
        // drive the full scheduling pass here without a store, so this just
        // documents the guard precondition the top-level scheduler relies on.
        let _ = count.fetch_add(1, Ordering::SeqCst);
        guard.restarting = false;
        assert!(!guard.is_restarting());
    }
}
