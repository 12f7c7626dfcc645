//! Dirty-state mediator (spec §4.9): the sole consumer of [`EditEvent`]
//! against the live scheduling state. Only edits to the currently active
//! pattern affect anything here — edits to any other pattern are inert until
//! that pattern is activated, at which point the normal full reschedule on
//! activation picks them up.

use crate::collaborators::{ArrangementStore, AutomationManager, InstrumentRegistry};
use crate::config::DebounceConfig;
use crate::content_scheduler::{Debouncer, ScheduleRequest, SchedulePriority, ScheduleScope};
use crate::edit::{EditEvent, PatternChangeType};
use crate::event_queue::EventMetadata;
use crate::model::Note;
use crate::note_scheduler::schedule_immediate_note;
use crate::transport::Transport;
use crate::voices::VoiceBookkeeper;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirtyOutcome {
    pub scheduled_immediately: bool,
    pub queued_for_reschedule: bool,
    pub removed_from_queue: usize,
}

fn submit_note_edit_reschedule(
    instrument_id: &str,
    now: f64,
    is_playing: bool,
    debouncer: &mut Debouncer,
    cfg: &DebounceConfig,
) -> Option<ScheduleRequest> {
    let request = ScheduleRequest {
        reason: Some("note_edit".to_string()),
        scope: ScheduleScope::Notes,
        instrument_filter: vec![instrument_id.to_string()],
        priority: SchedulePriority::Idle,
        ..Default::default()
    };
    debouncer.submit(request, now, is_playing, cfg)
}

/// A note was added to the active pattern (spec §4.9 "Note added"): schedule
/// it immediately if the transport is live, otherwise fold it into a
/// debounced `notes`-scoped reschedule.
#[allow(clippy::too_many_arguments)]
fn handle_note_added(
    note: &Note,
    instrument_id: &str,
    is_playing: bool,
    now: f64,
    loop_start_step: f64,
    loop_end_step: f64,
    current_step: f64,
    overlap_min_fade_seconds: f64,
    store: &dyn ArrangementStore,
    instruments: &dyn InstrumentRegistry,
    automation: &dyn AutomationManager,
    voices: &mut VoiceBookkeeper,
    debouncer: &mut Debouncer,
    transport: &mut Transport,
) -> DirtyOutcome {
    let mut outcome = DirtyOutcome::default();
    let cfg = transport.config().debounce;

    if !is_playing {
        submit_note_edit_reschedule(instrument_id, now, is_playing, debouncer, &cfg);
        outcome.queued_for_reschedule = true;
        return outcome;
    }

    let Some(pattern_id) = store.active_pattern_id() else {
        return outcome;
    };
    let Some(pattern) = store.pattern(&pattern_id) else {
        return outcome;
    };
    let handle = match instruments.get(instrument_id) {
        Some(h) => h,
        None => match instruments.resync(instrument_id) {
            Some(h) => h,
            None => {
                log::warn!("dirty: no instrument handle for {instrument_id}, deferring note add to next reschedule");
                submit_note_edit_reschedule(instrument_id, now, is_playing, debouncer, &cfg);
                outcome.queued_for_reschedule = true;
                return outcome;
            }
        },
    };

    let lanes = automation.get_lanes(&pattern_id, instrument_id);
    let pattern_length = pattern.length_steps() as f64;
    let seconds_per_step = transport.steps_to_seconds(1.0);

    let scheduled = schedule_immediate_note(
        note,
        instrument_id,
        pattern_length,
        loop_start_step,
        loop_end_step,
        current_step,
        now,
        seconds_per_step,
        overlap_min_fade_seconds,
        voices,
        &handle,
        &lanes,
        transport,
    );
    outcome.scheduled_immediately = scheduled.is_some();
    outcome
}

/// A note was removed from the active pattern (spec §4.9 "Note removed"):
/// release it and purge its future queue entries immediately if live,
/// otherwise fold it into a debounced `notes`-scoped reschedule.
fn handle_note_removed(
    note_id: u64,
    instrument_id: &str,
    is_playing: bool,
    now: f64,
    instruments: &dyn InstrumentRegistry,
    voices: &mut VoiceBookkeeper,
    debouncer: &mut Debouncer,
    transport: &mut Transport,
) -> DirtyOutcome {
    let mut outcome = DirtyOutcome::default();
    let cfg = transport.config().debounce;

    if !is_playing {
        submit_note_edit_reschedule(instrument_id, now, is_playing, debouncer, &cfg);
        outcome.queued_for_reschedule = true;
        return outcome;
    }

    if let Some((_, pitch, _)) = voices.take_by_note_id(note_id) {
        if let Some(handle) = instruments.get(instrument_id) {
            handle.release_note(pitch, now, None);
        }
    }
    outcome.removed_from_queue = transport.clear_scheduled_events(Some(&|meta: &EventMetadata| meta.note_id == Some(note_id)));
    outcome
}

/// A pattern-level property changed (rename, length, clear) — nothing
/// note-specific to release or purge by id, so fold into a full debounced
/// reschedule (spec §4.9 "Pattern changed").
fn handle_pattern_changed(change_type: PatternChangeType, is_playing: bool, now: f64, debouncer: &mut Debouncer, cfg: &DebounceConfig) -> DirtyOutcome {
    let priority = match change_type {
        PatternChangeType::Cleared | PatternChangeType::LengthChanged => SchedulePriority::Realtime,
        PatternChangeType::Renamed | PatternChangeType::Other => SchedulePriority::Idle,
    };
    let request = ScheduleRequest {
        reason: Some("pattern_changed".to_string()),
        scope: ScheduleScope::All,
        priority,
        ..Default::default()
    };
    debouncer.submit(request, now, is_playing, cfg);
    DirtyOutcome {
        queued_for_reschedule: true,
        ..Default::default()
    }
}

/// Consume one edit-bus event against the live scheduling state. Events for
/// any pattern other than the active one are ignored here.
#[allow(clippy::too_many_arguments)]
pub fn handle_edit_event(
    event: &EditEvent,
    is_playing: bool,
    now: f64,
    loop_start_step: f64,
    loop_end_step: f64,
    current_step: f64,
    overlap_min_fade_seconds: f64,
    store: &dyn ArrangementStore,
    instruments: &dyn InstrumentRegistry,
    automation: &dyn AutomationManager,
    voices: &mut VoiceBookkeeper,
    debouncer: &mut Debouncer,
    transport: &mut Transport,
) -> DirtyOutcome {
    let Some(active_pattern_id) = store.active_pattern_id() else {
        return DirtyOutcome::default();
    };
    if *event.pattern_id() != active_pattern_id {
        return DirtyOutcome::default();
    }

    match event {
        EditEvent::NoteAdded { instrument_id, note, .. } => handle_note_added(
            note,
            instrument_id,
            is_playing,
            now,
            loop_start_step,
            loop_end_step,
            current_step,
            overlap_min_fade_seconds,
            store,
            instruments,
            automation,
            voices,
            debouncer,
            transport,
        ),
        EditEvent::NoteRemoved { instrument_id, note_id, .. } => {
            handle_note_removed(*note_id, instrument_id, is_playing, now, instruments, voices, debouncer, transport)
        }
        EditEvent::NoteModified { instrument_id, old_note, note, .. } => {
            let mut outcome = handle_note_removed(old_note.id, instrument_id, is_playing, now, instruments, voices, debouncer, transport);
            let add_outcome = handle_note_added(
                note,
                instrument_id,
                is_playing,
                now,
                loop_start_step,
                loop_end_step,
                current_step,
                overlap_min_fade_seconds,
                store,
                instruments,
                automation,
                voices,
                debouncer,
                transport,
            );
            outcome.scheduled_immediately |= add_outcome.scheduled_immediately;
            outcome.queued_for_reschedule |= add_outcome.queued_for_reschedule;
            outcome.removed_from_queue += add_outcome.removed_from_queue;
            outcome
        }
        EditEvent::PatternChanged { change_type, .. } => {
            let cfg = transport.config().debounce;
            handle_pattern_changed(change_type.clone(), is_playing, now, debouncer, &cfg)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use crate::model::{AudioClip, AutomationLane, ExtendedParams, Pattern, Pitch, Track};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeInstrument {
        triggers: Mutex<Vec<(Pitch, f64)>>,
        releases: Mutex<Vec<(Pitch, f64)>>,
        has_release: AtomicBool,
    }

    impl crate::collaborators::InstrumentHandle for FakeInstrument {
        fn trigger_note(&self, pitch: Pitch, _velocity: f32, at_time: f64, _duration: f64, _ext: Option<&ExtendedParams>) {
            self.triggers.lock().unwrap().push((pitch, at_time));
        }
        fn release_note(&self, pitch: Pitch, at_time: f64, _release_velocity: Option<f32>) {
            self.releases.lock().unwrap().push((pitch, at_time));
        }
        fn all_notes_off(&self, _at_time: f64, _fade_time: Option<f64>) {}
        fn stop_all(&self, _fade_time: Option<f64>) {}
        fn apply_automation(&self, _params: &crate::collaborators::ParamsMap, _at_time: f64) {}
        fn has_release_sustain(&self) -> bool {
            self.has_release.load(Ordering::SeqCst)
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

    struct FakeAutomation;
    impl AutomationManager for FakeAutomation {
        fn get_lanes(&self, _pattern_id: &str, _instrument_id: &str) -> Vec<AutomationLane> {
            Vec::new()
        }
    }

    struct FakeStore {
        pattern: Pattern,
        tracks: Vec<Track>,
        clips: Vec<AudioClip>,
    }

    impl ArrangementStore for FakeStore {
        fn active_pattern_id(&self) -> Option<String> {
            Some(self.pattern.id.clone())
        }
        fn pattern(&self, id: &str) -> Option<&Pattern> {
            (id == self.pattern.id).then_some(&self.pattern)
        }
        fn clips(&self) -> &[AudioClip] {
            &self.clips
        }
        fn tracks(&self) -> &[Track] {
            &self.tracks
        }
    }

    fn store() -> FakeStore {
        FakeStore {
            pattern: Pattern::new("p1", "test"),
            tracks: Vec::new(),
            clips: Vec::new(),
        }
    }

    fn transport() -> Transport {
        let mut t = Transport::new(SchedulerConfig::default(), 120.0, 48_000.0).unwrap();
        t.start(0.0, None);
        t
    }

    #[test]
    fn note_added_while_playing_schedules_immediately() {
        let store = store();
        let inst = Arc::new(FakeInstrument::default());
        inst.has_release.store(true, Ordering::SeqCst);
        let registry = FakeRegistry { handle: inst.clone() };
        let automation = FakeAutomation;
        let mut voices = VoiceBookkeeper::new();
        let mut debouncer = Debouncer::new();
        let mut t = transport();

        let event = EditEvent::NoteAdded {
            pattern_id: "p1".to_string(),
            instrument_id: "synth".to_string(),
            note: Note::new(1, 60, 0.0, 1.0, 1.0),
        };

        let outcome = handle_edit_event(
            &event, true, 0.0, 0.0, 16.0, 0.0, 0.002, &store, &registry, &automation, &mut voices, &mut debouncer, &mut t,
        );
        assert!(outcome.scheduled_immediately);
        assert_eq!(t.queue_len(), 1);

        // Drain the queue far enough in the future to confirm the trigger
        // callback that was enqueued actually fires.
        t.tick(3.0);
        assert!(!inst.triggers.lock().unwrap().is_empty());
    }

    #[test]
    fn note_added_while_stopped_debounces() {
        let store = store();
        let inst = Arc::new(FakeInstrument::default());
        let registry = FakeRegistry { handle: inst };
        let automation = FakeAutomation;
        let mut voices = VoiceBookkeeper::new();
        let mut debouncer = Debouncer::new();
        let mut t = transport();

        let event = EditEvent::NoteAdded {
            pattern_id: "p1".to_string(),
            instrument_id: "synth".to_string(),
            note: Note::new(1, 60, 0.0, 1.0, 1.0),
        };

        let outcome = handle_edit_event(
            &event, false, 0.0, 0.0, 16.0, 0.0, 0.002, &store, &registry, &automation, &mut voices, &mut debouncer, &mut t,
        );
        assert!(outcome.queued_for_reschedule);
        assert!(debouncer.is_pending());
    }

    #[test]
    fn note_removed_while_playing_releases_and_purges() {
        let store = store();
        let inst = Arc::new(FakeInstrument::default());
        let registry = FakeRegistry { handle: inst.clone() };
        let automation = FakeAutomation;
        let mut voices = VoiceBookkeeper::new();
        let mut debouncer = Debouncer::new();
        let mut t = transport();

        voices.upsert(
            "synth",
            60,
            crate::voices::ActiveNoteRecord {
                note_id: 1,
                start_audio_time: 0.0,
                end_audio_time: 1.0,
                start_step: 0.0,
                end_step: 1.0,
                source_note: Note::new(1, 60, 0.0, 1.0, 1.0),
            },
        );
        let mut meta = EventMetadata::default();
        meta.note_id = Some(1);
        t.schedule_event(0.0, 1.0, meta, Box::new(|| {}));

        let event = EditEvent::NoteRemoved {
            pattern_id: "p1".to_string(),
            instrument_id: "synth".to_string(),
            note_id: 1,
        };

        let outcome = handle_edit_event(
            &event, true, 0.0, 0.0, 16.0, 0.0, 0.002, &store, &registry, &automation, &mut voices, &mut debouncer, &mut t,
        );
        assert_eq!(outcome.removed_from_queue, 1);
        assert_eq!(inst.releases.lock().unwrap().len(), 1);
        assert!(voices.is_empty());
    }

    #[test]
    fn edit_for_inactive_pattern_is_ignored() {
        let store = store();
        let inst = Arc::new(FakeInstrument::default());
        let registry = FakeRegistry { handle: inst };
        let automation = FakeAutomation;
        let mut voices = VoiceBookkeeper::new();
        let mut debouncer = Debouncer::new();
        let mut t = transport();

        let event = EditEvent::NoteAdded {
            pattern_id: "other".to_string(),
            instrument_id: "synth".to_string(),
            note: Note::new(1, 60, 0.0, 1.0, 1.0),
        };

        let outcome = handle_edit_event(
            &event, true, 0.0, 0.0, 16.0, 0.0, 0.002, &store, &registry, &automation, &mut voices, &mut debouncer, &mut t,
        );
        assert_eq!(outcome, DirtyOutcome::default());
    }

    #[test]
    fn pattern_changed_queues_full_reschedule() {
        let store = store();
        let inst = Arc::new(FakeInstrument::default());
        let registry = FakeRegistry { handle: inst };
        let automation = FakeAutomation;
        let mut voices = VoiceBookkeeper::new();
        let mut debouncer = Debouncer::new();
        let mut t = transport();

        let event = EditEvent::PatternChanged {
            pattern_id: "p1".to_string(),
            change_type: PatternChangeType::Cleared,
        };

        let outcome = handle_edit_event(
            &event, true, 0.0, 0.0, 16.0, 0.0, 0.002, &store, &registry, &automation, &mut voices, &mut debouncer, &mut t,
        );
        assert!(outcome.queued_for_reschedule);
        assert!(debouncer.is_pending());
    }
}
