//! Translation of pattern notes into timed events (spec §4.5).

use std::sync::Arc;

use crate::collaborators::InstrumentHandle;
use crate::event_queue::{EventKind, EventMetadata};
use crate::model::{AutomationLane, ExtendedParams, Note, NoteLength, Pitch};
use crate::transport::Transport;
use crate::voices::{OverlapRelease, VoiceBookkeeper};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteScheduleOutcome {
    pub note_on_time: f64,
    pub note_off_time: Option<f64>,
    pub early_release: Option<OverlapRelease>,
}

/// Duration in steps, resolving every [`NoteLength`] shape (spec §4.5 step 6).
pub fn resolve_duration_steps(note: &Note, pattern_length_steps: f64) -> f64 {
    match &note.length {
        NoteLength::Steps(n) if *n > 0.0 => *n,
        NoteLength::Steps(_) => 1.0,
        NoteLength::ExtendToPatternEnd => (pattern_length_steps - note.start_step).max(0.0),
        NoteLength::Trigger => 0.1,
        NoteLength::Fraction(n) if *n > 0 => 16.0 / *n as f64,
        NoteLength::Fraction(_) => 1.0,
    }
}

/// Direct note fields plus CC-lane-derived pan/mod-wheel values at the
/// note's start step (spec §4.5 step 9). Volume (CC7) is deliberately never
/// folded in here (spec §9 "Volume automation is not per-note").
fn resolve_extended_params(note: &Note, lanes: &[AutomationLane]) -> Option<ExtendedParams> {
    let mut params = note.extended_params.clone().unwrap_or_default();

    if params.pan.is_none() {
        if let Some(lane) = lanes.iter().find(|l| l.cc_number == 10) {
            if let Some(v) = lane.get_value_at(note.start_step) {
                params.pan = Some(((v - 64.0) / 64.0) as f32);
            }
        }
    }
    if params.mod_wheel.is_none() {
        if let Some(lane) = lanes.iter().find(|l| l.cc_number == 1) {
            if let Some(v) = lane.get_value_at(note.start_step) {
                params.mod_wheel = Some(v as f32);
            }
        }
    }

    if params.is_empty() {
        None
    } else {
        Some(params)
    }
}

#[allow(clippy::too_many_arguments)]
fn enqueue_resolved_note(
    note: &Note,
    instrument_id: &str,
    absolute: f64,
    mut duration: f64,
    seconds_per_step: f64,
    now: f64,
    overlap_min_fade_seconds: f64,
    voices: &mut VoiceBookkeeper,
    instrument: &Arc<dyn InstrumentHandle>,
    lanes: &[AutomationLane],
    transport: &mut Transport,
) -> NoteScheduleOutcome {
    let pitch: Pitch = note.pitch;

    let early_release = voices.check_overlap(instrument_id, pitch, absolute, overlap_min_fade_seconds);
    if let Some(release) = early_release {
        if release.release_at > now {
            let release_at = transport.snap_to_sample(release.release_at);
            let inst = instrument.clone();
            let mut meta = EventMetadata::new(EventKind::NoteOff);
            meta.note_id = Some(release.note_id);
            meta.instrument_id = Some(instrument_id.to_string());
            transport.schedule_event(
                now,
                release_at,
                meta,
                Box::new(move || inst.release_note(pitch, release_at, None)),
            );
        }
    }

    let start_step = note.start_step;
    voices.upsert(
        instrument_id.to_string(),
        pitch,
        crate::voices::ActiveNoteRecord {
            note_id: note.id,
            start_audio_time: absolute,
            end_audio_time: absolute + duration,
            start_step,
            end_step: start_step + duration / seconds_per_step,
            source_note: note.clone(),
        },
    );

    // Slide extension is applied after overlap detection and bookkeeping, so
    // it lengthens the dispatched note-off without affecting the active-note
    // record used for overlap checks (spec §4.5 steps 8-9 run in that order).
    if let Some(slide) = &note.slide {
        duration += slide.duration_steps * seconds_per_step;
    }

    let extended_params = resolve_extended_params(note, lanes);

    let note_on_time = transport.snap_to_sample(absolute);
    let velocity = note.velocity;
    let inst_on = instrument.clone();
    let mut on_meta = EventMetadata::new(EventKind::NoteOn);
    on_meta.instrument_id = Some(instrument_id.to_string());
    on_meta.note_id = Some(note.id);
    on_meta.step = Some(start_step);
    let on_params = extended_params.clone();
    transport.schedule_event(
        now,
        note_on_time,
        on_meta,
        Box::new(move || inst_on.trigger_note(pitch, velocity, note_on_time, duration, on_params.as_ref())),
    );

    let note_off_time = if duration > 0.0 && instrument.has_release_sustain() {
        let off_time = transport.snap_to_sample(absolute + duration);
        let inst_off = instrument.clone();
        let release_velocity = note.release_velocity;
        let mut off_meta = EventMetadata::new(EventKind::NoteOff);
        off_meta.instrument_id = Some(instrument_id.to_string());
        off_meta.note_id = Some(note.id);
        off_meta.step = Some(start_step);
        off_meta.scheduled_note_on_time = Some(note_on_time);
        transport.schedule_event(
            now,
            off_time,
            off_meta,
            Box::new(move || inst_off.release_note(pitch, off_time, release_velocity)),
        );
        Some(off_time)
    } else {
        None
    };

    NoteScheduleOutcome {
        note_on_time,
        note_off_time,
        early_release,
    }
}

/// Steps 2-5 of the translation: turn a step position into an absolute audio
/// time relative to `base`, carrying it forward by one loop length if it
/// falls in the past and a loop is active. Shared by note scheduling and
/// pattern-level scheduled-automation points, which resolve to an audio time
/// the same way.
pub fn resolve_absolute_time(
    time_step: f64,
    base: f64,
    current_pos_seconds: f64,
    seconds_per_step: f64,
    loop_enabled: bool,
    loop_duration_seconds: f64,
) -> Option<f64> {
    let time_seconds = time_step * seconds_per_step;
    let relative = time_seconds - current_pos_seconds;
    let mut absolute = base + relative;

    if absolute < base {
        if loop_enabled {
            absolute += loop_duration_seconds;
            if absolute < base {
                return None;
            }
        } else {
            return None;
        }
    }
    Some(absolute)
}

/// One note's full translation for a normal scheduling pass (spec §4.5 steps
/// 1-11). Returns `None` when the note is muted or falls entirely in the
/// past with no loop to carry it forward.
#[allow(clippy::too_many_arguments)]
pub fn schedule_note(
    note: &Note,
    instrument_id: &str,
    pattern_length_steps: f64,
    now: f64,
    base: f64,
    current_pos_seconds: f64,
    seconds_per_step: f64,
    loop_enabled: bool,
    loop_duration_seconds: f64,
    overlap_min_fade_seconds: f64,
    voices: &mut VoiceBookkeeper,
    instrument: &Arc<dyn InstrumentHandle>,
    lanes: &[AutomationLane],
    transport: &mut Transport,
) -> Option<NoteScheduleOutcome> {
    if note.muted {
        return None;
    }

    let absolute = resolve_absolute_time(
        note.start_step,
        base,
        current_pos_seconds,
        seconds_per_step,
        loop_enabled,
        loop_duration_seconds,
    )?;

    let duration_steps = resolve_duration_steps(note, pattern_length_steps);
    let duration = duration_steps * seconds_per_step;

    Some(enqueue_resolved_note(
        note,
        instrument_id,
        absolute,
        duration,
        seconds_per_step,
        now,
        overlap_min_fade_seconds,
        voices,
        instrument,
        lanes,
        transport,
    ))
}

fn normalize(x: f64, loop_len: f64) -> f64 {
    if loop_len <= 0.0 {
        return x;
    }
    let m = x % loop_len;
    if m < 0.0 {
        m + loop_len
    } else {
        m
    }
}

/// The step at which a just-added note should first sound (spec §4.5
/// "Immediate mid-playback insertion").
pub fn compute_insertion_step(note_start_step: f64, loop_start: f64, loop_end: f64, current_step: f64) -> f64 {
    let loop_len = loop_end - loop_start;
    let cur_rel = normalize(current_step - loop_start, loop_len);
    let note_rel = normalize(note_start_step - loop_start, loop_len);
    if note_rel > cur_rel {
        note_start_step
    } else {
        note_start_step + loop_len
    }
}

/// Schedule a note added live during playback (spec §4.5 "Immediate
/// mid-playback insertion"). Returns `None` if a duplicate of this note id
/// is already in the future queue.
#[allow(clippy::too_many_arguments)]
pub fn schedule_immediate_note(
    note: &Note,
    instrument_id: &str,
    pattern_length_steps: f64,
    loop_start_step: f64,
    loop_end_step: f64,
    current_step: f64,
    now: f64,
    seconds_per_step: f64,
    overlap_min_fade_seconds: f64,
    voices: &mut VoiceBookkeeper,
    instrument: &Arc<dyn InstrumentHandle>,
    lanes: &[AutomationLane],
    transport: &mut Transport,
) -> Option<NoteScheduleOutcome> {
    if note.muted || transport.queue_contains_note_id(note.id) {
        return None;
    }

    let step = compute_insertion_step(note.start_step, loop_start_step, loop_end_step, current_step);
    let mut absolute = transport.transport_start_time() + step * seconds_per_step;
    if absolute - now <= 0.003 {
        absolute = now + 0.01;
    }

    let duration_steps = resolve_duration_steps(note, pattern_length_steps);
    let duration = duration_steps * seconds_per_step;

    Some(enqueue_resolved_note(
        note,
        instrument_id,
        absolute,
        duration,
        seconds_per_step,
        now,
        overlap_min_fade_seconds,
        voices,
        instrument,
        lanes,
        transport,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use crate::model::NoteId;
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeInstrument {
        triggers: Mutex<Vec<(Pitch, f64, f64)>>,
        releases: Mutex<Vec<(Pitch, f64)>>,
        release_sustain: std::sync::atomic::AtomicBool,
    }

    impl FakeInstrument {
        fn with_sustain(sustain: bool) -> Arc<Self> {
            Arc::new(Self {
                release_sustain: std::sync::atomic::AtomicBool::new(sustain),
                ..Default::default()
            })
        }
    }

    impl InstrumentHandle for FakeInstrument {
        fn trigger_note(&self, pitch: Pitch, velocity: f32, at_time: f64, duration: f64, _ext: Option<&ExtendedParams>) {
            self.triggers.lock().unwrap().push((pitch, at_time, duration));
            let _ = velocity;
        }
        fn release_note(&self, pitch: Pitch, at_time: f64, _release_velocity: Option<f32>) {
            self.releases.lock().unwrap().push((pitch, at_time));
        }
        fn all_notes_off(&self, _at_time: f64, _fade_time: Option<f64>) {}
        fn stop_all(&self, _fade_time: Option<f64>) {}
        fn apply_automation(&self, _params: &crate::collaborators::ParamsMap, _at_time: f64) {}
        fn has_release_sustain(&self) -> bool {
            self.release_sustain.load(Ordering::SeqCst)
        }
    }

    fn note(id: NoteId, start_step: f64, length_steps: f64, pitch: Pitch) -> Note {
        Note::new(id, pitch, start_step, length_steps, 1.0)
    }

    fn transport() -> Transport {
        Transport::new(SchedulerConfig::default(), 120.0, 48_000.0).unwrap()
    }

    #[test]
    fn single_note_schedules_on_and_off() {
        let mut t = transport();
        t.start(0.0, None);
        let inst = FakeInstrument::with_sustain(true);
        let mut voices = VoiceBookkeeper::new();
        let n = note(1, 0.0, 1.0, 60);

        let outcome = schedule_note(
            &n, "synth", 16.0, 0.0, 0.0, 0.0, 0.125, false, 2.0, 0.002,
            &mut voices, &(inst.clone() as Arc<dyn InstrumentHandle>), &[], &mut t,
        )
        .unwrap();

        assert!((outcome.note_on_time - 0.0).abs() < 1e-9);
        assert!((outcome.note_off_time.unwrap() - 0.125).abs() < 1e-9);
        assert_eq!(voices.len(), 1);
    }

    #[test]
    fn muted_note_is_skipped() {
        let mut t = transport();
        let inst = FakeInstrument::with_sustain(true);
        let mut voices = VoiceBookkeeper::new();
        let mut n = note(1, 0.0, 1.0, 60);
        n.muted = true;

        let outcome = schedule_note(
            &n, "synth", 16.0, 0.0, 0.0, 0.0, 0.125, false, 2.0, 0.002,
            &mut voices, &(inst as Arc<dyn InstrumentHandle>), &[], &mut t,
        );
        assert!(outcome.is_none());
    }

    #[test]
    fn past_note_without_loop_is_skipped() {
        let mut t = transport();
        let inst = FakeInstrument::with_sustain(true);
        let mut voices = VoiceBookkeeper::new();
        let n = note(1, 0.0, 1.0, 60);
        // current position is ahead of the note's start: relative is negative.
        let outcome = schedule_note(
            &n, "synth", 16.0, 0.0, 0.0, 10.0, 0.125, false, 2.0, 0.002,
            &mut voices, &(inst as Arc<dyn InstrumentHandle>), &[], &mut t,
        );
        assert!(outcome.is_none());
    }

    #[test]
    fn percussive_instrument_skips_note_off() {
        let mut t = transport();
        let inst = FakeInstrument::with_sustain(false);
        let mut voices = VoiceBookkeeper::new();
        let n = note(1, 0.0, 1.0, 60);
        let outcome = schedule_note(
            &n, "synth", 16.0, 0.0, 0.0, 0.0, 0.125, false, 2.0, 0.002,
            &mut voices, &(inst as Arc<dyn InstrumentHandle>), &[], &mut t,
        )
        .unwrap();
        assert!(outcome.note_off_time.is_none());
    }

    #[test]
    fn overlapping_same_pitch_schedules_early_release() {
        let mut t = transport();
        let inst = FakeInstrument::with_sustain(true);
        let mut voices = VoiceBookkeeper::new();

        let first = note(1, 0.0, 8.0, 48);
        schedule_note(
            &first, "synth", 16.0, 0.0, 0.0, 0.0, 0.125, false, 2.0, 0.002,
            &mut voices, &(inst.clone() as Arc<dyn InstrumentHandle>), &[], &mut t,
        )
        .unwrap();

        let second = note(2, 4.0, 8.0, 48);
        let outcome = schedule_note(
            &second, "synth", 16.0, 0.0, 0.0, 0.0, 0.125, false, 2.0, 0.002,
            &mut voices, &(inst.clone() as Arc<dyn InstrumentHandle>), &[], &mut t,
        )
        .unwrap();

        let release = outcome.early_release.unwrap();
        assert_eq!(release.note_id, 1);
        assert!((release.release_at - 0.25).abs() < 1e-9);
    }

    #[test]
    fn insertion_step_plays_next_iteration_when_behind_current() {
        let step = compute_insertion_step(4.0, 0.0, 16.0, 10.0);
        assert_eq!(step, 20.0);
    }

    #[test]
    fn insertion_step_plays_this_iteration_when_ahead_of_current() {
        let step = compute_insertion_step(12.0, 0.0, 16.0, 10.0);
        assert_eq!(step, 12.0);
    }
}
