//! Active-note bookkeeping and same-pitch overlap detection (spec §3 "Active-note
//! record", §4.5 step 7, §4.8 step 3).
//!
//! Owned by the note scheduler; read by the content scheduler for overlap
//! handling and by loop-restart for selective stop (spec §3 "Ownership").

use std::collections::HashMap;

use crate::model::{InstrumentId, Note, Pitch};

#[derive(Debug, Clone)]
pub struct ActiveNoteRecord {
    pub note_id: u64,
    pub start_audio_time: f64,
    pub end_audio_time: f64,
    pub start_step: f64,
    pub end_step: f64,
    pub source_note: Note,
}

/// Result of detecting an in-flight note of the same pitch (spec §4.5 step 7).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlapRelease {
    pub note_id: u64,
    pub release_at: f64,
}

#[derive(Default)]
pub struct VoiceBookkeeper {
    active: HashMap<(InstrumentId, Pitch), ActiveNoteRecord>,
}

impl VoiceBookkeeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, instrument_id: &str, pitch: Pitch) -> Option<&ActiveNoteRecord> {
        self.active.get(&(instrument_id.to_string(), pitch))
    }

    /// Check for, and describe the release of, a same-pitch note already
    /// sounding past `absolute_start` (spec §4.5 step 7).
    pub fn check_overlap(
        &self,
        instrument_id: &str,
        pitch: Pitch,
        absolute_start: f64,
        overlap_min_fade_seconds: f64,
    ) -> Option<OverlapRelease> {
        let existing = self.get(instrument_id, pitch)?;
        if existing.end_audio_time <= absolute_start {
            return None;
        }
        let overlap = existing.end_audio_time - absolute_start;
        let fade = overlap_min_fade_seconds.max(0.5 * overlap);
        Some(OverlapRelease {
            note_id: existing.note_id,
            release_at: absolute_start - fade,
        })
    }

    pub fn upsert(&mut self, instrument_id: impl Into<InstrumentId>, pitch: Pitch, record: ActiveNoteRecord) {
        self.active.insert((instrument_id.into(), pitch), record);
    }

    pub fn remove(&mut self, instrument_id: &str, pitch: Pitch) -> Option<ActiveNoteRecord> {
        self.active.remove(&(instrument_id.to_string(), pitch))
    }

    pub fn remove_by_note_id(&mut self, note_id: u64) {
        self.active.retain(|_, r| r.note_id != note_id);
    }

    /// Remove and return the record for `note_id`, keyed so the caller can
    /// address the instrument handle needed to actually release it (spec §4.9
    /// "Note removed").
    pub fn take_by_note_id(&mut self, note_id: u64) -> Option<(InstrumentId, Pitch, ActiveNoteRecord)> {
        let key = self.active.iter().find(|(_, r)| r.note_id == note_id).map(|(k, _)| k.clone())?;
        let record = self.active.remove(&key)?;
        Some((key.0, key.1, record))
    }

    pub fn clear(&mut self) {
        self.active.clear();
    }

    pub fn clear_instrument(&mut self, instrument_id: &str) {
        self.active.retain(|(inst, _), _| inst != instrument_id);
    }

    /// Notes entirely past `loop_end_step` — candidates for the loop-restart
    /// selective stop (spec §4.8 step 3).
    pub fn notes_entirely_past(&self, loop_end_step: f64) -> Vec<ActiveNoteRecord> {
        self.active
            .values()
            .filter(|r| r.start_step >= loop_end_step && r.end_step <= loop_end_step)
            .cloned()
            .collect()
    }

    /// Same selection as [`VoiceBookkeeper::notes_entirely_past`], keyed by
    /// `(instrument_id, pitch)` so the caller can address the instrument
    /// handle needed to actually stop the note.
    pub fn notes_entirely_past_with_keys(&self, loop_end_step: f64) -> Vec<(InstrumentId, Pitch, ActiveNoteRecord)> {
        self.active
            .iter()
            .filter(|(_, r)| r.start_step >= loop_end_step && r.end_step <= loop_end_step)
            .map(|((instrument_id, pitch), r)| (instrument_id.clone(), *pitch, r.clone()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }
}
