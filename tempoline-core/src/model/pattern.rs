//! `Pattern` entity (spec §3): a fixed-length grid of per-instrument notes
//! plus optional pattern-level scheduled automation.

use std::collections::HashMap;

use super::automation::AutomationPoint;
use super::ids::{InstrumentId, PatternId};
use super::note::Note;

#[derive(Debug, Clone)]
pub struct Pattern {
    pub id: PatternId,
    pub name: String,
    length_steps: u32,
    pub data: HashMap<InstrumentId, Vec<Note>>,
    /// Scheduled automation keyed by `"{mixer|instrument|effect}.{id}.{parameter}"`
    /// (spec §4.7, mode 1).
    pub automation: HashMap<String, Vec<AutomationPoint>>,
}

impl Pattern {
    pub fn new(id: impl Into<PatternId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            length_steps: 16,
            data: HashMap::new(),
            automation: HashMap::new(),
        }
    }

    /// The pattern's length in steps, auto-computed as the smallest multiple
    /// of 16 covering the last note end, with a floor of 16 (spec §3).
    pub fn length_steps(&self) -> u32 {
        let last_note_end = self
            .data
            .values()
            .flatten()
            .map(|n| n.end_step_hint())
            .fold(0.0_f64, f64::max);

        let computed = ((last_note_end / 16.0).ceil() as u32).max(1) * 16;
        computed.max(self.length_steps).max(16)
    }

    /// Override the floor used by [`Pattern::length_steps`] (for patterns
    /// that declare an explicit length even when sparsely populated).
    pub fn set_minimum_length_steps(&mut self, steps: u32) {
        self.length_steps = steps;
    }

    pub fn notes_for(&self, instrument_id: &str) -> &[Note] {
        self.data
            .get(instrument_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn add_note(&mut self, instrument_id: impl Into<InstrumentId>, note: Note) {
        self.data.entry(instrument_id.into()).or_default().push(note);
    }

    pub fn instrument_ids(&self) -> impl Iterator<Item = &InstrumentId> {
        self.data.keys()
    }
}
