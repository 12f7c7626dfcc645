//! The `Note` entity (spec §3) and its legacy-compatible duration encoding
//! (spec §4.5 step 6).

use super::ids::{NoteId, Pitch};

/// How a note's sounding length is expressed. JSON-era DAW files carried
/// several historical shapes for this; the note scheduler resolves all of
/// them down to a `f64` step count (§4.5 step 6).
#[derive(Debug, Clone, PartialEq)]
pub enum NoteLength {
    /// Explicit length in steps. Also covers "oval" notes, whose
    /// `visual_length` is shorter than this value but which must still
    /// sound for the full scheduled length.
    Steps(f64),
    /// Legacy marker: a one-shot trigger, fixed at a tenth of a step.
    Trigger,
    /// Legacy note-value notation, e.g. `"8n"` (eighth note), `"16n"`.
    /// `n` is the denominator against a whole note (16 steps).
    Fraction(u32),
    /// Legacy `visual_length == 1` with no numeric length: sounds until the
    /// end of the pattern.
    ExtendToPatternEnd,
}

impl NoteLength {
    /// Parse a legacy duration string, falling back per §7 ("invalid note
    /// duration string: attempt a numeric-extraction fallback").
    pub fn parse_legacy(raw: &str) -> Option<NoteLength> {
        if raw.eq_ignore_ascii_case("trigger") {
            return Some(NoteLength::Trigger);
        }
        let mut seen_dot = false;
        let leading_number: String = raw
            .chars()
            .take_while(|c| {
                if c.is_ascii_digit() {
                    true
                } else if *c == '.' && !seen_dot {
                    seen_dot = true;
                    true
                } else {
                    false
                }
            })
            .collect();

        if raw.ends_with('n') && !leading_number.is_empty() {
            if let Ok(n) = leading_number.parse::<u32>() {
                return Some(NoteLength::Fraction(n));
            }
        }
        // Numeric-extraction fallback: any leading digits at all.
        if !leading_number.is_empty() {
            if let Ok(n) = leading_number.parse::<f64>() {
                return Some(NoteLength::Steps(n));
            }
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slide {
    pub target_pitch: Pitch,
    pub duration_steps: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtendedParams {
    pub pan: Option<f32>,
    pub mod_wheel: Option<f32>,
    pub aftertouch: Option<f32>,
    pub pitch_bend: Vec<f32>,
}

impl ExtendedParams {
    pub fn is_empty(&self) -> bool {
        self.pan.is_none()
            && self.mod_wheel.is_none()
            && self.aftertouch.is_none()
            && self.pitch_bend.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub id: NoteId,
    pub pitch: Pitch,
    pub start_step: f64,
    pub length: NoteLength,
    /// Legacy visual-length hint; only consulted when `length` came from
    /// that legacy path (see [`NoteLength::ExtendToPatternEnd`]).
    pub visual_length: Option<f64>,
    pub velocity: f32,
    pub release_velocity: Option<f32>,
    pub muted: bool,
    pub slide: Option<Slide>,
    pub extended_params: Option<ExtendedParams>,
}

impl Note {
    pub fn new(id: NoteId, pitch: Pitch, start_step: f64, length_steps: f64, velocity: f32) -> Self {
        Self {
            id,
            pitch,
            start_step,
            length: NoteLength::Steps(length_steps),
            visual_length: None,
            velocity: velocity.clamp(0.0, 1.0),
            release_velocity: None,
            muted: false,
            slide: None,
            extended_params: None,
        }
    }

    pub fn end_step_hint(&self) -> f64 {
        match &self.length {
            NoteLength::Steps(n) => self.start_step + n,
            _ => self.start_step + self.visual_length.unwrap_or(1.0),
        }
    }
}
