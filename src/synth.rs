//! A minimal polyphonic sine synth used as the demo's only
//! [`tempoline_core::InstrumentHandle`] — grounded on the teacher's
//! `audio::audio::AudioPlayer` (shared `Arc<Mutex<_>>` state read from a cpal
//! output callback), generalized from "one fixed frequency list" to
//! "a set of voices with note-on/note-off envelopes".

use std::collections::HashMap;
use std::sync::Mutex;

use tempoline_core::{ExtendedParams, InstrumentHandle, ParamsMap, Pitch};

fn pitch_to_frequency(pitch: Pitch) -> f32 {
    440.0 * 2f32.powf((pitch as f32 - 69.0) / 12.0)
}

/// One sounding voice. `phase` advances every sample; `released_at` marks the
/// moment `release_note` was called so the mixer can apply a short fade
/// instead of a click.
struct Voice {
    pitch: Pitch,
    phase: f32,
    velocity: f32,
    start_time: f64,
    release_time: Option<f64>,
}

struct SynthState {
    voices: Vec<Voice>,
    gain: f64,
}

/// `Send + Sync` instrument handle backing a single sine-wave voice bank.
/// `trigger_note`/`release_note` just mutate the shared voice list; the cpal
/// callback in [`crate::driver`] is the only reader.
pub struct SineSynth {
    state: Mutex<SynthState>,
    sample_rate: f32,
}

impl SineSynth {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            state: Mutex::new(SynthState { voices: Vec::new(), gain: 1.0 }),
            sample_rate,
        }
    }

    /// Render `len` interleaved mono samples, removing voices that have
    /// fully released. Called from the audio callback thread only.
    pub fn render(&self, out: &mut [f32], now: f64, sample_advance: f64) {
        let mut state = self.state.lock().unwrap();
        let gain = state.gain as f32;
        out.fill(0.0);
        let mut t = now;
        for frame in out.iter_mut() {
            let mut mixed = 0.0;
            for voice in &state.voices {
                let env = voice_envelope(voice, t);
                if env <= 0.0 {
                    continue;
                }
                let freq = pitch_to_frequency(voice.pitch);
                let elapsed = (t - voice.start_time) as f32;
                let angle = voice.phase + 2.0 * std::f32::consts::PI * freq * elapsed;
                mixed += voice.velocity * env * angle.sin();
            }
            *frame += mixed * gain * 0.2;
            t += sample_advance;
        }
        state.voices.retain(|v| voice_envelope(v, t) > 0.0);
    }
}

const RELEASE_TAIL_SECONDS: f64 = 0.08;

fn voice_envelope(voice: &Voice, t: f64) -> f32 {
    match voice.release_time {
        Some(released) => {
            let elapsed = t - released;
            if elapsed <= 0.0 {
                1.0
            } else {
                (1.0 - (elapsed / RELEASE_TAIL_SECONDS) as f32).max(0.0)
            }
        }
        None => 1.0,
    }
}

impl InstrumentHandle for SineSynth {
    fn trigger_note(&self, pitch: Pitch, velocity: f32, at_time: f64, _duration: f64, _extended_params: Option<&ExtendedParams>) {
        let mut state = self.state.lock().unwrap();
        state.voices.push(Voice {
            pitch,
            phase: 0.0,
            velocity,
            start_time: at_time,
            release_time: None,
        });
    }

    fn release_note(&self, pitch: Pitch, at_time: f64, _release_velocity: Option<f32>) {
        let mut state = self.state.lock().unwrap();
        for voice in state.voices.iter_mut().filter(|v| v.pitch == pitch && v.release_time.is_none()) {
            voice.release_time = Some(at_time);
        }
    }

    fn all_notes_off(&self, at_time: f64, _fade_time: Option<f64>) {
        let mut state = self.state.lock().unwrap();
        for voice in state.voices.iter_mut().filter(|v| v.release_time.is_none()) {
            voice.release_time = Some(at_time);
        }
    }

    fn stop_all(&self, _fade_time: Option<f64>) {
        self.state.lock().unwrap().voices.clear();
    }

    fn apply_automation(&self, params: &ParamsMap, _at_time: f64) {
        if let Some(gain) = params.get("gain") {
            self.state.lock().unwrap().gain = *gain;
        }
    }

    fn has_release_sustain(&self) -> bool {
        true
    }

    fn active_sources_count(&self) -> Option<usize> {
        Some(self.state.lock().unwrap().voices.len())
    }
}

/// A second instrument kind with no sustain at all — every trigger is a short
/// percussive blip, so the scheduler never bothers sending it a note-off
/// (spec'd hook: [`InstrumentHandle::has_release_sustain`]).
pub struct ClickInstrument {
    hits: Mutex<HashMap<Pitch, f64>>,
}

impl ClickInstrument {
    pub fn new() -> Self {
        Self { hits: Mutex::new(HashMap::new()) }
    }
}

impl InstrumentHandle for ClickInstrument {
    fn trigger_note(&self, pitch: Pitch, _velocity: f32, at_time: f64, _duration: f64, _extended_params: Option<&ExtendedParams>) {
        self.hits.lock().unwrap().insert(pitch, at_time);
    }

    fn release_note(&self, _pitch: Pitch, _at_time: f64, _release_velocity: Option<f32>) {}

    fn all_notes_off(&self, _at_time: f64, _fade_time: Option<f64>) {
        self.hits.lock().unwrap().clear();
    }

    fn stop_all(&self, _fade_time: Option<f64>) {
        self.hits.lock().unwrap().clear();
    }

    fn apply_automation(&self, _params: &ParamsMap, _at_time: f64) {}

    fn has_release_sustain(&self) -> bool {
        false
    }
}
