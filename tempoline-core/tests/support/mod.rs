//! Shared fakes for the scenario tests in `scenarios.rs`. Follows the same
//! shape as the inline `#[cfg(test)]` fakes in `dirty.rs`/`loop_restart.rs`/
//! `note_scheduler.rs`, just promoted to a standalone module so every
//! end-to-end scenario can share one `RecordedInstrument`/`TestStore` pair
//! instead of redeclaring them per test file.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tempoline_core::{
    ArrangementStore, AudioClip, AudioSourceHandle, AudioSourceRegistry, AutomationLane, AutomationManager, EffectHandle,
    EffectRegistry, ExtendedParams, InstrumentHandle, InstrumentRegistry, MixerChannelHandle, MixerRegistry, ParamsMap, Pattern,
    Pitch, Track,
};

/// An instrument handle that only ever records what was called on it.
#[derive(Default)]
pub struct RecordedInstrument {
    pub triggers: Mutex<Vec<(Pitch, f64, f64)>>,
    pub releases: Mutex<Vec<(Pitch, f64)>>,
    pub stopped: Mutex<usize>,
    sustain: bool,
}

impl RecordedInstrument {
    pub fn new(sustain: bool) -> Arc<Self> {
        Arc::new(Self {
            sustain,
            ..Default::default()
        })
    }

    pub fn trigger_count(&self) -> usize {
        self.triggers.lock().unwrap().len()
    }

    pub fn release_count(&self) -> usize {
        self.releases.lock().unwrap().len()
    }

    pub fn trigger_times(&self) -> Vec<f64> {
        self.triggers.lock().unwrap().iter().map(|(_, t, _)| *t).collect()
    }
}

impl InstrumentHandle for RecordedInstrument {
    fn trigger_note(&self, pitch: Pitch, velocity: f32, at_time: f64, duration: f64, _extended_params: Option<&ExtendedParams>) {
        let _ = velocity;
        self.triggers.lock().unwrap().push((pitch, at_time, duration));
    }

    fn release_note(&self, pitch: Pitch, at_time: f64, _release_velocity: Option<f32>) {
        self.releases.lock().unwrap().push((pitch, at_time));
    }

    fn all_notes_off(&self, at_time: f64, _fade_time: Option<f64>) {
        for pitch in self.triggers.lock().unwrap().iter().map(|(p, ..)| *p).collect::<Vec<_>>() {
            self.releases.lock().unwrap().push((pitch, at_time));
        }
    }

    fn stop_all(&self, _fade_time: Option<f64>) {
        *self.stopped.lock().unwrap() += 1;
    }

    fn apply_automation(&self, _params: &ParamsMap, _at_time: f64) {}

    fn has_release_sustain(&self) -> bool {
        self.sustain
    }
}

pub struct TestInstruments {
    pub handles: HashMap<String, Arc<RecordedInstrument>>,
}

impl TestInstruments {
    pub fn new(handles: HashMap<String, Arc<RecordedInstrument>>) -> Self {
        Self { handles }
    }
}

impl InstrumentRegistry for TestInstruments {
    fn get(&self, instrument_id: &str) -> Option<Arc<dyn InstrumentHandle>> {
        self.handles.get(instrument_id).map(|h| h.clone() as Arc<dyn InstrumentHandle>)
    }
}

pub struct TestStore {
    pub pattern: Pattern,
    pub tracks: Vec<Track>,
    pub clips: Vec<AudioClip>,
}

impl TestStore {
    pub fn new(pattern: Pattern) -> Self {
        Self {
            pattern,
            tracks: Vec::new(),
            clips: Vec::new(),
        }
    }
}

impl ArrangementStore for TestStore {
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

pub struct NoAutomation;

impl AutomationManager for NoAutomation {
    fn get_lanes(&self, _pattern_id: &str, _instrument_id: &str) -> Vec<AutomationLane> {
        Vec::new()
    }
}

pub struct NoMixer;

impl MixerRegistry for NoMixer {
    fn get(&self, _channel_id: &str) -> Option<Arc<dyn MixerChannelHandle>> {
        None
    }
}

pub struct NoAudioSources;

impl AudioSourceRegistry for NoAudioSources {
    fn resolve(&self, _asset_id: &str, _mixer_channel_id: &str) -> Option<Arc<dyn AudioSourceHandle>> {
        None
    }
}

/// An effect registry with one silent passthrough effect, used only by the
/// test that exercises `SchedulerCollaborators::effects` at all.
pub struct RecordingEffect {
    pub applied: Mutex<Vec<(String, f64)>>,
}

impl Default for RecordingEffect {
    fn default() -> Self {
        Self { applied: Mutex::new(Vec::new()) }
    }
}

impl EffectHandle for RecordingEffect {
    fn update_params(&self, params: &ParamsMap) {
        let mut applied = self.applied.lock().unwrap();
        for (k, v) in params {
            applied.push((k.clone(), *v));
        }
    }
}

pub struct TestEffects {
    pub effect: Arc<RecordingEffect>,
}

impl EffectRegistry for TestEffects {
    fn get(&self, _effect_id: &str) -> Option<Arc<dyn EffectHandle>> {
        Some(self.effect.clone() as Arc<dyn EffectHandle>)
    }
}
