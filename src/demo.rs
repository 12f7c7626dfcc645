//! Wires a tiny two-instrument, two-pattern project into the collaborator
//! traits [`tempoline_core::collaborators`] expects, grounded on the
//! teacher's in-memory `SharedEnvironment` (a plain owned store handed to the
//! evaluator by reference) rather than anything database-backed.

use std::sync::Arc;

use tempoline_core::{
    AudioClip, AudioSourceHandle, AudioSourceRegistry, AutomationLane, AutomationManager, InstrumentHandle, InstrumentRegistry,
    MixerChannelHandle, MixerRegistry, Note, Pattern, Track,
};

use crate::synth::{ClickInstrument, SineSynth};

pub const LEAD: &str = "lead";
pub const KICK: &str = "kick";

/// Builds the "lead plays a rising four-note line over a four-on-the-floor
/// kick" demo pattern, two bars long.
pub fn build_pattern(lead: Arc<SineSynth>, kick: Arc<ClickInstrument>) -> (Pattern, InstrumentMap) {
    let mut pattern = Pattern::new("demo-pattern", "Demo Loop");
    for (i, pitch) in [60u8, 64, 67, 71].into_iter().enumerate() {
        pattern.add_note(LEAD, Note::new(i as u64, pitch, (i * 4) as f64, 3.0, 0.8));
    }
    for i in 0..4u64 {
        pattern.add_note(KICK, Note::new(100 + i, 36, (i * 4) as f64, 0.1, 1.0));
    }

    let map = InstrumentMap { lead, kick };
    (pattern, map)
}

pub struct InstrumentMap {
    lead: Arc<SineSynth>,
    kick: Arc<ClickInstrument>,
}

pub struct DemoInstruments {
    map: InstrumentMap,
}

impl DemoInstruments {
    pub fn new(map: InstrumentMap) -> Self {
        Self { map }
    }
}

impl InstrumentRegistry for DemoInstruments {
    fn get(&self, instrument_id: &str) -> Option<Arc<dyn InstrumentHandle>> {
        match instrument_id {
            LEAD => Some(self.map.lead.clone() as Arc<dyn InstrumentHandle>),
            KICK => Some(self.map.kick.clone() as Arc<dyn InstrumentHandle>),
            _ => None,
        }
    }
}

/// No mixer sends in the demo; every lookup misses, which the scheduler
/// treats as "automation target not found — skip this point" (spec'd as a
/// recoverable no-op, not an error).
pub struct DemoMixer;

impl MixerRegistry for DemoMixer {
    fn get(&self, _channel_id: &str) -> Option<Arc<dyn MixerChannelHandle>> {
        None
    }
}

pub struct DemoAudioSources;

impl AudioSourceRegistry for DemoAudioSources {
    fn resolve(&self, _asset_id: &str, _mixer_channel_id: &str) -> Option<Arc<dyn AudioSourceHandle>> {
        None
    }
}

/// No scheduled-automation lanes in the demo pattern.
pub struct DemoAutomation;

impl AutomationManager for DemoAutomation {
    fn get_lanes(&self, _pattern_id: &str, _instrument_id: &str) -> Vec<AutomationLane> {
        Vec::new()
    }
}

pub struct DemoStore {
    pattern: Pattern,
    clips: Vec<AudioClip>,
    tracks: Vec<Track>,
}

impl DemoStore {
    pub fn new(pattern: Pattern) -> Self {
        let tracks = vec![Track::new("track-1")];
        let clips = vec![AudioClip::pattern_clip("clip-1", "track-1", pattern.id.clone(), 0.0, 8.0)];
        Self { pattern, clips, tracks }
    }
}

impl tempoline_core::ArrangementStore for DemoStore {
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
