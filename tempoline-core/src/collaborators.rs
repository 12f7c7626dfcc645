//! External interfaces this crate consumes (spec §6 "Required collaborators").
//!
//! Everything here is a narrow trait the audio graph, project store, and
//! automation system implement. The scheduler only ever calls these methods
//! — it never reaches into an instrument's or effect's internals, and it
//! treats pattern/arrangement data as a read-only snapshot.

use std::collections::HashMap;
use std::sync::Arc;

use crate::model::{AudioClip, AutomationLane, ExtendedParams, MixerChannelId, Pattern, Pitch, Track};

pub type ParamsMap = HashMap<String, f64>;

/// Dynamic-dispatch capability set for a synth/sampler/external instrument
/// (spec §6, §9 "dynamic dispatch over instruments/effects").
pub trait InstrumentHandle: Send + Sync {
    fn trigger_note(
        &self,
        pitch: Pitch,
        velocity: f32,
        at_time: f64,
        duration: f64,
        extended_params: Option<&ExtendedParams>,
    );

    fn release_note(&self, pitch: Pitch, at_time: f64, release_velocity: Option<f32>);

    fn all_notes_off(&self, at_time: f64, fade_time: Option<f64>);

    /// Emergency stop; also used to flush any voices left by a crashed cycle.
    fn stop_all(&self, fade_time: Option<f64>);

    fn apply_automation(&self, params: &ParamsMap, at_time: f64);

    /// Percussive instruments may opt out of note-off scheduling entirely
    /// (spec §4.5 step 11).
    fn has_release_sustain(&self) -> bool;

    fn active_sources_count(&self) -> Option<usize> {
        None
    }
}

pub trait EffectHandle: Send + Sync {
    fn update_params(&self, params: &ParamsMap);

    /// Flush any effect tail (reverb/delay) on stop. Default no-op.
    fn flush(&self) {}

    fn reset(&self) {}
}

/// Resolves instrument ids to live handles. The audio graph owns the
/// handles' lifetimes; the scheduler only ever holds a strong reference for
/// the duration of a single dispatch.
pub trait InstrumentRegistry {
    fn get(&self, instrument_id: &str) -> Option<Arc<dyn InstrumentHandle>>;

    /// One synchronous re-sync attempt when an instrument id is missing
    /// (spec §7 "Missing instrument reference"). Default just re-queries.
    fn resync(&self, instrument_id: &str) -> Option<Arc<dyn InstrumentHandle>> {
        self.get(instrument_id)
    }
}

pub trait EffectRegistry {
    fn get(&self, effect_id: &str) -> Option<Arc<dyn EffectHandle>>;

    fn all(&self) -> Vec<Arc<dyn EffectHandle>> {
        Vec::new()
    }
}

/// A no-op effect registry for setups with no per-track effects.
pub struct NoEffects;

impl EffectRegistry for NoEffects {
    fn get(&self, _effect_id: &str) -> Option<Arc<dyn EffectHandle>> {
        None
    }
}

pub trait AutomationManager {
    fn get_lanes(&self, pattern_id: &str, instrument_id: &str) -> Vec<AutomationLane>;
}

/// Target of a scheduled-automation setter call (spec §4.7 mode 1: mixer
/// gain/pan/mute/solo). Not one of the §6-listed required collaborators, but
/// the automation targets it names need some handle to call through.
pub trait MixerChannelHandle: Send + Sync {
    fn set_param(&self, parameter: &str, value: f64);
    fn set_mute(&self, muted: bool);
    fn set_solo(&self, solo: bool);
}

pub trait MixerRegistry {
    fn get(&self, channel_id: &str) -> Option<Arc<dyn MixerChannelHandle>>;
}

/// One playing audio-clip source (spec §4.6: "Track the audio node group …
/// for targeted stop"). The audio graph owns the actual source/gain/pan
/// node chain; the scheduler only ever starts, stops, or asks whether it has
/// ended.
pub trait AudioSourceHandle: Send + Sync {
    #[allow(clippy::too_many_arguments)]
    fn start(
        &self,
        at_time: f64,
        offset_seconds: f64,
        duration_seconds: f64,
        gain_linear: f64,
        pan: f64,
        fade_in_seconds: f64,
        fade_out_seconds: f64,
        playback_rate: f64,
    );

    fn stop(&self, fade_time: Option<f64>);

    fn has_ended(&self) -> bool {
        false
    }
}

/// Resolves an asset id to a fresh, not-yet-started source handle (spec
/// §4.6: "Resolve AudioBuffer by asset_id → sample_id → embedded buffer").
pub trait AudioSourceRegistry {
    fn resolve(&self, asset_id: &str, mixer_channel_id: &str) -> Option<Arc<dyn AudioSourceHandle>>;

    /// Asset-level default mixer routing, the second tier of the clip
    /// routing chain (spec §4.6: "unique clip metadata → asset metadata →
    /// track default → master"). Registries that don't track a per-asset
    /// default can leave this unimplemented.
    fn default_mixer_channel(&self, _asset_id: &str) -> Option<MixerChannelId> {
        None
    }
}

/// Read-only snapshot of pattern/arrangement project data (spec §3 "Patterns
/// and clips are snapshots read under a read lock during scheduling").
pub trait ArrangementStore {
    fn active_pattern_id(&self) -> Option<String>;
    fn pattern(&self, id: &str) -> Option<&Pattern>;
    fn clips(&self) -> &[AudioClip];
    fn tracks(&self) -> &[Track];

    fn track(&self, id: &str) -> Option<&Track> {
        self.tracks().iter().find(|t| t.id == id)
    }
}
