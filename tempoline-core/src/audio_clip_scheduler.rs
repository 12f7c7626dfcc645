//! Audio-clip scheduling (spec §4.6): resolve a clip's asset, compute gain/
//! pan/fade parameters, and place it either starting immediately (if the
//! transport is already inside the clip) or at a future absolute time.

use std::collections::HashMap;
use std::sync::Arc;

use crate::collaborators::{AudioSourceHandle, AudioSourceRegistry, MixerRegistry};
use crate::event_queue::{EventKind, EventMetadata};
use crate::model::{AudioClip, ClipId};
use crate::transport::Transport;

/// Routing destination used when nothing else in the chain resolves to a
/// live mixer channel (spec §4.6 routing chain's last tier).
pub const MASTER_MIXER_CHANNEL_ID: &str = "master";

/// Clip mixer routing (spec §4.6: "unique clip metadata → asset metadata →
/// track default → master"). Falls through to master only when the track
/// default channel itself doesn't resolve to a live handle.
fn resolve_mixer_channel(clip: &AudioClip, audio_sources: &dyn AudioSourceRegistry, mixer: &dyn MixerRegistry) -> String {
    if let Some(channel_id) = clip.mixer_channel_id.clone() {
        return channel_id;
    }
    if let Some(asset_id) = &clip.asset_id {
        if let Some(channel_id) = audio_sources.default_mixer_channel(asset_id) {
            return channel_id;
        }
    }
    let track_default = format!("arr-{}", clip.track_id);
    if mixer.get(&track_default).is_some() {
        track_default
    } else {
        MASTER_MIXER_CHANNEL_ID.to_string()
    }
}

fn gain_linear(clip: &AudioClip) -> f64 {
    let gain_db = clip.gain_db.unwrap_or(0.0);
    let volume = clip.volume.unwrap_or(1.0);
    10f64.powf(gain_db / 20.0) * volume
}

/// Tracks live clip playback for targeted stop (spec §4.6 "Track the audio
/// node group … for targeted stop on stop_all, clear_by_clip, and loop/pause
/// events").
#[derive(Default)]
pub struct ActiveAudioSources {
    sources: HashMap<ClipId, Arc<dyn AudioSourceHandle>>,
}

impl ActiveAudioSources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, clip_id: ClipId, handle: Arc<dyn AudioSourceHandle>) {
        self.sources.insert(clip_id, handle);
    }

    pub fn stop_all(&mut self, fade_time: Option<f64>) {
        for handle in self.sources.values() {
            handle.stop(fade_time);
        }
        self.sources.clear();
    }

    pub fn clear_by_clip(&mut self, clip_id: &str, fade_time: Option<f64>) {
        if let Some(handle) = self.sources.remove(clip_id) {
            handle.stop(fade_time);
        }
    }

    /// Disconnect nodes whose source has already ended (spec §4.6 "On
    /// source-end, disconnect all nodes and remove from the active list").
    pub fn prune_ended(&mut self) {
        self.sources.retain(|_, h| !h.has_ended());
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

pub struct AudioClipScheduleOutcome {
    pub start_at: f64,
    pub offset_seconds: f64,
    pub duration_seconds: f64,
    pub started_immediately: bool,
}

/// Schedule one audio clip (spec §4.6). `current_position_seconds` and
/// `base_time` mirror the note scheduler's `current_pos_seconds`/`base`:
/// the transport's logical position and the anchor time for that position.
#[allow(clippy::too_many_arguments)]
pub fn schedule_audio_clip(
    clip: &AudioClip,
    base_time: f64,
    current_position_seconds: f64,
    bpm: f64,
    now: f64,
    registry: &dyn AudioSourceRegistry,
    mixer: &dyn MixerRegistry,
    active: &mut ActiveAudioSources,
    transport: &mut Transport,
) -> Option<AudioClipScheduleOutcome> {
    let asset_id = clip.asset_id.as_ref()?;
    let mixer_channel_id = resolve_mixer_channel(clip, registry, mixer);
    let handle = registry.resolve(asset_id, &mixer_channel_id)?;

    let clip_start_seconds = clip.start_beats * 60.0 / bpm;
    let clip_end_seconds = clip_start_seconds + clip.duration_beats * 60.0 / bpm;

    let (start_at, offset_seconds, duration_seconds, started_immediately) =
        if current_position_seconds >= clip_start_seconds && current_position_seconds < clip_end_seconds {
            let offset = current_position_seconds - clip_start_seconds + clip.sample_offset_seconds.unwrap_or(0.0);
            let remaining = (clip_end_seconds - clip_start_seconds) - (current_position_seconds - clip_start_seconds);
            (base_time, offset, remaining.max(0.0), true)
        } else {
            let absolute = base_time + (clip_start_seconds - current_position_seconds);
            (
                absolute,
                clip.sample_offset_seconds.unwrap_or(0.0),
                clip_end_seconds - clip_start_seconds,
                false,
            )
        };

    if !started_immediately && start_at < now {
        return None;
    }

    let gain = gain_linear(clip);
    let pan = clip.pan.unwrap_or(0.0);
    let fade_in = clip.fade_in_beats.unwrap_or(0.0) * 60.0 / bpm;
    let fade_out = clip.fade_out_beats.unwrap_or(0.0) * 60.0 / bpm;
    let playback_rate = clip.playback_rate.unwrap_or(1.0);

    active.register(clip.id.clone(), handle.clone());

    let snapped_start = transport.snap_to_sample(start_at);
    let mut metadata = EventMetadata::new(EventKind::AudioClip);
    metadata.clip_id = Some(clip.id.clone());

    transport.schedule_event(
        now,
        snapped_start,
        metadata,
        Box::new(move || {
            handle.start(
                snapped_start,
                offset_seconds,
                duration_seconds,
                gain,
                pan,
                fade_in,
                fade_out,
                playback_rate,
            );
        }),
    );

    Some(AudioClipScheduleOutcome {
        start_at: snapped_start,
        offset_seconds,
        duration_seconds,
        started_immediately,
    })
}
