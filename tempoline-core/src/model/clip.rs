//! `AudioClip` entity (spec §3): a clip on the arrangement timeline, either a
//! looped pattern reference or a rendered audio asset.

use super::ids::{AssetId, ClipId, MixerChannelId, PatternId, TrackId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipKind {
    Pattern,
    Audio,
}

#[derive(Debug, Clone)]
pub struct AudioClip {
    pub id: ClipId,
    pub kind: ClipKind,
    pub track_id: TrackId,
    pub start_beats: f64,
    pub duration_beats: f64,

    // Pattern-clip fields.
    pub pattern_id: Option<PatternId>,
    pub pattern_offset_steps: Option<f64>,

    // Audio-clip fields.
    pub asset_id: Option<AssetId>,
    pub sample_offset_seconds: Option<f64>,
    pub gain_db: Option<f64>,
    pub volume: Option<f64>,
    pub pan: Option<f64>,
    pub fade_in_beats: Option<f64>,
    pub fade_out_beats: Option<f64>,
    pub playback_rate: Option<f64>,
    pub mixer_channel_id: Option<MixerChannelId>,
}

impl AudioClip {
    pub fn pattern_clip(
        id: impl Into<ClipId>,
        track_id: impl Into<TrackId>,
        pattern_id: impl Into<PatternId>,
        start_beats: f64,
        duration_beats: f64,
    ) -> Self {
        Self {
            id: id.into(),
            kind: ClipKind::Pattern,
            track_id: track_id.into(),
            start_beats,
            duration_beats,
            pattern_id: Some(pattern_id.into()),
            pattern_offset_steps: Some(0.0),
            asset_id: None,
            sample_offset_seconds: None,
            gain_db: None,
            volume: None,
            pan: None,
            fade_in_beats: None,
            fade_out_beats: None,
            playback_rate: None,
            mixer_channel_id: None,
        }
    }

    pub fn audio_clip(
        id: impl Into<ClipId>,
        track_id: impl Into<TrackId>,
        asset_id: impl Into<AssetId>,
        start_beats: f64,
        duration_beats: f64,
    ) -> Self {
        Self {
            id: id.into(),
            kind: ClipKind::Audio,
            track_id: track_id.into(),
            start_beats,
            duration_beats,
            pattern_id: None,
            pattern_offset_steps: None,
            asset_id: Some(asset_id.into()),
            sample_offset_seconds: None,
            gain_db: None,
            volume: None,
            pan: None,
            fade_in_beats: None,
            fade_out_beats: None,
            playback_rate: None,
            mixer_channel_id: None,
        }
    }

    pub fn with_pattern_offset(mut self, offset_steps: f64) -> Self {
        self.pattern_offset_steps = Some(offset_steps);
        self
    }

    pub fn end_beats(&self) -> f64 {
        self.start_beats + self.duration_beats
    }
}
