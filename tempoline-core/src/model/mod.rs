//! Playback data model (spec §3). These are plain, serialization-free
//! structs — the scheduler reads them through the store traits in
//! [`crate::collaborators`] as immutable snapshots, never mutating them.

pub mod automation;
pub mod clip;
pub mod ids;
pub mod note;
pub mod pattern;
pub mod track;

pub use automation::{AutomationLane, AutomationPoint, Interpolation};
pub use clip::{AudioClip, ClipKind};
pub use ids::{AssetId, ClipId, InstrumentId, MixerChannelId, NoteId, PatternId, Pitch, TrackId};
pub use note::{ExtendedParams, Note, NoteLength, Slide};
pub use pattern::Pattern;
pub use track::{any_soloed, is_track_audible, Track};
