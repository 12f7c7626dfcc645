//! Opaque identifier aliases shared across the data model (spec §3).
//!
//! These come from the project/asset systems that own the pattern and
//! arrangement stores — this crate never allocates them, only compares and
//! formats them (e.g. the mixer-insert fallback name `"arr-{track_id}"` in
//! §4.6).

pub type NoteId = u64;
pub type InstrumentId = String;
pub type PatternId = String;
pub type TrackId = String;
pub type ClipId = String;
pub type AssetId = String;
pub type MixerChannelId = String;

/// MIDI-style pitch number. The scheduler never interprets pitch beyond
/// equality (for overlap/voice bookkeeping) and pass-through to instrument
/// handles.
pub type Pitch = u8;
