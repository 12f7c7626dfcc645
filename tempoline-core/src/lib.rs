//! # tempoline-core
//!
//! Playback scheduling core for a digital audio workstation: a tick-driven
//! transport clock with look-ahead scheduling, a content scheduler that
//! materializes pattern notes, song-arrangement clips, and automation into
//! timed events, and voice bookkeeping that prevents stuck notes across
//! overlaps and loop restarts.
//!
//! The crate is host-agnostic: it never touches an audio device, a UI
//! toolkit, or a project file format. It only ever calls through the narrow
//! collaborator traits in [`collaborators`] — the host supplies live
//! instrument/effect/mixer/audio-source handles and a read-only snapshot of
//! the pattern/arrangement data.
//!
//! [`scheduler::PlaybackScheduler`] is the single entry point most hosts
//! need; the other modules are exposed for hosts that want to drive the
//! transport or content scheduler directly.

pub mod audio_clip_scheduler;
pub mod automation_scheduler;
pub mod bus;
pub mod collaborators;
pub mod config;
pub mod content_scheduler;
pub mod dirty;
pub mod edit;
pub mod error;
pub mod event_queue;
pub mod events;
pub mod loop_restart;
pub mod model;
pub mod note_scheduler;
pub mod position;
pub mod scheduler;
pub mod time;
pub mod transport;
pub mod voices;

pub use collaborators::{
    ArrangementStore, AudioSourceHandle, AudioSourceRegistry, AutomationManager, EffectHandle, EffectRegistry, InstrumentHandle,
    InstrumentRegistry, MixerChannelHandle, MixerRegistry, NoEffects, ParamsMap,
};
pub use config::SchedulerConfig;
pub use content_scheduler::PlaybackMode;
pub use edit::EditEvent;
pub use error::{ScheduleError, Result};
pub use events::TransportEvent;
pub use model::{
    AssetId, AudioClip, AutomationLane, AutomationPoint, ClipId, ClipKind, ExtendedParams, Interpolation, InstrumentId,
    MixerChannelId, Note, NoteId, NoteLength, Pattern, PatternId, Pitch, Slide, Track, TrackId,
};
pub use scheduler::{PlaybackScheduler, SchedulerCollaborators};
pub use transport::Transport;
