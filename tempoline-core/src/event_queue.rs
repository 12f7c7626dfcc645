//! Time-ordered deferred dispatch (spec §4.2).
//!
//! A min-heap keyed on `audio_time`, with insertion order as a tie-break so
//! same-time entries dispatch FIFO (spec §5 "within a single source time,
//! events dispatch FIFO"). Grounded on the teacher's
//! `cadence-core/types/scheduled_event.rs` reversed-`Ord` min-heap trick and
//! `src/audio/scheduler.rs`'s pop-while-due sweep, generalized from a single
//! `ScheduledAction` enum to an opaque callback plus structured metadata so
//! callers can cancel by predicate.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::model::{ClipId, InstrumentId, NoteId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    NoteOn,
    NoteOff,
    Automation,
    AudioClip,
}

/// Tag data carried alongside every queued callback (spec §3 "Event queue
/// entry"). Used for predicate-filtered cancellation, never for dispatch
/// itself.
#[derive(Debug, Clone, Default)]
pub struct EventMetadata {
    pub kind: Option<EventKind>,
    pub instrument_id: Option<InstrumentId>,
    pub note_id: Option<NoteId>,
    pub clip_id: Option<ClipId>,
    pub step: Option<f64>,
    /// For `note_off` entries: the `note_on` time they pair with, so a later
    /// cancel-by-note-id can match precisely (spec §4.5 step 11).
    pub scheduled_note_on_time: Option<f64>,
}

impl EventMetadata {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind: Some(kind),
            ..Default::default()
        }
    }
}

pub type EventCallback = Box<dyn FnOnce() + Send>;

pub struct QueuedEvent {
    pub audio_time: f64,
    pub metadata: EventMetadata,
    callback: EventCallback,
    seq: u64,
}

impl QueuedEvent {
    fn key(&self) -> (f64, u64) {
        (self.audio_time, self.seq)
    }
}

impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}
impl Eq for QueuedEvent {}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so `BinaryHeap` (a max-heap) pops the earliest-then-oldest
        // entry first.
        other
            .audio_time
            .partial_cmp(&self.audio_time)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Time-ordered container: enqueue O(log N), pop-all-due amortized O(k),
/// predicate-filtered cancel O(N).
#[derive(Default)]
pub struct EventQueue {
    heap: BinaryHeap<QueuedEvent>,
    next_seq: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Returns the assigned sequence number as an opaque handle (spec §4.1:
    /// "handles are not required to be cancellable individually").
    pub fn push(&mut self, audio_time: f64, metadata: EventMetadata, callback: EventCallback) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(QueuedEvent {
            audio_time,
            metadata,
            callback,
            seq,
        });
        seq
    }

    /// Round an audio time to the nearest sample boundary (spec §4.2
    /// "callbacks receive the sample-accurate scheduled time").
    pub fn snap_to_sample(audio_time: f64, sample_rate: f64) -> f64 {
        if sample_rate <= 0.0 {
            return audio_time;
        }
        (audio_time * sample_rate).round() / sample_rate
    }

    /// Pop and invoke every entry with `audio_time <= horizon`, earliest (and
    /// within a tie, oldest) first.
    pub fn drain_due(&mut self, horizon: f64) -> usize {
        let mut dispatched = 0;
        while let Some(top) = self.heap.peek() {
            if top.audio_time > horizon {
                break;
            }
            let event = self.heap.pop().expect("peeked Some");
            (event.callback)();
            dispatched += 1;
        }
        dispatched
    }

    /// Remove every entry matching `predicate`. With no predicate (`|_| true`)
    /// this clears the whole queue (spec §4.1 `clear_scheduled_events`).
    /// Returns the number of entries removed.
    pub fn cancel_matching(&mut self, predicate: impl Fn(&EventMetadata) -> bool) -> usize {
        let before = self.heap.len();
        let kept: Vec<QueuedEvent> = self
            .heap
            .drain()
            .filter(|e| !predicate(&e.metadata))
            .collect();
        let removed = before - kept.len();
        self.heap = BinaryHeap::from(kept);
        removed
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    /// Used by the note scheduler's immediate mid-playback insertion to
    /// avoid double-scheduling a note already in the future queue (spec
    /// §4.5 "duplicate-prevention").
    pub fn contains_note_id(&self, note_id: u64) -> bool {
        self.heap.iter().any(|e| e.metadata.note_id == Some(note_id))
    }
}
