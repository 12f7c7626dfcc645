//! Content scheduler (spec §4.4): walks pattern/clip/automation snapshots
//! and materializes them into the event queue and real-time automation
//! registry. Debounce coalescing, scope resolution, and the pattern/song
//! mode walks are grounded on the same translation primitives as
//! [`crate::note_scheduler`].

use std::collections::HashSet;

use crate::audio_clip_scheduler::{schedule_audio_clip, ActiveAudioSources};
use crate::automation_scheduler::{AutomationSinks, AutomationTarget, RealtimeAutomation};
use crate::collaborators::{ArrangementStore, AudioSourceRegistry, AutomationManager, InstrumentRegistry, MixerRegistry};
use crate::config::DebounceConfig;
use crate::event_queue::{EventKind, EventMetadata};
use crate::model::{is_track_audible, AudioClip, ClipKind, InstrumentId, Pattern};
use crate::note_scheduler::{resolve_absolute_time, schedule_note};
use crate::transport::Transport;
use crate::voices::VoiceBookkeeper;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackMode {
    Pattern,
    Song,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulePriority {
    Burst,
    Realtime,
    Idle,
    Auto,
}

impl Default for SchedulePriority {
    fn default() -> Self {
        SchedulePriority::Auto
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleScope {
    Auto,
    Notes,
    All,
}

impl Default for ScheduleScope {
    fn default() -> Self {
        ScheduleScope::Auto
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScheduleRequest {
    pub reason: Option<String>,
    pub force: bool,
    pub scope: ScheduleScope,
    pub instrument_filter: Vec<InstrumentId>,
    pub priority: SchedulePriority,
    pub append: bool,
    pub base_audio_time: Option<f64>,
}

fn bypasses_debounce(request: &ScheduleRequest) -> bool {
    request.force || request.scope == ScheduleScope::All || request.append
}

fn resolve_delay_ms(priority: SchedulePriority, is_playing: bool, cfg: &DebounceConfig) -> u64 {
    match priority {
        SchedulePriority::Burst => cfg.burst_ms,
        SchedulePriority::Realtime => cfg.realtime_ms,
        SchedulePriority::Idle => cfg.idle_ms,
        SchedulePriority::Auto => {
            if is_playing {
                cfg.realtime_ms
            } else {
                cfg.idle_ms
            }
        }
    }
}

/// Coalesces rapid scheduling requests (spec §4.4 "Debounce / priority").
/// Driven cooperatively by [`Debouncer::poll`] on the same real-time loop
/// that runs the transport sweep — there is no sleep or background timer.
#[derive(Default)]
pub struct Debouncer {
    pending: Option<(ScheduleRequest, f64)>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Submit a request. Returns it immediately if it bypasses debouncing;
    /// otherwise arms (or replaces) the pending timer and returns `None`.
    pub fn submit(
        &mut self,
        request: ScheduleRequest,
        now: f64,
        is_playing: bool,
        cfg: &DebounceConfig,
    ) -> Option<ScheduleRequest> {
        if bypasses_debounce(&request) {
            self.pending = None;
            return Some(request);
        }
        let delay_ms = resolve_delay_ms(request.priority, is_playing, cfg);
        self.pending = Some((request, now + delay_ms as f64 / 1000.0));
        None
    }

    /// Re-enter the debounce timer on the real-time loop; fires the pending
    /// request once its delay has elapsed.
    pub fn poll(&mut self, now: f64) -> Option<ScheduleRequest> {
        let fire = matches!(&self.pending, Some((_, fire_at)) if now >= *fire_at);
        if fire {
            self.pending.take().map(|(r, _)| r)
        } else {
            None
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// Promote `request.scope` to the effective scope for this pass (spec §4.4
/// "Scope resolution").
pub fn resolve_scope(request: &ScheduleRequest, mode: PlaybackMode, dirty_instruments_nonempty: bool, dirty_global: bool) -> ScheduleScope {
    let mut scope = match request.scope {
        ScheduleScope::Auto => {
            if !request.instrument_filter.is_empty() || dirty_instruments_nonempty {
                ScheduleScope::Notes
            } else {
                ScheduleScope::All
            }
        }
        other => other,
    };
    if dirty_global || mode == PlaybackMode::Song || request.force {
        scope = ScheduleScope::All;
    }
    scope
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScheduleMetrics {
    pub notes_scheduled: usize,
    pub instrument_count: usize,
}

fn is_resume_or_note_edit(request: &ScheduleRequest) -> bool {
    request.append || matches!(request.reason.as_deref(), Some("note_edit") | Some("resume"))
}

/// Clamp (or loop-wrap) `current_position_steps` to the loop bounds per spec
/// §4.4 pattern-mode step 1.
fn effective_position(request: &ScheduleRequest, current_position_steps: f64, loop_enabled: bool, loop_start: f64, loop_end: f64) -> f64 {
    if !loop_enabled || (current_position_steps >= loop_start && current_position_steps < loop_end) {
        return current_position_steps;
    }
    let len = loop_end - loop_start;
    if is_resume_or_note_edit(request) && len > 0.0 {
        loop_start + (current_position_steps - loop_start).rem_euclid(len)
    } else {
        loop_start
    }
}

fn instruments_to_visit(pattern: &Pattern, scope: ScheduleScope, filter: &[InstrumentId]) -> Vec<InstrumentId> {
    match scope {
        ScheduleScope::Notes if !filter.is_empty() => {
            let present: HashSet<&InstrumentId> = pattern.instrument_ids().collect();
            filter.iter().filter(|id| present.contains(id)).cloned().collect()
        }
        _ => pattern.instrument_ids().cloned().collect(),
    }
}

/// Resolve `target`'s handle now and enqueue a callback that applies `value`
/// at its scheduled time (spec §4.7 mode 1). Handles are resolved eagerly
/// rather than at dispatch time: they are `Arc<dyn ... + Send + Sync>`, so
/// capturing the already-resolved handle in the callback is both cheaper and
/// avoids borrowing the non-`'static` registries into a queued closure.
fn enqueue_automation_point(
    target: &AutomationTarget,
    value: f64,
    absolute: f64,
    time_step: f64,
    now: f64,
    transport: &mut Transport,
    sinks: &AutomationSinks,
) {
    let snapped = transport.snap_to_sample(absolute);
    let mut meta = EventMetadata::new(EventKind::Automation);
    meta.step = Some(time_step);

    match target {
        AutomationTarget::Instrument { instrument_id, parameter } => {
            let Some(handle) = sinks.instruments.get(instrument_id) else {
                log::warn!("scheduled automation: no instrument handle for {instrument_id}");
                return;
            };
            let parameter = parameter.clone();
            transport.schedule_event(
                now,
                snapped,
                meta,
                Box::new(move || {
                    let mut params = crate::collaborators::ParamsMap::new();
                    params.insert(parameter, value);
                    handle.apply_automation(&params, snapped);
                }),
            );
        }
        AutomationTarget::Effect { effect_id, parameter } => {
            let Some(handle) = sinks.effects.get(effect_id) else {
                log::warn!("scheduled automation: no effect handle for {effect_id}");
                return;
            };
            let parameter = parameter.clone();
            transport.schedule_event(
                now,
                snapped,
                meta,
                Box::new(move || {
                    let mut params = crate::collaborators::ParamsMap::new();
                    params.insert(parameter, value);
                    handle.update_params(&params);
                }),
            );
        }
        AutomationTarget::Mixer { channel_id, parameter } => {
            let Some(handle) = sinks.mixer.get(channel_id) else {
                log::warn!("scheduled automation: no mixer channel for {channel_id}");
                return;
            };
            let parameter = parameter.clone();
            transport.schedule_event(
                now,
                snapped,
                meta,
                Box::new(move || match parameter.as_str() {
                    "mute" => handle.set_mute(value != 0.0),
                    "solo" => handle.set_solo(value != 0.0),
                    other => handle.set_param(other, value),
                }),
            );
        }
    }
}

/// Enqueue every scheduled-automation point in `pattern.automation` whose
/// target parses (spec §4.7 mode 1).
#[allow(clippy::too_many_arguments)]
fn schedule_pattern_automation(
    pattern: &Pattern,
    now: f64,
    base: f64,
    current_pos_seconds: f64,
    seconds_per_step: f64,
    loop_enabled: bool,
    loop_duration_seconds: f64,
    transport: &mut Transport,
    sinks: &AutomationSinks,
) {
    for (raw_target, points) in &pattern.automation {
        let Some(target) = AutomationTarget::parse(raw_target) else {
            log::warn!("scheduled automation: unparseable target {raw_target}");
            continue;
        };
        for point in points {
            let Some(absolute) = resolve_absolute_time(
                point.time_step,
                base,
                current_pos_seconds,
                seconds_per_step,
                loop_enabled,
                loop_duration_seconds,
            ) else {
                continue;
            };
            enqueue_automation_point(&target, point.value, absolute, point.time_step, now, transport, sinks);
        }
    }
}

/// Schedule one instrument's notes and real-time automation for the active
/// pattern (spec §4.4 pattern-mode steps 2-4).
#[allow(clippy::too_many_arguments)]
fn schedule_instrument(
    pattern: &Pattern,
    instrument_id: &InstrumentId,
    now: f64,
    base: f64,
    current_pos_seconds: f64,
    seconds_per_step: f64,
    loop_enabled: bool,
    loop_duration_seconds: f64,
    overlap_min_fade_seconds: f64,
    voices: &mut VoiceBookkeeper,
    instruments: &dyn InstrumentRegistry,
    automation: &dyn AutomationManager,
    realtime_automation: &mut RealtimeAutomation,
    transport: &mut Transport,
) -> usize {
    let handle = match instruments.get(instrument_id) {
        Some(h) => h,
        None => match instruments.resync(instrument_id) {
            Some(h) => h,
            None => {
                log::warn!("content scheduler: no instrument handle for {instrument_id}, skipping for this cycle");
                return 0;
            }
        },
    };

    let lanes = automation.get_lanes(&pattern.id, instrument_id);
    let pattern_length = pattern.length_steps() as f64;
    let mut scheduled = 0;

    for note in pattern.notes_for(instrument_id) {
        let outcome = schedule_note(
            note,
            instrument_id,
            pattern_length,
            now,
            base,
            current_pos_seconds,
            seconds_per_step,
            loop_enabled,
            loop_duration_seconds,
            overlap_min_fade_seconds,
            voices,
            &handle,
            &lanes,
            transport,
        );
        if outcome.is_some() {
            scheduled += 1;
        }
    }

    realtime_automation.start(instrument_id.clone(), lanes);
    scheduled
}

/// Full pattern-mode scheduling pass (spec §4.4).
#[allow(clippy::too_many_arguments)]
pub fn schedule_pattern_mode(
    request: &ScheduleRequest,
    now: f64,
    current_position_steps: f64,
    overlap_min_fade_seconds: f64,
    transport: &mut Transport,
    store: &dyn ArrangementStore,
    instruments: &dyn InstrumentRegistry,
    automation: &dyn AutomationManager,
    voices: &mut VoiceBookkeeper,
    realtime_automation: &mut RealtimeAutomation,
    automation_sinks: &AutomationSinks,
) -> ScheduleMetrics {
    let mut metrics = ScheduleMetrics::default();

    let Some(pattern_id) = store.active_pattern_id() else {
        return metrics;
    };
    let Some(pattern) = store.pattern(&pattern_id) else {
        log::warn!("content scheduler: active pattern {pattern_id} missing from store");
        return metrics;
    };

    let loop_info = transport.loop_info();
    let position = effective_position(
        request,
        current_position_steps,
        loop_info.enabled,
        loop_info.start_step as f64,
        loop_info.end_step as f64,
    );

    let seconds_per_step = transport.steps_to_seconds(1.0);
    let current_pos_seconds = position * seconds_per_step;
    let base = request.base_audio_time.unwrap_or(now);
    let loop_duration_seconds = (loop_info.end_step.saturating_sub(loop_info.start_step)) as f64 * seconds_per_step;

    let scope = resolve_scope(request, PlaybackMode::Pattern, !request.instrument_filter.is_empty(), false);
    let targets = instruments_to_visit(pattern, scope, &request.instrument_filter);

    for instrument_id in &targets {
        let scheduled = schedule_instrument(
            pattern,
            instrument_id,
            now,
            base,
            current_pos_seconds,
            seconds_per_step,
            loop_info.enabled,
            loop_duration_seconds,
            overlap_min_fade_seconds,
            voices,
            instruments,
            automation,
            realtime_automation,
            transport,
        );
        metrics.notes_scheduled += scheduled;
        metrics.instrument_count += 1;
    }

    schedule_pattern_automation(
        pattern,
        now,
        base,
        current_pos_seconds,
        seconds_per_step,
        loop_info.enabled,
        loop_duration_seconds,
        transport,
        automation_sinks,
    );

    metrics
}

/// Expand a pattern clip's looped source-pattern notes into arrangement-time
/// notes (spec §4.4 "Pattern clip"). Returns `(arrangement_step, note)`
/// pairs; the caller schedules each through [`schedule_note`].
pub fn expand_pattern_clip_notes<'a>(
    clip: &AudioClip,
    pattern: &'a Pattern,
    instrument_id: &str,
    clip_start_step: f64,
    clip_duration_steps: f64,
) -> Vec<(f64, &'a crate::model::Note)> {
    let pattern_length = pattern.length_steps() as f64;
    if pattern_length <= 0.0 {
        return Vec::new();
    }
    let offset = clip.pattern_offset_steps.unwrap_or(0.0);
    let window_start = offset;
    let window_end = offset + clip_duration_steps;

    let mut out = Vec::new();
    let max_loop_index = (window_end / pattern_length).ceil() as i64 + 1;
    for loop_index in 0..=max_loop_index.max(0) {
        let loop_offset = loop_index as f64 * pattern_length;
        if loop_offset >= window_end {
            break;
        }
        for note in pattern.notes_for(instrument_id) {
            let expanded_start = note.start_step + loop_offset;
            if expanded_start >= window_start && expanded_start < window_end {
                let arrangement_step = (expanded_start - offset) + clip_start_step;
                out.push((arrangement_step, note));
            }
        }
    }
    out
}

/// Schedule one arrangement clip (spec §4.4 "Song mode scheduling", §4.6).
/// Shared by the full song-mode rebuild below and by a targeted single-clip
/// reschedule, so a clip property edit doesn't have to rebuild the whole
/// arrangement.
#[allow(clippy::too_many_arguments)]
pub fn schedule_one_clip(
    clip: &AudioClip,
    now: f64,
    current_position_seconds: f64,
    bpm: f64,
    overlap_min_fade_seconds: f64,
    transport: &mut Transport,
    store: &dyn ArrangementStore,
    instruments: &dyn InstrumentRegistry,
    audio_sources: &dyn AudioSourceRegistry,
    mixer: &dyn MixerRegistry,
    voices: &mut VoiceBookkeeper,
    active_audio: &mut ActiveAudioSources,
) -> usize {
    let seconds_per_step = transport.steps_to_seconds(1.0);

    match clip.kind {
        ClipKind::Pattern => {
            let Some(pattern_id) = &clip.pattern_id else { return 0 };
            let Some(pattern) = store.pattern(pattern_id) else {
                log::warn!("content scheduler: clip {} references missing pattern {pattern_id}", clip.id);
                return 0;
            };
            let clip_start_step = clip.start_beats * 4.0;
            let clip_duration_steps = clip.duration_beats * 4.0;
            let mut scheduled = 0;

            for instrument_id in pattern.instrument_ids().cloned().collect::<Vec<_>>() {
                let handle = match instruments.get(&instrument_id) {
                    Some(h) => h,
                    None => match instruments.resync(&instrument_id) {
                        Some(h) => h,
                        None => {
                            log::warn!("content scheduler: no instrument handle for {instrument_id}, skipping clip {}", clip.id);
                            continue;
                        }
                    },
                };
                let expanded = expand_pattern_clip_notes(clip, pattern, &instrument_id, clip_start_step, clip_duration_steps);
                for (arrangement_step, note) in expanded {
                    // `base = now`, `current_pos_seconds` unrelocated: the
                    // relocated note's own `start_step` already carries the
                    // arrangement-time position, so `schedule_note`'s own
                    // past-note check resolves the same absolute time
                    // `expand_pattern_clip_notes` placed it at.
                    let mut relocated = note.clone();
                    relocated.start_step = arrangement_step;
                    if schedule_note(
                        &relocated,
                        &instrument_id,
                        pattern.length_steps() as f64,
                        now,
                        now,
                        current_position_seconds,
                        seconds_per_step,
                        false,
                        0.0,
                        overlap_min_fade_seconds,
                        voices,
                        &handle,
                        &[],
                        transport,
                    )
                    .is_some()
                    {
                        scheduled += 1;
                    }
                }
            }
            scheduled
        }
        ClipKind::Audio => {
            let scheduled =
                schedule_audio_clip(clip, now, current_position_seconds, bpm, now, audio_sources, mixer, active_audio, transport)
                    .is_some();
            scheduled as usize
        }
    }
}

/// Full song-mode scheduling pass (spec §4.4 "Song mode scheduling"): always
/// a full rebuild, visiting every audible clip via [`schedule_one_clip`].
#[allow(clippy::too_many_arguments)]
pub fn schedule_song_mode(
    now: f64,
    current_position_steps: f64,
    current_position_seconds: f64,
    bpm: f64,
    overlap_min_fade_seconds: f64,
    transport: &mut Transport,
    store: &dyn ArrangementStore,
    instruments: &dyn InstrumentRegistry,
    audio_sources: &dyn AudioSourceRegistry,
    mixer: &dyn MixerRegistry,
    voices: &mut VoiceBookkeeper,
    active_audio: &mut ActiveAudioSources,
) -> ScheduleMetrics {
    let mut metrics = ScheduleMetrics::default();
    let any_soloed = crate::model::any_soloed(store.tracks());

    for clip in store.clips() {
        let Some(track) = store.track(&clip.track_id) else {
            continue;
        };
        if !is_track_audible(track, any_soloed) {
            continue;
        }

        let scheduled = schedule_one_clip(
            clip,
            now,
            current_position_seconds,
            bpm,
            overlap_min_fade_seconds,
            transport,
            store,
            instruments,
            audio_sources,
            mixer,
            voices,
            active_audio,
        );
        metrics.notes_scheduled += scheduled;
        metrics.instrument_count += 1;
    }

    let _ = current_position_steps;
    metrics
}

/// Partial reschedule for `scope=notes` (spec §4.4 "Partial reschedule"):
/// clear only queue entries for the dirty instruments, then rewrite them.
/// Audio sources are left untouched.
pub fn partial_reschedule(
    dirty_instruments: &[InstrumentId],
    transport: &mut Transport,
) -> usize {
    let targets: HashSet<InstrumentId> = dirty_instruments.iter().cloned().collect();
    transport.clear_scheduled_events(Some(&|meta: &EventMetadata| {
        meta.instrument_id.as_ref().is_some_and(|id| targets.contains(id))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;

    #[test]
    fn bypasses_debounce_on_force() {
        let mut d = Debouncer::new();
        let req = ScheduleRequest {
            force: true,
            ..Default::default()
        };
        let cfg = DebounceConfig::default();
        assert!(d.submit(req, 0.0, true, &cfg).is_some());
        assert!(!d.is_pending());
    }

    #[test]
    fn coalesces_pending_request_and_fires_after_delay() {
        let mut d = Debouncer::new();
        let cfg = DebounceConfig::default();
        let req = ScheduleRequest {
            priority: SchedulePriority::Idle,
            ..Default::default()
        };
        assert!(d.submit(req, 0.0, false, &cfg).is_none());
        assert!(d.poll(0.0).is_none());
        assert!(d.poll(0.020).is_some());
    }

    #[test]
    fn scope_promotes_to_all_in_song_mode() {
        let req = ScheduleRequest::default();
        let scope = resolve_scope(&req, PlaybackMode::Song, false, false);
        assert_eq!(scope, ScheduleScope::All);
    }

    #[test]
    fn scope_resolves_to_notes_when_filter_present() {
        let req = ScheduleRequest {
            instrument_filter: vec!["synth".to_string()],
            ..Default::default()
        };
        let scope = resolve_scope(&req, PlaybackMode::Pattern, false, false);
        assert_eq!(scope, ScheduleScope::Notes);
    }

    #[test]
    fn effective_position_clamps_to_loop_start_outside_bounds() {
        let req = ScheduleRequest::default();
        let pos = effective_position(&req, 100.0, true, 0.0, 16.0);
        assert_eq!(pos, 0.0);
    }

    #[test]
    fn effective_position_wraps_for_note_edit() {
        let req = ScheduleRequest {
            reason: Some("note_edit".to_string()),
            ..Default::default()
        };
        let pos = effective_position(&req, 20.0, true, 0.0, 16.0);
        assert_eq!(pos, 4.0);
    }

    #[test]
    fn pattern_clip_expansion_loops_source_pattern_across_window() {
        let mut pattern = Pattern::new("p1", "test");
        pattern.add_note("synth", crate::model::Note::new(1, 60, 0.0, 1.0, 1.0));
        pattern.add_note("synth", crate::model::Note::new(2, 60, 4.0, 1.0, 1.0));
        pattern.add_note("synth", crate::model::Note::new(3, 60, 8.0, 1.0, 1.0));
        pattern.add_note("synth", crate::model::Note::new(4, 60, 12.0, 1.0, 1.0));
        pattern.set_minimum_length_steps(16);

        let clip = AudioClip::pattern_clip("c1", "t1", "p1", 1.0, 2.0).with_pattern_offset(4.0);
        // clip_start_step = 1 beat * 4 = 4; clip_duration_steps = 2 beats * 4 = 8
        let expanded = expand_pattern_clip_notes(&clip, &pattern, "synth", 4.0, 8.0);
        let mut steps: Vec<f64> = expanded.iter().map(|(s, _)| *s).collect();
        steps.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(steps, vec![4.0, 8.0]);
    }

    #[test]
    fn partial_reschedule_clears_only_targeted_instrument_entries() {
        let cfg = SchedulerConfig::default();
        let mut t = Transport::new(cfg, 120.0, 48_000.0).unwrap();
        t.start(0.0, None);
        let mut meta_a = EventMetadata::default();
        meta_a.instrument_id = Some("a".to_string());
        let mut meta_b = EventMetadata::default();
        meta_b.instrument_id = Some("b".to_string());
        t.schedule_event(0.0, 1.0, meta_a, Box::new(|| {}));
        t.schedule_event(0.0, 1.0, meta_b, Box::new(|| {}));

        let removed = partial_reschedule(&["a".to_string()], &mut t);
        assert_eq!(removed, 1);
        assert_eq!(t.queue_len(), 1);
    }
}
