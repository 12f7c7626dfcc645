//! `PlaybackScheduler` (spec §6 "Surfaces"): the public entry point that owns
//! the transport, voice bookkeeping, real-time automation, active audio
//! sources, and debounce state, and wires the edit bus and transport event
//! bus into the content scheduler and loop-restart handler.

use crossbeam_channel::Receiver;

use crate::audio_clip_scheduler::ActiveAudioSources;
use crate::automation_scheduler::{AutomationSinks, RealtimeAutomation};
use crate::collaborators::{ArrangementStore, AudioSourceRegistry, AutomationManager, EffectRegistry, InstrumentRegistry, MixerRegistry};
use crate::content_scheduler::{
    partial_reschedule, resolve_scope, schedule_one_clip, schedule_pattern_mode, schedule_song_mode, Debouncer, PlaybackMode, ScheduleMetrics,
    ScheduleRequest, SchedulePriority, ScheduleScope,
};
use crate::dirty::handle_edit_event;
use crate::edit::EditEvent;
use crate::error::Result;
use crate::event_queue::EventMetadata;
use crate::events::TransportEvent;
use crate::loop_restart::{handle_loop_restart, LoopRestartGuard};
use crate::model::AudioClip;
use crate::position::Position;
use crate::transport::{LoopInfo, Transport, TransportState, TransportStatus};
use crate::voices::VoiceBookkeeper;

/// Everything the scheduler needs from the host to resolve collaborators and
/// read project data (spec §6 "Required collaborators").
pub struct SchedulerCollaborators {
    pub store: Box<dyn ArrangementStore>,
    pub instruments: Box<dyn InstrumentRegistry>,
    pub effects: Box<dyn EffectRegistry>,
    pub mixer: Box<dyn MixerRegistry>,
    pub audio_sources: Box<dyn AudioSourceRegistry>,
    pub automation: Box<dyn AutomationManager>,
}

pub struct PlaybackScheduler {
    transport: Transport,
    voices: VoiceBookkeeper,
    realtime_automation: RealtimeAutomation,
    active_audio: ActiveAudioSources,
    debouncer: Debouncer,
    loop_guard: LoopRestartGuard,
    mode: PlaybackMode,
    overlap_min_fade_seconds: f64,

    collaborators: SchedulerCollaborators,

    transport_events: Receiver<TransportEvent>,
    edit_events: Receiver<EditEvent>,
}

impl PlaybackScheduler {
    pub fn new(mut transport: Transport, collaborators: SchedulerCollaborators, edit_events: Receiver<EditEvent>) -> Self {
        let transport_events = transport.events.subscribe();
        let overlap_min_fade_seconds = transport.config().overlap_min_fade_ms / 1000.0;
        Self {
            transport,
            voices: VoiceBookkeeper::new(),
            realtime_automation: RealtimeAutomation::new(),
            active_audio: ActiveAudioSources::new(),
            debouncer: Debouncer::new(),
            loop_guard: LoopRestartGuard::new(),
            mode: PlaybackMode::Pattern,
            overlap_min_fade_seconds,
            collaborators,
            transport_events,
            edit_events,
        }
    }

    fn is_playing(&self) -> bool {
        self.transport.state() == TransportState::Playing
    }

    /// Run one scheduling pass for `request` immediately, clearing whatever
    /// portion of the queue its resolved scope covers first (spec §4.4
    /// "Partial reschedule" vs full rebuild).
    fn run_schedule(&mut self, request: &ScheduleRequest, now: f64) -> ScheduleMetrics {
        let dirty_instruments_nonempty = !request.instrument_filter.is_empty();
        let scope = resolve_scope(request, self.mode, dirty_instruments_nonempty, false);

        if scope == ScheduleScope::Notes {
            partial_reschedule(&request.instrument_filter, &mut self.transport);
        } else if !request.append {
            self.transport.clear_scheduled_events(None);
            self.voices.clear();
            self.realtime_automation.stop_all();
            if self.mode == PlaybackMode::Song {
                self.active_audio.stop_all(None);
            }
        }

        let position = self.transport.position();
        match self.mode {
            PlaybackMode::Pattern => {
                let sinks = AutomationSinks {
                    instruments: self.collaborators.instruments.as_ref(),
                    effects: self.collaborators.effects.as_ref(),
                    mixer: self.collaborators.mixer.as_ref(),
                };
                schedule_pattern_mode(
                    request,
                    now,
                    position.step_float,
                    self.overlap_min_fade_seconds,
                    &mut self.transport,
                    self.collaborators.store.as_ref(),
                    self.collaborators.instruments.as_ref(),
                    self.collaborators.automation.as_ref(),
                    &mut self.voices,
                    &mut self.realtime_automation,
                    &sinks,
                )
            }
            PlaybackMode::Song => {
                let seconds_per_step = self.transport.steps_to_seconds(1.0);
                schedule_song_mode(
                    now,
                    position.step_float,
                    position.step_float * seconds_per_step,
                    self.transport.bpm(),
                    self.overlap_min_fade_seconds,
                    &mut self.transport,
                    self.collaborators.store.as_ref(),
                    self.collaborators.instruments.as_ref(),
                    self.collaborators.audio_sources.as_ref(),
                    self.collaborators.mixer.as_ref(),
                    &mut self.voices,
                    &mut self.active_audio,
                )
            }
        }
    }

    /// Submit a request through the debouncer, running it immediately when
    /// it bypasses debouncing (spec §4.4 "Debounce / priority").
    fn dispatch(&mut self, request: ScheduleRequest, now: f64) -> ScheduleMetrics {
        let cfg = self.transport.config().debounce;
        let is_playing = self.is_playing();
        match self.debouncer.submit(request, now, is_playing, &cfg) {
            Some(req) => self.run_schedule(&req, now),
            None => ScheduleMetrics::default(),
        }
    }

    fn force_full_reschedule(&mut self, now: f64, reason: &str, priority: SchedulePriority) -> ScheduleMetrics {
        let request = ScheduleRequest {
            reason: Some(reason.to_string()),
            force: true,
            scope: ScheduleScope::All,
            priority,
            ..Default::default()
        };
        self.dispatch(request, now)
    }

    // ---- Transport surfaces (spec §6) ----------------------------------

    pub fn play(&mut self, audio_now: f64, start_step: Option<u64>) {
        if let Some(step) = start_step {
            self.transport.set_position(step);
        }
        self.transport.start(audio_now, None);
        self.force_full_reschedule(audio_now, "play", SchedulePriority::Burst);
    }

    pub fn pause(&mut self) {
        self.transport.pause();
        let fade = self.transport.config().pause_fade_ms / 1000.0;
        self.active_audio.stop_all(Some(fade));
    }

    pub fn resume(&mut self, audio_now: f64) {
        self.transport.start(audio_now, None);
        self.force_full_reschedule(audio_now, "resume", SchedulePriority::Burst);
    }

    pub fn stop(&mut self) {
        self.transport.stop();
        self.voices.clear();
        self.realtime_automation.stop_all();
        self.active_audio.stop_all(None);
    }

    pub fn jump_to_step(&mut self, step: u64) {
        self.transport.set_position(step);
    }

    pub fn jump_to_bar(&mut self, bar: u64) {
        let steps_per_bar = self.transport.config().steps_per_bar() as u64;
        let step = bar.saturating_sub(1) * steps_per_bar;
        self.transport.set_position(step);
    }

    pub fn jump_to_time(&mut self, seconds: f64) {
        let step = self.transport.seconds_to_steps(seconds).max(0.0).round() as u64;
        self.transport.set_position(step);
    }

    pub fn set_playback_mode(&mut self, mode: PlaybackMode, audio_now: f64) {
        if self.mode == mode {
            return;
        }
        self.mode = mode;
        if self.is_playing() {
            self.force_full_reschedule(audio_now, "playback_mode_changed", SchedulePriority::Burst);
        }
    }

    pub fn get_playback_mode(&self) -> PlaybackMode {
        self.mode
    }

    pub fn set_loop_points(&mut self, start_step: u64, end_step: u64) -> Result<()> {
        self.transport.set_loop_points(start_step, end_step)
    }

    pub fn set_loop_enabled(&mut self, enabled: bool) {
        self.transport.set_loop_enabled(enabled);
    }

    /// Loop the active pattern's full length (spec §6 `enable_auto_loop`).
    pub fn enable_auto_loop(&mut self) -> Result<()> {
        let Some(pattern_id) = self.collaborators.store.active_pattern_id() else {
            return Ok(());
        };
        let Some(pattern) = self.collaborators.store.pattern(&pattern_id) else {
            return Ok(());
        };
        let length = pattern.length_steps() as u64;
        self.transport.set_loop_points(0, length)?;
        self.transport.set_loop_enabled(true);
        Ok(())
    }

    pub fn set_bpm(&mut self, bpm: f64) -> Result<()> {
        self.transport.set_bpm(bpm)
    }

    pub fn reschedule(&mut self, audio_now: f64, reason: Option<String>, force: bool) -> ScheduleMetrics {
        let request = ScheduleRequest {
            reason,
            force,
            ..Default::default()
        };
        self.dispatch(request, audio_now)
    }

    /// Reschedule a single arrangement clip without rebuilding the whole
    /// song-mode queue (spec §6 `reschedule_clip_events`).
    pub fn reschedule_clip_events(&mut self, audio_now: f64, clip: &AudioClip) -> usize {
        self.transport
            .clear_scheduled_events(Some(&|meta: &EventMetadata| meta.clip_id.as_deref() == Some(clip.id.as_str())));
        self.active_audio.clear_by_clip(&clip.id, None);

        let position = self.transport.position();
        let seconds_per_step = self.transport.steps_to_seconds(1.0);
        let current_position_seconds = position.step_float * seconds_per_step;
        let bpm = self.transport.bpm();

        schedule_one_clip(
            clip,
            audio_now,
            current_position_seconds,
            bpm,
            self.overlap_min_fade_seconds,
            &mut self.transport,
            self.collaborators.store.as_ref(),
            self.collaborators.instruments.as_ref(),
            self.collaborators.audio_sources.as_ref(),
            self.collaborators.mixer.as_ref(),
            &mut self.voices,
            &mut self.active_audio,
        )
    }

    pub fn get_current_position(&mut self) -> Position {
        self.transport.position()
    }

    pub fn get_playback_status(&self) -> TransportStatus {
        self.transport.status()
    }

    pub fn get_loop_info(&self) -> LoopInfo {
        self.transport.loop_info()
    }

    // ---- Real-time driving loop -----------------------------------------

    /// Drive one pass of the scheduling loop: advance the transport's
    /// look-ahead sweep, react to whatever transport events that produced,
    /// consume pending edit-bus events, and fire any debounced request whose
    /// delay has elapsed (spec §5 "driven by a real-time callback").
    pub fn tick(&mut self, audio_now: f64) -> u64 {
        let advanced = self.transport.tick(audio_now);
        self.drain_transport_events(audio_now);
        self.drain_edit_events(audio_now);
        if let Some(request) = self.debouncer.poll(audio_now) {
            self.run_schedule(&request, audio_now);
        }
        advanced
    }

    fn drain_transport_events(&mut self, audio_now: f64) {
        while let Ok(event) = self.transport_events.try_recv() {
            match event {
                TransportEvent::SchedulerTick { time, tick } => {
                    let step = self.transport.ticks_to_steps(tick) as f64;
                    self.realtime_automation.tick(step, time, self.collaborators.instruments.as_ref());
                }
                TransportEvent::Loop { next_loop_start_time, .. } => {
                    let loop_info = self.transport.loop_info();
                    let overlap_min_fade_seconds = self.overlap_min_fade_seconds;
                    let mode = self.mode;
                    // `SchedulerConfig` is `Copy`: snapshot it so this borrow
                    // doesn't overlap the `&mut self.transport` passed below.
                    let cfg = *self.transport.config();
                    let sinks = AutomationSinks {
                        instruments: self.collaborators.instruments.as_ref(),
                        effects: self.collaborators.effects.as_ref(),
                        mixer: self.collaborators.mixer.as_ref(),
                    };
                    handle_loop_restart(
                        &mut self.loop_guard,
                        mode,
                        loop_info.start_step as f64,
                        loop_info.end_step as f64,
                        next_loop_start_time,
                        audio_now,
                        overlap_min_fade_seconds,
                        &cfg,
                        &mut self.transport,
                        self.collaborators.store.as_ref(),
                        self.collaborators.instruments.as_ref(),
                        self.collaborators.automation.as_ref(),
                        self.collaborators.audio_sources.as_ref(),
                        &mut self.voices,
                        &mut self.realtime_automation,
                        &mut self.active_audio,
                        &sinks,
                    );
                }
                TransportEvent::TransportStart { .. }
                | TransportEvent::TransportStop
                | TransportEvent::TransportPause { .. }
                | TransportEvent::BarChange { .. }
                | TransportEvent::BpmChange { .. }
                | TransportEvent::LoopRestart { .. }
                | TransportEvent::PositionUpdate { .. } => {}
            }
        }
    }

    fn drain_edit_events(&mut self, audio_now: f64) {
        let is_playing = self.is_playing();
        let loop_info = self.transport.loop_info();
        let current_step = self.transport.position().step_float;
        let overlap_min_fade_seconds = self.overlap_min_fade_seconds;

        while let Ok(event) = self.edit_events.try_recv() {
            handle_edit_event(
                &event,
                is_playing,
                audio_now,
                loop_info.start_step as f64,
                loop_info.end_step as f64,
                current_step,
                overlap_min_fade_seconds,
                self.collaborators.store.as_ref(),
                self.collaborators.instruments.as_ref(),
                self.collaborators.automation.as_ref(),
                &mut self.voices,
                &mut self.debouncer,
                &mut self.transport,
            );
        }
    }
}
