//! Demo driver for `tempoline-core`: wires a two-instrument pattern into a
//! [`PlaybackScheduler`], opens a cpal output stream, and runs the transport
//! for a few bars while logging the position as it advances.
//!
//! Grounded on the teacher's `Repl::new` wiring (`src/repl/mod.rs`): build
//! the audio player, build the clock/scheduler, hand the clock's tick
//! receiver to whatever consumes it. Here the consumer is
//! `PlaybackScheduler::tick`, called from a plain control thread instead of
//! the teacher's background `EventDispatcher` thread, since the scheduler is
//! not `Send`-free — it owns `Box<dyn ...>` trait objects the driver thread
//! must stay on.

mod demo;
mod driver;
mod synth;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tempoline_core::{PlaybackMode, PlaybackScheduler, SchedulerCollaborators, SchedulerConfig, Transport};

use crate::demo::{build_pattern, DemoAudioSources, DemoAutomation, DemoInstruments, DemoMixer, DemoStore};
use crate::driver::AudioOutput;
use crate::synth::{ClickInstrument, SineSynth};

fn main() -> Result<()> {
    env_logger::init();

    let clock_start = Instant::now();

    // Query the real output sample rate before building the scheduler so the
    // transport's tick timing matches the audio device, not a guess.
    use cpal::traits::HostTrait;
    let probe_host = cpal::default_host();
    let probe_device = probe_host
        .default_output_device()
        .ok_or_else(|| anyhow::anyhow!("no output device available"))?;
    let sample_rate = {
        use cpal::traits::DeviceTrait;
        probe_device.default_output_config()?.sample_rate().0 as f64
    };

    let lead = Arc::new(SineSynth::new(sample_rate as f32));
    let kick = Arc::new(ClickInstrument::new());
    let (pattern, instrument_map) = build_pattern(lead.clone(), kick.clone());
    let store = DemoStore::new(pattern);

    let collaborators = SchedulerCollaborators {
        store: Box::new(store),
        instruments: Box::new(DemoInstruments::new(instrument_map)),
        effects: Box::new(tempoline_core::NoEffects),
        mixer: Box::new(DemoMixer),
        audio_sources: Box::new(DemoAudioSources),
        automation: Box::new(DemoAutomation),
    };

    let transport = Transport::new(SchedulerConfig::default(), 120.0, sample_rate)?;
    let (_edit_tx, edit_rx) = crossbeam_channel::unbounded();
    let mut scheduler = PlaybackScheduler::new(transport, collaborators, edit_rx);
    scheduler.set_playback_mode(PlaybackMode::Pattern, clock_start.elapsed().as_secs_f64());
    scheduler.enable_auto_loop()?;

    let output = AudioOutput::new(lead, clock_start)?;
    output.play()?;

    scheduler.play(clock_start.elapsed().as_secs_f64(), Some(0));
    log::info!("playing demo pattern at 120 BPM, looped — Ctrl+C to stop");

    let run_for = Duration::from_secs(16);
    let deadline = Instant::now() + run_for;
    let mut last_bar_logged: i64 = -1;
    while Instant::now() < deadline {
        let audio_now = clock_start.elapsed().as_secs_f64();
        scheduler.tick(audio_now);

        let position = scheduler.get_current_position();
        if position.bar as i64 != last_bar_logged {
            last_bar_logged = position.bar as i64;
            log::info!("{}", position.display_string());
        }

        std::thread::sleep(Duration::from_millis(5));
    }

    scheduler.stop();
    Ok(())
}
