//! cpal output stream setup, grounded on the teacher's
//! `audio::audio::AudioPlayer::build_stream` — same device/config/sample-format
//! dispatch, generalized to mix an arbitrary set of [`SineSynth`] voice banks
//! instead of one shared frequency list.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SampleFormat, SizedSample, Stream, StreamConfig};

use crate::synth::SineSynth;

pub struct AudioOutput {
    stream: Stream,
    pub sample_rate: f64,
}

impl AudioOutput {
    pub fn new(synth: Arc<SineSynth>, clock_start: std::time::Instant) -> Result<Self> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or_else(|| anyhow!("no output device available"))?;
        let config = device.default_output_config()?;
        let sample_format = config.sample_format();
        let stream_config: StreamConfig = config.into();
        let sample_rate = stream_config.sample_rate.0 as f64;

        let stream = match sample_format {
            SampleFormat::F32 => Self::build_stream::<f32>(&device, &stream_config, synth, clock_start)?,
            SampleFormat::I16 => Self::build_stream::<i16>(&device, &stream_config, synth, clock_start)?,
            SampleFormat::U16 => Self::build_stream::<u16>(&device, &stream_config, synth, clock_start)?,
            other => return Err(anyhow!("unsupported sample format: {:?}", other)),
        };

        Ok(Self { stream, sample_rate })
    }

    fn build_stream<T>(
        device: &cpal::Device,
        config: &StreamConfig,
        synth: Arc<SineSynth>,
        clock_start: std::time::Instant,
    ) -> Result<Stream>
    where
        T: Sample + SizedSample + Send + 'static + cpal::FromSample<f32>,
    {
        let channels = config.channels as usize;
        let sample_rate = config.sample_rate.0 as f64;
        let sample_advance = 1.0 / sample_rate;
        let mut scratch: Vec<f32> = Vec::new();
        let err_fn = |err| log::error!("output stream error: {err}");

        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / channels;
                    scratch.resize(frames, 0.0);
                    let now = clock_start.elapsed().as_secs_f64();
                    synth.render(&mut scratch, now, sample_advance);
                    for (frame, &sample) in data.chunks_mut(channels).zip(scratch.iter()) {
                        let value: T = cpal::Sample::from_sample(sample);
                        for out in frame.iter_mut() {
                            *out = value;
                        }
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| anyhow!("failed to build output stream: {e}"))?;

        Ok(stream)
    }

    pub fn play(&self) -> Result<()> {
        self.stream.play().map_err(|e| anyhow!("failed to play stream: {e}"))
    }
}
