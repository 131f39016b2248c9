//! Microphone capture, speaker playback and PCM plumbing.
//!
//! `cpal` streams are not `Send`, so both device streams live on a
//! dedicated thread for the lifetime of a session. The rest of the client
//! only ever sees channels: captured mono blocks arrive on an `mpsc`
//! receiver, and decoded assistant audio is pushed into a ring buffer that
//! the output callback drains. Playback has no application-level buffering
//! policy beyond that ring; samples play as they arrive.

use crate::error::RealtimeError;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::{
    HeapCons, HeapProd, HeapRb,
    traits::{Consumer, Split},
};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use std::sync::mpsc as std_mpsc;
use std::thread;
use tokio::sync::mpsc;
use tracing::warn;

/// PCM16 sample rate the realtime service expects on both directions.
pub const REALTIME_PCM16_SAMPLE_RATE: f64 = 24_000.0;

/// Captured blocks queued between the device thread and the I/O task.
const CAPTURE_QUEUE_BLOCKS: usize = 32;
/// Ring capacity for decoded assistant audio, about two seconds at 48 kHz.
const PLAYBACK_BUFFER_SAMPLES: usize = 96_000;
/// Fixed input block size fed to the resampler.
const RESAMPLE_CHUNK: usize = 1024;

/// Owns the device thread. Dropping or closing it releases the microphone
/// and speaker streams.
pub struct AudioIo {
    stop: Option<std_mpsc::Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

/// Channel ends handed to the transport I/O task.
pub struct AudioStreams {
    /// Mono capture blocks at `capture_rate`.
    pub capture: mpsc::Receiver<Vec<f32>>,
    /// Push decoded assistant audio at `playback_rate` here.
    pub playback: HeapProd<f32>,
    pub capture_rate: u32,
    pub playback_rate: u32,
}

impl AudioIo {
    /// Opens the default input and output devices.
    ///
    /// Fails with [`RealtimeError::MediaAccess`] when no device is
    /// available or a stream cannot be built. Not retried; the caller
    /// surfaces the failure to the user.
    pub fn open() -> Result<(AudioIo, AudioStreams), RealtimeError> {
        let (ready_tx, ready_rx) = std_mpsc::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel();
        let (capture_tx, capture_rx) = mpsc::channel(CAPTURE_QUEUE_BLOCKS);
        let (playback_prod, playback_cons) = HeapRb::<f32>::new(PLAYBACK_BUFFER_SAMPLES).split();

        let thread = thread::Builder::new()
            .name("voicebar-audio".to_string())
            .spawn(move || run_device_thread(capture_tx, playback_cons, ready_tx, stop_rx))
            .map_err(|e| RealtimeError::MediaAccess(format!("failed to spawn audio thread: {e}")))?;

        let (capture_rate, playback_rate) = ready_rx
            .recv()
            .map_err(|_| {
                RealtimeError::MediaAccess("audio thread exited before reporting readiness".to_string())
            })?
            .map_err(RealtimeError::MediaAccess)?;

        let io = AudioIo {
            stop: Some(stop_tx),
            thread: Some(thread),
        };
        let streams = AudioStreams {
            capture: capture_rx,
            playback: playback_prod,
            capture_rate,
            playback_rate,
        };
        Ok((io, streams))
    }

    /// Stops both device streams. Callable multiple times.
    pub fn close(&mut self) {
        // Dropping the sender wakes the device thread out of its park.
        drop(self.stop.take());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for AudioIo {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_device_thread(
    capture_tx: mpsc::Sender<Vec<f32>>,
    playback: HeapCons<f32>,
    ready_tx: std_mpsc::Sender<Result<(u32, u32), String>>,
    stop_rx: std_mpsc::Receiver<()>,
) {
    match build_streams(capture_tx, playback) {
        Ok((streams, rates)) => {
            if ready_tx.send(Ok(rates)).is_err() {
                return;
            }
            // Park until the session closes; recv also returns when the
            // stop sender is dropped.
            let _ = stop_rx.recv();
            drop(streams);
        }
        Err(message) => {
            let _ = ready_tx.send(Err(message));
        }
    }
}

struct DeviceStreams {
    _input: cpal::Stream,
    _output: cpal::Stream,
}

fn log_stream_error(error: cpal::StreamError) {
    warn!("audio stream error: {error}");
}

fn build_streams(
    capture_tx: mpsc::Sender<Vec<f32>>,
    mut playback: HeapCons<f32>,
) -> Result<(DeviceStreams, (u32, u32)), String> {
    let host = cpal::default_host();
    let input_device = host
        .default_input_device()
        .ok_or_else(|| "no input device available".to_string())?;
    let output_device = host
        .default_output_device()
        .ok_or_else(|| "no output device available".to_string())?;
    let input_config = input_device
        .default_input_config()
        .map_err(|e| format!("no usable input config: {e}"))?;
    let output_config = output_device
        .default_output_config()
        .map_err(|e| format!("no usable output config: {e}"))?;

    let capture_rate = input_config.sample_rate().0;
    let playback_rate = output_config.sample_rate().0;
    let in_channels = input_config.channels() as usize;
    let out_channels = output_config.channels() as usize;

    let input = match input_config.sample_format() {
        cpal::SampleFormat::F32 => input_device.build_input_stream(
            &input_config.config(),
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                // try_send: a stalled consumer drops blocks instead of
                // blocking the device callback.
                let _ = capture_tx.try_send(downmix(data, in_channels));
            },
            log_stream_error,
            None,
        ),
        cpal::SampleFormat::I16 => input_device.build_input_stream(
            &input_config.config(),
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let floats: Vec<f32> = data.iter().map(|&s| s as f32 / 32768.0).collect();
                let _ = capture_tx.try_send(downmix(&floats, in_channels));
            },
            log_stream_error,
            None,
        ),
        other => return Err(format!("unsupported input sample format {other}")),
    }
    .map_err(|e| format!("failed to open capture stream: {e}"))?;

    let output = match output_config.sample_format() {
        cpal::SampleFormat::F32 => output_device.build_output_stream(
            &output_config.config(),
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / out_channels;
                let mut mono = vec![0.0f32; frames];
                playback.pop_slice(&mut mono);
                for (frame, sample) in mono.iter().enumerate() {
                    for slot in &mut data[frame * out_channels..(frame + 1) * out_channels] {
                        *slot = *sample;
                    }
                }
            },
            log_stream_error,
            None,
        ),
        cpal::SampleFormat::I16 => output_device.build_output_stream(
            &output_config.config(),
            move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / out_channels;
                let mut mono = vec![0.0f32; frames];
                playback.pop_slice(&mut mono);
                for (frame, sample) in mono.iter().enumerate() {
                    let value = (sample * 32767.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
                    for slot in &mut data[frame * out_channels..(frame + 1) * out_channels] {
                        *slot = value;
                    }
                }
            },
            log_stream_error,
            None,
        ),
        other => return Err(format!("unsupported output sample format {other}")),
    }
    .map_err(|e| format!("failed to open playback stream: {e}"))?;

    input
        .play()
        .map_err(|e| format!("failed to start capture stream: {e}"))?;
    output
        .play()
        .map_err(|e| format!("failed to start playback stream: {e}"))?;

    Ok((
        DeviceStreams {
            _input: input,
            _output: output,
        },
        (capture_rate, playback_rate),
    ))
}

/// Averages interleaved frames down to mono.
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Normalized microphone level for UI meters: mean absolute amplitude with
/// a 4x sensitivity gain, clamped to 1.0.
pub fn level(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s.abs()).sum();
    ((sum / samples.len() as f32) * 4.0).min(1.0)
}

/// Encodes f32 samples as base64 little-endian PCM16.
pub fn encode_base64_pcm16(samples: &[f32]) -> String {
    use base64::Engine;
    let bytes: Vec<u8> = samples
        .iter()
        .flat_map(|&sample| {
            let value = (sample * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            value.to_le_bytes()
        })
        .collect();
    base64::engine::general_purpose::STANDARD.encode(&bytes)
}

/// Decodes base64 little-endian PCM16 into normalized f32 samples.
/// Undecodable input yields an empty block rather than killing the stream.
pub fn decode_base64_pcm16(data: &str) -> Vec<f32> {
    use base64::Engine;
    match base64::engine::general_purpose::STANDARD.decode(data) {
        Ok(bytes) => bytes
            .chunks_exact(2)
            .map(|chunk| {
                let value = i16::from_le_bytes([chunk[0], chunk[1]]);
                (value as f32 / 32768.0).clamp(-1.0, 1.0)
            })
            .collect(),
        Err(error) => {
            warn!("failed to decode base64 audio payload: {error}");
            Vec::new()
        }
    }
}

/// Mono resampler that accepts arbitrary block sizes by buffering input
/// into fixed chunks. A no-op when the rates already match.
pub struct BlockResampler {
    inner: Option<FastFixedIn<f32>>,
    pending: Vec<f32>,
}

impl BlockResampler {
    pub fn new(in_rate: f64, out_rate: f64) -> Result<Self, RealtimeError> {
        let inner = if (in_rate - out_rate).abs() < f64::EPSILON {
            None
        } else {
            Some(
                FastFixedIn::<f32>::new(
                    out_rate / in_rate,
                    1.0,
                    PolynomialDegree::Cubic,
                    RESAMPLE_CHUNK,
                    1,
                )
                .map_err(|e| RealtimeError::MediaAccess(format!("resampler setup failed: {e}")))?,
            )
        };
        Ok(Self {
            inner,
            pending: Vec::new(),
        })
    }

    /// Feeds a block of mono samples and returns whatever full chunks are
    /// ready at the output rate. Remainders are carried to the next call.
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>, RealtimeError> {
        let Some(resampler) = &mut self.inner else {
            return Ok(input.to_vec());
        };
        self.pending.extend_from_slice(input);
        let mut output = Vec::new();
        while self.pending.len() >= RESAMPLE_CHUNK {
            let chunk: Vec<f32> = self.pending.drain(..RESAMPLE_CHUNK).collect();
            let mut resampled = resampler
                .process(&[chunk], None)
                .map_err(|e| RealtimeError::MediaAccess(format!("resampling failed: {e}")))?;
            output.append(&mut resampled[0]);
        }
        Ok(output)
    }
}
