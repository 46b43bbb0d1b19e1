//! Audio device sink using cpal
//!
//! Plays scheduled buffers on an output device. The cpal stream lives on its own
//! thread since streams are not `Send` on every platform. Finished buffers are
//! handed to a completion thread, so the device callback never runs scheduler code.
//!
//! There is no resampling: the stream is (re)opened at the format of the first
//! buffer of each new format when the device supports it. Otherwise the device
//! default is used, channels are mapped and a warning is logged.

use crate::audio::{AudioFormat, PcmBuffer};
use crate::error::{Error, Result};
use crate::playback::session::PlaybackSession;
use crate::playback::sink::{AudioSink, CompletionHandler};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

struct Queued {
    buffer: PcmBuffer,
    session: PlaybackSession,
    completion: CompletionHandler,
}

/// Buffers waiting for the device, with the read position in the head buffer
#[derive(Default)]
struct DeviceQueue {
    queue: VecDeque<Queued>,
    /// Next frame to play from the head buffer
    cursor: usize,
    playing: bool,
    /// Format the stream was last opened for
    stream_format: Option<AudioFormat>,
}

impl DeviceQueue {
    /// Fill `out` (interleaved, `channels` per frame) and return the buffers that finished
    ///
    /// Silence is written while paused or starved.
    fn render(&mut self, out: &mut [f32], channels: usize) -> Vec<Queued> {
        let mut finished = Vec::new();

        for frame in out.chunks_mut(channels.max(1)) {
            frame.fill(0.0);
            if !self.playing {
                continue;
            }
            self.retire_played(&mut finished);
            let Some(head) = self.queue.front() else {
                continue;
            };

            let source_channels = head.buffer.format.channels.max(1) as usize;
            let base = self.cursor * source_channels;
            for (channel, sample) in frame.iter_mut().enumerate() {
                let index = base + channel.min(source_channels - 1);
                *sample = head.buffer.samples.get(index).copied().unwrap_or(0.0);
            }
            self.cursor += 1;
        }

        if self.playing {
            self.retire_played(&mut finished);
        }
        finished
    }

    fn retire_played(&mut self, finished: &mut Vec<Queued>) {
        while self
            .queue
            .front()
            .is_some_and(|head| self.cursor >= head.buffer.frame_count)
        {
            if let Some(done) = self.queue.pop_front() {
                finished.push(done);
            }
            self.cursor = 0;
        }
    }
}

enum DeviceCommand {
    Open(AudioFormat),
    Shutdown,
}

/// Sink playing through an audio output device
pub struct DeviceSink {
    queue: Arc<Mutex<DeviceQueue>>,
    commands: Mutex<mpsc::Sender<DeviceCommand>>,
    device_thread: Mutex<Option<JoinHandle<()>>>,
    completion_thread: Mutex<Option<JoinHandle<()>>>,
}

impl DeviceSink {
    /// Open the named output device, or the default one
    ///
    /// Falls back to the default device when the named one is not found.
    pub fn open(device_name: Option<String>) -> Result<Self> {
        let queue = Arc::new(Mutex::new(DeviceQueue::default()));
        let (completions_tx, completions_rx) = mpsc::channel::<Queued>();
        let (commands_tx, commands_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        let completion_thread = thread::Builder::new()
            .name("segue-sink-completions".to_string())
            .spawn(move || {
                for done in completions_rx {
                    (done.completion)(&done.session);
                }
                debug!("Completion thread exiting");
            })?;

        let device_queue = Arc::clone(&queue);
        let device_thread = thread::Builder::new()
            .name("segue-audio-device".to_string())
            .spawn(move || {
                let device = match find_device(device_name.as_deref()) {
                    Ok(device) => {
                        let _ = ready_tx.send(Ok(()));
                        device
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                run_device(device, device_queue, completions_tx, commands_rx);
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(Error::AudioOutput("audio device thread exited".to_string())),
        }

        Ok(Self {
            queue,
            commands: Mutex::new(commands_tx),
            device_thread: Mutex::new(Some(device_thread)),
            completion_thread: Mutex::new(Some(completion_thread)),
        })
    }

    fn send(&self, command: DeviceCommand) {
        if self.commands.lock().send(command).is_err() {
            warn!("Audio device thread is gone");
        }
    }
}

fn find_device(name: Option<&str>) -> Result<Device> {
    let host = cpal::default_host();

    if let Some(name) = name {
        let mut devices = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?;
        if let Some(device) = devices.find(|d| d.name().ok().as_deref() == Some(name)) {
            info!(device = name, "Using requested audio device");
            return Ok(device);
        }
        warn!(device = name, "Requested device not found, falling back to default device");
    }

    let device = host
        .default_output_device()
        .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?;
    info!(
        device = %device.name().unwrap_or_else(|_| "Unknown".to_string()),
        "Using default audio device"
    );
    Ok(device)
}

/// Device thread: owns the stream and reopens it when the buffer format changes
fn run_device(
    device: Device,
    queue: Arc<Mutex<DeviceQueue>>,
    completions: mpsc::Sender<Queued>,
    commands: mpsc::Receiver<DeviceCommand>,
) {
    let mut stream: Option<Stream> = None;

    for command in commands {
        match command {
            DeviceCommand::Open(format) => {
                // Close the old stream before opening the next one on the same device
                stream = None;
                match open_stream(&device, format, &queue, &completions) {
                    Ok(opened) => stream = Some(opened),
                    Err(e) => error!(error = %e, "Failed to open audio stream"),
                }
            }
            DeviceCommand::Shutdown => break,
        }
    }

    drop(stream);
    debug!("Audio device thread exiting");
}

fn open_stream(
    device: &Device,
    format: AudioFormat,
    queue: &Arc<Mutex<DeviceQueue>>,
    completions: &mpsc::Sender<Queued>,
) -> Result<Stream> {
    let (config, sample_format) = stream_config(device, format)?;
    debug!(
        sample_rate = config.sample_rate.0,
        channels = config.channels,
        ?sample_format,
        "Opening audio stream"
    );

    let queue = Arc::clone(queue);
    let completions = completions.clone();
    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(device, &config, queue, completions)?,
        SampleFormat::I16 => build_stream::<i16>(device, &config, queue, completions)?,
        SampleFormat::U16 => build_stream::<u16>(device, &config, queue, completions)?,
        other => {
            return Err(Error::AudioOutput(format!("Unsupported sample format: {:?}", other)));
        }
    };

    stream
        .play()
        .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;
    Ok(stream)
}

/// Exact rate and channel count when supported (f32 preferred), else the device default
fn stream_config(device: &Device, format: AudioFormat) -> Result<(StreamConfig, SampleFormat)> {
    let matching: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| Error::AudioOutput(format!("Failed to get device configs: {}", e)))?
        .filter(|c| {
            c.channels() == format.channels
                && c.min_sample_rate().0 <= format.sample_rate
                && c.max_sample_rate().0 >= format.sample_rate
        })
        .collect();

    let preferred = matching
        .iter()
        .find(|c| c.sample_format() == SampleFormat::F32)
        .or_else(|| matching.first());
    if let Some(supported) = preferred {
        let sample_format = supported.sample_format();
        let config = supported
            .clone()
            .with_sample_rate(cpal::SampleRate(format.sample_rate))
            .config();
        return Ok((config, sample_format));
    }

    let fallback = device
        .default_output_config()
        .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;
    warn!(
        track_rate = format.sample_rate,
        track_channels = format.channels,
        device_rate = fallback.sample_rate().0,
        device_channels = fallback.channels(),
        "Device does not support track format, using device default"
    );
    Ok((fallback.config(), fallback.sample_format()))
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    queue: Arc<Mutex<DeviceQueue>>,
    completions: mpsc::Sender<Queued>,
) -> Result<Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let mut scratch: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                scratch.resize(data.len(), 0.0);
                let finished = queue.lock().render(&mut scratch, channels);
                for (out, sample) in data.iter_mut().zip(&scratch) {
                    *out = T::from_sample(sample.clamp(-1.0, 1.0));
                }
                for done in finished {
                    let _ = completions.send(done);
                }
            },
            |err| error!(error = %err, "Audio stream error"),
            None,
        )
        .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
}

impl AudioSink for DeviceSink {
    fn schedule_buffer(
        &self,
        buffer: PcmBuffer,
        session: &PlaybackSession,
        completion: CompletionHandler,
        _seek_position: Option<f64>,
    ) {
        let format = buffer.format;
        let reopen = {
            let mut q = self.queue.lock();
            q.queue.push_back(Queued {
                buffer,
                session: session.clone(),
                completion,
            });
            q.stream_format.replace(format) != Some(format)
        };
        if reopen {
            self.send(DeviceCommand::Open(format));
        }
    }

    fn play(&self) {
        self.queue.lock().playing = true;
    }

    fn pause(&self) {
        self.queue.lock().playing = false;
    }

    fn stop(&self) {
        let drained: Vec<Queued> = {
            let mut q = self.queue.lock();
            q.playing = false;
            q.cursor = 0;
            q.queue.drain(..).collect()
        };
        for done in drained {
            (done.completion)(&done.session);
        }
    }

    fn is_playing(&self) -> bool {
        self.queue.lock().playing
    }
}

impl Drop for DeviceSink {
    fn drop(&mut self) {
        self.send(DeviceCommand::Shutdown);
        if let Some(handle) = self.device_thread.lock().take() {
            if handle.join().is_err() {
                error!("Audio device thread panicked");
            }
        }
        // The device thread held the last completion sender
        if let Some(handle) = self.completion_thread.lock().take() {
            if handle.join().is_err() {
                error!("Completion thread panicked");
            }
        }
    }
}
