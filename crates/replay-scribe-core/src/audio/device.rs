//! CPAL-backed implementation of the capture/playback boundary.
//!
//! CPAL streams are not `Send`, so every handle owns a dedicated audio thread
//! that holds the stream; the handle talks to it over a command channel and
//! shared atomics. Clips are written as 16-bit WAV files under a per-process
//! temp directory and referenced by `file://` URIs.

use crate::{
    CoreResult, SessionError,
    audio::{AudioDriver, ClipRef, Playback, Recording, RecordingPreset},
};

use std::{
    panic::Location,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
        mpsc as std_mpsc,
    },
    thread,
};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use error_location::ErrorLocation;
use tokio::sync::oneshot;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

#[track_caller]
fn device_error(reason: impl Into<String>) -> SessionError {
    SessionError::DeviceError {
        reason: reason.into(),
        location: ErrorLocation::from(Location::caller()),
    }
}

/// Production driver for the default host's audio devices.
pub struct CpalDriver {
    clip_dir: PathBuf,
}

impl CpalDriver {
    /// Create a driver writing clips under `$TMPDIR/replay-scribe`.
    #[track_caller]
    pub fn new() -> CoreResult<Self> {
        Self::with_clip_dir(std::env::temp_dir().join("replay-scribe"))
    }

    /// Create a driver writing clips under an explicit directory.
    #[track_caller]
    pub fn with_clip_dir(clip_dir: PathBuf) -> CoreResult<Self> {
        std::fs::create_dir_all(&clip_dir)
            .map_err(|e| device_error(format!("Failed to create clip directory: {}", e)))?;

        info!(clip_dir = ?clip_dir, "CpalDriver initialized");

        Ok(Self { clip_dir })
    }
}

#[async_trait]
impl AudioDriver for CpalDriver {
    #[instrument(skip(self))]
    async fn create_recording(&self, preset: &RecordingPreset) -> CoreResult<Box<dyn Recording>> {
        let clip_path = self.clip_dir.join(format!("{}.wav", Uuid::new_v4()));

        let (ready_tx, ready_rx) = oneshot::channel();
        let (cmd_tx, cmd_rx) = std_mpsc::channel();

        let preset = *preset;
        let thread = thread::spawn(move || capture_thread_main(preset, ready_tx, cmd_rx));

        ready_rx
            .await
            .map_err(|_| device_error("Capture thread exited before reporting readiness"))??;

        debug!(clip_path = ?clip_path, "Capture stream opened");

        Ok(Box::new(CpalRecording {
            cmd_tx,
            thread: Some(thread),
            clip_path,
        }))
    }

    #[instrument(skip(self))]
    async fn create_sound(&self, clip: &ClipRef) -> CoreResult<Box<dyn Playback>> {
        let path = clip
            .to_file_path()
            .ok_or_else(|| device_error(format!("Unsupported clip locator: {}", clip)))?;

        let shared = Arc::new(PlaybackShared {
            playing: AtomicBool::new(false),
            position: AtomicUsize::new(0),
            finished_fired: AtomicBool::new(false),
        });

        let (finished_tx, finished_rx) = oneshot::channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let (cmd_tx, cmd_rx) = std_mpsc::channel();

        let thread_shared = Arc::clone(&shared);
        let thread = thread::spawn(move || {
            playback_thread_main(path, thread_shared, finished_tx, ready_tx, cmd_rx)
        });

        ready_rx
            .await
            .map_err(|_| device_error("Playback thread exited before reporting readiness"))??;

        Ok(Box::new(CpalPlayback {
            cmd_tx,
            thread: Some(thread),
            shared,
            finished_rx: Some(finished_rx),
        }))
    }
}

// ---------------------------------------------------------------------------
// Capture
// ---------------------------------------------------------------------------

enum CaptureCommand {
    /// Stop the stream, encode the WAV at `path`, reply with the outcome.
    Finish {
        path: PathBuf,
        reply: oneshot::Sender<CoreResult<()>>,
    },
    /// Drop the stream and exit without writing anything.
    Abort,
}

struct CpalRecording {
    cmd_tx: std_mpsc::Sender<CaptureCommand>,
    thread: Option<thread::JoinHandle<()>>,
    clip_path: PathBuf,
}

#[async_trait]
impl Recording for CpalRecording {
    async fn stop_and_unload(&mut self) -> CoreResult<ClipRef> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.cmd_tx
            .send(CaptureCommand::Finish {
                path: self.clip_path.clone(),
                reply: reply_tx,
            })
            .map_err(|_| device_error("Capture thread terminated"))?;

        reply_rx
            .await
            .map_err(|_| device_error("Capture thread dropped the finalize reply"))??;

        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }

        let clip = ClipRef::new(format!("file://{}", self.clip_path.display()));
        info!(clip = %clip, "Capture finalized");
        Ok(clip)
    }
}

impl Drop for CpalRecording {
    fn drop(&mut self) {
        // Best-effort release when the session discards the handle without
        // finalizing (cleanup path).
        let _ = self.cmd_tx.send(CaptureCommand::Abort);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Owns the input stream for the lifetime of one recording.
fn capture_thread_main(
    preset: RecordingPreset,
    ready: oneshot::Sender<CoreResult<()>>,
    commands: std_mpsc::Receiver<CaptureCommand>,
) {
    let (stream, samples, sample_rate) = match open_capture_stream(&preset) {
        Ok(parts) => parts,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    if ready.send(Ok(())).is_err() {
        // Caller gave up while the device was opening.
        return;
    }

    // Stays alive after a failed finalize so it can be retried.
    let mut stream = Some(stream);
    while let Ok(cmd) = commands.recv() {
        match cmd {
            CaptureCommand::Finish { path, reply } => {
                drop(stream.take());
                let buf = samples.lock().unwrap_or_else(|e| {
                    error!("Sample buffer lock poisoned, recovering: {}", e);
                    e.into_inner()
                });
                let result = write_wav(&path, &buf, sample_rate, preset.channels);
                let finished = result.is_ok();
                let _ = reply.send(result);
                if finished {
                    break;
                }
            }
            CaptureCommand::Abort => break,
        }
    }
}

type CaptureParts = (cpal::Stream, Arc<Mutex<Vec<f32>>>, u32);

/// Open an input stream, preferring the preset's exact format and falling
/// back to the device default with integer decimation.
#[track_caller]
fn open_capture_stream(preset: &RecordingPreset) -> CoreResult<CaptureParts> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| device_error("No microphone found"))?;

    let supported: Vec<_> = device
        .supported_input_configs()
        .map_err(|e| device_error(format!("Failed to enumerate input configs: {}", e)))?
        .collect();

    let exact = supported.iter().find(|c| {
        c.channels() == preset.channels
            && c.min_sample_rate() <= preset.sample_rate
            && c.max_sample_rate() >= preset.sample_rate
            && c.sample_format() == cpal::SampleFormat::F32
    });

    let (config, effective_rate, decimation) = if let Some(cfg) = exact {
        (cfg.with_sample_rate(preset.sample_rate).config(), preset.sample_rate, 1usize)
    } else {
        let default = device
            .default_input_config()
            .map_err(|e| device_error(format!("Failed to get input config: {}", e)))?;
        let rate = default.sample_rate();
        let factor = (rate / preset.sample_rate).max(1) as usize;
        let effective = rate / factor as u32;
        debug!(
            native_rate = rate,
            decimation = factor,
            effective_rate = effective,
            "Preset rate unsupported, decimating the device default"
        );
        (default.config(), effective, factor)
    };

    let channels = config.channels as usize;
    if preset.channels != 1 && preset.channels != config.channels {
        return Err(device_error(format!(
            "Unsupported channel layout: preset wants {}, device offers {}",
            preset.channels, config.channels
        )));
    }
    let mix_to_mono = preset.channels == 1 && channels > 1;

    let samples: Arc<Mutex<Vec<f32>>> = Arc::new(Mutex::new(Vec::new()));
    let buffer = Arc::clone(&samples);

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                // Recover from lock poison rather than silently dropping
                // audio; the Vec data is still valid after a panic elsewhere.
                let mut buf = buffer.lock().unwrap_or_else(|e| {
                    error!("Sample buffer lock poisoned, recovering: {}", e);
                    e.into_inner()
                });
                for (i, frame) in data.chunks(channels).enumerate() {
                    if i % decimation != 0 {
                        continue;
                    }
                    if mix_to_mono {
                        buf.push(frame.iter().sum::<f32>() / channels as f32);
                    } else {
                        buf.extend_from_slice(frame);
                    }
                }
            },
            |err| error!("Input stream error: {}", err),
            None,
        )
        .map_err(|e| device_error(format!("Failed to build input stream: {}", e)))?;

    stream
        .play()
        .map_err(|e| device_error(format!("Failed to start input stream: {}", e)))?;

    info!(sample_rate = effective_rate, channels = preset.channels, "Capture started");

    Ok((stream, samples, effective_rate))
}

/// Encode the captured samples as 16-bit PCM WAV.
#[track_caller]
pub(crate) fn write_wav(
    path: &Path,
    samples: &[f32],
    sample_rate: u32,
    channels: u16,
) -> CoreResult<()> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| device_error(format!("Failed to create clip file: {}", e)))?;

    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer
            .write_sample(value)
            .map_err(|e| device_error(format!("Failed to write clip file: {}", e)))?;
    }

    writer
        .finalize()
        .map_err(|e| device_error(format!("Failed to finalize clip file: {}", e)))?;

    debug!(path = ?path, sample_count = samples.len(), "Clip written");
    Ok(())
}

// ---------------------------------------------------------------------------
// Playback
// ---------------------------------------------------------------------------

enum SoundCommand {
    Shutdown,
}

struct PlaybackShared {
    playing: AtomicBool,
    position: AtomicUsize,
    finished_fired: AtomicBool,
}

struct CpalPlayback {
    cmd_tx: std_mpsc::Sender<SoundCommand>,
    thread: Option<thread::JoinHandle<()>>,
    shared: Arc<PlaybackShared>,
    finished_rx: Option<oneshot::Receiver<()>>,
}

#[async_trait]
impl Playback for CpalPlayback {
    async fn play(&mut self) -> CoreResult<()> {
        self.shared.playing.store(true, Ordering::Release);
        Ok(())
    }

    async fn pause(&mut self) -> CoreResult<()> {
        self.shared.playing.store(false, Ordering::Release);
        Ok(())
    }

    async fn stop(&mut self) -> CoreResult<()> {
        self.shared.playing.store(false, Ordering::Release);
        self.shared.position.store(0, Ordering::Release);
        Ok(())
    }

    async fn unload(&mut self) -> CoreResult<()> {
        let _ = self.cmd_tx.send(SoundCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        Ok(())
    }

    fn take_finished(&mut self) -> Option<oneshot::Receiver<()>> {
        self.finished_rx.take()
    }
}

impl Drop for CpalPlayback {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(SoundCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Owns the output stream for the lifetime of one loaded sound.
fn playback_thread_main(
    path: PathBuf,
    shared: Arc<PlaybackShared>,
    finished: oneshot::Sender<()>,
    ready: oneshot::Sender<CoreResult<()>>,
    commands: std_mpsc::Receiver<SoundCommand>,
) {
    let stream = match open_playback_stream(&path, shared, finished) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    if ready.send(Ok(())).is_err() {
        return;
    }

    // Park until the handle releases us; disconnect counts as shutdown.
    match commands.recv() {
        Ok(SoundCommand::Shutdown) | Err(_) => drop(stream),
    }
}

#[track_caller]
fn open_playback_stream(
    path: &Path,
    shared: Arc<PlaybackShared>,
    finished: oneshot::Sender<()>,
) -> CoreResult<cpal::Stream> {
    let (samples, spec) = read_wav(path)?;
    let samples = Arc::new(samples);

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| device_error("No output device found"))?;

    // The clip format is fixed; ask the device for it as-is rather than
    // converting.
    let config = cpal::StreamConfig {
        channels: spec.channels,
        sample_rate: spec.sample_rate,
        buffer_size: cpal::BufferSize::Default,
    };

    let total = samples.len();
    let channels = spec.channels as usize;
    let finished = Mutex::new(Some(finished));

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                if !shared.playing.load(Ordering::Acquire) {
                    data.fill(0.0);
                    return;
                }
                let mut pos = shared.position.load(Ordering::Acquire);
                for frame in data.chunks_mut(channels) {
                    for slot in frame.iter_mut() {
                        *slot = if pos < total {
                            let value = samples[pos];
                            pos += 1;
                            value
                        } else {
                            0.0
                        };
                    }
                }
                shared.position.store(pos, Ordering::Release);

                if pos >= total && !shared.finished_fired.swap(true, Ordering::AcqRel) {
                    shared.playing.store(false, Ordering::Release);
                    let sender = finished.lock().unwrap_or_else(|e| e.into_inner()).take();
                    if let Some(sender) = sender {
                        let _ = sender.send(());
                    }
                }
            },
            |err| error!("Output stream error: {}", err),
            None,
        )
        .map_err(|e| device_error(format!("Failed to build output stream: {}", e)))?;

    stream
        .play()
        .map_err(|e| device_error(format!("Failed to start output stream: {}", e)))?;

    debug!(path = ?path, sample_count = total, "Sound loaded");

    Ok(stream)
}

/// Decode a clip into interleaved f32 samples.
#[track_caller]
pub(crate) fn read_wav(path: &Path) -> CoreResult<(Vec<f32>, hound::WavSpec)> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| device_error(format!("Failed to open clip file: {}", e)))?;
    let spec = reader.spec();

    let samples: Result<Vec<f32>, _> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let scale = f32::from(i16::MAX);
            reader
                .samples::<i16>()
                .map(|s| s.map(|v| f32::from(v) / scale))
                .collect()
        }
        hound::SampleFormat::Float => reader.samples::<f32>().collect(),
    };

    let samples =
        samples.map_err(|e| device_error(format!("Failed to decode clip file: {}", e)))?;

    Ok((samples, spec))
}
