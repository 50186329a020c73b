//! Audio collaborator: tone envelope synthesis, device output and capture
//!
//! Envelope per tone (linear segments):
//! - 0 → 0.3 over the first 50 ms
//! - 0.3 → 0.1 until 50 ms before the end
//! - 0.1 → 0 at the end

use rodio::source::Mix;
use rodio::{OutputStream, OutputStreamHandle, Source};
use std::f32::consts::PI;
use std::path::Path;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Major third and perfect fifth over the base
pub const CHORD_RATIOS: [f64; 3] = [1.0, 1.25, 1.5];

/// Attack / release ramp length
const RAMP_SECS: f32 = 0.05;
const PEAK_GAIN: f32 = 0.3;
const SUSTAIN_GAIN: f32 = 0.1;

pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Seconds of audio a capture keeps before dropping the oldest samples
pub const DEFAULT_CAPTURE_SECS: u32 = 120;

/// Fire-and-forget tone output
pub trait AudioSink: Send {
    fn play_tone(&mut self, frequency_hz: f64, duration_ms: f64);

    /// Base, major third and fifth at once
    fn play_chord(&mut self, base_frequency_hz: f64, duration_ms: f64) {
        for ratio in CHORD_RATIOS {
            self.play_tone(base_frequency_hz * ratio, duration_ms);
        }
    }
}

fn playable(frequency_hz: f64) -> bool {
    if frequency_hz.is_finite() && frequency_hz > 0.0 {
        return true;
    }
    tracing::warn!(frequency_hz, "ignoring tone with invalid frequency");
    false
}

// =============================================================================
// TONE SOURCE
// =============================================================================

/// Mono sine tone with the feedback envelope
#[derive(Debug, Clone)]
pub struct Tone {
    frequency: f32,
    sample_rate: u32,
    total_samples: usize,
    num_sample: usize,
}

impl Tone {
    pub fn new(frequency_hz: f64, duration_ms: f64, sample_rate: u32) -> Self {
        let duration_secs = (duration_ms.max(0.0) / 1000.0) as f32;
        Self {
            frequency: frequency_hz as f32,
            sample_rate,
            total_samples: (duration_secs * sample_rate as f32).round() as usize,
            num_sample: 0,
        }
    }

    pub fn duration_secs(&self) -> f32 {
        self.total_samples as f32 / self.sample_rate as f32
    }

    /// Envelope gain at `t` seconds into the tone
    pub fn gain_at(&self, t: f32) -> f32 {
        let end = self.duration_secs();
        if t < 0.0 || t >= end {
            return 0.0;
        }

        let release_start = (end - RAMP_SECS).max(RAMP_SECS);
        if t < RAMP_SECS {
            PEAK_GAIN * (t / RAMP_SECS)
        } else if t < release_start {
            let span = release_start - RAMP_SECS;
            PEAK_GAIN + (SUSTAIN_GAIN - PEAK_GAIN) * ((t - RAMP_SECS) / span)
        } else {
            let span = (end - release_start).max(f32::EPSILON);
            SUSTAIN_GAIN * (1.0 - (t - release_start) / span)
        }
    }
}

impl Iterator for Tone {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        if self.num_sample >= self.total_samples {
            return None;
        }
        let t = self.num_sample as f32 / self.sample_rate as f32;
        self.num_sample += 1;
        Some((2.0 * PI * self.frequency * t).sin() * self.gain_at(t))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.total_samples - self.num_sample;
        (left, Some(left))
    }
}

impl ExactSizeIterator for Tone {}

impl Source for Tone {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(Duration::from_secs_f32(self.duration_secs()))
    }
}

/// Base, third and fifth mixed into one source
pub fn chord(base_frequency_hz: f64, duration_ms: f64, sample_rate: u32) -> Mix<Mix<Tone, Tone>, Tone> {
    let [root, third, fifth] = CHORD_RATIOS.map(|r| Tone::new(base_frequency_hz * r, duration_ms, sample_rate));
    root.mix(third).mix(fifth)
}

// =============================================================================
// DEVICE OUTPUT
// =============================================================================

#[derive(Debug)]
enum AudioCommand {
    Tone { frequency_hz: f64, duration_ms: f64 },
    Chord { base_frequency_hz: f64, duration_ms: f64 },
}

/// Plays tones on the default output device
///
/// The output stream is opened on a dedicated thread when the first tone
/// arrives. Tones overlap instead of queueing. Without a device, tones are
/// dropped after a single warning.
#[derive(Debug)]
pub struct DeviceAudio {
    tx: Option<mpsc::Sender<AudioCommand>>,
    sample_rate: u32,
    spawn_failed: bool,
}

impl Default for DeviceAudio {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceAudio {
    pub fn new() -> Self {
        Self {
            tx: None,
            sample_rate: DEFAULT_SAMPLE_RATE,
            spawn_failed: false,
        }
    }

    /// Whether the output thread has been started
    pub fn is_started(&self) -> bool {
        self.tx.is_some()
    }

    fn send(&mut self, command: AudioCommand) {
        if self.tx.is_none() && !self.spawn_failed {
            let (tx, rx) = mpsc::channel();
            let sample_rate = self.sample_rate;
            match thread::Builder::new()
                .name("touchfeel-audio".to_string())
                .spawn(move || run_output(rx, sample_rate))
            {
                Ok(_) => self.tx = Some(tx),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to start audio thread");
                    self.spawn_failed = true;
                }
            }
        }
        if let Some(tx) = &self.tx {
            let _ = tx.send(command);
        }
    }
}

/// Owns the non-Send output stream for the lifetime of the sender
fn run_output(rx: mpsc::Receiver<AudioCommand>, sample_rate: u32) {
    let mut output: Option<(OutputStream, OutputStreamHandle)> = None;
    let mut unavailable = false;

    while let Ok(command) = rx.recv() {
        if output.is_none() && !unavailable {
            match OutputStream::try_default() {
                Ok(pair) => {
                    tracing::debug!(sample_rate, "audio output opened");
                    output = Some(pair);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "no audio output device, tones are dropped");
                    unavailable = true;
                }
            }
        }
        let Some((_, handle)) = output.as_ref() else {
            continue;
        };

        let played = match command {
            AudioCommand::Tone { frequency_hz, duration_ms } => {
                handle.play_raw(Tone::new(frequency_hz, duration_ms, sample_rate))
            }
            AudioCommand::Chord { base_frequency_hz, duration_ms } => {
                handle.play_raw(chord(base_frequency_hz, duration_ms, sample_rate))
            }
        };
        if let Err(e) = played {
            tracing::warn!(error = %e, "failed to play tone");
        }
    }
}

impl AudioSink for DeviceAudio {
    fn play_tone(&mut self, frequency_hz: f64, duration_ms: f64) {
        if playable(frequency_hz) {
            self.send(AudioCommand::Tone { frequency_hz, duration_ms });
        }
    }

    fn play_chord(&mut self, base_frequency_hz: f64, duration_ms: f64) {
        if playable(base_frequency_hz) {
            self.send(AudioCommand::Chord { base_frequency_hz, duration_ms });
        }
    }
}

// =============================================================================
// CAPTURE
// =============================================================================

/// Renders tones one after another into a bounded PCM buffer
///
/// Allocated on the first tone. Once the buffer holds more than its limit,
/// the oldest samples are dropped.
#[derive(Debug)]
pub struct PcmMixer {
    sample_rate: u32,
    max_samples: usize,
    samples: Option<Vec<f32>>,
    tones_played: u64,
    dropped_samples: u64,
}

impl Default for PcmMixer {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_RATE)
    }
}

impl PcmMixer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            max_samples: (sample_rate as usize) * (DEFAULT_CAPTURE_SECS as usize),
            samples: None,
            tones_played: 0,
            dropped_samples: 0,
        }
    }

    /// Keep at most `max_samples` of the most recent audio
    pub fn with_limit(mut self, max_samples: usize) -> Self {
        self.max_samples = max_samples;
        self
    }

    pub fn is_initialized(&self) -> bool {
        self.samples.is_some()
    }

    fn append<S: Source<Item = f32>>(&mut self, source: S) {
        let sample_rate = self.sample_rate;
        let buffer = self.samples.get_or_insert_with(|| {
            tracing::debug!(sample_rate, "audio capture initialized");
            Vec::new()
        });
        buffer.extend(source);

        if buffer.len() > self.max_samples {
            let excess = buffer.len() - self.max_samples;
            buffer.drain(..excess);
            self.dropped_samples += excess as u64;
        }
    }

    pub fn samples(&self) -> &[f32] {
        self.samples.as_deref().unwrap_or(&[])
    }

    pub fn tones_played(&self) -> u64 {
        self.tones_played
    }

    /// Samples discarded to stay under the limit
    pub fn dropped_samples(&self) -> u64 {
        self.dropped_samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Write the buffer as a mono 32-bit float WAV file
    pub fn write_wav(&self, path: &Path) -> Result<(), hound::Error> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(path, spec)?;
        for &sample in self.samples() {
            writer.write_sample(sample)?;
        }
        writer.finalize()
    }
}

impl AudioSink for PcmMixer {
    fn play_tone(&mut self, frequency_hz: f64, duration_ms: f64) {
        if !playable(frequency_hz) {
            return;
        }
        self.append(Tone::new(frequency_hz, duration_ms, self.sample_rate));
        self.tones_played += 1;
    }

    fn play_chord(&mut self, base_frequency_hz: f64, duration_ms: f64) {
        if !playable(base_frequency_hz) {
            return;
        }
        self.append(chord(base_frequency_hz, duration_ms, self.sample_rate));
        self.tones_played += CHORD_RATIOS.len() as u64;
    }
}

/// Capture shared with whoever writes the buffer out afterwards
#[derive(Debug, Clone, Default)]
pub struct SharedMixer(Arc<Mutex<PcmMixer>>);

impl SharedMixer {
    pub fn new(mixer: PcmMixer) -> Self {
        Self(Arc::new(Mutex::new(mixer)))
    }

    /// Run `f` against the mixer; `None` if a holder panicked
    pub fn with<T>(&self, f: impl FnOnce(&mut PcmMixer) -> T) -> Option<T> {
        self.0.lock().ok().map(|mut mixer| f(&mut mixer))
    }
}

impl AudioSink for SharedMixer {
    fn play_tone(&mut self, frequency_hz: f64, duration_ms: f64) {
        self.with(|m| m.play_tone(frequency_hz, duration_ms));
    }

    fn play_chord(&mut self, base_frequency_hz: f64, duration_ms: f64) {
        self.with(|m| m.play_chord(base_frequency_hz, duration_ms));
    }
}

/// Discards tones
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAudio;

impl AudioSink for NullAudio {
    fn play_tone(&mut self, _frequency_hz: f64, _duration_ms: f64) {}
}
