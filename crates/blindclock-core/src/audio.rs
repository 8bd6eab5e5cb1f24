//! Synthesized audio cues.
//!
//! Three short tones with no audio assets: a fixed-length sine source
//! with a fade envelope, one fresh sink per invocation, detached after
//! its decay window so cues never overlap or accumulate. Playback runs
//! on a dedicated thread because the output stream is not `Send`; the
//! engine handle just queues commands. The output device is acquired
//! lazily through [`CueEngine::unlock`], mirroring gesture-gated audio
//! unlock; a missing device disables playback with a single warning and
//! never blocks timer progression.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use rodio::{OutputStream, OutputStreamHandle, Sink, Source};
use serde::{Deserialize, Serialize};

const SAMPLE_RATE: u32 = 44_100;

/// The three discrete cues derived from timer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cue {
    /// One minute remaining in the level.
    MinuteAlert,
    /// One tick per second of the final countdown.
    CountdownTick,
    /// The level elapsed (or was skipped forward).
    LevelComplete,
}

/// Fixed-length sine tone with a fade envelope to avoid clicks.
#[derive(Debug, Clone)]
pub struct Tone {
    freq_hz: f32,
    total_samples: u32,
    fade_samples: u32,
    sample_idx: u32,
}

impl Tone {
    pub fn new(freq_hz: f32, duration_ms: u32) -> Self {
        let total_samples = SAMPLE_RATE * duration_ms / 1000;
        Self {
            freq_hz,
            total_samples,
            // 10 ms fade in/out, capped at a quarter of the tone.
            fade_samples: (SAMPLE_RATE / 100).min(total_samples / 4).max(1),
            sample_idx: 0,
        }
    }

    fn envelope(&self) -> f32 {
        let left = self.total_samples - self.sample_idx;
        if self.sample_idx < self.fade_samples {
            self.sample_idx as f32 / self.fade_samples as f32
        } else if left <= self.fade_samples {
            left as f32 / self.fade_samples as f32
        } else {
            1.0
        }
    }
}

impl Iterator for Tone {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.sample_idx >= self.total_samples {
            return None;
        }
        let t = self.sample_idx as f32 / SAMPLE_RATE as f32;
        let sample = (t * self.freq_hz * std::f32::consts::TAU).sin() * self.envelope();
        self.sample_idx += 1;
        Some(sample * 0.6)
    }
}

impl Source for Tone {
    fn current_frame_len(&self) -> Option<usize> {
        Some((self.total_samples - self.sample_idx) as usize)
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(Duration::from_millis(
            self.total_samples as u64 * 1000 / SAMPLE_RATE as u64,
        ))
    }
}

enum AudioCmd {
    Unlock,
    Play(Cue),
    Test,
}

/// Handle to the playback thread.
pub struct CueEngine {
    tx: mpsc::Sender<AudioCmd>,
    available: Arc<AtomicBool>,
}

impl CueEngine {
    /// `volume` is 0-100 from configuration.
    pub fn new(volume: u32) -> Self {
        let (tx, rx) = mpsc::channel();
        let available = Arc::new(AtomicBool::new(false));
        let thread_flag = Arc::clone(&available);
        let volume = (volume.min(100) as f32) / 100.0;

        std::thread::Builder::new()
            .name("blindclock-audio".into())
            .spawn(move || playback_loop(rx, thread_flag, volume))
            .ok();

        Self { tx, available }
    }

    /// Acquire the output device. Safe to call repeatedly; only the
    /// first call does work. Failure disables playback.
    pub fn unlock(&self) {
        let _ = self.tx.send(AudioCmd::Unlock);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }

    /// Queue one cue. A no-op before a successful unlock.
    pub fn play(&self, cue: Cue) {
        let _ = self.tx.send(AudioCmd::Play(cue));
    }

    /// Sequence one sample of each cue (the sound-check button).
    pub fn test_audio(&self) {
        let _ = self.tx.send(AudioCmd::Test);
    }
}

fn playback_loop(rx: mpsc::Receiver<AudioCmd>, available: Arc<AtomicBool>, volume: f32) {
    let mut output: Option<(OutputStream, OutputStreamHandle)> = None;
    let mut warned = false;

    while let Ok(cmd) = rx.recv() {
        match cmd {
            AudioCmd::Unlock => {
                if output.is_some() || warned {
                    continue;
                }
                match OutputStream::try_default() {
                    Ok(pair) => {
                        output = Some(pair);
                        available.store(true, Ordering::Relaxed);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "audio output unavailable; cues disabled");
                        warned = true;
                    }
                }
            }
            AudioCmd::Play(cue) => {
                if let Some((_, handle)) = &output {
                    play_tones(handle, volume, &tones(cue));
                }
            }
            AudioCmd::Test => {
                if let Some((_, handle)) = &output {
                    let mut sequence = Vec::new();
                    for cue in [Cue::MinuteAlert, Cue::CountdownTick, Cue::LevelComplete] {
                        sequence.extend(tones(cue));
                        // Silence gap between samples.
                        sequence.push(Tone::new(0.0, 250));
                    }
                    play_tones(handle, volume, &sequence);
                }
            }
        }
    }
}

fn play_tones(handle: &OutputStreamHandle, volume: f32, tones: &[Tone]) {
    let Ok(sink) = Sink::try_new(handle) else {
        return;
    };
    sink.set_volume(volume);
    for tone in tones {
        sink.append(tone.clone());
    }
    sink.detach();
}

fn tones(cue: Cue) -> Vec<Tone> {
    match cue {
        Cue::MinuteAlert => vec![Tone::new(880.0, 350)],
        Cue::CountdownTick => vec![Tone::new(1320.0, 120)],
        Cue::LevelComplete => vec![Tone::new(660.0, 200), Tone::new(880.0, 300)],
    }
}
