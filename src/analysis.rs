//! Analysis Taps
//!
//! Read-only sinks hung off the router's pre-compression and post-processing tap
//! points. Everything here that runs on the audio thread is allocation-free:
//!
//! - [`LevelMeter`]: per-channel block peak and a 300 ms RMS, published through
//!   [`Meters`].
//! - [`SpectrumTap`]: pushes a mono fold-down into an SPSC ring. The matching
//!   [`SpectrumReader`] lives on the editor side and turns the newest complete
//!   frame into a dB magnitude spectrum.

use crate::dsp::utils::{lin_to_db, time_constant_coeff};
use crate::meters::{Meters, METER_FLOOR_DB};
use crate::router::BlockTaps;
use ringbuf::{Consumer, Producer, RingBuffer};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// RMS integration window of the level meter.
pub const LEVEL_WINDOW_MS: f32 = 300.0;
pub const SPECTRUM_FFT_SIZE: usize = 2048;

// Meters expose a left/right pair; mono is mirrored.
const METER_CHANNELS: usize = 2;
// Ring capacity in frames of the FFT size.
const SPECTRUM_RING_FRAMES: usize = 4;
const SPECTRUM_FLOOR_DB: f32 = -120.0;

pub struct LevelMeter {
    coeff: f32,
    rms_sq: [f32; METER_CHANNELS],
    peak: [f32; METER_CHANNELS],
}

impl LevelMeter {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            coeff: time_constant_coeff(LEVEL_WINDOW_MS, sample_rate),
            rms_sq: [0.0; METER_CHANNELS],
            peak: [0.0; METER_CHANNELS],
        }
    }

    pub fn reset(&mut self) {
        self.rms_sq = [0.0; METER_CHANNELS];
        self.peak = [0.0; METER_CHANNELS];
    }

    pub fn push_block(&mut self, block: &[&mut [f32]]) {
        for ch in 0..METER_CHANNELS {
            let Some(samples) = block.get(ch).or_else(|| block.first()) else {
                self.peak[ch] = 0.0;
                continue;
            };

            let mut peak = 0.0f32;
            let mut sq = self.rms_sq[ch];
            for &x in samples.iter() {
                peak = peak.max(x.abs());
                sq = self.coeff * sq + (1.0 - self.coeff) * x * x;
            }
            self.peak[ch] = peak;
            self.rms_sq[ch] = sq.max(0.0);
        }
    }

    /// Peak of the last block, dBFS.
    pub fn peak_db(&self, channel: usize) -> f32 {
        lin_to_db(self.peak[channel.min(METER_CHANNELS - 1)]).max(METER_FLOOR_DB)
    }

    pub fn rms_db(&self, channel: usize) -> f32 {
        lin_to_db(self.rms_sq[channel.min(METER_CHANNELS - 1)].sqrt()).max(METER_FLOOR_DB)
    }
}

/// Audio-thread half of a spectrum feed.
pub struct SpectrumTap {
    producer: Producer<f32>,
}

impl SpectrumTap {
    /// Allocates the ring and FFT plan. Configuration path only.
    pub fn new(fft_size: usize) -> (Self, SpectrumReader) {
        let (producer, consumer) = RingBuffer::<f32>::new(fft_size * SPECTRUM_RING_FRAMES).split();
        (Self { producer }, SpectrumReader::new(consumer, fft_size))
    }

    /// Fold the block down to mono and queue it. Drops samples when the reader
    /// falls behind instead of waiting.
    pub fn push_block(&mut self, block: &[&mut [f32]]) {
        let Some(first) = block.first() else {
            return;
        };
        let scale = 1.0 / block.len() as f32;
        for idx in 0..first.len() {
            let sum: f32 = block.iter().map(|ch| ch[idx]).sum();
            if self.producer.push(sum * scale).is_err() {
                break;
            }
        }
    }
}

/// Editor-side half of a spectrum feed.
pub struct SpectrumReader {
    consumer: Consumer<f32>,
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    window: Vec<f32>,
    window_sum: f32,
    frame: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    magnitudes_db: Vec<f32>,
}

impl SpectrumReader {
    fn new(consumer: Consumer<f32>, fft_size: usize) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);
        let scratch = vec![Complex::default(); fft.get_inplace_scratch_len()];

        let window: Vec<f32> = (0..fft_size)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * i as f32 / fft_size as f32;
                0.5 - 0.5 * phase.cos()
            })
            .collect();
        let window_sum = window.iter().sum::<f32>().max(1e-12);

        Self {
            consumer,
            fft,
            fft_size,
            window,
            window_sum,
            frame: vec![Complex::default(); fft_size],
            scratch,
            magnitudes_db: vec![SPECTRUM_FLOOR_DB; fft_size / 2 + 1],
        }
    }

    /// Analyse the newest complete frame. Returns `false` if none is queued.
    pub fn update(&mut self) -> bool {
        if self.consumer.len() < self.fft_size {
            return false;
        }
        while self.consumer.len() >= 2 * self.fft_size {
            for _ in 0..self.fft_size {
                let _ = self.consumer.pop();
            }
        }

        for (slot, w) in self.frame.iter_mut().zip(self.window.iter()) {
            let sample = self.consumer.pop().unwrap_or(0.0);
            *slot = Complex::new(sample * w, 0.0);
        }
        self.fft.process_with_scratch(&mut self.frame, &mut self.scratch);

        let norm = 2.0 / self.window_sum;
        for (mag, bin) in self.magnitudes_db.iter_mut().zip(self.frame.iter()) {
            *mag = lin_to_db(bin.norm() * norm).max(SPECTRUM_FLOOR_DB);
        }
        true
    }

    /// Bins `0..=fft_size / 2`, dBFS for a full-scale sine.
    pub fn magnitudes_db(&self) -> &[f32] {
        &self.magnitudes_db
    }

    pub fn bin_frequency(&self, bin: usize, sample_rate: f32) -> f32 {
        bin as f32 * sample_rate / self.fft_size as f32
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }
}

pub struct SpectrumReaders {
    pub input: SpectrumReader,
    pub output: SpectrumReader,
}

/// The plugin's tap set: input level + spectrum before compression, output level
/// + spectrum after everything.
pub struct AnalysisTaps {
    meters: Arc<Meters>,
    input_level: LevelMeter,
    output_level: LevelMeter,
    input_spectrum: SpectrumTap,
    output_spectrum: SpectrumTap,
}

impl AnalysisTaps {
    pub fn new(sample_rate: f32, meters: Arc<Meters>) -> (Self, SpectrumReaders) {
        let (input_spectrum, input) = SpectrumTap::new(SPECTRUM_FFT_SIZE);
        let (output_spectrum, output) = SpectrumTap::new(SPECTRUM_FFT_SIZE);
        let taps = Self {
            meters,
            input_level: LevelMeter::new(sample_rate),
            output_level: LevelMeter::new(sample_rate),
            input_spectrum,
            output_spectrum,
        };
        (taps, SpectrumReaders { input, output })
    }

    pub fn reset(&mut self) {
        self.input_level.reset();
        self.output_level.reset();
    }
}

impl BlockTaps for AnalysisTaps {
    fn pre_compression(&mut self, block: &[&mut [f32]]) {
        self.input_level.push_block(block);
        self.meters
            .set_input_peaks(self.input_level.peak_db(0), self.input_level.peak_db(1));
        self.input_spectrum.push_block(block);
    }

    fn post_processing(&mut self, block: &[&mut [f32]]) {
        self.output_level.push_block(block);
        self.meters
            .set_output_peaks(self.output_level.peak_db(0), self.output_level.peak_db(1));
        self.meters
            .set_output_rms(self.output_level.rms_db(0), self.output_level.rms_db(1));
        self.output_spectrum.push_block(block);
    }
}
