//! Feedback Compressor (Wet Path)
//!
//! # Contract
//! - **Detector**: per-channel peak ballistics follower. Attack coefficient while the
//!   rectified input rises above the envelope, release coefficient while it falls.
//! - **Static curve**: hard knee. Above threshold the level is reduced by
//!   `1 - 1/ratio` of the dB excess; below threshold gain is unity.
//! - **Bypassed**: the follower still runs over every sample so the envelope stays
//!   warm, but no gain is applied and the audio leaves untouched.
//! - **Will Not Do**: makeup gain, lookahead, stereo linking or allocation.
//!
//! # Lifecycle
//! - **Prepared**: `prepare` sizes per-channel envelope state and recomputes the
//!   ballistics coefficients for the sample rate.
//! - **Reset**: envelopes return to zero.

use crate::dsp::utils::{ballistics_coeff, db_to_lin, lin_to_db};
use crate::settings::CompressorSettings;

// Lowest threshold the curve accepts (dBFS). Guards the inverse.
const THRESHOLD_FLOOR_DB: f32 = -200.0;

/// Black-box compressor primitive. Owns coefficients and envelopes only.
pub struct FeedbackCompressor {
    sample_rate: f32,
    threshold: f32,
    threshold_inverse: f32,
    ratio_inverse: f32,
    attack_ms: f32,
    release_ms: f32,
    attack_coeff: f32,
    release_coeff: f32,
    envelopes: Vec<f32>,
}

impl FeedbackCompressor {
    pub fn new(sample_rate: f32, channels: usize) -> Self {
        let mut comp = Self {
            sample_rate,
            threshold: 1.0,
            threshold_inverse: 1.0,
            ratio_inverse: 1.0,
            attack_ms: 1.0,
            release_ms: 100.0,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            envelopes: Vec::new(),
        };
        comp.prepare(sample_rate, channels);
        comp
    }

    pub fn prepare(&mut self, sample_rate: f32, channels: usize) {
        self.sample_rate = sample_rate;
        self.envelopes.clear();
        self.envelopes.resize(channels, 0.0);
        self.attack_coeff = ballistics_coeff(self.attack_ms, sample_rate);
        self.release_coeff = ballistics_coeff(self.release_ms, sample_rate);
    }

    pub fn reset(&mut self) {
        self.envelopes.iter_mut().for_each(|env| *env = 0.0);
    }

    pub fn set_threshold_db(&mut self, threshold_db: f32) {
        self.threshold = db_to_lin(threshold_db.max(THRESHOLD_FLOOR_DB)).max(f32::MIN_POSITIVE);
        self.threshold_inverse = 1.0 / self.threshold;
    }

    pub fn set_ratio(&mut self, ratio: f32) {
        self.ratio_inverse = 1.0 / ratio.max(1.0);
    }

    pub fn set_attack_ms(&mut self, attack_ms: f32) {
        if attack_ms != self.attack_ms {
            self.attack_ms = attack_ms;
            self.attack_coeff = ballistics_coeff(attack_ms, self.sample_rate);
        }
    }

    pub fn set_release_ms(&mut self, release_ms: f32) {
        if release_ms != self.release_ms {
            self.release_ms = release_ms;
            self.release_coeff = ballistics_coeff(release_ms, self.sample_rate);
        }
    }

    #[inline]
    fn follow(&self, envelope: f32, input: f32) -> f32 {
        let x = input.abs();
        let cte = if x > envelope {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        x + cte * (envelope - x)
    }

    #[inline]
    fn gain_for(&self, envelope: f32) -> f32 {
        if envelope < self.threshold {
            1.0
        } else {
            (envelope * self.threshold_inverse).powf(self.ratio_inverse - 1.0)
        }
    }

    /// Process channels in place. Returns the smallest linear gain applied.
    pub fn process<C: AsMut<[f32]>>(&mut self, block: &mut [C], bypass: bool) -> f32 {
        debug_assert!(
            block.len() <= self.envelopes.len(),
            "compressor prepared for {} channels, got {}",
            self.envelopes.len(),
            block.len()
        );

        let mut min_gain = 1.0f32;
        for ch in 0..block.len().min(self.envelopes.len()) {
            let mut envelope = self.envelopes[ch];
            for sample in block[ch].as_mut().iter_mut() {
                envelope = self.follow(envelope, *sample);
                if !bypass {
                    let gain = self.gain_for(envelope);
                    *sample *= gain;
                    min_gain = min_gain.min(gain);
                }
            }
            self.envelopes[ch] = envelope;
        }
        min_gain
    }

    pub fn envelope(&self, channel: usize) -> f32 {
        self.envelopes.get(channel).copied().unwrap_or(0.0)
    }
}

/// Wet-path stage: latches [`CompressorSettings`] once per block and drives the
/// primitive, tracking gain reduction for the meters.
pub struct CompressionStage {
    compressor: FeedbackCompressor,
    bypass: bool,
    gain_reduction_db: f32,
}

impl CompressionStage {
    pub fn new(sample_rate: f32, channels: usize) -> Self {
        Self {
            compressor: FeedbackCompressor::new(sample_rate, channels),
            bypass: false,
            gain_reduction_db: 0.0,
        }
    }

    pub fn prepare(&mut self, sample_rate: f32, channels: usize) {
        self.compressor.prepare(sample_rate, channels);
        self.gain_reduction_db = 0.0;
    }

    pub fn reset(&mut self) {
        self.compressor.reset();
        self.gain_reduction_db = 0.0;
    }

    pub fn update_settings(&mut self, settings: &CompressorSettings) {
        self.compressor.set_threshold_db(settings.threshold_db);
        self.compressor.set_attack_ms(settings.attack_ms);
        self.compressor.set_release_ms(settings.release_ms);
        self.compressor.set_ratio(settings.ratio);
        self.bypass = settings.bypass;
    }

    pub fn process<C: AsMut<[f32]>>(&mut self, block: &mut [C]) {
        let min_gain = self.compressor.process(block, self.bypass);
        self.gain_reduction_db = -lin_to_db(min_gain);
    }

    /// Peak gain reduction of the last processed block, in positive dB.
    pub fn gain_reduction_db(&self) -> f32 {
        self.gain_reduction_db
    }

    pub fn compressor(&self) -> &FeedbackCompressor {
        &self.compressor
    }
}
