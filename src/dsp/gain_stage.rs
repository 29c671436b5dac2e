//! Smoothed Gain Stage
//!
//! # Contract
//! - **Input**: target gain in dB, set once per block.
//! - **Effect**: multiplies every sample by a gain that ramps linearly (in the
//!   linear-gain domain) from the currently applied value to the target over
//!   [`RAMP_SECONDS`]. A steady target is held without ramping.
//! - **Will Not Do**: clip, saturate or allocate.
//!
//! # Lifecycle
//! - **Prepared**: `prepare` computes the ramp length and clears ramp memory.
//! - **First target after reset**: applied immediately, no fade-in.
//! - **Advanced**: `advance` moves the ramp forward without touching audio so a
//!   stage that is skipped for a block stays time-aligned.

use crate::dsp::utils::db_to_lin;

/// Ramp duration used by both the input and output gain stages.
pub const RAMP_SECONDS: f32 = 0.05;

pub struct GainStage {
    current: f32,
    target: f32,
    step: f32,
    // Samples left until `current` lands on `target`
    countdown: usize,
    ramp_samples: usize,
    initialized: bool,
}

impl Default for GainStage {
    fn default() -> Self {
        Self::new()
    }
}

impl GainStage {
    pub fn new() -> Self {
        Self {
            current: 1.0,
            target: 1.0,
            step: 0.0,
            countdown: 0,
            ramp_samples: 0,
            initialized: false,
        }
    }

    /// Recompute the ramp length for a new sample rate and drop ramp memory.
    pub fn prepare(&mut self, sample_rate: f32) {
        self.ramp_samples = (RAMP_SECONDS * sample_rate).floor().max(0.0) as usize;
        self.reset();
    }

    pub fn reset(&mut self) {
        self.current = 1.0;
        self.target = 1.0;
        self.step = 0.0;
        self.countdown = 0;
        self.initialized = false;
    }

    pub fn set_target_gain_db(&mut self, gain_db: f32) {
        let target = db_to_lin(gain_db);

        if !self.initialized {
            self.current = target;
            self.target = target;
            self.countdown = 0;
            self.initialized = true;
            return;
        }

        if target == self.target {
            return;
        }

        self.target = target;
        if self.ramp_samples == 0 {
            self.current = target;
            self.countdown = 0;
        } else {
            self.countdown = self.ramp_samples;
            self.step = (self.target - self.current) / self.ramp_samples as f32;
        }
    }

    #[inline]
    fn next_gain(&mut self) -> f32 {
        if self.countdown == 0 {
            return self.target;
        }
        self.countdown -= 1;
        if self.countdown == 0 {
            self.current = self.target;
        } else {
            self.current += self.step;
        }
        self.current
    }

    /// Apply the gain in place. One gain value per frame, shared by all channels.
    pub fn process<C: AsMut<[f32]>>(&mut self, block: &mut [C]) {
        if self.countdown == 0 {
            let gain = self.target;
            if gain != 1.0 {
                for channel in block.iter_mut() {
                    for sample in channel.as_mut().iter_mut() {
                        *sample *= gain;
                    }
                }
            }
            return;
        }

        let num_samples = block.first_mut().map_or(0, |c| c.as_mut().len());
        for idx in 0..num_samples {
            let gain = self.next_gain();
            for channel in block.iter_mut() {
                if let Some(sample) = channel.as_mut().get_mut(idx) {
                    *sample *= gain;
                }
            }
        }
    }

    /// Move the ramp forward by `num_samples` without processing audio.
    pub fn advance(&mut self, num_samples: usize) {
        if num_samples >= self.countdown {
            self.current = self.target;
            self.countdown = 0;
        } else {
            self.countdown -= num_samples;
            self.current += self.step * num_samples as f32;
        }
    }

    pub fn is_ramping(&self) -> bool {
        self.countdown > 0
    }

    /// Linear gain that the next steady sample would receive.
    pub fn current_gain(&self) -> f32 {
        if self.countdown == 0 {
            self.target
        } else {
            self.current
        }
    }

    pub fn ramp_samples(&self) -> usize {
        self.ramp_samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::utils::db_to_lin;

    fn ones(len: usize) -> Vec<Vec<f32>> {
        vec![vec![1.0; len]]
    }

    #[test]
    fn test_first_target_is_applied_without_ramp() {
        let mut stage = GainStage::new();
        stage.prepare(48000.0);
        stage.set_target_gain_db(-6.0);
        assert!(!stage.is_ramping());

        let mut block = ones(64);
        stage.process(&mut block);
        let expected = db_to_lin(-6.0);
        assert!(block[0].iter().all(|s| (s - expected).abs() < 1e-6));
    }

    #[test]
    fn test_ramp_reaches_target_after_ramp_time() {
        let mut stage = GainStage::new();
        stage.prepare(48000.0);
        stage.set_target_gain_db(0.0);
        stage.set_target_gain_db(-12.0);
        assert_eq!(stage.ramp_samples(), 2400);

        let mut block = ones(3000);
        stage.process(&mut block);

        let target = db_to_lin(-12.0);
        // Strictly decreasing during the ramp, then flat
        for pair in block[0][..2400].windows(2) {
            assert!(pair[1] < pair[0]);
        }
        assert!((block[0][2399] - target).abs() < 1e-6);
        assert!(block[0][2400..].iter().all(|s| (s - target).abs() < 1e-6));
    }

    #[test]
    fn test_ramp_spans_block_boundaries() {
        let mut stage = GainStage::new();
        stage.prepare(48000.0);
        stage.set_target_gain_db(0.0);
        stage.set_target_gain_db(6.0);

        let mut first = ones(256);
        stage.process(&mut first);
        stage.set_target_gain_db(6.0);
        let mut second = ones(256);
        stage.process(&mut second);

        let step = (db_to_lin(6.0) - 1.0) / 2400.0;
        let jump = second[0][0] - first[0][255];
        assert!((jump - step).abs() < 1e-5);
        assert!(stage.is_ramping());
    }

    #[test]
    fn test_all_channels_share_one_gain_per_frame() {
        let mut stage = GainStage::new();
        stage.prepare(44100.0);
        stage.set_target_gain_db(0.0);
        stage.set_target_gain_db(-20.0);

        let mut block = vec![vec![1.0f32; 128], vec![1.0f32; 128]];
        stage.process(&mut block);
        assert_eq!(block[0], block[1]);
    }

    #[test]
    fn test_advance_keeps_ramp_time_aligned() {
        let mut processed = GainStage::new();
        let mut skipped = GainStage::new();
        for stage in [&mut processed, &mut skipped] {
            stage.prepare(48000.0);
            stage.set_target_gain_db(0.0);
            stage.set_target_gain_db(-12.0);
        }

        let mut block = ones(1000);
        processed.process(&mut block);
        skipped.advance(1000);
        assert!((processed.current_gain() - skipped.current_gain()).abs() < 1e-5);

        skipped.advance(5000);
        assert!(!skipped.is_ramping());
        assert!((skipped.current_gain() - db_to_lin(-12.0)).abs() < 1e-6);
    }

    #[test]
    fn test_minus_infinity_silences() {
        let mut stage = GainStage::new();
        stage.prepare(48000.0);
        stage.set_target_gain_db(-100.0);
        let mut block = ones(16);
        stage.process(&mut block);
        assert!(block[0].iter().all(|s| *s == 0.0));
    }
}
