//! Plain-value snapshots read by the router once per block.
//!
//! The router never holds parameter handles. Whatever owns the parameters (the
//! plugin's atomic parameter set, a JSON file in the render tool, a test) hands
//! over `Copy` snapshots through [`ParameterSource`].

use anyhow::ensure;
use serde::{Deserialize, Serialize};

pub const DEFAULT_SAMPLE_RATE: f32 = 44100.0;
pub const DEFAULT_MAX_BLOCK_SIZE: usize = 512;

/// Host configuration. Fixed between two configuration-change events.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProcessingConfig {
    pub sample_rate: f32,
    pub max_block_size: usize,
    /// Output channel count. Every block carries exactly this many channels.
    pub channel_count: usize,
    /// Channels actually fed by the host input bus. The rest get cleared.
    pub input_channel_count: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            max_block_size: DEFAULT_MAX_BLOCK_SIZE,
            channel_count: 2,
            input_channel_count: 2,
        }
    }
}

impl ProcessingConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.sample_rate.is_finite() && self.sample_rate > 0.0,
            "sample rate must be positive, got {}",
            self.sample_rate
        );
        ensure!(self.max_block_size > 0, "max block size must be non-zero");
        ensure!(self.channel_count > 0, "at least one output channel is required");
        ensure!(
            self.input_channel_count <= self.channel_count,
            "{} input channels exceed {} output channels",
            self.input_channel_count,
            self.channel_count
        );
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressorSettings {
    pub threshold_db: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
    pub ratio: f32,
    pub bypass: bool,
}

impl Default for CompressorSettings {
    fn default() -> Self {
        Self {
            threshold_db: 0.0,
            attack_ms: 50.0,
            release_ms: 250.0,
            ratio: 20.0,
            bypass: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixState {
    pub input_gain_db: f32,
    pub output_gain_db: f32,
    /// 0 = dry only, 1 = wet only. Clamped by the owner.
    pub dry_wet_mix: f32,
    /// Mutes the wet path.
    pub mute: bool,
    /// Solos the wet path.
    pub solo: bool,
    pub plugin_bypass: bool,
}

impl Default for MixState {
    fn default() -> Self {
        Self {
            input_gain_db: 0.0,
            output_gain_db: 0.0,
            dry_wet_mix: 0.5,
            mute: false,
            solo: false,
            plugin_bypass: false,
        }
    }
}

/// Wait-free parameter snapshots. Implementations must not lock or allocate.
pub trait ParameterSource {
    fn compressor_settings(&self) -> CompressorSettings;
    fn mix_state(&self) -> MixState;
}

/// Fixed parameters, e.g. loaded from a settings file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticParameters {
    pub compressor: CompressorSettings,
    pub mix: MixState,
}

impl ParameterSource for StaticParameters {
    fn compressor_settings(&self) -> CompressorSettings {
        self.compressor
    }

    fn mix_state(&self) -> MixState {
        self.mix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ProcessingConfig::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation_rejects_bad_shapes() {
        let base = ProcessingConfig::default();
        let bad = [
            ProcessingConfig {
                sample_rate: 0.0,
                ..base
            },
            ProcessingConfig {
                sample_rate: f32::NAN,
                ..base
            },
            ProcessingConfig {
                max_block_size: 0,
                ..base
            },
            ProcessingConfig {
                channel_count: 0,
                input_channel_count: 0,
                ..base
            },
            ProcessingConfig {
                channel_count: 1,
                input_channel_count: 2,
                ..base
            },
        ];
        for config in bad {
            assert!(config.validate().is_err(), "{config:?} should be rejected");
        }
    }

    #[test]
    fn test_partial_settings_file_falls_back_to_defaults() {
        let json = r#"{ "compressor": { "threshold_db": -30.0 }, "mix": { "solo": true } }"#;
        let params: StaticParameters = serde_json::from_str(json).unwrap();
        assert_eq!(params.compressor.threshold_db, -30.0);
        assert_eq!(params.compressor.ratio, 20.0);
        assert!(params.mix.solo);
        assert_eq!(params.mix.dry_wet_mix, 0.5);
    }
}
