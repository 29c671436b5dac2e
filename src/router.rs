//! Parallel Compression Signal Router
//!
//! # Block Pipeline
//! 1. **Channel padding**: outputs without a matching input channel are cleared.
//! 2. **Input gain**: smoothed, in place on the live block.
//! 3. **Pre-compression tap**: read-only.
//! 4. **Snapshot**: dry and wet scratch buffers are overwritten with the block.
//! 5. **Compression**: wet buffer only.
//! 6. **Mix weighting**: `wet_mix = dry_wet_mix`, `dry_mix = 1 - wet_mix`.
//! 7. **Routing**: plugin bypass, then solo, then mute, then the normal blend.
//! 8. **Output gain**: smoothed. Under plugin bypass the ramp advances but the
//!    audio is left alone.
//! 9. **Post-processing tap**: read-only, after all mutation.
//!
//! # Real-Time Contract
//! - `process` never allocates, locks or blocks. All storage is sized in `prepare`.
//! - The only state carried between blocks is gain-ramp memory and compressor
//!   envelopes. Both are cleared by `prepare` and `reset`.
//! - Parameters arrive as fresh snapshots every block; nothing is cached.
//!
//! # Routing Precedence
//! Plugin bypass is checked first and overrides solo and mute entirely. Solo wins
//! over mute when both are set. The wet path still runs under plugin bypass so
//! its envelopes stay warm, but its gain reduction is not reported.

use crate::dsp::{BufferSet, CompressionStage, GainStage};
use crate::pc_log;
use crate::settings::{CompressorSettings, MixState, ParameterSource, ProcessingConfig};

/// Read-only observers of the block at the two tap points.
///
/// Implementations run on the audio thread and must not allocate, lock or keep
/// the block beyond the call.
pub trait BlockTaps {
    fn pre_compression(&mut self, _block: &[&mut [f32]]) {}
    fn post_processing(&mut self, _block: &[&mut [f32]]) {}
}

impl BlockTaps for () {}

/// What gets summed back into the live block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Routing {
    /// Post-input-gain block passes through untouched.
    Bypassed,
    /// Solo: weighted wet path only.
    WetOnly,
    /// Mute: weighted dry path only.
    DryOnly,
    /// Weighted wet + weighted dry.
    Blend,
}

impl Routing {
    pub fn select(mix: &MixState) -> Self {
        if mix.plugin_bypass {
            Routing::Bypassed
        } else if mix.solo {
            Routing::WetOnly
        } else if mix.mute {
            Routing::DryOnly
        } else {
            Routing::Blend
        }
    }

    fn includes_wet(self) -> bool {
        matches!(self, Routing::WetOnly | Routing::Blend)
    }

    fn includes_dry(self) -> bool {
        matches!(self, Routing::DryOnly | Routing::Blend)
    }
}

pub struct SignalRouter {
    config: ProcessingConfig,
    input_gain: GainStage,
    output_gain: GainStage,
    compression: CompressionStage,
    buffers: BufferSet,
    last_routing: Option<Routing>,
}

impl SignalRouter {
    /// Allocates. Build on the configuration path.
    pub fn new(config: ProcessingConfig) -> Self {
        let mut router = Self {
            config,
            input_gain: GainStage::new(),
            output_gain: GainStage::new(),
            compression: CompressionStage::new(config.sample_rate, config.channel_count),
            buffers: BufferSet::default(),
            last_routing: None,
        };
        router.prepare(config);
        router
    }

    /// Configuration change. Resizes scratch storage and clears all DSP memory.
    /// May allocate; never call concurrently with `process`.
    pub fn prepare(&mut self, config: ProcessingConfig) {
        self.config = config;
        self.input_gain.prepare(config.sample_rate);
        self.output_gain.prepare(config.sample_rate);
        self.compression
            .prepare(config.sample_rate, config.channel_count);
        self.buffers
            .resize(config.channel_count, config.max_block_size);
        self.last_routing = None;
    }

    /// Clear ramps and envelopes without touching the configuration.
    pub fn reset(&mut self) {
        self.input_gain.reset();
        self.output_gain.reset();
        self.compression.reset();
        self.last_routing = None;
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    /// Compressor gain reduction of the last block, positive dB. Zero while
    /// plugin bypass is routing around the wet path.
    pub fn gain_reduction_db(&self) -> f32 {
        if self.last_routing == Some(Routing::Bypassed) {
            return 0.0;
        }
        self.compression.gain_reduction_db()
    }

    /// Read fresh snapshots from `params` and process one block.
    pub fn process_block<P, T>(&mut self, block: &mut [&mut [f32]], params: &P, taps: &mut T)
    where
        P: ParameterSource + ?Sized,
        T: BlockTaps + ?Sized,
    {
        let settings = params.compressor_settings();
        let mix = params.mix_state();
        self.process(block, &settings, &mix, taps);
    }

    pub fn process<T: BlockTaps + ?Sized>(
        &mut self,
        block: &mut [&mut [f32]],
        settings: &CompressorSettings,
        mix: &MixState,
        taps: &mut T,
    ) {
        let num_samples = block.first().map_or(0, |ch| ch.len());
        debug_assert_eq!(
            block.len(),
            self.config.channel_count,
            "block channel count does not match the prepared configuration"
        );
        debug_assert!(
            num_samples <= self.config.max_block_size,
            "block of {num_samples} samples exceeds prepared max {}",
            self.config.max_block_size
        );
        debug_assert!(block.iter().all(|ch| ch.len() == num_samples));

        // 1. Channel padding
        for channel in block.iter_mut().skip(self.config.input_channel_count) {
            channel.fill(0.0);
        }

        self.compression.update_settings(settings);
        self.input_gain.set_target_gain_db(mix.input_gain_db);
        self.output_gain.set_target_gain_db(mix.output_gain_db);

        // 2-3. Input gain, then analysis of what the compressor will see
        self.input_gain.process(block);
        taps.pre_compression(block);

        // 4-5. Dry/wet copies, compress the wet one
        self.buffers.snapshot(block);
        self.compression.process(self.buffers.wet_mut());

        // 6. Mix weights (already clamped upstream)
        let wet_mix = mix.dry_wet_mix;
        let dry_mix = 1.0 - wet_mix;
        self.buffers.apply_mix(wet_mix, dry_mix);

        // 7. Routing
        let routing = Routing::select(mix);
        if self.last_routing != Some(routing) {
            pc_log!("routing -> {:?}", routing);
            self.last_routing = Some(routing);
        }

        if routing != Routing::Bypassed {
            for channel in block.iter_mut() {
                channel.fill(0.0);
            }
            if routing.includes_wet() {
                self.buffers.sum_wet_into(block);
            }
            if routing.includes_dry() {
                self.buffers.sum_dry_into(block);
            }
        }

        // 8. Output gain
        if routing == Routing::Bypassed {
            self.output_gain.advance(num_samples);
        } else {
            self.output_gain.process(block);
        }

        // 9. Final block goes to output analysis and metering
        taps.post_processing(block);
    }
}
