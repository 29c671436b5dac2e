pub mod analysis;
mod debug;
pub mod dsp;
pub mod meters;
pub mod router;
pub mod settings;

pub use crate::router::{BlockTaps, Routing, SignalRouter};
pub use crate::settings::{
    CompressorSettings, MixState, ParameterSource, ProcessingConfig, StaticParameters,
};

use crate::analysis::{AnalysisTaps, SpectrumReaders};
use crate::meters::Meters;
use assert_no_alloc::permit_alloc;
use nih_plug::prelude::*;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

// -----------------------------------------------------------------------------
// PARAMETERS
// -----------------------------------------------------------------------------
#[derive(Params)]
pub struct ParallelCompressorParams {
    #[id = "threshold"]
    pub threshold: FloatParam,

    #[id = "attack"]
    pub attack: FloatParam,

    #[id = "release"]
    pub release: FloatParam,

    #[id = "ratio"]
    pub ratio: FloatParam,

    /// Compressor bypass. The wet path still runs, uncompressed.
    #[id = "bypass"]
    pub bypass: BoolParam,

    #[id = "mute"]
    pub mute: BoolParam,

    #[id = "solo"]
    pub solo: BoolParam,

    /// Kill-switch for the whole processor. Overrides solo and mute.
    #[id = "plugin_bypass"]
    pub plugin_bypass: BoolParam,

    // Gains are ramped by the router, so no host-side smoothers here
    #[id = "input_gain"]
    pub input_gain: FloatParam,

    #[id = "output_gain"]
    pub output_gain: FloatParam,

    #[id = "dry_wet_mix"]
    pub dry_wet_mix: FloatParam,
}

// Helper to format values as "50%" for the DAW display
fn format_percent(v: f32) -> String {
    format!("{:.0}%", v * 100.0)
}

// Helper to format gain in dB
fn format_db(v: f32) -> String {
    format!("{:.1} dB", v)
}

fn format_ms(v: f32) -> String {
    format!("{:.1} ms", v)
}

fn format_ratio(v: f32) -> String {
    format!("{:.1}:1", v)
}

impl Default for ParallelCompressorParams {
    fn default() -> Self {
        let comp = CompressorSettings::default();
        let mix = MixState::default();

        Self {
            threshold: FloatParam::new(
                "Threshold",
                comp.threshold_db,
                FloatRange::Linear {
                    min: -60.0,
                    max: 12.0,
                },
            )
            .with_step_size(0.1)
            .with_value_to_string(Arc::new(format_db)),

            attack: FloatParam::new(
                "Attack",
                comp.attack_ms,
                FloatRange::Linear {
                    min: 1.0,
                    max: 500.0,
                },
            )
            .with_step_size(0.1)
            .with_value_to_string(Arc::new(format_ms)),

            release: FloatParam::new(
                "Release",
                comp.release_ms,
                FloatRange::Linear {
                    min: 1.0,
                    max: 500.0,
                },
            )
            .with_step_size(0.1)
            .with_value_to_string(Arc::new(format_ms)),

            ratio: FloatParam::new(
                "Ratio",
                comp.ratio,
                FloatRange::Skewed {
                    min: 1.0,
                    max: 100.0,
                    factor: 0.5,
                },
            )
            .with_value_to_string(Arc::new(format_ratio)),

            bypass: BoolParam::new("Bypass", comp.bypass),
            mute: BoolParam::new("Mute", mix.mute),
            solo: BoolParam::new("Solo", mix.solo),
            plugin_bypass: BoolParam::new("Plugin Bypass", mix.plugin_bypass),

            input_gain: FloatParam::new(
                "Input Gain",
                mix.input_gain_db,
                FloatRange::Linear {
                    min: -24.0,
                    max: 24.0,
                },
            )
            .with_step_size(0.5)
            .with_value_to_string(Arc::new(format_db)),

            output_gain: FloatParam::new(
                "Output Gain",
                mix.output_gain_db,
                FloatRange::Linear {
                    min: -24.0,
                    max: 24.0,
                },
            )
            .with_step_size(0.5)
            .with_value_to_string(Arc::new(format_db)),

            dry_wet_mix: FloatParam::new(
                "Dry/Wet Mix",
                mix.dry_wet_mix,
                FloatRange::Linear { min: 0.0, max: 1.0 },
            )
            .with_value_to_string(Arc::new(format_percent)),
        }
    }
}

impl ParameterSource for ParallelCompressorParams {
    fn compressor_settings(&self) -> CompressorSettings {
        CompressorSettings {
            threshold_db: self.threshold.value(),
            attack_ms: self.attack.value(),
            release_ms: self.release.value(),
            ratio: self.ratio.value(),
            bypass: self.bypass.value(),
        }
    }

    fn mix_state(&self) -> MixState {
        MixState {
            input_gain_db: self.input_gain.value(),
            output_gain_db: self.output_gain.value(),
            dry_wet_mix: self.dry_wet_mix.value().clamp(0.0, 1.0),
            mute: self.mute.value(),
            solo: self.solo.value(),
            plugin_bypass: self.plugin_bypass.value(),
        }
    }
}

// How often the audio thread asks for the `pc_log!` ring to be flushed
const LOG_DRAIN_INTERVAL_SECONDS: f32 = 0.25;

/// Work handed from the audio thread to the host's background thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShellTask {
    /// Forward queued `pc_log!` messages to the `log` facade.
    DrainLog,
}

// -----------------------------------------------------------------------------
// PLUGIN STRUCT
// -----------------------------------------------------------------------------
pub struct ParallelCompressorPlugin {
    params: Arc<ParallelCompressorParams>,
    router: SignalRouter,
    taps: AnalysisTaps,

    // Editor-side halves of the spectrum feeds, replaced on every initialize
    spectrum: Arc<Mutex<Option<SpectrumReaders>>>,
    meters: Arc<Meters>,

    log_drain_interval: usize,
    samples_since_drain: usize,
}

impl Default for ParallelCompressorPlugin {
    fn default() -> Self {
        let config = ProcessingConfig::default();
        let meters = Arc::new(Meters::new());
        let (taps, readers) = AnalysisTaps::new(config.sample_rate, meters.clone());

        Self {
            params: Arc::new(ParallelCompressorParams::default()),
            router: SignalRouter::new(config),
            taps,
            spectrum: Arc::new(Mutex::new(Some(readers))),
            meters,
            log_drain_interval: Self::drain_interval(config.sample_rate),
            samples_since_drain: 0,
        }
    }
}

impl ParallelCompressorPlugin {
    /// Shared meter values. The audio thread writes them every block; reading
    /// them is left to whatever embeds the plugin (an editor, a host-side
    /// display). No editor ships with this crate.
    pub fn meters(&self) -> Arc<Meters> {
        self.meters.clone()
    }

    /// Reader halves of the input and output spectrum feeds, for the same
    /// consumers as [`Self::meters`]. The slot is refilled on every
    /// `initialize`; call [`SpectrumReaders`]' `update` off the audio thread.
    pub fn spectrum_readers(&self) -> Arc<Mutex<Option<SpectrumReaders>>> {
        self.spectrum.clone()
    }

    fn drain_interval(sample_rate: f32) -> usize {
        ((LOG_DRAIN_INTERVAL_SECONDS * sample_rate) as usize).max(1)
    }

    /// Count processed samples; true once per drain interval.
    fn log_drain_due(&mut self, num_samples: usize) -> bool {
        self.samples_since_drain += num_samples;
        if self.samples_since_drain < self.log_drain_interval {
            return false;
        }
        self.samples_since_drain %= self.log_drain_interval;
        true
    }

    fn host_config(
        audio_io_layout: &AudioIOLayout,
        buffer_config: &BufferConfig,
    ) -> ProcessingConfig {
        ProcessingConfig {
            sample_rate: buffer_config.sample_rate,
            max_block_size: buffer_config.max_buffer_size as usize,
            channel_count: audio_io_layout
                .main_output_channels
                .map_or(0, |c| c.get() as usize),
            input_channel_count: audio_io_layout
                .main_input_channels
                .map_or(0, |c| c.get() as usize),
        }
    }
}

impl Plugin for ParallelCompressorPlugin {
    const NAME: &'static str = "Parallel Compressor";
    const VENDOR: &'static str = "Andrzej Marczewski";
    const URL: &'static str = "";
    const EMAIL: &'static str = "";
    const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    const AUDIO_IO_LAYOUTS: &'static [AudioIOLayout] = &[
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(2),
            main_output_channels: NonZeroU32::new(2),
            ..AudioIOLayout::const_default()
        },
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(1),
            main_output_channels: NonZeroU32::new(1),
            ..AudioIOLayout::const_default()
        },
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(1),
            main_output_channels: NonZeroU32::new(2),
            ..AudioIOLayout::const_default()
        },
    ];

    const MIDI_INPUT: MidiConfig = MidiConfig::None;
    // Parameters are snapshotted once per block
    const SAMPLE_ACCURATE_AUTOMATION: bool = false;

    type SysExMessage = ();
    type BackgroundTask = ShellTask;

    fn params(&self) -> Arc<dyn Params> {
        self.params.clone()
    }

    fn initialize(
        &mut self,
        audio_io_layout: &AudioIOLayout,
        buffer_config: &BufferConfig,
        _context: &mut impl InitContext<Self>,
    ) -> bool {
        #[cfg(feature = "debug")]
        crate::debug::logger::init_logger();

        let config = Self::host_config(audio_io_layout, buffer_config);
        if let Err(err) = config.validate() {
            log::error!("rejecting host configuration {:?}: {:#}", config, err);
            return false;
        }

        catch_unwind(AssertUnwindSafe(|| {
            permit_alloc(|| {
                self.router.prepare(config);
                let (taps, readers) = AnalysisTaps::new(config.sample_rate, self.meters.clone());
                self.taps = taps;
                match self.spectrum.lock() {
                    Ok(mut slot) => *slot = Some(readers),
                    Err(_) => log::warn!("spectrum readers poisoned, keeping previous feed"),
                }
            });
            self.meters.reset();
            self.log_drain_interval = Self::drain_interval(config.sample_rate);
            self.samples_since_drain = 0;

            log::info!(
                "prepared: {} Hz, {} samples max, {} in / {} out",
                config.sample_rate,
                config.max_block_size,
                config.input_channel_count,
                config.channel_count
            );

            // Flush anything the audio thread queued since the last configuration
            #[cfg(feature = "debug")]
            let _ = crate::debug::logger::drain();

            true
        }))
        .unwrap_or(false)
    }

    fn deactivate(&mut self) {
        #[cfg(feature = "debug")]
        let _ = crate::debug::logger::drain();
    }

    fn task_executor(&mut self) -> TaskExecutor<Self> {
        Box::new(|task| match task {
            ShellTask::DrainLog => {
                #[cfg(feature = "debug")]
                let _ = crate::debug::logger::drain();
            }
        })
    }

    fn process(
        &mut self,
        buffer: &mut Buffer,
        _aux: &mut AuxiliaryBuffers,
        context: &mut impl ProcessContext<Self>,
    ) -> ProcessStatus {
        catch_unwind(AssertUnwindSafe(|| {
            let num_samples = buffer.samples();
            self.router
                .process_block(buffer.as_slice(), self.params.as_ref(), &mut self.taps);
            self.meters
                .set_gain_reduction_db(self.router.gain_reduction_db());

            if cfg!(feature = "debug") && self.log_drain_due(num_samples) {
                context.execute_background(ShellTask::DrainLog);
            }
            ProcessStatus::Normal
        }))
        .unwrap_or(ProcessStatus::Normal)
    }

    fn reset(&mut self) {
        catch_unwind(AssertUnwindSafe(|| {
            self.router.reset();
            self.taps.reset();
            self.meters.reset();
        }))
        .unwrap_or(());
    }
}

impl ClapPlugin for ParallelCompressorPlugin {
    const CLAP_ID: &'static str = "com.andrzej.parallel-compressor";
    const CLAP_DESCRIPTION: Option<&'static str> = Some("Parallel (New York) compression");
    const CLAP_MANUAL_URL: Option<&'static str> = None;
    const CLAP_SUPPORT_URL: Option<&'static str> = None;
    const CLAP_FEATURES: &'static [ClapFeature] = &[
        ClapFeature::AudioEffect,
        ClapFeature::Compressor,
        ClapFeature::Stereo,
        ClapFeature::Mono,
    ];
}

impl Vst3Plugin for ParallelCompressorPlugin {
    const VST3_CLASS_ID: [u8; 16] = *b"ParallelComp_v03";
    const VST3_SUBCATEGORIES: &'static [Vst3SubCategory] =
        &[Vst3SubCategory::Fx, Vst3SubCategory::Dynamics];
}

nih_export_clap!(ParallelCompressorPlugin);
nih_export_vst3!(ParallelCompressorPlugin);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_defaults_match_settings_defaults() {
        let params = ParallelCompressorParams::default();
        assert_eq!(params.compressor_settings(), CompressorSettings::default());
        assert_eq!(params.mix_state(), MixState::default());
    }

    #[test]
    fn test_host_config_from_layouts() {
        let buffer_config = BufferConfig {
            sample_rate: 48000.0,
            min_buffer_size: None,
            max_buffer_size: 1024,
            process_mode: ProcessMode::Realtime,
        };

        let mono_to_stereo = &ParallelCompressorPlugin::AUDIO_IO_LAYOUTS[2];
        let config = ParallelCompressorPlugin::host_config(mono_to_stereo, &buffer_config);
        assert_eq!(config.channel_count, 2);
        assert_eq!(config.input_channel_count, 1);
        assert_eq!(config.max_block_size, 1024);

        for layout in ParallelCompressorPlugin::AUDIO_IO_LAYOUTS {
            let config = ParallelCompressorPlugin::host_config(layout, &buffer_config);
            assert!(config.validate().is_ok());
        }
    }

    #[test]
    fn test_log_drain_fires_every_quarter_second() {
        let mut plugin = ParallelCompressorPlugin::default();
        // 44.1 kHz default: 11025 samples per interval
        let fired = (0..220).filter(|_| plugin.log_drain_due(512)).count();
        assert_eq!(fired, 220 * 512 / 11025);
        assert!(plugin.samples_since_drain < plugin.log_drain_interval);
    }

    #[test]
    fn test_shell_taps_feed_spectrum_readers_and_meters() {
        let mut plugin = ParallelCompressorPlugin::default();
        let meters = plugin.meters();
        let readers = plugin.spectrum_readers();

        for block_idx in 0..4 {
            let tone: Vec<f32> = (0..512)
                .map(|i| 0.5 * ((block_idx * 512 + i) as f32 * 0.05).sin())
                .collect();
            let mut left = tone.clone();
            let mut right = tone;
            let mut block: [&mut [f32]; 2] = [&mut left, &mut right];
            plugin
                .router
                .process_block(&mut block, plugin.params.as_ref(), &mut plugin.taps);
        }

        let (in_l, in_r) = meters.get_input_peaks();
        assert!(in_l > meters::METER_FLOOR_DB && in_r > meters::METER_FLOOR_DB);

        let mut slot = readers.lock().unwrap();
        let spectrum = slot.as_mut().unwrap();
        assert!(spectrum.input.update());
        assert!(spectrum.output.update());
        assert!(spectrum.output.magnitudes_db().iter().any(|m| *m > -20.0));
    }

    #[test]
    fn test_params_feed_router_through_parameter_source() {
        let params = ParallelCompressorParams::default();
        let mut router = SignalRouter::new(ProcessingConfig {
            sample_rate: 48000.0,
            max_block_size: 64,
            channel_count: 1,
            input_channel_count: 1,
        });

        // Default threshold is 0 dB, so a quiet block passes both paths unchanged
        let mut channel = vec![0.25f32; 64];
        let mut block: [&mut [f32]; 1] = [&mut channel];
        router.process_block(&mut block, &params, &mut ());
        assert!(channel.iter().all(|s| (s - 0.25).abs() < 1e-6));
    }
}
