use anyhow::{anyhow, Context, Result};
use ebur128::{EbuR128, Mode};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use parallel_compressor::{ProcessingConfig, SignalRouter, StaticParameters};
use std::path::{Path, PathBuf};

const DEFAULT_BLOCK_SIZE: usize = 512;
const USAGE: &str = "usage: pc_render <input.wav> <output.wav> [settings.json] [block_size]";

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let input = args.next().map(PathBuf::from).context(USAGE)?;
    let output = args.next().map(PathBuf::from).context(USAGE)?;
    let params = match args.next() {
        Some(path) => load_settings(Path::new(&path))?,
        None => StaticParameters::default(),
    };
    let block_size = match args.next() {
        Some(raw) => raw
            .parse::<usize>()
            .with_context(|| format!("invalid block size '{raw}'"))?,
        None => DEFAULT_BLOCK_SIZE,
    };

    let (mut channels, sample_rate) = read_wav(&input)?;
    let frames = channels.first().map_or(0, Vec::len);

    let config = ProcessingConfig {
        sample_rate: sample_rate as f32,
        max_block_size: block_size,
        channel_count: channels.len(),
        input_channel_count: channels.len(),
    };
    config
        .validate()
        .with_context(|| format!("cannot render '{}'", input.display()))?;

    let mut router = SignalRouter::new(config);
    let mut max_gr_db = 0.0f32;
    let mut start = 0;
    while start < frames {
        let end = (start + block_size).min(frames);
        let mut block: Vec<&mut [f32]> = channels
            .iter_mut()
            .map(|ch| &mut ch[start..end])
            .collect();
        router.process_block(&mut block, &params, &mut ());
        max_gr_db = max_gr_db.max(router.gain_reduction_db());
        start = end;
    }

    let interleaved = interleave(&channels);
    write_wav(&output, &interleaved, channels.len() as u16, sample_rate)?;

    println!("Rendered '{}' -> '{}':", input.display(), output.display());
    println!("  frames           : {}", frames);
    println!("  channels         : {}", channels.len());
    println!("  block size       : {}", block_size);
    println!("  max gain red.    : {:.2} dB", max_gr_db);
    report_loudness(&interleaved, channels.len(), sample_rate)?;
    Ok(())
}

fn load_settings(path: &Path) -> Result<StaticParameters> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read settings '{}'", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("failed to parse settings '{}'", path.display()))
}

/// Deinterleaved samples in [-1, 1] plus the file's sample rate.
fn read_wav(path: &Path) -> Result<(Vec<Vec<f32>>, u32)> {
    let reader = WavReader::open(path)
        .with_context(|| format!("failed to open input WAV '{}'", path.display()))?;
    let spec = reader.spec();
    let num_channels = spec.channels as usize;

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .context("failed to decode float samples")?,
        SampleFormat::Int => {
            let scale = 1.0 / (1u64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()
                .context("failed to decode integer samples")?
        }
    };

    let mut channels = vec![Vec::with_capacity(samples.len() / num_channels.max(1)); num_channels];
    for frame in samples.chunks_exact(num_channels.max(1)) {
        for (ch, &s) in channels.iter_mut().zip(frame) {
            ch.push(s);
        }
    }
    Ok((channels, spec.sample_rate))
}

fn interleave(channels: &[Vec<f32>]) -> Vec<f32> {
    let frames = channels.first().map_or(0, Vec::len);
    let mut out = Vec::with_capacity(frames * channels.len());
    for idx in 0..frames {
        out.extend(channels.iter().map(|ch| ch[idx]));
    }
    out
}

fn write_wav(path: &Path, interleaved: &[f32], channels: u16, sample_rate: u32) -> Result<()> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("failed to create output WAV '{}'", path.display()))?;
    for &s in interleaved {
        writer.write_sample(s)?;
    }
    writer.finalize().context("failed to finalize output WAV")?;
    Ok(())
}

fn report_loudness(interleaved: &[f32], channels: usize, sample_rate: u32) -> Result<()> {
    let mut meter = EbuR128::new(channels as u32, sample_rate, Mode::I | Mode::TRUE_PEAK)
        .map_err(|err| anyhow!("failed to create loudness meter: {:?}", err))?;
    meter
        .add_frames_f32(interleaved)
        .map_err(|err| anyhow!("loudness analysis failed: {:?}", err))?;

    match meter.loudness_global() {
        Ok(lufs) if lufs.is_finite() => println!("  integrated       : {:.1} LUFS", lufs),
        _ => println!("  integrated       : n/a (too short or silent)"),
    }

    let mut true_peak = 0.0f64;
    for ch in 0..channels as u32 {
        if let Ok(tp) = meter.true_peak(ch) {
            true_peak = true_peak.max(tp);
        }
    }
    if true_peak > 0.0 {
        println!("  true peak        : {:.2} dBTP", 20.0 * true_peak.log10());
    } else {
        println!("  true peak        : -inf dBTP");
    }
    Ok(())
}
