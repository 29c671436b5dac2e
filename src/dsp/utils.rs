/// Floor for level detection so log10 never sees zero.
pub const DB_EPS: f32 = 1e-9;

/// Anything at or below this is treated as silence by the gain stages.
pub const MINUS_INFINITY_DB: f32 = -100.0;

#[inline]
pub fn db_to_lin(db: f32) -> f32 {
    if db <= MINUS_INFINITY_DB {
        0.0
    } else {
        10.0f32.powf(db / 20.0)
    }
}

#[inline]
pub fn lin_to_db(lin: f32) -> f32 {
    20.0 * lin.max(DB_EPS).log10()
}

/// One-pole smoothing coefficient for a time constant in milliseconds.
#[inline]
pub fn time_constant_coeff(time_ms: f32, sample_rate: f32) -> f32 {
    let samples = time_ms * 0.001 * sample_rate;
    if samples <= 0.0 {
        0.0
    } else {
        (-1.0 / samples).exp()
    }
}

/// Ballistics coefficient for attack/release followers.
///
/// Times under a microsecond collapse to an instant follower.
#[inline]
pub fn ballistics_coeff(time_ms: f32, sample_rate: f32) -> f32 {
    if time_ms < 1e-3 || sample_rate <= 0.0 {
        0.0
    } else {
        (-2.0 * std::f32::consts::PI * 1000.0 / (time_ms * sample_rate)).exp()
    }
}

/// Multiply every sample of every channel by a linear `gain`.
#[inline]
pub fn scale_channels<C: AsMut<[f32]>>(channels: &mut [C], gain: f32) {
    if gain == 1.0 {
        return;
    }
    for channel in channels.iter_mut() {
        for sample in channel.as_mut().iter_mut() {
            *sample *= gain;
        }
    }
}

/// Sum `src` into `dst` channel by channel.
#[inline]
pub fn add_channels<C: AsRef<[f32]>>(dst: &mut [&mut [f32]], src: &[C]) {
    for (out, input) in dst.iter_mut().zip(src.iter()) {
        for (o, i) in out.iter_mut().zip(input.as_ref().iter()) {
            *o += *i;
        }
    }
}
