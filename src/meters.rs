//! Thread-safe metering shared between the audio thread and an editor.
//!
//! Floats are stored as bits in `AtomicU32` so both sides stay lock-free. Levels
//! are in dBFS, gain reduction in positive dB.

use std::sync::atomic::{AtomicU32, Ordering};

/// Reported when nothing has been metered yet.
pub const METER_FLOOR_DB: f32 = -80.0;

pub struct Meters {
    input_peak_l: AtomicU32,
    input_peak_r: AtomicU32,
    output_peak_l: AtomicU32,
    output_peak_r: AtomicU32,
    output_rms_l: AtomicU32,
    output_rms_r: AtomicU32,
    gain_reduction: AtomicU32,
}

impl Default for Meters {
    fn default() -> Self {
        let floor = || AtomicU32::new(METER_FLOOR_DB.to_bits());
        Self {
            input_peak_l: floor(),
            input_peak_r: floor(),
            output_peak_l: floor(),
            output_peak_r: floor(),
            output_rms_l: floor(),
            output_rms_r: floor(),
            gain_reduction: AtomicU32::new(0.0f32.to_bits()),
        }
    }
}

#[inline]
fn store(cell: &AtomicU32, val: f32) {
    cell.store(val.to_bits(), Ordering::Relaxed);
}

#[inline]
fn load(cell: &AtomicU32) -> f32 {
    f32::from_bits(cell.load(Ordering::Relaxed))
}

impl Meters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&self) {
        for cell in [
            &self.input_peak_l,
            &self.input_peak_r,
            &self.output_peak_l,
            &self.output_peak_r,
            &self.output_rms_l,
            &self.output_rms_r,
        ] {
            store(cell, METER_FLOOR_DB);
        }
        store(&self.gain_reduction, 0.0);
    }

    pub fn set_input_peaks(&self, l: f32, r: f32) {
        store(&self.input_peak_l, l);
        store(&self.input_peak_r, r);
    }

    pub fn set_output_peaks(&self, l: f32, r: f32) {
        store(&self.output_peak_l, l);
        store(&self.output_peak_r, r);
    }

    pub fn set_output_rms(&self, l: f32, r: f32) {
        store(&self.output_rms_l, l);
        store(&self.output_rms_r, r);
    }

    pub fn set_gain_reduction_db(&self, val: f32) {
        store(&self.gain_reduction, val);
    }

    pub fn get_input_peaks(&self) -> (f32, f32) {
        (load(&self.input_peak_l), load(&self.input_peak_r))
    }

    pub fn get_output_peaks(&self) -> (f32, f32) {
        (load(&self.output_peak_l), load(&self.output_peak_r))
    }

    pub fn get_output_rms(&self) -> (f32, f32) {
        (load(&self.output_rms_l), load(&self.output_rms_r))
    }

    pub fn get_gain_reduction_db(&self) -> f32 {
        load(&self.gain_reduction)
    }
}
