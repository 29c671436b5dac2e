use crate::dsp::utils::{add_channels, scale_channels};

/// Dry and wet scratch copies of the live block.
///
/// Capacity is reserved in [`BufferSet::resize`] (configuration path). On the
/// audio path each snapshot truncates and refills the vectors in place, so the
/// scratch shape always matches the incoming block and nothing from the previous
/// block survives.
#[derive(Default)]
pub struct BufferSet {
    dry: Vec<Vec<f32>>,
    wet: Vec<Vec<f32>>,
    max_block_size: usize,
}

impl BufferSet {
    pub fn new(channels: usize, max_block_size: usize) -> Self {
        let mut set = Self::default();
        set.resize(channels, max_block_size);
        set
    }

    /// Allocates. Call only from the configuration path.
    pub fn resize(&mut self, channels: usize, max_block_size: usize) {
        self.max_block_size = max_block_size;
        for buffers in [&mut self.dry, &mut self.wet] {
            buffers.clear();
            buffers.resize_with(channels, || Vec::with_capacity(max_block_size));
        }
    }

    pub fn channels(&self) -> usize {
        self.dry.len()
    }

    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    /// Overwrite both scratch buffers with a copy of `block`.
    pub fn snapshot(&mut self, block: &[&mut [f32]]) {
        debug_assert_eq!(
            block.len(),
            self.dry.len(),
            "block has {} channels, scratch prepared for {}",
            block.len(),
            self.dry.len()
        );

        for ((src, dry), wet) in block.iter().zip(self.dry.iter_mut()).zip(self.wet.iter_mut()) {
            debug_assert!(
                src.len() <= self.max_block_size,
                "block of {} samples exceeds prepared max {}",
                src.len(),
                self.max_block_size
            );
            dry.clear();
            dry.extend_from_slice(src);
            wet.clear();
            wet.extend_from_slice(src);
        }
    }

    pub fn dry(&self) -> &[Vec<f32>] {
        &self.dry
    }

    pub fn wet(&self) -> &[Vec<f32>] {
        &self.wet
    }

    pub fn wet_mut(&mut self) -> &mut [Vec<f32>] {
        &mut self.wet
    }

    /// Linear mix weights, applied to each scratch buffer.
    pub fn apply_mix(&mut self, wet_mix: f32, dry_mix: f32) {
        scale_channels(&mut self.wet, wet_mix);
        scale_channels(&mut self.dry, dry_mix);
    }

    pub fn sum_wet_into(&self, block: &mut [&mut [f32]]) {
        add_channels(block, &self.wet);
    }

    pub fn sum_dry_into(&self, block: &mut [&mut [f32]]) {
        add_channels(block, &self.dry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_replaces_previous_content() {
        let mut set = BufferSet::new(2, 8);

        let mut l = [1.0f32; 8];
        let mut r = [2.0f32; 8];
        let block: [&mut [f32]; 2] = [&mut l, &mut r];
        set.snapshot(&block);
        set.apply_mix(0.5, 0.5);

        let mut l = [3.0f32; 4];
        let mut r = [4.0f32; 4];
        let block: [&mut [f32]; 2] = [&mut l, &mut r];
        set.snapshot(&block);

        assert_eq!(set.dry()[0], vec![3.0; 4]);
        assert_eq!(set.wet()[1], vec![4.0; 4]);
    }

    #[test]
    fn test_snapshot_does_not_grow_capacity() {
        let mut set = BufferSet::new(1, 256);
        let before = set.dry()[0].capacity();
        let mut ch = [0.5f32; 256];
        let block: [&mut [f32]; 1] = [&mut ch];
        set.snapshot(&block);
        assert_eq!(set.dry()[0].capacity(), before);
        assert_eq!(set.max_block_size(), 256);
        assert_eq!(set.channels(), 1);
    }

    #[test]
    fn test_mix_and_sum() {
        let mut set = BufferSet::new(1, 4);
        let mut ch = [1.0f32; 4];
        let block: [&mut [f32]; 1] = [&mut ch];
        set.snapshot(&block);
        set.wet_mut()[0].iter_mut().for_each(|s| *s = 0.5);
        set.apply_mix(0.25, 0.75);

        let mut out = [0.0f32; 4];
        {
            let mut block: [&mut [f32]; 1] = [&mut out];
            set.sum_wet_into(&mut block);
            set.sum_dry_into(&mut block);
        }
        assert!(out.iter().all(|s| (s - (0.125 + 0.75)).abs() < 1e-6));
    }
}
