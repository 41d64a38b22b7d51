//! Pixel sample types.
//!
//! A [`Sample`] decomposes into a fixed number of `f64` components, rebuilds
//! from them, and has a fixed-width little-endian byte encoding. Chunks are
//! averaged together through [`Sample::accumulate`] and [`Sample::mean`].

use std::fmt::Debug;

/// Contract for a pixel value stored in a chunk.
pub trait Sample: Copy + Default + PartialEq + Debug + Send + Sync + 'static {
    /// Short name used in blob containers and filenames (e.g. `height`).
    const KIND: &'static str;

    /// Bytes per sample in a persisted record.
    const ENCODED_LEN: usize;

    /// Fixed-size component array.
    type Components: AsRef<[f64]>;

    fn to_components(&self) -> Self::Components;

    /// Rebuild from components. Missing components read as zero.
    fn from_components(components: &[f64]) -> Self;

    /// Append exactly [`Sample::ENCODED_LEN`] bytes.
    fn write_bytes(&self, out: &mut Vec<u8>);

    /// Decode from exactly [`Sample::ENCODED_LEN`] bytes.
    fn read_bytes(bytes: &[u8]) -> Self;

    /// Add this sample into `sums`, the running per-component sums of the
    /// samples folded so far.
    fn accumulate(&self, sums: &mut [f64]) {
        for (sum, c) in sums.iter_mut().zip(self.to_components().as_ref()) {
            *sum += c;
        }
    }

    /// The mean of `count` samples whose components add up to `sums`.
    ///
    /// Rounding to the sample type happens here, once, so the result does
    /// not depend on the order the samples were accumulated in.
    fn mean(count: u32, sums: &[f64]) -> Self {
        let n = f64::from(count.max(1));
        let mean: Vec<f64> = sums.iter().map(|s| s / n).collect();
        Self::from_components(&mean)
    }
}

/// Elevation in metres.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Height(pub f32);

impl Height {
    /// Marker for missing data (the SRTM void value).
    pub const VOID: Height = Height(-32768.0);

    pub fn is_void(self) -> bool {
        self.0 == Self::VOID.0
    }

    pub fn meters(self) -> Option<f32> {
        if self.is_void() {
            None
        } else {
            Some(self.0)
        }
    }
}

impl Sample for Height {
    const KIND: &'static str = "height";
    const ENCODED_LEN: usize = 4;
    type Components = [f64; 1];

    fn to_components(&self) -> [f64; 1] {
        [self.0 as f64]
    }

    fn from_components(components: &[f64]) -> Self {
        Height(components.first().copied().unwrap_or(0.0) as f32)
    }

    fn write_bytes(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.0.to_le_bytes());
    }

    fn read_bytes(bytes: &[u8]) -> Self {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&bytes[..4]);
        Height(f32::from_le_bytes(raw))
    }

    /// Void absorbs: a void sample poisons the sum with NaN.
    fn accumulate(&self, sums: &mut [f64]) {
        if let Some(sum) = sums.first_mut() {
            *sum = if self.is_void() { f64::NAN } else { *sum + self.0 as f64 };
        }
    }

    fn mean(count: u32, sums: &[f64]) -> Self {
        match sums.first() {
            Some(sum) if sum.is_nan() => Height::VOID,
            Some(sum) => Height((sum / f64::from(count.max(1))) as f32),
            None => Height::default(),
        }
    }
}

/// 8-bit RGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgb(pub [u8; 3]);

impl Sample for Rgb {
    const KIND: &'static str = "rgb";
    const ENCODED_LEN: usize = 3;
    type Components = [f64; 3];

    fn to_components(&self) -> [f64; 3] {
        self.0.map(f64::from)
    }

    /// Channels are rounded and clamped to `0..=255`.
    fn from_components(components: &[f64]) -> Self {
        let channel = |k: usize| {
            components
                .get(k)
                .copied()
                .unwrap_or(0.0)
                .round()
                .clamp(0.0, 255.0) as u8
        };
        Rgb([channel(0), channel(1), channel(2)])
    }

    fn write_bytes(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.0);
    }

    fn read_bytes(bytes: &[u8]) -> Self {
        Rgb([bytes[0], bytes[1], bytes[2]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mean_of<T: Sample>(samples: &[T]) -> T {
        let width = T::default().to_components().as_ref().len();
        let mut sums = vec![0.0; width];
        for s in samples {
            s.accumulate(&mut sums);
        }
        T::mean(samples.len() as u32, &sums)
    }

    #[test]
    fn test_height_online_mean() {
        assert_eq!(mean_of(&[Height(3.0), Height(9.0), Height(21.0)]), Height(11.0));
    }

    #[test]
    fn test_height_void_absorbs() {
        assert!(mean_of(&[Height(5.0), Height::VOID, Height(7.0)]).is_void());
        assert!(mean_of(&[Height::VOID, Height(1.0)]).is_void());
        assert_eq!(mean_of(&[Height(5.0), Height::VOID]).meters(), None);
        assert_eq!(mean_of(&[Height(5.0), Height(7.0)]).meters(), Some(6.0));
    }

    #[test]
    fn test_height_mean_ignores_order() {
        let values = [Height(0.1), Height(0.7), Height(1234.567)];
        let forward = mean_of(&values);
        let backward = mean_of(&[values[2], values[1], values[0]]);
        let middle = mean_of(&[values[1], values[2], values[0]]);
        assert_eq!(forward.0.to_bits(), backward.0.to_bits());
        assert_eq!(forward.0.to_bits(), middle.0.to_bits());
    }

    #[test]
    fn test_height_bytes() {
        let mut out = Vec::new();
        Height(1234.5).write_bytes(&mut out);
        Height::VOID.write_bytes(&mut out);
        assert_eq!(out.len(), 2 * Height::ENCODED_LEN);
        assert_eq!(Height::read_bytes(&out[..4]), Height(1234.5));
        assert!(Height::read_bytes(&out[4..]).is_void());
    }

    #[test]
    fn test_rgb_clamps() {
        assert_eq!(Rgb::from_components(&[-3.0, 127.5, 400.0]), Rgb([0, 128, 255]));
        assert_eq!(Rgb([1, 2, 3]).to_components(), [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_rgb_online_mean() {
        let samples = [Rgb([10, 20, 30]), Rgb([30, 40, 50])];
        assert_eq!(mean_of(&samples), Rgb([20, 30, 40]));
        let samples = [Rgb([10, 20, 30]), Rgb([30, 40, 50]), Rgb([80, 90, 255])];
        assert_eq!(mean_of(&samples), Rgb([40, 50, 112]));
    }

    #[test]
    fn test_rgb_rounds_once() {
        let (dark, light) = (Rgb([0, 0, 0]), Rgb([1, 1, 1]));
        assert_eq!(mean_of(&[dark, dark, light]), Rgb([0, 0, 0]));
        assert_eq!(mean_of(&[light, dark, dark]), Rgb([0, 0, 0]));
        assert_eq!(mean_of(&[dark, light, light]), Rgb([1, 1, 1]));
    }
}
