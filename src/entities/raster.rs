//! Pre-rendered RGBA8 buffer attached to a comment while it sits in the cache.
//!
//! Buffers are recycled through `RasterPool`, so the byte estimate used for
//! budgeting (`Raster::estimate`) and the real size after `ensure()` must
//! agree: both are `ceil(w) * ceil(h) * 4`.

/// Owned RGBA8 pixel buffer, 4 bytes per pixel.
#[derive(Debug, Clone, Default)]
pub struct Raster {
    buf: Vec<u8>,
    width: u32,
    height: u32,
}

impl Raster {
    /// Create an empty raster (no allocation until `ensure()`)
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a zeroed raster of the given dimensions
    pub fn with_size(width: u32, height: u32) -> Self {
        let mut r = Self::new();
        r.ensure(width, height);
        r
    }

    /// Byte-size estimate for a layout of `w` x `h` units
    ///
    /// Used for admission decisions before the buffer exists.
    pub fn estimate(w: f32, h: f32) -> usize {
        (w.ceil().max(0.0) as usize) * (h.ceil().max(0.0) as usize) * 4
    }

    /// Resize to `width` x `height`, zeroing all pixels.
    ///
    /// Keeps the existing allocation when capacity allows, so pooled buffers
    /// are reused instead of reallocated.
    pub fn ensure(&mut self, width: u32, height: u32) {
        let len = width as usize * height as usize * 4;
        self.buf.clear();
        self.buf.resize(len, 0);
        self.width = width;
        self.height = height;
    }

    /// Drop pixel content but keep the allocation (for pool recycling)
    pub fn reset(&mut self) {
        self.buf.clear();
        self.width = 0;
        self.height = 0;
    }

    /// Buffer size in bytes
    pub fn size(&self) -> usize {
        self.buf.len()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Pixel data, row-major RGBA
    pub fn pixels(&self) -> &[u8] {
        &self.buf
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test: byte estimate matches real buffer size
    /// Validates: admission accounting and allocation agree
    #[test]
    fn test_estimate_matches_ensure() {
        let mut r = Raster::new();
        r.ensure(120, 32);
        assert_eq!(r.size(), 120 * 32 * 4);
        assert_eq!(Raster::estimate(120.0, 32.0), r.size());

        // fractional layout sizes round up
        assert_eq!(Raster::estimate(119.2, 31.5), 120 * 32 * 4);
        assert_eq!(Raster::estimate(0.0, 31.5), 0);
    }

    /// Test: ensure() reuses the allocation
    /// Validates: pooled buffers do not reallocate on same-or-smaller rebuilds
    #[test]
    fn test_ensure_reuses_capacity() {
        let mut r = Raster::with_size(100, 20);
        let cap = r.buf.capacity();
        r.reset();
        assert!(r.is_empty());
        assert_eq!(r.size(), 0);

        r.ensure(80, 20);
        assert_eq!(r.size(), 80 * 20 * 4);
        assert_eq!(r.buf.capacity(), cap);
    }

    /// Test: ensure() zeroes previous content
    /// Validates: recycled buffers never leak one comment's pixels into another
    #[test]
    fn test_ensure_zeroes_content() {
        let mut r = Raster::with_size(4, 4);
        r.pixels_mut().fill(0xAB);
        r.ensure(4, 4);
        assert!(r.pixels().iter().all(|&b| b == 0));
    }
}
