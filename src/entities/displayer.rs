//! Measuring/rasterizing seam and the render target seam
//!
//! **Why**: The engine never shapes text or touches a real canvas itself.
//! `Displayer` turns a comment into layout dimensions and a pixel buffer,
//! `Surface` consumes cached buffers (or draws directly on a miss). Real
//! applications plug in their text stack; `MonoDisplayer` is the bundled
//! fixed-metrics implementation used by the tests and the simulator.

use super::comment::Comment;
use super::raster::Raster;

/// Artifact build failures
///
/// Build errors never cross the worker boundary; the pass logs them and
/// stops early.
#[derive(Debug)]
pub enum BuildError {
    /// Allocation failed under memory pressure
    OutOfMemory,
    /// The displayer could not produce pixels for this comment
    Render(String),
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildError::OutOfMemory => write!(f, "out of memory"),
            BuildError::Render(e) => write!(f, "render error: {}", e),
        }
    }
}

impl std::error::Error for BuildError {}

/// Shapes and rasterizes comments.
///
/// `measure` must be cheap enough to run under the render gate; `build` may
/// be slow, the scheduler paces it against the render loop.
pub trait Displayer: Send + Sync {
    /// Layout size of `comment` in pixels
    fn measure(&self, comment: &Comment) -> (f32, f32);

    /// Rasterize `comment`, reusing `reuse` if given.
    ///
    /// The returned raster's `size()` must match
    /// `Raster::estimate(measure(comment))` so budget accounting stays exact.
    fn build(&self, comment: &Comment, reuse: Option<Raster>) -> Result<Raster, BuildError>;
}

/// Render target for one frame of the overlay
pub trait Surface {
    /// Compose a pre-built raster at the comment's position (cache hit)
    fn blit(&mut self, comment: &Comment, raster: &Raster);

    /// Draw the comment synchronously without a cache entry (fallback)
    fn draw_direct(&mut self, comment: &Comment);
}

/// Fixed-metrics monospace displayer
///
/// Every glyph occupies `glyph_width` x `line_height`; multi-line text is
/// split on `\n` and measured as widest-line x line-count. The raster is a
/// filled box per text line. Enough for tests, demos and layout debugging.
#[derive(Debug, Clone)]
pub struct MonoDisplayer {
    pub glyph_width: f32,
    pub line_height: f32,
    pub padding: f32,
}

impl Default for MonoDisplayer {
    fn default() -> Self {
        Self {
            glyph_width: 16.0,
            line_height: 24.0,
            padding: 4.0,
        }
    }
}

impl MonoDisplayer {
    fn layout(&self, text: &str) -> (f32, f32) {
        let mut max_chars = 0usize;
        let mut lines = 0usize;
        for line in text.split('\n') {
            max_chars = max_chars.max(line.chars().count());
            lines += 1;
        }
        let w = max_chars as f32 * self.glyph_width + 2.0 * self.padding;
        let h = lines as f32 * self.line_height + 2.0 * self.padding;
        (w, h)
    }
}

impl Displayer for MonoDisplayer {
    fn measure(&self, comment: &Comment) -> (f32, f32) {
        self.layout(comment.text())
    }

    fn build(&self, comment: &Comment, reuse: Option<Raster>) -> Result<Raster, BuildError> {
        let (w, h) = if comment.measured() {
            comment.size()
        } else {
            self.layout(comment.text())
        };
        let (pw, ph) = (w.ceil() as u32, h.ceil() as u32);
        if pw == 0 || ph == 0 {
            return Err(BuildError::Render("empty layout".into()));
        }

        let mut raster = reuse.unwrap_or_default();
        raster.ensure(pw, ph);

        // one opaque white box per text line, padding left transparent
        let pad = self.padding.round() as u32;
        let line_h = self.line_height.round() as u32;
        let pixels = raster.pixels_mut();
        for (i, line) in comment.text().split('\n').enumerate() {
            let chars = line.chars().count() as u32;
            if chars == 0 {
                continue;
            }
            let x0 = pad.min(pw);
            let x1 = (pad + chars * self.glyph_width.round() as u32).min(pw);
            let y0 = (pad + i as u32 * line_h).min(ph);
            let y1 = (y0 + line_h).min(ph);
            for y in y0..y1 {
                let start = (y * pw + x0) as usize * 4;
                let end = (y * pw + x1) as usize * 4;
                pixels[start..end].fill(0xFF);
            }
        }
        Ok(raster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::comment::CommentKind;

    #[test]
    fn test_measure_single_line() {
        let d = MonoDisplayer::default();
        let c = Comment::new("hello", CommentKind::Rolling, 0, 4000);
        let (w, h) = d.measure(&c);
        assert_eq!(w, 5.0 * 16.0 + 8.0);
        assert_eq!(h, 24.0 + 8.0);
    }

    /// Test: multi-line measuring
    /// Validates: width follows the widest line, height follows line count
    #[test]
    fn test_measure_multiline() {
        let d = MonoDisplayer::default();
        let c = Comment::new("ab\nlonger\nx", CommentKind::Top, 0, 4000);
        let (w, h) = d.measure(&c);
        assert_eq!(w, 6.0 * 16.0 + 8.0);
        assert_eq!(h, 3.0 * 24.0 + 8.0);
    }

    /// Test: build size matches estimate
    /// Validates: the store's byte accounting sees exactly what was allocated
    #[test]
    fn test_build_matches_estimate() {
        let d = MonoDisplayer::default();
        let c = Comment::new("danmaku", CommentKind::Rolling, 0, 4000);
        let (w, h) = d.measure(&c);
        c.set_measured(w, h);

        let raster = d.build(&c, None).unwrap();
        assert_eq!(raster.size(), Raster::estimate(w, h));
        // some ink was laid down
        assert!(raster.pixels().iter().any(|&b| b != 0));
    }

    #[test]
    fn test_build_reuses_buffer() {
        let d = MonoDisplayer::default();
        let c = Comment::new("aa", CommentKind::Rolling, 0, 4000);

        let big = Raster::with_size(500, 100);
        let raster = d.build(&c, Some(big)).unwrap();
        let (w, h) = d.measure(&c);
        assert_eq!(raster.size(), Raster::estimate(w, h));
    }

    #[test]
    fn test_build_empty_text_fails() {
        let d = MonoDisplayer {
            padding: 0.0,
            ..Default::default()
        };
        let c = Comment::new("", CommentKind::Rolling, 0, 4000);
        assert!(d.build(&c, None).is_err());
    }
}
