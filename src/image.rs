// image.rs - Runtime-sized image container for sample inputs and references.
//
// Row-major, contiguous, stride == width. Samples synthesize their input
// frames here (image file I/O is not part of the harness), compute the CPU
// reference on them, and upload `as_slice()` to the device.
//
// BORDERS:
// Kernels clamp coordinates to the image edge. `get_clamped` is the host
// mirror of that addressing mode so CPU references agree pixel-for-pixel:
//
//   (-1, -1) -> (0, 0)      (width, y) -> (width - 1, y)

use std::fmt;
use std::str::FromStr;

/// Types that can serve as pixel values.
pub trait Pixel: Copy + Default + Send + Sync + PartialOrd + fmt::Debug + 'static {
    fn to_u32(self) -> u32;
    fn from_u32(v: u32) -> Self;
}

impl Pixel for u8 {
    #[inline]
    fn to_u32(self) -> u32 {
        self as u32
    }

    #[inline]
    fn from_u32(v: u32) -> Self {
        v.min(u8::MAX as u32) as u8
    }
}

impl Pixel for u16 {
    #[inline]
    fn to_u32(self) -> u32 {
        self as u32
    }

    #[inline]
    fn from_u32(v: u32) -> Self {
        v.min(u16::MAX as u32) as u16
    }
}

/// A 2D image with runtime dimensions.
#[derive(Clone, PartialEq)]
pub struct Image<T: Pixel> {
    data: Vec<T>,
    width: usize,
    height: usize,
}

impl<T: Pixel> Image<T> {
    /// Zero-initialized image.
    pub fn new(width: usize, height: usize) -> Self {
        Image { data: vec![T::default(); width * height], width, height }
    }

    /// Wrap an existing pixel vector. `None` if the length does not match.
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Option<Self> {
        (data.len() == width * height).then_some(Image { data, width, height })
    }

    pub fn from_fn<F: FnMut(usize, usize) -> T>(width: usize, height: usize, mut f: F) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Image { data, width, height }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Pixel at (x, y).
    ///
    /// # Panics
    /// Panics if (x, y) is out of bounds.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> T {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x}, {y}) out of bounds for {}x{} image",
            self.width,
            self.height
        );
        self.data[y * self.width + x]
    }

    /// Pixel at (x, y) with coordinates clamped to the image edge.
    #[inline]
    pub fn get_clamped(&self, x: isize, y: isize) -> T {
        let cx = x.clamp(0, self.width as isize - 1) as usize;
        let cy = y.clamp(0, self.height as isize - 1) as usize;
        self.data[cy * self.width + cx]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: T) {
        assert!(x < self.width && y < self.height);
        self.data[y * self.width + x] = value;
    }

    pub fn row(&self, y: usize) -> &[T] {
        assert!(y < self.height, "row {y} out of bounds (height {})", self.height);
        &self.data[y * self.width..(y + 1) * self.width]
    }

    /// Iterate `(x, y, value)` in row-major order.
    pub fn pixels(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        let w = self.width;
        self.data.iter().enumerate().map(move |(i, &v)| (i % w, i / w, v))
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Every pixel widened to `u32`, the element type kernels address.
    pub fn to_u32_vec(&self) -> Vec<u32> {
        self.data.iter().map(|p| p.to_u32()).collect()
    }

    /// Inverse of `to_u32_vec`.
    pub fn from_u32_slice(width: usize, height: usize, values: &[u32]) -> Option<Self> {
        Self::from_vec(width, height, values.iter().map(|&v| T::from_u32(v)).collect())
    }

    /// Rows `parity`, `parity + 2`, ... as a half-height image.
    ///
    /// `parity` 0 is the top field of an interlaced frame, 1 the bottom.
    pub fn field(&self, parity: usize) -> Image<T> {
        let rows: Vec<usize> = (parity..self.height).step_by(2).collect();
        let mut data = Vec::with_capacity(rows.len() * self.width);
        for &y in &rows {
            data.extend_from_slice(self.row(y));
        }
        Image { data, width: self.width, height: rows.len() }
    }
}

impl<T: Pixel> fmt::Debug for Image<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Image<{}> {}x{}", std::any::type_name::<T>(), self.width, self.height)?;
        let rows = self.height.min(8);
        let cols = self.width.min(8);
        for y in 0..rows {
            let row: Vec<String> = (0..cols).map(|x| format!("{:?}", self.get(x, y))).collect();
            let ellipsis = if cols < self.width { " ..." } else { "" };
            writeln!(f, "  [{}{}]", row.join(", "), ellipsis)?;
        }
        if rows < self.height {
            writeln!(f, "  ...")?;
        }
        Ok(())
    }
}

impl<T: Pixel> std::ops::Index<(usize, usize)> for Image<T> {
    type Output = T;

    fn index(&self, (x, y): (usize, usize)) -> &T {
        assert!(x < self.width && y < self.height);
        &self.data[y * self.width + x]
    }
}

// ---------------------------------------------------------------------------
// Synthetic inputs
// ---------------------------------------------------------------------------

/// Content of a synthesized 8-bit test image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Pattern {
    /// Every pixel has the same value.
    Uniform,
    /// Diagonal ramp.
    #[default]
    Gradient,
    /// Deterministic pseudo-random values (salt-and-pepper friendly).
    Noise,
}

impl FromStr for Pattern {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "uniform" => Ok(Pattern::Uniform),
            "gradient" => Ok(Pattern::Gradient),
            "noise" => Ok(Pattern::Noise),
            other => Err(format!("unknown pattern `{other}`")),
        }
    }
}

/// xorshift32; fixed seed so a failing run reproduces.
pub(crate) struct XorShift(u32);

impl XorShift {
    pub(crate) fn new(seed: u32) -> Self {
        XorShift(seed.max(1))
    }

    pub(crate) fn next_u32(&mut self) -> u32 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.0 = x;
        x
    }
}

/// Synthesize a `width`×`height` image. `seed` picks the noise sequence
/// and, through its low byte, the `Uniform` fill value.
pub fn synthesize(pattern: Pattern, width: usize, height: usize, seed: u32) -> Image<u8> {
    match pattern {
        Pattern::Uniform => Image::from_fn(width, height, |_, _| (seed & 0xff) as u8),
        Pattern::Gradient => {
            let span = (width + height).saturating_sub(2).max(1);
            Image::from_fn(width, height, |x, y| ((x + y) * 255 / span) as u8)
        }
        Pattern::Noise => {
            let mut rng = XorShift::new(seed);
            Image::from_fn(width, height, |_, _| (rng.next_u32() >> 24) as u8)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamped_access_at_corners() {
        let img = Image::from_vec(2, 2, vec![1u8, 2, 3, 4]).unwrap();
        assert_eq!(img.get_clamped(-1, -1), 1);
        assert_eq!(img.get_clamped(5, -3), 2);
        assert_eq!(img.get_clamped(-2, 9), 3);
        assert_eq!(img.get_clamped(2, 2), 4);
    }

    #[test]
    fn uniform_pattern_is_uniform() {
        let img = synthesize(Pattern::Uniform, 7, 5, 42);
        assert!(img.pixels().all(|(_, _, v)| v == 42));
    }

    #[test]
    fn noise_is_deterministic() {
        let a = synthesize(Pattern::Noise, 16, 16, 7);
        let b = synthesize(Pattern::Noise, 16, 16, 7);
        assert_eq!(a, b);
        assert_ne!(a, synthesize(Pattern::Noise, 16, 16, 8));
    }

    #[test]
    fn gradient_spans_full_range() {
        let img = synthesize(Pattern::Gradient, 32, 32, 0);
        assert_eq!(img.get(0, 0), 0);
        assert_eq!(img.get(31, 31), 255);
    }
}
