// image.rs — Image containers shared by both execution paths.
//
// Three layers:
//
//   ColorImage   — interleaved u8 samples straight out of the decoder
//                  (1 or 3 channels, R,G,B order). Pipeline input only.
//   Image<T>     — one plane of `T` pixels with an explicit row stride.
//                  Every stage after grayscale reduction works on these.
//   Frame /      — a ColorImage or Image<u8> tagged with the identifier
//   ProcessedFrame  the loader assigned (the file name). The identifier is
//                  what ties an input to its host and accelerated outputs.
//
// Memory layout of Image<T> (stride = 5, width = 4):
//
//   data index:  0  1  2  3 [4]  5  6  7  8 [9] 10 11 12 13 [14]
//   pixel:       ■  ■  ■  ■  ·   ■  ■  ■  ■  ·   ■  ■  ■  ■  ·
//   row:         |--- row 0 ---|  |--- row 1 ---|  |--- row 2 ---|
//
// The padding elements never carry pixel data. The GPU upload path
// compacts them away before handing rows to wgpu (see gpu/image.rs).

use std::fmt;

// ---------------------------------------------------------------------------
// Pixel trait
// ---------------------------------------------------------------------------

/// Trait for types that can serve as pixel values in an [`Image`].
///
/// `to_f32`/`from_f32` are RAW conversions (u8 42 ↔ f32 42.0), which is
/// what the convolution and gradient stages accumulate in.
pub trait Pixel: Copy + Default + Send + Sync + PartialOrd + 'static {
    fn to_f32(self) -> f32;

    /// Construct a pixel from an f32 value (with clamping/rounding where
    /// the type needs it).
    fn from_f32(v: f32) -> Self;
}

impl Pixel for u8 {
    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        // Round half away from zero. The WGSL side spells this
        // floor(v + 0.5), which agrees for the non-negative range we store.
        v.clamp(0.0, 255.0).round() as u8
    }
}

impl Pixel for f32 {
    #[inline]
    fn to_f32(self) -> f32 {
        self
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        v
    }
}

// ---------------------------------------------------------------------------
// Image<T>
// ---------------------------------------------------------------------------

/// A single-plane 2D image with runtime dimensions, generic over pixel type.
pub struct Image<T: Pixel> {
    /// Pixel data in row-major order. Length = height * stride.
    data: Vec<T>,
    width: usize,
    height: usize,
    /// Row stride in *elements* (not bytes). stride >= width.
    stride: usize,
}

// Manual Clone: a deep copy of the pixel buffer, not a cheap handle copy.
impl<T: Pixel> Clone for Image<T> {
    fn clone(&self) -> Self {
        Image {
            data: self.data.clone(),
            width: self.width,
            height: self.height,
            stride: self.stride,
        }
    }
}

impl<T: Pixel> Image<T> {
    /// Create a zero-initialized image. Stride equals width.
    pub fn new(width: usize, height: usize) -> Self {
        Self::new_with_stride(width, height, width)
    }

    /// Create a zero-initialized image with an explicit stride.
    ///
    /// # Panics
    /// Panics if `stride < width`.
    pub fn new_with_stride(width: usize, height: usize, stride: usize) -> Self {
        assert!(
            stride >= width,
            "stride ({stride}) must be >= width ({width})"
        );
        Image {
            data: vec![T::default(); height * stride],
            width,
            height,
            stride,
        }
    }

    /// Create an image from a tightly packed pixel vector.
    ///
    /// # Panics
    /// Panics if `data.len() != width * height`.
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Self {
        assert_eq!(
            data.len(),
            width * height,
            "data length ({}) must equal width * height ({})",
            data.len(),
            width * height,
        );
        Image {
            data,
            width,
            height,
            stride: width,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Get the pixel value at (x, y). x is column, y is row.
    ///
    /// # Panics
    /// Panics if (x, y) is out of bounds.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> T {
        self.bounds_check(x, y);
        self.data[y * self.stride + x]
    }

    /// Get pixel value without bounds checking.
    ///
    /// # Safety
    /// Caller must guarantee x < width and y < height.
    /// Used in the interior loops of convolution and morphology where the
    /// loop bounds already keep the window inside the image.
    #[inline(always)]
    pub unsafe fn get_unchecked(&self, x: usize, y: usize) -> T {
        debug_assert!(x < self.width && y < self.height,
            "get_unchecked({x},{y}) out of bounds for {}x{}", self.width, self.height);
        *self.data.get_unchecked(y * self.stride + x)
    }

    /// Set pixel value without bounds checking.
    ///
    /// # Safety
    /// Caller must guarantee x < width and y < height.
    #[inline(always)]
    pub unsafe fn set_unchecked(&mut self, x: usize, y: usize, value: T) {
        debug_assert!(x < self.width && y < self.height);
        *self.data.get_unchecked_mut(y * self.stride + x) = value;
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: T) {
        self.bounds_check(x, y);
        let idx = y * self.stride + x;
        self.data[idx] = value;
    }

    /// Borrow a single row as a slice (active pixels only, no padding).
    #[inline]
    pub fn row(&self, y: usize) -> &[T] {
        assert!(y < self.height, "row {y} out of bounds (height {})", self.height);
        let start = y * self.stride;
        &self.data[start..start + self.width]
    }

    /// Iterate over all pixels as `(x, y, value)` tuples, skipping padding.
    pub fn pixels(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        (0..self.height).flat_map(move |y| {
            (0..self.width).map(move |x| (x, y, self.data[y * self.stride + x]))
        })
    }

    /// Access the underlying data as a flat slice, including stride padding.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Copy the active pixels into a tightly packed vector (stride == width).
    pub fn to_packed_vec(&self) -> Vec<T> {
        if self.stride == self.width {
            return self.data.clone();
        }
        let mut out = Vec::with_capacity(self.width * self.height);
        for y in 0..self.height {
            out.extend_from_slice(self.row(y));
        }
        out
    }

    #[inline]
    fn bounds_check(&self, x: usize, y: usize) {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x},{y}) out of bounds for image {}×{}",
            self.width,
            self.height,
        );
    }
}

impl<T: Pixel + fmt::Debug> fmt::Debug for Image<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Image {}×{} (stride {}):", self.width, self.height, self.stride)?;
        // Print at most 8×8 pixels; larger images just get the header.
        let max_show = 8;
        for y in 0..self.height.min(max_show) {
            write!(f, "  [")?;
            for x in 0..self.width.min(max_show) {
                if x > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{:?}", self.get(x, y))?;
            }
            if self.width > max_show {
                write!(f, ", ...")?;
            }
            writeln!(f, "]")?;
        }
        if self.height > max_show {
            writeln!(f, "  ...")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ColorImage
// ---------------------------------------------------------------------------

/// Interleaved 8-bit image as produced by the decoder.
///
/// `channels` is 1 (grayscale) or 3 (R, G, B). The channel count is the
/// "pixel format" the accelerated path configures its grayscale kernel from.
#[derive(Clone, PartialEq, Eq)]
pub struct ColorImage {
    data: Vec<u8>,
    width: usize,
    height: usize,
    channels: usize,
}

impl ColorImage {
    /// Wrap interleaved samples.
    ///
    /// # Panics
    /// Panics if `channels` is not 1 or 3, or if
    /// `data.len() != width * height * channels`.
    pub fn from_vec(width: usize, height: usize, channels: usize, data: Vec<u8>) -> Self {
        assert!(
            channels == 1 || channels == 3,
            "channels must be 1 or 3 (got {channels})"
        );
        assert_eq!(
            data.len(),
            width * height * channels,
            "data length ({}) must equal width * height * channels ({})",
            data.len(),
            width * height * channels,
        );
        ColorImage { data, width, height, channels }
    }

    /// A solid-colour RGB image.
    pub fn filled_rgb(width: usize, height: usize, rgb: [u8; 3]) -> Self {
        let mut data = Vec::with_capacity(width * height * 3);
        for _ in 0..width * height {
            data.extend_from_slice(&rgb);
        }
        ColorImage::from_vec(width, height, 3, data)
    }

    /// Promote a grayscale plane to a 1-channel ColorImage.
    pub fn from_gray(gray: &Image<u8>) -> Self {
        ColorImage::from_vec(gray.width(), gray.height(), 1, gray.to_packed_vec())
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// True when the image has no pixels. The loader never hands these on.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// The `channels` samples of pixel (x, y).
    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> &[u8] {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x},{y}) out of bounds for image {}×{}",
            self.width,
            self.height,
        );
        let start = (y * self.width + x) * self.channels;
        &self.data[start..start + self.channels]
    }

    /// Overwrite pixel (x, y). `value` must have `channels` samples.
    pub fn set_pixel(&mut self, x: usize, y: usize, value: &[u8]) {
        assert_eq!(value.len(), self.channels, "sample count must match channels");
        assert!(x < self.width && y < self.height);
        let start = (y * self.width + x) * self.channels;
        self.data[start..start + self.channels].copy_from_slice(value);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Debug for ColorImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ColorImage {}×{}×{}", self.width, self.height, self.channels)
    }
}

// ---------------------------------------------------------------------------
// Identified frames
// ---------------------------------------------------------------------------

/// A decoded input image plus the identifier the loader gave it.
#[derive(Debug, Clone)]
pub struct Frame {
    pub id: String,
    pub image: ColorImage,
}

impl Frame {
    pub fn new(id: impl Into<String>, image: ColorImage) -> Self {
        Frame { id: id.into(), image }
    }
}

/// A pipeline output, keyed by the identifier of the frame it came from.
#[derive(Debug, Clone)]
pub struct ProcessedFrame {
    pub id: String,
    pub image: Image<u8>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
