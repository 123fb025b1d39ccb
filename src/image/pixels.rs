use ndarray::{Array2, Array3, ArrayD, ArrayViewMutD, IxDyn};

use crate::error::{Result, VisionError};

/// Element type of a pixel buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DType {
    U8,
    U16,
    F32,
}

impl DType {
    pub fn is_integer(self) -> bool {
        matches!(self, DType::U8 | DType::U16)
    }

    pub fn name(self) -> &'static str {
        match self {
            DType::U8 => "uint8",
            DType::U16 => "uint16",
            DType::F32 => "float32",
        }
    }
}

/// An owned n-dimensional sample buffer (row-major, `[rows, cols, ..]`).
#[derive(Clone, Debug, PartialEq)]
pub enum PixelData {
    U8(ArrayD<u8>),
    U16(ArrayD<u16>),
    F32(ArrayD<f32>),
}

/// Mutable view handed to [`crate::image::Image::modify_pixels`]. The shape
/// of a view cannot change, only sample values.
pub enum PixelsMut<'a> {
    U8(ArrayViewMutD<'a, u8>),
    U16(ArrayViewMutD<'a, u16>),
    F32(ArrayViewMutD<'a, f32>),
}

impl PixelData {
    pub fn zeros_u8(shape: &[usize]) -> Self {
        PixelData::U8(ArrayD::zeros(IxDyn(shape)))
    }

    /// Build a `[rows, cols]` uint8 buffer from row-major samples.
    pub fn from_u8_plane(rows: usize, cols: usize, samples: Vec<u8>) -> Result<Self> {
        Array2::from_shape_vec((rows, cols), samples)
            .map(|a| PixelData::U8(a.into_dyn()))
            .map_err(|e| VisionError::ShapeMismatch(e.to_string()))
    }

    pub fn dtype(&self) -> DType {
        match self {
            PixelData::U8(_) => DType::U8,
            PixelData::U16(_) => DType::U16,
            PixelData::F32(_) => DType::F32,
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            PixelData::U8(a) => a.shape(),
            PixelData::U16(a) => a.shape(),
            PixelData::F32(a) => a.shape(),
        }
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sample at `index` as f32 (any dtype).
    pub fn value_at(&self, index: &[usize]) -> Option<f32> {
        match self {
            PixelData::U8(a) => a.get(IxDyn(index)).map(|&v| v as f32),
            PixelData::U16(a) => a.get(IxDyn(index)).map(|&v| v as f32),
            PixelData::F32(a) => a.get(IxDyn(index)).copied(),
        }
    }

    /// Minimum and maximum sample, `None` for an empty buffer.
    pub fn min_max(&self) -> Option<(f32, f32)> {
        fn fold<T: Copy + Into<f32>>(it: impl Iterator<Item = T>) -> Option<(f32, f32)> {
            it.map(Into::into).fold(None, |acc, v: f32| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
        }
        match self {
            PixelData::U8(a) => fold(a.iter().copied()),
            PixelData::U16(a) => fold(a.iter().copied()),
            PixelData::F32(a) => fold(a.iter().copied()),
        }
    }

    pub fn view_mut(&mut self) -> PixelsMut<'_> {
        match self {
            PixelData::U8(a) => PixelsMut::U8(a.view_mut()),
            PixelData::U16(a) => PixelsMut::U16(a.view_mut()),
            PixelData::F32(a) => PixelsMut::F32(a.view_mut()),
        }
    }
}

macro_rules! impl_from_array {
    ($t:ty, $variant:ident) => {
        impl From<ArrayD<$t>> for PixelData {
            fn from(a: ArrayD<$t>) -> Self {
                PixelData::$variant(a)
            }
        }
        impl From<Array2<$t>> for PixelData {
            fn from(a: Array2<$t>) -> Self {
                PixelData::$variant(a.into_dyn())
            }
        }
        impl From<Array3<$t>> for PixelData {
            fn from(a: Array3<$t>) -> Self {
                PixelData::$variant(a.into_dyn())
            }
        }
    };
}

impl_from_array!(u8, U8);
impl_from_array!(u16, U16);
impl_from_array!(f32, F32);
