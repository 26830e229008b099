//! Owned, contiguous, rank-3 `f32` buffers.
//!
//! Every tensor that crosses the model boundary has rank 3 (`(1, N, 1)` audio,
//! `(1, 8, 8)` conditioning, `(1, 1, 1022)` state), so a fixed shape array is
//! enough. Storage is always row-major and contiguous.

/// Result of [`Tensor3::update_or_replace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateUpdate {
    /// Shapes matched and the data was copied into the existing allocation.
    Copied,
    /// Shapes differed and the buffer was reallocated.
    Replaced,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tensor3 {
    shape: [usize; 3],
    data: Vec<f32>,
}

impl Tensor3 {
    pub fn zeros(shape: [usize; 3]) -> Self {
        Self {
            shape,
            data: vec![0.0; shape_len(shape)],
        }
    }

    /// Returns `None` if `data.len()` does not match the element count of `shape`.
    pub fn from_vec(shape: [usize; 3], data: Vec<f32>) -> Option<Self> {
        (data.len() == shape_len(shape)).then_some(Self { shape, data })
    }

    #[inline]
    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Copies `src` element-wise into the existing storage.
    ///
    /// Returns `false` (and leaves the tensor unchanged) if the lengths differ.
    #[inline]
    pub fn copy_from(&mut self, src: &[f32]) -> bool {
        if src.len() != self.data.len() {
            return false;
        }
        self.data.copy_from_slice(src);
        true
    }

    /// Overwrites this tensor with `data` of the given `shape`.
    ///
    /// When the shape is unchanged the copy goes into the existing allocation.
    /// Otherwise the buffer is reallocated, which must not happen on the
    /// steady-state audio path.
    pub fn update_or_replace(&mut self, shape: [usize; 3], data: &[f32]) -> StateUpdate {
        debug_assert_eq!(shape_len(shape), data.len());
        if shape == self.shape && data.len() == self.data.len() {
            self.data.copy_from_slice(data);
            StateUpdate::Copied
        } else {
            self.shape = shape;
            self.data = data.to_vec();
            StateUpdate::Replaced
        }
    }

    /// Same as [`update_or_replace`](Self::update_or_replace) for sources that
    /// cannot be viewed as a contiguous slice.
    pub fn update_or_replace_iter(
        &mut self,
        shape: [usize; 3],
        data: impl ExactSizeIterator<Item = f32>,
    ) -> StateUpdate {
        if shape == self.shape && data.len() == self.data.len() {
            for (dst, src) in self.data.iter_mut().zip(data) {
                *dst = src;
            }
            StateUpdate::Copied
        } else {
            self.shape = shape;
            self.data = data.collect();
            StateUpdate::Replaced
        }
    }

    pub fn fill(&mut self, value: f32) {
        self.data.fill(value);
    }
}

#[inline]
pub fn shape_len(shape: [usize; 3]) -> usize {
    shape[0] * shape[1] * shape[2]
}
