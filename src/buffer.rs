use std::fmt;

use crate::{
  align::{Alignment, offset_to_boundary},
  error::{AllocationError, Result},
};

/// An aligned byte buffer built without `unsafe`.
///
/// Same layout as [`crate::AlignedAllocator`] hands out, but the raw block is
/// an owned boxed slice and the aligned region is an index range into it. The
/// offset byte sits at `start - 1` and is read back through a checked slice
/// access.
///
/// ```text
///   raw: ┌───────── padding ─────────┬───┬──────── len bytes ────────┬─────┐
///        │                           │ o │                           │     │
///        └───────────────────────────┴───┴───────────────────────────┴─────┘
///        0                                ▲ start = o (on a boundary)
/// ```
///
/// ```rust
/// use offset_alloc::AlignedBuf;
///
/// let mut buf = AlignedBuf::new(100, 64).unwrap();
/// assert_eq!(buf.as_ptr() as usize % 64, 0);
///
/// buf.as_mut_slice()[0] = 42;
/// assert_eq!(buf.as_slice()[0], 42);
/// assert!((1..=64).contains(&buf.offset()));
/// ```
pub struct AlignedBuf {
  raw: Box<[u8]>,
  start: usize,
  len: usize,
  alignment: Alignment,
}

impl AlignedBuf {
  pub fn new(
    size: usize,
    alignment: usize,
  ) -> Result<Self> {
    Self::with_alignment(size, Alignment::new(alignment)?)
  }

  pub fn with_alignment(
    size: usize,
    alignment: Alignment,
  ) -> Result<Self> {
    let padded = size
      .checked_add(alignment.get())
      .ok_or(AllocationError::OutOfMemory { requested: size })?;

    let mut raw = Vec::new();
    raw
      .try_reserve_exact(padded)
      .map_err(|_| AllocationError::OutOfMemory { requested: padded })?;
    raw.resize(padded, 0u8);
    let mut raw = raw.into_boxed_slice();

    // The heap block does not move with the box, so the offset computed here
    // stays valid for the buffer's lifetime.
    let start = offset_to_boundary(raw.as_ptr() as usize, alignment);
    raw[start - 1] = start as u8;

    Ok(Self {
      raw,
      start,
      len: size,
      alignment,
    })
  }

  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  pub fn alignment(&self) -> Alignment {
    self.alignment
  }

  /// The stored offset byte, in `1..=alignment`.
  pub fn offset(&self) -> usize {
    self
      .raw
      .get(self.start - 1)
      .map_or(0, |&offset| offset as usize)
  }

  /// Index of the raw block's first byte as recovered from the offset byte.
  /// Always zero for an intact buffer.
  pub fn raw_start(&self) -> usize {
    self.start - self.offset()
  }

  pub fn as_ptr(&self) -> *const u8 {
    self.as_slice().as_ptr()
  }

  pub fn as_slice(&self) -> &[u8] {
    &self.raw[self.start..self.start + self.len]
  }

  pub fn as_mut_slice(&mut self) -> &mut [u8] {
    &mut self.raw[self.start..self.start + self.len]
  }
}

impl fmt::Debug for AlignedBuf {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("AlignedBuf")
      .field("ptr", &self.as_ptr())
      .field("len", &self.len)
      .field("alignment", &self.alignment)
      .field("offset", &self.offset())
      .finish()
  }
}
