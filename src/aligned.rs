use std::{alloc::Layout, fmt, ops, ptr::NonNull, slice};

use log::{debug, trace};

use crate::{
  align::{Alignment, offset_to_boundary},
  error::{AllocationError, Result},
  raw::{Malloc, RawAllocator},
};

/// Hands out addresses on a power-of-two boundary carved out of unaligned raw
/// blocks.
///
/// Every raw block is over-allocated by `alignment` bytes. The handle is the
/// first boundary strictly after the raw start, and the byte right behind it
/// records how far it was moved, so release needs no side table.
pub struct AlignedAllocator<R: RawAllocator = Malloc> {
  raw: R,
  alignment: Alignment,
}

impl AlignedAllocator<Malloc> {
  pub const fn malloc() -> Self {
    Self::with_default_alignment(Malloc, Alignment::DEFAULT)
  }
}

impl Default for AlignedAllocator<Malloc> {
  fn default() -> Self {
    Self::malloc()
  }
}

impl<R: RawAllocator> AlignedAllocator<R> {
  pub const fn new(raw: R) -> Self {
    Self::with_default_alignment(raw, Alignment::DEFAULT)
  }

  pub const fn with_default_alignment(
    raw: R,
    alignment: Alignment,
  ) -> Self {
    Self { raw, alignment }
  }

  pub fn raw(&self) -> &R {
    &self.raw
  }

  pub fn default_alignment(&self) -> Alignment {
    self.alignment
  }

  /// Allocates `size` bytes starting on an `alignment` boundary.
  ///
  /// The alignment is checked before the raw allocator is touched, so a
  /// rejected request costs nothing.
  ///
  /// ```rust
  /// use offset_alloc::AlignedAllocator;
  ///
  /// let allocator = AlignedAllocator::malloc();
  /// let handle = allocator.allocate(100, 64).unwrap();
  /// assert_eq!(handle.as_ptr() as usize % 64, 0);
  ///
  /// unsafe { allocator.release(handle.as_ptr()) };
  ///
  /// assert!(allocator.allocate(100, 256).is_err());
  /// ```
  pub fn allocate(
    &self,
    size: usize,
    alignment: usize,
  ) -> Result<NonNull<u8>> {
    let alignment = Alignment::new(alignment)
      .inspect_err(|err| debug!("rejected request for {size} bytes: {err}"))?;

    self.allocate_aligned(size, alignment)
  }

  /// Allocates `size` bytes on the allocator's configured boundary.
  pub fn allocate_default(
    &self,
    size: usize,
  ) -> Result<NonNull<u8>> {
    self.allocate_aligned(size, self.alignment)
  }

  /// Allocates for a `Layout`. Layout alignments below two are raised to
  /// `Alignment::MIN`.
  pub fn allocate_layout(
    &self,
    layout: Layout,
  ) -> Result<NonNull<u8>> {
    self.allocate(layout.size(), layout.align().max(Alignment::MIN.get()))
  }

  pub fn allocate_aligned(
    &self,
    size: usize,
    alignment: Alignment,
  ) -> Result<NonNull<u8>> {
    let Some(padded) = size.checked_add(alignment.get()) else {
      debug!("rejected request for {size} bytes: padding by {alignment} overflows");
      return Err(AllocationError::OutOfMemory { requested: size });
    };

    let Some(raw_start) = self.raw.raw_allocate(padded) else {
      return Err(AllocationError::OutOfMemory { requested: padded });
    };

    let offset = offset_to_boundary(raw_start.as_ptr() as usize, alignment);
    debug_assert!((1..=alignment.get()).contains(&offset));

    // `offset <= alignment` keeps both the header byte and `size` bytes after
    // the handle inside the `padded` bytes of the raw block.
    let handle = unsafe {
      let handle = raw_start.add(offset);
      handle.sub(1).write(offset as u8);
      handle
    };

    trace!(
      "allocated {size} bytes at {:?} (raw {:?}, offset {offset}, align {alignment})",
      handle, raw_start,
    );

    Ok(handle)
  }

  /// Allocates a zero-filled region that is released when the guard drops.
  pub fn allocate_zeroed(
    &self,
    size: usize,
    alignment: usize,
  ) -> Result<AlignedBox<'_, R>> {
    let handle = self.allocate(size, alignment)?;

    unsafe { handle.as_ptr().write_bytes(0, size) };

    Ok(AlignedBox {
      handle,
      len: size,
      allocator: self,
    })
  }

  /// Returns the block behind `handle` to the raw allocator. Null is a no-op.
  ///
  /// # Safety
  ///
  /// `handle` must be null or have come from this allocator and not have been
  /// released yet. The byte at `handle - 1` must not have been written since
  /// allocation.
  pub unsafe fn release(
    &self,
    handle: *mut u8,
  ) {
    let Some(handle) = NonNull::new(handle) else {
      return;
    };

    unsafe {
      let offset = self.offset_of(handle);
      let raw_start = handle.sub(offset);

      trace!("releasing {:?} (raw {:?}, offset {offset})", handle, raw_start);

      self.raw.raw_release(raw_start);
    }
  }

  /// Reads the offset stored in front of `handle`.
  ///
  /// # Safety
  ///
  /// `handle` must be a live handle from an `AlignedAllocator`.
  pub unsafe fn offset_of(
    &self,
    handle: NonNull<u8>,
  ) -> usize {
    unsafe { handle.sub(1).read() as usize }
  }
}

impl<R: RawAllocator + fmt::Debug> fmt::Debug for AlignedAllocator<R> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("AlignedAllocator")
      .field("raw", &self.raw)
      .field("alignment", &self.alignment)
      .finish()
  }
}

/// Owned, zero-initialised aligned region. Releases itself on drop.
pub struct AlignedBox<'a, R: RawAllocator> {
  handle: NonNull<u8>,
  len: usize,
  allocator: &'a AlignedAllocator<R>,
}

impl<R: RawAllocator> AlignedBox<'_, R> {
  pub fn as_ptr(&self) -> *const u8 {
    self.handle.as_ptr()
  }

  pub fn as_mut_ptr(&mut self) -> *mut u8 {
    self.handle.as_ptr()
  }

  /// Gives up ownership. The handle must later go to
  /// [`AlignedAllocator::release`] on the same allocator.
  pub fn into_raw(self) -> NonNull<u8> {
    let handle = self.handle;
    std::mem::forget(self);
    handle
  }
}

impl<R: RawAllocator> ops::Deref for AlignedBox<'_, R> {
  type Target = [u8];

  fn deref(&self) -> &[u8] {
    unsafe { slice::from_raw_parts(self.handle.as_ptr(), self.len) }
  }
}

impl<R: RawAllocator> ops::DerefMut for AlignedBox<'_, R> {
  fn deref_mut(&mut self) -> &mut [u8] {
    unsafe { slice::from_raw_parts_mut(self.handle.as_ptr(), self.len) }
  }
}

impl<R: RawAllocator> Drop for AlignedBox<'_, R> {
  fn drop(&mut self) {
    unsafe { self.allocator.release(self.handle.as_ptr()) }
  }
}

impl<R: RawAllocator> fmt::Debug for AlignedBox<'_, R> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("AlignedBox")
      .field("handle", &self.handle)
      .field("len", &self.len)
      .finish()
  }
}

/// Allocates `size` bytes on an `alignment` boundary from the C heap.
pub fn aligned_allocate(
  size: usize,
  alignment: usize,
) -> Result<NonNull<u8>> {
  AlignedAllocator::malloc().allocate(size, alignment)
}

/// Releases a handle returned by [`aligned_allocate`]. Null is a no-op.
///
/// # Safety
///
/// Same contract as [`AlignedAllocator::release`].
pub unsafe fn aligned_release(handle: *mut u8) {
  unsafe { AlignedAllocator::malloc().release(handle) }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::raw::tracking::TrackingRaw;

  const ALIGNMENTS: [usize; 7] = [2, 4, 8, 16, 32, 64, 128];
  const SIZES: [usize; 6] = [0, 1, 7, 31, 255, 4096];

  #[test]
  fn test_alignment_grid() {
    let allocator = AlignedAllocator::malloc();

    for alignment in ALIGNMENTS {
      for size in SIZES {
        let handle = allocator.allocate(size, alignment).unwrap();
        assert_eq!(handle.as_ptr() as usize % alignment, 0, "size {size}, align {alignment}");

        unsafe {
          handle.as_ptr().write_bytes(0xC3, size);
          allocator.release(handle.as_ptr());
        }
      }
    }
  }

  #[test]
  fn test_release_recovers_raw_start() {
    for skew in [0, 1, 5, 31, 64, 127, 200, 255] {
      let allocator = AlignedAllocator::new(TrackingRaw::with_skew(skew));

      for alignment in ALIGNMENTS {
        let handle = allocator.allocate(24, alignment).unwrap();
        let raw_start = *allocator.raw().allocated().last().unwrap();

        let offset = unsafe { allocator.offset_of(handle) };
        assert!((1..=alignment).contains(&offset));
        assert_eq!(raw_start + offset, handle.as_ptr() as usize);

        unsafe { allocator.release(handle.as_ptr()) };

        assert_eq!(allocator.raw().released().last(), Some(&raw_start));
      }

      assert_eq!(allocator.raw().outstanding(), 0);
      assert_eq!(allocator.raw().allocated(), allocator.raw().released());
    }
  }

  #[test]
  fn test_raw_start_on_boundary_stores_full_offset() {
    let allocator = AlignedAllocator::new(TrackingRaw::with_skew(0));

    for alignment in ALIGNMENTS {
      let handle = allocator.allocate(16, alignment).unwrap();
      let raw_start = *allocator.raw().allocated().last().unwrap();
      assert_eq!(raw_start % alignment, 0);

      let stored = unsafe { handle.as_ptr().sub(1).read() };
      assert_eq!(stored as usize, alignment);
      assert_eq!(handle.as_ptr() as usize, raw_start + alignment);

      unsafe { allocator.release(handle.as_ptr()) };
      assert_eq!(allocator.raw().released().last(), Some(&raw_start));
    }

    assert_eq!(allocator.raw().outstanding(), 0);
  }

  #[test]
  fn test_one_byte_before_boundary() {
    // Raw start one byte short of a boundary: the handle lands right after the
    // header byte.
    for alignment in ALIGNMENTS {
      let allocator = AlignedAllocator::new(TrackingRaw::with_skew(alignment - 1));
      let handle = allocator.allocate(8, alignment).unwrap();
      let raw_start = *allocator.raw().allocated().last().unwrap();

      assert_eq!(handle.as_ptr() as usize, raw_start + 1);
      assert_eq!(unsafe { allocator.offset_of(handle) }, 1);

      unsafe { allocator.release(handle.as_ptr()) };
      assert_eq!(allocator.raw().outstanding(), 0);
    }
  }

  #[test]
  fn test_unsupported_alignment_skips_raw_allocator() {
    let allocator = AlignedAllocator::new(TrackingRaw::new());

    for alignment in [256, 3, 0, 1, 48, 1024] {
      assert_eq!(
        allocator.allocate(64, alignment),
        Err(AllocationError::UnsupportedAlignment { alignment })
      );
    }

    assert_eq!(allocator.raw().allocation_count(), 0);
    assert_eq!(allocator.raw().outstanding(), 0);
  }

  #[test]
  fn test_out_of_memory_leaves_nothing_behind() {
    let allocator = AlignedAllocator::new(TrackingRaw::new());
    let kept = allocator.allocate(10, 16).unwrap();
    let before = allocator.raw().outstanding();

    allocator.raw().set_failing(true);
    assert_eq!(
      allocator.allocate(100, 16),
      Err(AllocationError::OutOfMemory { requested: 116 })
    );
    assert_eq!(allocator.raw().outstanding(), before);

    allocator.raw().set_failing(false);
    unsafe { allocator.release(kept.as_ptr()) };
    assert_eq!(allocator.raw().outstanding(), 0);
  }

  #[test]
  fn test_size_overflow() {
    let allocator = AlignedAllocator::new(TrackingRaw::new());

    assert_eq!(
      allocator.allocate(usize::MAX - 3, 8),
      Err(AllocationError::OutOfMemory {
        requested: usize::MAX - 3
      })
    );
    assert_eq!(allocator.raw().allocation_count(), 0);
  }

  #[test]
  fn test_release_null_is_noop() {
    let allocator = AlignedAllocator::new(TrackingRaw::new());

    unsafe { allocator.release(std::ptr::null_mut()) };

    assert!(allocator.raw().released().is_empty());
  }

  #[test]
  fn test_ten_blocks_reverse_release() {
    let allocator = AlignedAllocator::new(TrackingRaw::with_skew(7));
    let sizes = [1, 50, 99, 5, 500, 13, 256, 2, 1000, 17];

    let handles: Vec<_> = sizes
      .iter()
      .map(|&size| allocator.allocate(size, 32).unwrap())
      .collect();

    for (handle, size) in handles.iter().zip(sizes) {
      assert_eq!(handle.as_ptr() as usize % 32, 0);
      unsafe { handle.as_ptr().write_bytes(size as u8, size) };
    }

    assert_eq!(allocator.raw().outstanding(), 10);

    for (handle, size) in handles.iter().zip(sizes) {
      let data = unsafe { slice::from_raw_parts(handle.as_ptr(), size) };
      assert!(data.iter().all(|&b| b == size as u8));
    }

    for handle in handles.iter().rev() {
      unsafe { allocator.release(handle.as_ptr()) };
    }

    assert_eq!(allocator.raw().outstanding(), 0);

    let mut released = allocator.raw().released();
    released.reverse();
    assert_eq!(released, allocator.raw().allocated());
  }

  #[test]
  fn test_writes_do_not_touch_header() {
    let allocator = AlignedAllocator::new(TrackingRaw::with_skew(0));
    let first = allocator.allocate(64, 64).unwrap();
    let second = allocator.allocate(64, 64).unwrap();

    unsafe {
      first.as_ptr().write_bytes(0xFF, 64);
      second.as_ptr().write_bytes(0xFF, 64);

      assert_eq!(allocator.offset_of(first), 64);
      assert_eq!(allocator.offset_of(second), 64);

      allocator.release(second.as_ptr());
      allocator.release(first.as_ptr());
    }

    assert_eq!(allocator.raw().outstanding(), 0);
  }

  #[test]
  fn test_default_alignment() {
    let allocator = AlignedAllocator::new(TrackingRaw::with_skew(1));
    assert_eq!(allocator.default_alignment(), Alignment::default());

    let handle = allocator.allocate_default(40).unwrap();
    assert_eq!(handle.as_ptr() as usize % 32, 0);
    unsafe { allocator.release(handle.as_ptr()) };

    let wide = AlignedAllocator::with_default_alignment(TrackingRaw::with_skew(1), Alignment::MAX);
    let handle = wide.allocate_default(40).unwrap();
    assert_eq!(handle.as_ptr() as usize % 128, 0);
    unsafe { wide.release(handle.as_ptr()) };

    assert_eq!(wide.raw().outstanding(), 0);
  }

  #[test]
  fn test_allocate_layout() {
    let allocator = AlignedAllocator::new(TrackingRaw::with_skew(3));

    let handle = allocator.allocate_layout(Layout::new::<u64>()).unwrap();
    assert_eq!(handle.as_ptr() as usize % std::mem::align_of::<u64>(), 0);
    unsafe {
      handle.cast::<u64>().write(0x1122334455667788);
      assert_eq!(handle.cast::<u64>().read(), 0x1122334455667788);
      allocator.release(handle.as_ptr());
    }

    let bytes = allocator.allocate_layout(Layout::array::<u8>(12).unwrap()).unwrap();
    assert_eq!(bytes.as_ptr() as usize % 2, 0);
    unsafe { allocator.release(bytes.as_ptr()) };

    let over = Layout::from_size_align(8, 4096).unwrap();
    assert_eq!(
      allocator.allocate_layout(over),
      Err(AllocationError::UnsupportedAlignment { alignment: 4096 })
    );

    assert_eq!(allocator.raw().outstanding(), 0);
  }

  #[test]
  fn test_aligned_box() {
    let allocator = AlignedAllocator::new(TrackingRaw::with_skew(9));

    {
      let mut block = allocator.allocate_zeroed(100, 16).unwrap();
      assert_eq!(block.as_ptr() as usize % 16, 0);
      assert_eq!(block.len(), 100);
      assert!(block.iter().all(|&b| b == 0));

      block[99] = 7;
      assert_eq!(block[99], 7);
      assert_eq!(allocator.raw().outstanding(), 1);
    }

    assert_eq!(allocator.raw().outstanding(), 0);

    let block = allocator.allocate_zeroed(4, 8).unwrap();
    let handle = block.into_raw();
    assert_eq!(allocator.raw().outstanding(), 1);

    unsafe { allocator.release(handle.as_ptr()) };
    assert_eq!(allocator.raw().outstanding(), 0);
  }

  #[test]
  fn test_free_functions() {
    let handle = aligned_allocate(4096, 32).unwrap();
    assert_eq!(handle.as_ptr() as usize % 32, 0);
    unsafe {
      aligned_release(handle.as_ptr());
      aligned_release(std::ptr::null_mut());
    }

    assert_eq!(
      aligned_allocate(8, 256),
      Err(AllocationError::UnsupportedAlignment { alignment: 256 })
    );
  }

  #[test]
  fn test_random_soak() {
    fastrand::seed(0x5EED_A11C);

    let allocator = AlignedAllocator::new(TrackingRaw::with_skew(fastrand::usize(0..256)));
    let mut live: Vec<(NonNull<u8>, usize, u8)> = Vec::new();

    for round in 0..2000 {
      if live.is_empty() || fastrand::u8(0..3) > 0 {
        let alignment = ALIGNMENTS[fastrand::usize(..ALIGNMENTS.len())];
        let size = fastrand::usize(0..600);
        let fill = (round % 251) as u8;

        let handle = allocator.allocate(size, alignment).unwrap();
        assert_eq!(handle.as_ptr() as usize % alignment, 0);

        unsafe { handle.as_ptr().write_bytes(fill, size) };
        live.push((handle, size, fill));
      } else {
        let (handle, size, fill) = live.swap_remove(fastrand::usize(..live.len()));
        let data = unsafe { slice::from_raw_parts(handle.as_ptr(), size) };
        assert!(data.iter().all(|&b| b == fill));

        unsafe { allocator.release(handle.as_ptr()) };
      }
    }

    for (handle, _, _) in live.drain(..) {
      unsafe { allocator.release(handle.as_ptr()) };
    }

    assert_eq!(allocator.raw().outstanding(), 0);
  }
}
