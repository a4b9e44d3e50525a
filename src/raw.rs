use std::ptr::NonNull;

use libc::{c_void, free, malloc};

/// The unaligned allocation primitive the aligned allocator is built on.
///
/// # Safety
///
/// `raw_allocate` must return either `None` or a pointer to at least
/// `byte_count` writable bytes that stay valid, and are not handed out again,
/// until the pointer is passed back to `raw_release`.
pub unsafe trait RawAllocator {
  fn raw_allocate(
    &self,
    byte_count: usize,
  ) -> Option<NonNull<u8>>;

  /// # Safety
  ///
  /// `address` must have been returned by `raw_allocate` on this allocator and
  /// not released since.
  unsafe fn raw_release(
    &self,
    address: NonNull<u8>,
  );
}

/// The C library heap: `malloc(3)` and `free(3)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Malloc;

unsafe impl RawAllocator for Malloc {
  fn raw_allocate(
    &self,
    byte_count: usize,
  ) -> Option<NonNull<u8>> {
    NonNull::new(unsafe { malloc(byte_count) } as *mut u8)
  }

  unsafe fn raw_release(
    &self,
    address: NonNull<u8>,
  ) {
    unsafe { free(address.as_ptr() as *mut c_void) }
  }
}
