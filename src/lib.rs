//! # offset-alloc - Aligned Allocation on Top of an Unaligned Heap
//!
//! This crate hands out memory on a configurable power-of-two boundary using
//! nothing but a plain, unaligned allocator underneath (by default the C
//! library's `malloc`/`free`). The only bookkeeping is **one byte per
//! allocation**, stored right in front of the address the caller gets.
//!
//! ## Overview
//!
//! ```text
//!   Aligned Allocation (alignment = 32):
//!
//!   raw_start (from malloc)             handle (returned to caller)
//!   │                                   │
//!   ▼                                   ▼
//!   ┌─────────────────────────────┬────┬────────────────────────────┬──────┐
//!   │          padding            │ o  │       size bytes usable    │ tail │
//!   └─────────────────────────────┴────┴────────────────────────────┴──────┘
//!   ◄────────────── o ─────────────────►
//!   ◄───────────────────── size + alignment bytes ─────────────────────────►
//!
//!   o = alignment - (raw_start % alignment), in 1..=alignment
//!   handle = raw_start + o, handle % alignment == 0
//! ```
//!
//! Releasing reads `o` back from `handle - 1` and passes `handle - o` to
//! `free`.
//!
//! When `malloc` already returns an address on the boundary the handle is
//! moved a **full** alignment step forward, so the offset byte always exists
//! and is never zero:
//!
//! ```text
//!   raw_start % 32 == 0:
//!
//!   ┌───────────────── 31 bytes ──────────────┬────┬──────────────────────┐
//!   │                                         │ 32 │   size bytes usable  │
//!   └─────────────────────────────────────────┴────┴──────────────────────┘
//!   ▲                                              ▲
//!   raw_start                                      handle = raw_start + 32
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   offset_alloc
//!   ├── align      - Alignment type and boundary arithmetic
//!   ├── aligned    - AlignedAllocator, AlignedBox, aligned_allocate/release
//!   ├── buffer     - AlignedBuf, a safe owned-buffer variant
//!   ├── error      - AllocationError
//!   └── raw        - RawAllocator trait and the malloc backend
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use offset_alloc::{aligned_allocate, aligned_release};
//!
//! let handle = aligned_allocate(100, 32).unwrap();
//! assert_eq!(handle.as_ptr() as usize % 32, 0);
//!
//! unsafe {
//!     handle.as_ptr().write_bytes(0, 100);
//!     aligned_release(handle.as_ptr());
//! }
//! ```
//!
//! ## Limitations
//!
//! - **Alignment up to 128**: the offset has to fit in one byte.
//! - **No realloc**: blocks cannot grow or shrink in place.
//! - **Inherited threading**: the allocator keeps no state of its own, so it is
//!   exactly as thread-safe as the raw allocator underneath.
//!
//! ## Safety
//!
//! Releasing a pointer that did not come from the same allocator, releasing
//! twice, or writing to `handle - 1` or below is undefined behavior. The
//! release functions are `unsafe` for that reason. [`AlignedBox`] and
//! [`AlignedBuf`] avoid manual release altogether.

pub mod align;
mod aligned;
mod buffer;
mod error;
mod raw;

pub use align::Alignment;
pub use aligned::{AlignedAllocator, AlignedBox, aligned_allocate, aligned_release};
pub use buffer::AlignedBuf;
pub use error::{AllocationError, Result};
pub use raw::{Malloc, RawAllocator};
