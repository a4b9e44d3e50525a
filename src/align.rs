use std::fmt;

use crate::error::{AllocationError, Result};

/// A power-of-two boundary that fits the one-byte offset header.
///
/// The offset stored behind every handle lies in `1..=alignment`, so the
/// alignment itself has to fit in a `u8`. The largest power of two that does
/// is 128.
///
/// # Examples
///
/// ```rust
/// use offset_alloc::Alignment;
///
/// assert_eq!(Alignment::new(64).unwrap().get(), 64);
/// assert_eq!(Alignment::default().get(), 32);
///
/// assert!(Alignment::new(3).is_err());
/// assert!(Alignment::new(256).is_err());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Alignment(u8);

impl Alignment {
  pub const MIN: Alignment = Alignment(2);
  pub const MAX: Alignment = Alignment(128);
  pub const DEFAULT: Alignment = Alignment(32);

  pub fn new(alignment: usize) -> Result<Self> {
    if alignment <= 1 || alignment > u8::MAX as usize || !alignment.is_power_of_two() {
      return Err(AllocationError::UnsupportedAlignment { alignment });
    }

    Ok(Self(alignment as u8))
  }

  #[inline]
  pub const fn get(self) -> usize {
    self.0 as usize
  }

  #[inline]
  pub const fn mask(self) -> usize {
    self.get() - 1
  }
}

impl Default for Alignment {
  fn default() -> Self {
    Self::DEFAULT
  }
}

impl TryFrom<usize> for Alignment {
  type Error = AllocationError;

  fn try_from(alignment: usize) -> Result<Self> {
    Self::new(alignment)
  }
}

impl From<Alignment> for usize {
  fn from(alignment: Alignment) -> usize {
    alignment.get()
  }
}

impl fmt::Debug for Alignment {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(f, "Alignment({})", self.0)
  }
}

impl fmt::Display for Alignment {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    fmt::Display::fmt(&self.0, f)
  }
}

/// Distance from `address` forward to the next boundary, in `1..=alignment`.
///
/// An address that already sits on a boundary gets a full `alignment` step, so
/// the result is never zero and always leaves room for the offset byte.
///
/// ```rust
/// use offset_alloc::{Alignment, align::offset_to_boundary};
///
/// let align = Alignment::new(16).unwrap();
/// assert_eq!(offset_to_boundary(0x1001, align), 15);
/// assert_eq!(offset_to_boundary(0x100f, align), 1);
/// assert_eq!(offset_to_boundary(0x1000, align), 16);
/// ```
#[inline]
pub fn offset_to_boundary(
  address: usize,
  alignment: Alignment,
) -> usize {
  let offset = alignment.get() - (address & alignment.mask());

  if offset == 0 { alignment.get() } else { offset }
}

#[inline]
pub fn is_aligned(
  address: usize,
  alignment: Alignment,
) -> bool {
  address & alignment.mask() == 0
}
