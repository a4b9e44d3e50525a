use thiserror::Error;

pub type Result<T, E = AllocationError> = std::result::Result<T, E>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocationError {
  /// The raw allocator could not hand out `requested` bytes, or the padded
  /// request does not fit in the address space.
  #[error("out of memory: raw allocation of {requested} bytes failed")]
  OutOfMemory { requested: usize },

  /// The alignment is not a power of two in `2..=128`.
  #[error("unsupported alignment {alignment}: expected a power of two between 2 and 128")]
  UnsupportedAlignment { alignment: usize },
}
