use std::ptr::NonNull;

use offset_alloc::{AlignedAllocator, Alignment};

/// Prints where a block landed and how far it is from the boundary.
fn print_alloc(
  label: &str,
  size: usize,
  alignment: Alignment,
  handle: NonNull<u8>,
) {
  let address = handle.as_ptr() as usize;
  println!(
    "[{}] Allocated {} bytes, address = {:#X}, address % {} = {}",
    label,
    size,
    address,
    alignment,
    address % alignment.get()
  );
}

fn main() {
  let allocator = AlignedAllocator::malloc();
  let alignment = allocator.default_alignment();

  // --------------------------------------------------------------------
  // 1) A table of five pointers, itself aligned.
  // --------------------------------------------------------------------
  let table_size = size_of::<*mut u8>() * 5;
  let table = match allocator.allocate_default(table_size) {
    Ok(handle) => handle,
    Err(err) => {
      eprintln!("allocation failed: {err}");
      return;
    }
  };
  print_alloc("table", table_size, alignment, table);

  // --------------------------------------------------------------------
  // 2) Random sizes, each allocated, inspected and released again.
  // --------------------------------------------------------------------
  for i in 0..5 {
    let size = fastrand::usize(1..=512);
    match allocator.allocate_default(size) {
      Ok(handle) => {
        print_alloc(&format!("ptr[{i}]"), size, alignment, handle);
        unsafe { allocator.release(handle.as_ptr()) };
      }
      Err(err) => eprintln!("ptr[{i}]: {err}"),
    }
  }

  // --------------------------------------------------------------------
  // 3) Every supported boundary.
  // --------------------------------------------------------------------
  for shift in 1..=7 {
    let alignment = 1usize << shift;
    if let Ok(handle) = allocator.allocate(13, alignment) {
      let address = handle.as_ptr() as usize;
      println!("[align {alignment:>3}] address = {address:#X}, address % {alignment} = {}", address % alignment);
      unsafe { allocator.release(handle.as_ptr()) };
    }
  }

  // --------------------------------------------------------------------
  // 4) Boundaries the one-byte offset cannot express.
  // --------------------------------------------------------------------
  for alignment in [3, 256] {
    if let Err(err) = allocator.allocate(13, alignment) {
      println!("[align {alignment:>3}] {err}");
    }
  }

  unsafe { allocator.release(table.as_ptr()) };
}
