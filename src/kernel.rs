//! The FFI boundary: every `libc` call this allocator makes lives here, so the
//! pointer-arithmetic policy code above never touches raw syscall return values directly.
//!
//! None of the functions in this module decide whether a kernel failure is fatal. That
//! decision (and its diagnostic wording) stays at the call site in the policy code, matching
//! where the distilled source's `DIE(...)` macro invocations sit: immediately after each
//! `sbrk`/`mmap` call, naming the enclosing operation.

use libc::{c_void, intptr_t};
use std::ptr;

/// Extends (or, given a negative delta, shrinks) the brk arena by `delta` bytes.
///
/// Returns the address of the start of the newly added region (i.e. the previous program
/// break) on success, or `Err(())` if the kernel refused the request.
///
/// # Safety
///
/// Must not be called concurrently with any other brk-arena mutation; the allocator is
/// single-threaded and this is the only code path that touches the process break.
pub unsafe fn sbrk_extend(delta: isize) -> Result<*mut u8, ()> {
  let previous_break = unsafe { libc::sbrk(delta as intptr_t) };
  if previous_break as usize == usize::MAX {
    Err(())
  } else {
    Ok(previous_break as *mut u8)
  }
}

/// Requests a fresh anonymous private mapping of `len` bytes.
///
/// # Safety
///
/// `len` must be nonzero; the kernel's behavior for a zero-length mapping request is
/// unspecified.
pub unsafe fn map_anonymous(len: usize) -> Result<*mut u8, ()> {
  let addr = unsafe {
    libc::mmap(
      ptr::null_mut(),
      len,
      libc::PROT_READ | libc::PROT_WRITE,
      libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
      -1,
      0,
    )
  };
  if addr == libc::MAP_FAILED {
    Err(())
  } else {
    Ok(addr as *mut u8)
  }
}

/// Releases a mapping previously obtained from [`map_anonymous`].
///
/// # Safety
///
/// `(addr, len)` must exactly match a still-live mapping returned by [`map_anonymous`].
pub unsafe fn unmap(addr: *mut u8, len: usize) -> Result<(), ()> {
  let ret = unsafe { libc::munmap(addr as *mut c_void, len) };
  if ret < 0 { Err(()) } else { Ok(()) }
}

/// Returns the system's base page size, used to temporarily lower the brk/mmap threshold
/// during `allocate_zeroed`.
pub fn page_size() -> usize {
  let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
  if size <= 0 {
    // A page size this allocator can't query is a kernel/libc anomaly, not a trivial input;
    // there is no sane value to fall back to.
    fatal("Alloc failed");
  }
  size as usize
}

/// Writes the diagnostic named in the allocator's error-handling contract to standard error
/// and aborts the process.
///
/// This is `abort`, not `panic!`: unwinding through code that has already partially mutated
/// the block list would leave that state inconsistent for any `catch_unwind` upstream. Abort
/// guarantees no further code in the process observes it.
pub fn fatal(operation: &str) -> ! {
  eprintln!("{operation}");
  std::process::abort();
}
