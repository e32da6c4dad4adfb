//! The block header and the raw-pointer primitives built directly on top of it.
//!
//! Every region this allocator hands out, whether carved from the brk arena or obtained
//! fresh from `mmap`, is prefixed by one [`Block`]. The header lives at a fixed offset
//! before the user-visible payload for the block's entire lifetime; splitting a block writes
//! a brand new header into the old block's payload region rather than moving anything.

use std::mem;
use std::ptr;

/// Which of the three lifecycle states a block is currently in.
///
/// `Free` and `Allocated` blocks live in the brk arena and participate in splitting and
/// coalescing. `Mapped` blocks are independent `mmap` regions; they never split, never
/// coalesce, and are unmapped outright on free rather than being marked `Free`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BlockStatus {
  Free,
  Allocated,
  Mapped,
}

/// The fixed-size metadata record prefixing every managed payload.
///
/// Field order puts the two word-sized fields first so that, combined with `repr(C)`, the
/// struct's total size stays a multiple of 8 regardless of how small `BlockStatus`'s
/// discriminant ends up being: the payload immediately following the header inherits that
/// alignment for free.
#[repr(C)]
pub struct Block {
  pub size: usize,
  pub next: *mut Block,
  pub status: BlockStatus,
}

const _: () = assert!(mem::size_of::<Block>() % 8 == 0, "Block header must keep payloads 8-byte aligned");

impl Block {
  pub const HEADER_SIZE: usize = mem::size_of::<Block>();

  /// Writes a new header at `at`, returning it as a raw pointer.
  ///
  /// # Safety
  ///
  /// `at` must point to at least `Block::HEADER_SIZE` bytes of writable memory that is not
  /// currently aliased by any live reference.
  pub unsafe fn write(at: *mut u8, size: usize, status: BlockStatus, next: *mut Block) -> *mut Block {
    let block = at as *mut Block;
    unsafe {
      ptr::write(block, Block { size, next, status });
    }
    block
  }

  /// Returns the header immediately preceding a user-visible payload pointer.
  ///
  /// # Safety
  ///
  /// `payload` must have been returned by this allocator's `allocate`, `allocate_zeroed`, or
  /// `resize`, and must not have been freed.
  pub unsafe fn header_of(payload: *mut u8) -> *mut Block {
    unsafe { payload.sub(Self::HEADER_SIZE) as *mut Block }
  }

  /// Returns the user-visible payload pointer for a header.
  ///
  /// # Safety
  ///
  /// `block` must be a valid, live `Block` header.
  pub unsafe fn payload_of(block: *mut Block) -> *mut u8 {
    unsafe { (block as *mut u8).add(Self::HEADER_SIZE) }
  }

  /// Computes the address a new header would occupy if this block were split so that its
  /// own payload shrinks to `payload_size` bytes.
  ///
  /// # Safety
  ///
  /// `block` must be a valid, live `Block` header whose payload is at least `payload_size`
  /// bytes plus one header beyond `payload_size`, or the returned pointer is meaningless.
  pub unsafe fn split_at(block: *mut Block, payload_size: usize) -> *mut Block {
    unsafe { Self::payload_of(block).add(payload_size) as *mut Block }
  }
}
