//! Merging free neighbors on free, and growing the tail block in place on allocate when no
//! free-list match exists.
//!
//! Both operations exploit the same fact: because the brk arena only grows forward and every
//! brk block is appended in address order, list-adjacency equals address-adjacency. Merging
//! list neighbors is therefore always merging address neighbors, and growing the list's tail
//! is always growing the arena's highest block.

use crate::block::{Block, BlockStatus};
use crate::kernel;
use crate::registry::Registry;

/// Marks `block` free and merges it with an immediately-adjacent free predecessor and/or
/// successor, then refreshes the registry's tail anchor.
///
/// The surviving header after a merge is always the lower-address one, matching invariant 3
/// in the data model: no two adjacent brk-resident free blocks exist once this returns.
///
/// # Safety
///
/// `block` must be a live `Allocated` header currently reachable from `registry`'s head.
pub unsafe fn free_and_coalesce(registry: &mut Registry, block: *mut Block) {
  unsafe {
    (*block).status = BlockStatus::Free;

    let (prev, _) = registry.find_with_predecessor(block);
    let mut current = block;

    if !prev.is_null() && (*prev).status == BlockStatus::Free {
      (*prev).size += (*current).size + Block::HEADER_SIZE;
      (*prev).next = (*current).next;
      current = prev;
    }

    let next = (*current).next;
    if !next.is_null() && (*next).status == BlockStatus::Free {
      (*current).size += (*next).size + Block::HEADER_SIZE;
      (*current).next = (*next).next;
    }

    registry.refresh_tail_from(current);
  }
}

/// If the registry's tail block is `Free`, extends the brk arena so the tail grows to hold
/// `size` payload bytes, marks it `Allocated`, and returns it. Returns null if the tail is
/// absent or not free; the caller falls back to appending a fresh block.
///
/// # Safety
///
/// Must not race any other brk-arena mutation.
pub unsafe fn extend_tail_in_place(registry: &mut Registry, size: usize) -> *mut Block {
  unsafe {
    let tail = registry.tail();
    if tail.is_null() || (*tail).status != BlockStatus::Free {
      return std::ptr::null_mut();
    }

    let growth = size - (*tail).size;
    match kernel::sbrk_extend(growth as isize) {
      Ok(_) => {
        (*tail).size = size;
        (*tail).status = BlockStatus::Allocated;
        tail
      }
      Err(()) => kernel::fatal("Alloc failed"),
    }
  }
}
