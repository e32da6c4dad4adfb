//! The resize engine: in-place grow via next-block absorption, in-place shrink via split,
//! the mapped-block special case, and the copy-relocate fallback.
//!
//! There is no bump-allocator equivalent of resizing in place: growing or shrinking an
//! existing allocation requires tracking neighbors, which a pure bump scheme never does.
//! This module is built directly from `osmem.c`'s `os_realloc`.

use crate::block::{Block, BlockStatus};
use crate::kernel;
use crate::registry::Registry;
use crate::scanner;
use std::ptr;

/// The three things a resize call can turn into, once the trivial `n == 0` / `p == null`
/// cases have been handled by the caller.
pub enum Resized {
  /// The block grew or shrank without moving; same pointer.
  InPlace,
  /// The payload moved to a freshly placed header at a new address.
  Relocated(*mut Block),
}

/// Attempts to grow `block` to `new_size` in place by absorbing a free successor.
///
/// Returns `true` if the absorption happened (the whole successor is folded in, even when
/// only part of it was needed; a follow-up shrink-split is not re-invoked here).
///
/// # Safety
///
/// `block` must be a live header reachable from `registry`'s head.
unsafe fn try_absorb_successor(block: *mut Block, new_size: usize) -> bool {
  unsafe {
    let successor = (*block).next;
    if successor.is_null() || (*successor).status != BlockStatus::Free {
      return false;
    }
    if (*block).size + (*successor).size + Block::HEADER_SIZE < new_size {
      return false;
    }
    (*block).size += (*successor).size + Block::HEADER_SIZE;
    (*block).next = (*successor).next;
    true
  }
}

/// Core resize logic once `p` is known non-null and `n` is known non-zero.
///
/// `new_size` is already `round_up_8`-aligned. On a grow that cannot be satisfied in place,
/// the caller must still perform the allocate-copy-free fallback itself, since that requires
/// going back through the placement policy (which `resize` does not own); this function
/// signals that case by returning `Resized::Relocated` only for the mapped-grow special
/// case, which this module *can* implement standalone; the generic fallback is reported
/// through `None` and left to the caller in `lib.rs`.
///
/// # Safety
///
/// `block` must be the live header for a previously-returned payload pointer, reachable from
/// `registry`'s head (unless it is `Mapped`, in which case it has already been unlinked by
/// the caller before this runs, matching the mapped special case's own unlinking below).
pub unsafe fn resize_existing(registry: &mut Registry, block: *mut Block, new_size: usize) -> Option<Resized> {
  unsafe {
    if new_size > (*block).size {
      if (*block).status != BlockStatus::Mapped && try_absorb_successor(block, new_size) {
        registry.refresh_tail_from(block);
        return Some(Resized::InPlace);
      }
      if (*block).status == BlockStatus::Mapped {
        return Some(grow_mapped_block(registry, block, new_size));
      }
      // Cannot satisfy the grow in place or via the mapped special case; the caller falls
      // back to allocate + copy + free through the full placement policy.
      return None;
    }

    // Shrink case: split off a free suffix when there's enough surplus to host it.
    if (*block).status != BlockStatus::Mapped {
      scanner::split_if_worthwhile(block, new_size);
    }
    Some(Resized::InPlace)
  }
}

/// The mapped-grow special case: a fresh 128 KiB brk chunk is pre-allocated, `new_size`
/// bytes of the mapped block's payload are copied in, the new block takes the old block's
/// position in the list, and the old mapping is released.
///
/// This literally preserves the source behavior of unconditionally extending by 128 KiB
/// regardless of how much bigger `new_size` actually is; see DESIGN.md for why that waste
/// is kept rather than "fixed".
///
/// # Safety
///
/// `block` must be a live `Mapped` header still reachable from `registry`'s head.
unsafe fn grow_mapped_block(registry: &mut Registry, block: *mut Block, new_size: usize) -> Resized {
  unsafe {
    const PREALLOC_CHUNK: usize = 128 * 1024;
    let raw = match kernel::sbrk_extend(PREALLOC_CHUNK as isize) {
      Ok(addr) => addr,
      Err(()) => kernel::fatal("Alloc failed"),
    };

    let (prev, _) = registry.find_with_predecessor(block);
    let old_next = (*block).next;
    let new_block = Block::write(raw, new_size, BlockStatus::Allocated, old_next);

    ptr::copy_nonoverlapping(Block::payload_of(block), Block::payload_of(new_block), new_size);

    if prev.is_null() {
      // `new_block` takes the position `block` occupied in the list.
      registry.set_head(new_block);
    } else {
      (*prev).next = new_block;
    }
    registry.refresh_tail_from(new_block);

    let old_len = (*block).size + Block::HEADER_SIZE;
    if kernel::unmap(block as *mut u8, old_len).is_err() {
      kernel::fatal("Free failed");
    }

    Resized::Relocated(new_block)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::alloc::{Layout, alloc as std_alloc, dealloc as std_dealloc};

  struct Arena {
    layout: Layout,
    base: *mut u8,
  }

  impl Arena {
    fn new(len: usize) -> Self {
      let layout = Layout::from_size_align(len, 8).unwrap();
      let base = unsafe { std_alloc(layout) };
      assert!(!base.is_null());
      Self { layout, base }
    }
  }

  impl Drop for Arena {
    fn drop(&mut self) {
      unsafe { std_dealloc(self.base, self.layout) };
    }
  }

  #[test]
  fn grows_in_place_by_absorbing_free_successor() {
    let arena = Arena::new(1024);
    let mut registry = Registry::new();
    unsafe {
      let a = Block::write(arena.base, 64, BlockStatus::Allocated, ptr::null_mut());
      let b = Block::write(arena.base.add(Block::HEADER_SIZE + 64), 64, BlockStatus::Free, ptr::null_mut());
      (*a).next = b;
      registry.install_sole(a);
      registry.refresh_tail_from(a);

      let result = resize_existing(&mut registry, a, 120);
      assert!(matches!(result, Some(Resized::InPlace)));
      assert_eq!((*a).size, 64 + 64 + Block::HEADER_SIZE);
      assert!((*a).next.is_null());
      assert_eq!(registry.tail(), a, "the absorbed successor was the tail; the anchor must follow it into a");
    }
  }

  #[test]
  fn reports_none_when_no_in_place_grow_is_possible() {
    let arena = Arena::new(1024);
    let mut registry = Registry::new();
    unsafe {
      let a = Block::write(arena.base, 64, BlockStatus::Allocated, ptr::null_mut());
      registry.install_sole(a);
      registry.refresh_tail_from(a);

      let result = resize_existing(&mut registry, a, 256);
      assert!(matches!(result, None));
    }
  }

  #[test]
  fn shrinks_by_splitting_off_a_free_suffix() {
    let arena = Arena::new(1024);
    let mut registry = Registry::new();
    unsafe {
      let a = Block::write(arena.base, 500, BlockStatus::Allocated, ptr::null_mut());
      registry.install_sole(a);
      registry.refresh_tail_from(a);

      let result = resize_existing(&mut registry, a, 40);
      assert!(matches!(result, Some(Resized::InPlace)));
      assert_eq!((*a).size, 40);
      let remainder = (*a).next;
      assert!(!remainder.is_null());
      assert_eq!((*remainder).status, BlockStatus::Free);
    }
  }

  #[test]
  fn shrink_below_split_threshold_leaves_block_untouched() {
    let arena = Arena::new(1024);
    let mut registry = Registry::new();
    unsafe {
      let a = Block::write(arena.base, 48, BlockStatus::Allocated, ptr::null_mut());
      registry.install_sole(a);
      registry.refresh_tail_from(a);

      let result = resize_existing(&mut registry, a, 40);
      assert!(matches!(result, Some(Resized::InPlace)));
      assert_eq!((*a).size, 48);
      assert!((*a).next.is_null());
    }
  }
}
