//! The block registry: a singly-linked list of every block the allocator has ever created,
//! in creation order, with head/tail anchors kept consistent across every mutation.
//!
//! Brk-resident blocks land in address order because the arena only grows forward; mapped
//! blocks are interleaved in creation order regardless of address. List-adjacency therefore
//! equals address-adjacency for brk blocks, which is exactly the property the coalescer in
//! [`crate::coalesce`] relies on.

use crate::block::Block;
use std::ptr;

/// Owns the head and tail anchors of the block list.
///
/// Predecessors are never stored, only recovered by traversal when needed (see
/// [`Registry::find_with_predecessor`]), so there is no cyclic bookkeeping to keep in sync.
pub struct Registry {
  head: *mut Block,
  tail: *mut Block,
}

impl Registry {
  pub const fn new() -> Self {
    Self { head: ptr::null_mut(), tail: ptr::null_mut() }
  }

  pub fn is_empty(&self) -> bool {
    self.head.is_null()
  }

  pub fn head(&self) -> *mut Block {
    self.head
  }

  pub fn tail(&self) -> *mut Block {
    self.tail
  }

  /// Installs `block` as the sole element of an empty list.
  pub fn install_sole(&mut self, block: *mut Block) {
    debug_assert!(self.is_empty());
    self.head = block;
    self.tail = block;
  }

  /// Repoints the head anchor at `block`, which has just replaced the old head node at the
  /// same list position (used by the resize engine's mapped-grow special case, which
  /// installs a brand new header where an old one used to be rather than appending).
  pub fn set_head(&mut self, block: *mut Block) {
    self.head = block;
  }

  /// Appends `block` after the current tail, or installs it as the sole element if the list
  /// is empty.
  ///
  /// # Safety
  ///
  /// `block` must be a valid, freshly initialised header whose `next` is null.
  pub unsafe fn push_back(&mut self, block: *mut Block) {
    if self.is_empty() {
      self.install_sole(block);
    } else {
      unsafe {
        (*self.tail).next = block;
      }
      self.tail = block;
    }
  }

  /// Walks the list looking for the header exactly at `target`, returning it together with
  /// its predecessor (null if `target` is the head).
  ///
  /// # Safety
  ///
  /// `target` must be reachable from `head`, or this loops over invalid memory.
  pub unsafe fn find_with_predecessor(&self, target: *mut Block) -> (*mut Block, *mut Block) {
    let mut prev: *mut Block = ptr::null_mut();
    let mut current = self.head;
    unsafe {
      while current != target {
        prev = current;
        current = (*current).next;
      }
    }
    (prev, current)
  }

  /// Removes `block` from the list given its predecessor (null if `block` is the head).
  ///
  /// Does not touch `block`'s own `next` field, and does not refresh the tail anchor. The
  /// caller decides what "current tail" means after the removal (see
  /// [`Registry::refresh_tail_from`]).
  ///
  /// # Safety
  ///
  /// `block` and `prev` must reflect an actual adjacency in the list (as returned by
  /// [`Registry::find_with_predecessor`]).
  pub unsafe fn unlink(&mut self, prev: *mut Block, block: *mut Block) {
    unsafe {
      let next = (*block).next;
      if prev.is_null() {
        self.head = next;
      } else {
        (*prev).next = next;
      }
      if self.tail == block {
        self.tail = if prev.is_null() { next } else { prev };
      }
    }
  }

  /// Re-walks forward from `start` to find the true last reachable node, and sets the tail
  /// anchor to it. If `start` is null, falls back to walking from head; if head is also
  /// null, the list is empty and the tail anchor is cleared.
  ///
  /// Called at the end of every free: after coalescing, `start` may no longer be the true
  /// tail (its neighbor may have been the previous tail and is now folded into it), so the
  /// tail anchor must be refreshed by traversal rather than assumed.
  ///
  /// # Safety
  ///
  /// `start`, if non-null, must be reachable from head.
  pub unsafe fn refresh_tail_from(&mut self, start: *mut Block) {
    let mut current = if start.is_null() { self.head } else { start };
    if current.is_null() {
      self.tail = ptr::null_mut();
      return;
    }
    unsafe {
      while !(*current).next.is_null() {
        current = (*current).next;
      }
    }
    self.tail = current;
  }
}
