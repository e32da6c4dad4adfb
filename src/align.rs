/// Rounds a byte count up to the next multiple of 8.
///
/// Every payload size this allocator hands out is rounded through this macro before any
/// placement decision is made; nothing in the block list is ever sized to a non-multiple of 8.
/// Unlike a machine-word alignment macro, this is fixed at 8 regardless of target pointer width:
/// stronger alignment is explicitly out of scope.
///
/// # Examples
///
/// ```rust
/// use rallocator::round_up_8;
///
/// assert_eq!(round_up_8!(0usize), 0);
/// assert_eq!(round_up_8!(1usize), 8);
/// assert_eq!(round_up_8!(8usize), 8);
/// assert_eq!(round_up_8!(9usize), 16);
/// ```
#[macro_export]
macro_rules! round_up_8 {
  ($value:expr) => {
    ($value + 7) & !7
  };
}

#[cfg(test)]
mod tests {
  #[test]
  fn rounds_up_to_next_multiple_of_eight() {
    assert_eq!(round_up_8!(0usize), 0);
    assert_eq!(round_up_8!(1usize), 8);
    assert_eq!(round_up_8!(7usize), 8);
    assert_eq!(round_up_8!(8usize), 8);
    assert_eq!(round_up_8!(9usize), 16);
    assert_eq!(round_up_8!(100usize), 104);
    assert_eq!(round_up_8!(130000usize), 130000);
  }

  #[test]
  fn is_idempotent() {
    for n in 0..200usize {
      let once = round_up_8!(n);
      let twice = round_up_8!(once);
      assert_eq!(once, twice);
    }
  }
}
