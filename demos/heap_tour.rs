use std::io::Read;

use libc::sbrk;
use rallocator::HeapAllocator;

/// Waits until the user presses ENTER.
/// Useful for inspecting memory state with `pmap`, `htop`, `gdb`, or just watching how
/// allocations move the program break.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the current program break via `sbrk(0)`.
unsafe fn print_program_break(label: &str) {
  println!("[{}] PID = {}, program break (sbrk(0)) = {:?}", label, std::process::id(), unsafe { sbrk(0) });
}

fn main() {
  let mut heap = HeapAllocator::new();

  unsafe {
    print_program_break("start");
    block_until_enter_pressed();

    // 1) A small allocation triggers the cold-case 128 KiB pre-allocation.
    println!("\n[1] Allocate 64 bytes (triggers the 128 KiB pre-allocation)");
    let first = heap.allocate(64) as *mut u64;
    assert!(!first.is_null());
    first.write(0xDEAD_BEEF_DEAD_BEEF);
    println!("[1] Address = {:?}, value written = 0x{:X}", first, first.read());
    print_program_break("after pre-allocation");
    block_until_enter_pressed();

    // 2) A second small allocation is served warm, appended after the first.
    println!("\n[2] Allocate [u8; 12]");
    let second = heap.allocate(12);
    assert!(!second.is_null());
    second.write_bytes(0xAB, 12);
    println!("[2] Address = {:?}", second);
    block_until_enter_pressed();

    // 3) Free the first block and allocate something smaller: expect reuse via split.
    println!("\n[3] Free block 1, then allocate 20 bytes (expect reuse + split)");
    heap.free(first as *mut u8);
    let third = heap.allocate(20);
    println!(
      "[3] third == first? {} (reuse via first-fit split)",
      if third == first as *mut u8 { "yes" } else { "no" }
    );
    block_until_enter_pressed();

    // 4) A large allocation routes straight to mmap, bypassing the brk arena entirely.
    println!("\n[4] Allocate 256 KiB (exceeds the threshold, routes via mmap)");
    print_program_break("before large alloc");
    let big = heap.allocate(256 * 1024);
    assert!(!big.is_null());
    println!("[4] Address = {:?}", big);
    print_program_break("after large alloc (unchanged: this went via mmap)");
    block_until_enter_pressed();

    // 5) Resize the mapped block downward: this is a shrink that leaves it mapped in place.
    println!("\n[5] Resize the mapped block down to 128 bytes");
    let shrunk = heap.resize(big, 128);
    println!("[5] shrunk == big? {}", shrunk == big);
    heap.free(shrunk);

    // 6) allocate_zeroed for a medium size demonstrates the page-size threshold override.
    println!("\n[6] allocate_zeroed(1, 8192) - should route via mmap and come back zeroed");
    let zeroed = heap.allocate_zeroed(1, 8192);
    assert!(!zeroed.is_null());
    let all_zero = std::slice::from_raw_parts(zeroed, 8192).iter().all(|&b| b == 0);
    println!("[6] all 8192 bytes zero? {}", all_zero);
    heap.free(zeroed);

    heap.free(second);
    heap.free(third);

    println!("\n[7] End of tour. Process exit reclaims everything the OS still owns.");
  }
}
