#![no_main]

use libfuzzer_sys::fuzz_target;

use fibserv_core::algorithms::{binet, doubling, iterative};

fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }
    // Use first 4 bytes as n, capped at 5000 for speed (3 algorithms)
    let n = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as u64;
    let n = n % 5_000;

    let iter_result = iterative::nth(n);
    let doubling_result = doubling::nth(n);

    assert_eq!(iter_result, doubling_result, "Iterative != Doubling at n={n}");

    if let Ok(closed_form) = binet::nth(n) {
        assert_eq!(iter_result, closed_form, "Iterative != Binet at n={n}");
    }
});
