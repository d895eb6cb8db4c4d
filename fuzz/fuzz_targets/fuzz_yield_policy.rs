#![no_main]

use libfuzzer_sys::fuzz_target;

use fibserv_core::YieldPolicy;

fuzz_target!(|data: &[u8]| {
    if data.len() < 16 {
        return;
    }
    let total = u64::from_le_bytes(data[0..8].try_into().unwrap());
    let interval = u64::from_le_bytes(data[8..16].try_into().unwrap());

    let policy = YieldPolicy::new(total, interval);
    let effective = policy.effective();
    let span = policy.total_steps().saturating_sub(1).max(1);

    // The scheduler's last yield must land on the final step.
    assert!(effective >= 1);
    assert_eq!(span % effective, 0, "effective({total}, {interval}) = {effective}");
});
