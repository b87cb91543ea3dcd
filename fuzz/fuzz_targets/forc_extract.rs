#![no_main]

use forc_compute::{build_grid, extract};
use forc_core::{ExtractConfig, Sample};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    // Keep inputs small so the fuzzer stays fast.
    let config = ExtractConfig {
        hb_tolerance: data[0] as f64 / 64.0,
        trim_points: (data[1] % 4) as usize,
    };
    let raw: Vec<Sample> = data[2..]
        .chunks_exact(24)
        .take(512)
        .map(|c| {
            let f = |i: usize| f64::from_le_bytes(c[i..i + 8].try_into().unwrap());
            Sample::new(f(0), f(8), f(16))
        })
        .collect();

    let Ok(set) = extract(&raw, &config) else {
        return;
    };
    for curve in set.curves() {
        assert!(curve.len() >= 2);
        assert!(curve.ha().windows(2).all(|w| w[0] < w[1]));
        assert!(curve.ha()[0] >= curve.hb());
    }
    assert!(set.curves().windows(2).all(|w| w[0].hb() < w[1].hb()));

    let _ = build_grid(&set, 8, 2);
});
