#![no_main]

use libfuzzer_sys::fuzz_target;
use vdex_extract_vdex::deps;

fuzz_target!(|data: &[u8]| {
    // first byte picks the dex count, the rest is the deps section
    let Some((count, section)) = data.split_first() else {
        return;
    };

    let _ = deps::decode(section, *count as usize % 8);
});
