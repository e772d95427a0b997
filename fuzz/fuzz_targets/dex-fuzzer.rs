#![no_main]

use libfuzzer_sys::fuzz_target;
use vdex_extract_dex::Dex;

fuzz_target!(|data: &[u8]| {
    // must provide at least 8 bytes
    if data.len() < 8 {
        return;
    }

    let _ = Dex::new(data.to_vec());
});
