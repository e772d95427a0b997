#![no_main]

use libfuzzer_sys::fuzz_target;
use vdex_extract_vdex::container::Vdex;

fuzz_target!(|data: &[u8]| {
    let Ok(vdex) = Vdex::parse(data) else {
        return;
    };

    for slice in vdex.dex_files() {
        if slice.is_err() {
            break;
        }
    }
});
