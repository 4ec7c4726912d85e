#![no_main]

use libfuzzer_sys::fuzz_target;
use offload_dex::Dex;

fuzz_target!(|data: &[u8]| {
    if data.len() < 8 {
        return;
    }

    let _ = Dex::new(data.to_vec());
});
