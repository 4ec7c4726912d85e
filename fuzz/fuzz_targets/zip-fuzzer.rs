#![no_main]

use libfuzzer_sys::fuzz_target;
use offload_zip::ZipEntry;

fuzz_target!(|data: &[u8]| {
    let input = data.to_vec();
    let _ = ZipEntry::new(input);
});
