#![no_main]

use libfuzzer_sys::fuzz_target;
use vigil_shamir::Share;

fuzz_target!(|data: &[u8]| {
    // Binary and hex parsing must never panic
    if let Ok(share) = Share::from_bytes(data) {
        // A parsed share re-encodes to exactly the input
        assert_eq!(share.to_bytes().as_slice(), data);
        let _ = Share::from_hex(&share.to_hex());
    }

    if let Ok(text) = std::str::from_utf8(data) {
        let _ = Share::from_hex(text);
    }
});
