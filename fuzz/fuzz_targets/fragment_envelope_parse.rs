#![no_main]

use libfuzzer_sys::fuzz_target;
use vigil_core::EncryptedFragment;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Parsing arbitrary text must never panic. Key derivation is not run
    // here: a parsed envelope only carries bounded Argon2 costs.
    if let Ok(fragment) = EncryptedFragment::from_envelope(text) {
        let reparsed = EncryptedFragment::from_envelope(&fragment.to_envelope());
        assert_eq!(reparsed.ok().as_ref(), Some(&fragment));
    }
});
