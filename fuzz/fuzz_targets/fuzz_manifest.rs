#![no_main]
use blockvol::core::manifest::{self, MANIFEST_VERSION};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(validated) = manifest::validate(text, 102400) {
        assert!(validated.document.version <= MANIFEST_VERSION);
        assert_eq!(validated.document.encoding, manifest::ENCODING);
    }
});
