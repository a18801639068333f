#![no_main]
use blockvol::core::filename;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if !data.is_empty() {
        let id = filename::encode(data);
        assert_eq!(filename::decode(&id).unwrap(), data);
    }

    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(bytes) = filename::decode(text) {
            assert!(filename::is_well_formed(text));
            assert!(!bytes.is_empty());
        }
    }
});
