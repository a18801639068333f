#![no_main]
use blockvol::parse_name;
use libfuzzer_sys::fuzz_target;

// Any name that parses must render back to itself, except for the
// case of the type segment.
fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(Some(parsed)) = parse_name(text) {
        let rendered = parsed.name.to_string();
        assert_eq!(rendered.len(), text.len());
        assert!(rendered.eq_ignore_ascii_case(text));
    }
});
