#![no_main]

use libfuzzer_sys::fuzz_target;
use tau_snapshot::collapse_event_log;

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    let once = collapse_event_log(&text);
    assert!(once.split('\n').count() <= text.split('\n').count());
    let twice = collapse_event_log(&once);
    assert_eq!(once, twice);
});
