#![no_main]

use libfuzzer_sys::fuzz_target;
use tau_snapshot::{parse_page_block, render_summarized_page_block, SNAPSHOT_SECTION_HEADER};

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    let Some(block) = parse_page_block(&text) else {
        return;
    };
    assert_eq!(&text[block.span.clone()], block.full_match);
    assert!(block.full_match.contains(SNAPSHOT_SECTION_HEADER));
    assert!(!block.url.contains('\n'));
    assert!(!block.title.contains('\n'));
    assert!(block.full_match.contains(block.body));

    let rendered = render_summarized_page_block(block.url, block.title, "summary");
    assert!(parse_page_block(&rendered).is_none());
});
