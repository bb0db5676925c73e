//! Text grammars for browser tool output emitted by MCP page-automation servers.
//!
//! Locates the `### Page` / `### Snapshot` block that carries an accessibility
//! snapshot and collapses repeated lines inside the `### Events` section.

pub mod event_log;
pub mod page_block;

pub use event_log::{collapse_event_log, EVENTS_SECTION_HEADER};
pub use page_block::{
    parse_page_block, render_summarized_page_block, PageBlock, PAGE_SECTION_HEADER,
    PAGE_TITLE_PREFIX, PAGE_URL_PREFIX, SNAPSHOT_SECTION_HEADER, SUMMARIZED_SNAPSHOT_HEADER,
};
