use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;

pub const PAGE_SECTION_HEADER: &str = "### Page";
pub const PAGE_URL_PREFIX: &str = "- Page URL: ";
pub const PAGE_TITLE_PREFIX: &str = "- Page Title: ";
pub const SNAPSHOT_SECTION_HEADER: &str = "### Snapshot";
pub const SUMMARIZED_SNAPSHOT_HEADER: &str = "### Snapshot (summarized)";

// Header, URL and title lines are positional. Any number of `- ` metadata lines
// may sit between the title and the snapshot header. The body stops at the
// first fence that opens a line, so a later `### Events` section is never part
// of the match.
const PAGE_BLOCK_PATTERN: &str = r"(?ms)^### Page\n- Page URL: ([^\n]*)\n- Page Title: ([^\n]*)\n(?:- [^\n]*\n)*### Snapshot\n```yaml\n(?:(.*?)\n)??```";

fn page_block_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(PAGE_BLOCK_PATTERN).ok())
        .as_ref()
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Page-state block borrowed from a tool output text.
pub struct PageBlock<'a> {
    pub url: &'a str,
    pub title: &'a str,
    /// Inner fenced snapshot body, without the fences.
    pub body: &'a str,
    /// Exact substring the block occupies in the source text.
    pub full_match: &'a str,
    /// Byte range of `full_match` in the source text.
    pub span: Range<usize>,
}

impl PageBlock<'_> {
    /// Snapshot body length in characters.
    pub fn body_chars(&self) -> usize {
        self.body.chars().count()
    }
}

/// Locate the first page-state block in `text`.
///
/// Returns `None` for any text without the page/snapshot structure; that is the
/// normal outcome for tool output that carries no page state.
pub fn parse_page_block(text: &str) -> Option<PageBlock<'_>> {
    let captures = page_block_pattern()?.captures(text)?;
    let full = captures.get(0)?;
    Some(PageBlock {
        url: captures.get(1)?.as_str(),
        title: captures.get(2)?.as_str(),
        body: captures.get(3).map(|body| body.as_str()).unwrap_or_default(),
        full_match: full.as_str(),
        span: full.range(),
    })
}

/// Render the block that replaces a page-state block once its snapshot has been
/// summarized. URL and title lines are repeated verbatim.
pub fn render_summarized_page_block(url: &str, title: &str, summary: &str) -> String {
    format!(
        "{PAGE_SECTION_HEADER}\n{PAGE_URL_PREFIX}{url}\n{PAGE_TITLE_PREFIX}{title}\n{SUMMARIZED_SNAPSHOT_HEADER}\n{}",
        summary.trim_end()
    )
}
