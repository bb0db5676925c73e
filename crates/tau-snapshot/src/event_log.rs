use std::borrow::Cow;

pub const EVENTS_SECTION_HEADER: &str = "### Events";
const SECTION_HEADER_PREFIX: &str = "### ";
const REPEAT_MARKER_PREFIX: &str = "[repeated ";
const REPEAT_MARKER_SUFFIX: &str = " times]";

fn repeat_marker(count: usize) -> String {
    format!("  {REPEAT_MARKER_PREFIX}{count}{REPEAT_MARKER_SUFFIX}")
}

fn is_repeat_marker(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with(REPEAT_MARKER_PREFIX) && trimmed.ends_with(REPEAT_MARKER_SUFFIX)
}

/// Byte range of the body of the first `### Events` section: everything after
/// the header line up to the newline that precedes the next `### ` header, or
/// the end of the text.
fn find_events_body(text: &str) -> Option<(usize, usize)> {
    let mut line_start = 0usize;
    let header_end = loop {
        let rest = &text[line_start..];
        let line_len = rest.find('\n').unwrap_or(rest.len());
        if rest[..line_len].trim_end_matches('\r') == EVENTS_SECTION_HEADER {
            break line_start + line_len;
        }
        if line_len == rest.len() {
            return None;
        }
        line_start += line_len + 1;
    };

    if header_end >= text.len() {
        return Some((text.len(), text.len()));
    }
    let body_start = header_end + 1;
    let body = &text[body_start..];
    if body.starts_with(SECTION_HEADER_PREFIX) {
        return Some((body_start, body_start));
    }
    let body_end = body
        .find("\n### ")
        .map(|offset| body_start + offset)
        .unwrap_or(text.len());
    Some((body_start, body_end))
}

fn collapse_lines<'a>(lines: &[&'a str]) -> Vec<Cow<'a, str>> {
    let mut collapsed = Vec::with_capacity(lines.len());
    let mut index = 0usize;
    while index < lines.len() {
        let line = lines[index];
        if is_repeat_marker(line) {
            collapsed.push(Cow::Borrowed(line));
            index += 1;
            continue;
        }
        let run = lines[index..]
            .iter()
            .take_while(|candidate| **candidate == line)
            .count();
        collapsed.push(Cow::Borrowed(line));
        if run >= 2 {
            collapsed.push(Cow::Owned(repeat_marker(run)));
        }
        index += run;
    }
    collapsed
}

/// Collapse runs of identical consecutive lines inside the `### Events` section.
///
/// A run of `N >= 2` lines becomes the line followed by `  [repeated N times]`.
/// Marker lines are never folded themselves. The input is returned untouched
/// when there is no events section or when collapsing would not reduce the
/// section's line count, which also makes the operation idempotent.
pub fn collapse_event_log(text: &str) -> Cow<'_, str> {
    let Some((body_start, body_end)) = find_events_body(text) else {
        return Cow::Borrowed(text);
    };
    let lines = text[body_start..body_end].split('\n').collect::<Vec<_>>();
    let collapsed = collapse_lines(&lines);
    if collapsed.len() >= lines.len() {
        return Cow::Borrowed(text);
    }

    let mut output = String::with_capacity(text.len());
    output.push_str(&text[..body_start]);
    output.push_str(&collapsed.join("\n"));
    output.push_str(&text[body_end..]);
    Cow::Owned(output)
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    use proptest::prelude::*;

    use super::{collapse_event_log, find_events_body};

    #[test]
    fn unit_collapse_event_log_folds_run_of_three() {
        let text = "### Events\na\na\na\nb";
        assert_eq!(
            collapse_event_log(text),
            "### Events\na\n  [repeated 3 times]\nb"
        );
    }

    #[test]
    fn unit_collapse_event_log_reports_run_of_five_and_keeps_trailing_line() {
        let line = "- [WARNING] Failed to load resource @ https://x/favicon.ico";
        let text = format!("### Events\n{line}\n{line}\n{line}\n{line}\n{line}\n- [LOG] ready");
        let collapsed = collapse_event_log(&text);
        assert_eq!(
            collapsed,
            format!("### Events\n{line}\n  [repeated 5 times]\n- [LOG] ready")
        );
    }

    #[test]
    fn functional_collapse_event_log_stops_at_next_section_header() {
        let text = "### Page\n- Page URL: https://x\n### Events\nx\nx\nx\n### Tabs\nx\nx\nx";
        assert_eq!(
            collapse_event_log(text),
            "### Page\n- Page URL: https://x\n### Events\nx\n  [repeated 3 times]\n### Tabs\nx\nx\nx"
        );
    }

    #[test]
    fn functional_collapse_event_log_returns_borrowed_input_without_duplicates() {
        let text = "### Events\na\nb\na\nb";
        let collapsed = collapse_event_log(text);
        assert!(matches!(collapsed, Cow::Borrowed(_)));
        assert_eq!(collapsed, text);
    }

    #[test]
    fn regression_collapse_event_log_keeps_pair_runs_when_line_count_would_not_shrink() {
        let text = "### Events\na\na\nb";
        assert!(matches!(collapse_event_log(text), Cow::Borrowed(_)));
    }

    #[test]
    fn regression_collapse_event_log_without_events_section_is_identity() {
        let text = "### Result\nok\nok\nok";
        assert!(matches!(collapse_event_log(text), Cow::Borrowed(_)));
        assert!(matches!(collapse_event_log(""), Cow::Borrowed(_)));
    }

    #[test]
    fn regression_collapse_event_log_does_not_fold_existing_markers() {
        let text = "### Events\na\na\na\n  [repeated 3 times]\n  [repeated 3 times]\n  [repeated 3 times]";
        let once = collapse_event_log(text).into_owned();
        assert_eq!(
            once,
            "### Events\na\n  [repeated 3 times]\n  [repeated 3 times]\n  [repeated 3 times]\n  [repeated 3 times]"
        );
        assert_eq!(collapse_event_log(&once), once);
    }

    #[test]
    fn unit_find_events_body_handles_header_at_end_of_text() {
        let text = "### Events";
        assert_eq!(find_events_body(text), Some((text.len(), text.len())));
        assert!(matches!(collapse_event_log(text), Cow::Borrowed(_)));
    }

    proptest! {
        #[test]
        fn collapse_event_log_is_idempotent_and_never_grows(
            lines in proptest::collection::vec(prop_oneof![Just("a"), Just("b"), Just("c"), Just("- [LOG] x")], 0..40)
        ) {
            let text = format!("### Events\n{}", lines.join("\n"));
            let once = collapse_event_log(&text).into_owned();
            let twice = collapse_event_log(&once).into_owned();
            prop_assert_eq!(&once, &twice);
            prop_assert!(once.lines().count() <= text.lines().count());
        }
    }
}
