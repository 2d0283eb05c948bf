//! Tag and table-marker grammar
//!
//! ```text
//! [tag]rest-of-line              tag = [A-Za-z][^\]]*
//! [00:11:22][tag]rest-of-line    one leading non-tag group is skipped
//! [&Table][name][Start]          name = [^\]]+, whole line
//! [&Table][name][End]
//! ```

/// A dynamic-table marker line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableMarker<'a> {
    Start(&'a str),
    End(&'a str),
}

/// Leading bracket group of every table marker
const TABLE_GROUP: &str = "&Table";

/// Match a whole line against the table marker grammar
pub fn parse_table_marker(line: &str) -> Option<TableMarker<'_>> {
    let (group, rest) = bracket_group(line)?;
    if group != TABLE_GROUP {
        return None;
    }
    let rest = rest.strip_prefix('[')?;
    let close = rest.find(']')?;
    let name = &rest[..close];
    if name.is_empty() {
        return None;
    }

    match &rest[close..] {
        "][Start]" => Some(TableMarker::Start(name)),
        "][End]" => Some(TableMarker::End(name)),
        _ => None,
    }
}

/// Split `[content]rest` into `(content, rest)`
fn bracket_group(s: &str) -> Option<(&str, &str)> {
    let rest = s.strip_prefix('[')?;
    let close = rest.find(']')?;
    Some((&rest[..close], &rest[close + 1..]))
}

fn starts_with_letter(s: &str) -> bool {
    s.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
}

/// Extract the stream tag from a line prefix.
///
/// `[debug]msg` and `[00:11:22][debug]msg` both yield `debug`. At most one
/// leading group is skipped, and only when it does not start with a letter.
/// The `[&Table]` group of a marker-shaped line is never skipped.
pub fn extract_tag(line: &str) -> Option<&str> {
    let (first, rest) = bracket_group(line)?;
    if starts_with_letter(first) {
        return Some(first);
    }
    if first == TABLE_GROUP {
        return None;
    }

    let (second, _) = bracket_group(rest)?;
    if starts_with_letter(second) {
        Some(second)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_tag_simple() {
        assert_eq!(extract_tag("[debug]cmd"), Some("debug"));
        assert_eq!(extract_tag("[debug]"), Some("debug"));
        assert_eq!(extract_tag("[Motor 2] rpm=300"), Some("Motor 2"));
    }

    #[test]
    fn test_extract_tag_with_timestamp_prefix() {
        assert_eq!(extract_tag("[00:11:22][debug]usercmd"), Some("debug"));
        assert_eq!(extract_tag("[00:11:22][debug1]usercmd"), Some("debug1"));
    }

    #[test]
    fn test_extract_tag_only_timestamp_returns_none() {
        assert_eq!(extract_tag("[00:11:22]hello"), None);
    }

    #[test]
    fn test_extract_tag_requires_ascii_letter_first_char() {
        assert_eq!(extract_tag("[00:11:22][123]usercmd"), None);
        assert_eq!(extract_tag("[00:11:22][_debug]usercmd"), None);
        assert_eq!(extract_tag("[\u{e9}t\u{e9}]x"), None);
    }

    #[test]
    fn test_extract_tag_skips_at_most_one_group() {
        assert_eq!(extract_tag("[1][2][debug]x"), None);
    }

    #[test]
    fn test_extract_tag_rejects_unanchored_or_unclosed() {
        assert_eq!(extract_tag(" [debug]x"), None);
        assert_eq!(extract_tag("[debug"), None);
        assert_eq!(extract_tag("[]x"), None);
        assert_eq!(extract_tag(""), None);
    }

    #[test]
    fn test_extract_tag_ignores_table_marker_groups() {
        assert_eq!(extract_tag("[&Table][B][End]"), None);
        assert_eq!(extract_tag("[&Table][B][Start]"), None);
        assert_eq!(extract_tag("[&Table][B] stray"), None);
        assert_eq!(extract_tag("[&x][debug]still a timestamp-like group"), Some("debug"));
    }

    #[test]
    fn test_table_markers() {
        assert_eq!(
            parse_table_marker("[&Table][MyStatus][Start]"),
            Some(TableMarker::Start("MyStatus"))
        );
        assert_eq!(
            parse_table_marker("[&Table][My Status 2][End]"),
            Some(TableMarker::End("My Status 2"))
        );
    }

    #[test]
    fn test_table_marker_must_be_whole_line() {
        assert_eq!(parse_table_marker("[&Table][x][Start] extra"), None);
        assert_eq!(parse_table_marker(" [&Table][x][Start]"), None);
        assert_eq!(parse_table_marker("[&Table][][Start]"), None);
        assert_eq!(parse_table_marker("[&Table][x][start]"), None);
        assert_eq!(parse_table_marker("[&table][x][Start]"), None);
        assert_eq!(parse_table_marker("[&Table][x]"), None);
    }
}
