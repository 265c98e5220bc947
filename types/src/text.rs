//! Small pure text helpers.

/// Separator inserted between the kept head and tail of truncated output.
pub const TRUNCATION_MARKER: &str = "\n\n... [output truncated] ...\n\n";

/// Truncate `s` to at most `max_chars` characters of content, keeping both ends.
///
/// The head and tail halves are joined with [`TRUNCATION_MARKER`]; the marker
/// does NOT count toward the budget, so the result is at most
/// `max_chars + TRUNCATION_MARKER.chars().count()` characters. Counts `char`s,
/// not bytes, so multi-byte scalar values are never split.
#[must_use]
pub fn truncate_middle(s: &str, max_chars: usize) -> String {
    let total = s.chars().count();
    if total <= max_chars {
        return s.to_string();
    }
    let head_len = max_chars / 2;
    let tail_len = max_chars - head_len;

    let head_end = s.char_indices().nth(head_len).map_or(s.len(), |(i, _)| i);
    let tail_start = s
        .char_indices()
        .nth(total - tail_len)
        .map_or(s.len(), |(i, _)| i);

    let mut out = String::with_capacity(head_end + TRUNCATION_MARKER.len() + (s.len() - tail_start));
    out.push_str(&s[..head_end]);
    out.push_str(TRUNCATION_MARKER);
    out.push_str(&s[tail_start..]);
    out
}
