// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Line wrapping for page titles and filename labels.
//
// Both wrappers are greedy and width-driven: the caller supplies a
// measurement function (text → width in the same unit as `max_width`), so
// the wrapping logic is independent of the font backend.

/// Characters a title may break after. The delimiter stays on the line it
/// ends.
const TITLE_BREAKS: [char; 3] = [' ', '_', '/'];

/// Wrap a title on spaces, underscores and slashes.
///
/// A segment that does not fit starts a new line even if it is wider than
/// `max_width` on its own; content is never dropped. Trailing whitespace is
/// trimmed from every line.
pub fn wrap_title<F>(title: &str, max_width: f64, measure: F) -> Vec<String>
where
    F: Fn(&str) -> f64,
{
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_width = 0.0;

    for segment in split_keeping_delimiters(title) {
        let segment_width = measure(segment);
        if current_width + segment_width <= max_width || current.is_empty() {
            current.push_str(segment);
            current_width += segment_width;
        } else {
            lines.push(current.trim_end().to_string());
            current = segment.to_string();
            current_width = segment_width;
        }
    }

    if !current.is_empty() {
        lines.push(current.trim_end().to_string());
    }

    lines
}

/// Wrap a filename on underscores.
///
/// Words are re-joined with `_`; every accepted word adds `underscore_width`
/// to the running line width to pay for the separator that follows it.
pub fn wrap_filename<F>(
    filename: &str,
    max_width: f64,
    measure: F,
    underscore_width: f64,
) -> Vec<String>
where
    F: Fn(&str) -> f64,
{
    let mut lines = Vec::new();
    let mut parts: Vec<&str> = Vec::new();
    let mut current_width = 0.0;

    for word in filename.split('_') {
        let word_width = measure(word);
        if current_width + word_width <= max_width {
            parts.push(word);
            current_width += word_width + underscore_width;
        } else {
            if !parts.is_empty() {
                lines.push(parts.join("_"));
            }
            parts = vec![word];
            current_width = word_width;
        }
    }

    if !parts.is_empty() {
        lines.push(parts.join("_"));
    }

    lines
}

/// Split after every title break character, keeping the delimiter attached
/// to the end of the segment it closes.
fn split_keeping_delimiters(text: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0;
    for (idx, ch) in text.char_indices() {
        if TITLE_BREAKS.contains(&ch) {
            let end = idx + ch.len_utf8();
            segments.push(&text[start..end]);
            start = end;
        }
    }
    if start < text.len() {
        segments.push(&text[start..]);
    }
    segments
}
