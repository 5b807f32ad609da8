use std::sync::OnceLock;

use regex::Regex;

/// Marker introducing the sea-state part of a combined wind and sea field.
pub const SEA_STATE_MARKER: &str = "MER :";

fn line_break_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<br\s*/?>").expect("valid line break pattern"))
}

fn newline_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{2,}").expect("valid newline pattern"))
}

/// Turn an upstream fragment into plain text: `<br />` tags become newlines,
/// outer whitespace is trimmed and newline runs collapse to a single one.
///
/// An empty result means the field is absent and must not be emitted.
pub fn html_to_text(html: &str) -> String {
    let text = line_break_tag().replace_all(html, "\n");
    newline_runs().replace_all(text.trim(), "\n").into_owned()
}

/// Split a wind and sea field into its wind part and its sea-state part.
///
/// Returns the normalized paragraphs to emit, in order. Without the marker
/// the whole field is a single paragraph; empty halves are dropped.
pub fn split_wind_and_sea(field: &str) -> Vec<String> {
    let paragraphs = match field.split_once(SEA_STATE_MARKER) {
        Some((wind, sea)) => vec![
            html_to_text(wind),
            html_to_text(&format!("{SEA_STATE_MARKER}{sea}")),
        ],
        None => vec![html_to_text(field)],
    };
    paragraphs
        .into_iter()
        .filter(|paragraph| !paragraph.is_empty())
        .collect()
}

pub(crate) fn compact_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) fn escape_html(value: &str) -> String {
    let mut output = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => output.push_str("&amp;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            '"' => output.push_str("&#34;"),
            '\'' => output.push_str("&#39;"),
            _ => output.push(ch),
        }
    }
    output
}
