//! Syntax highlighting of a whole source file into one markup block.
//!
//! The block is what a server-side highlighter would hand the page: inline
//! styled `<span>`s that freely cross line boundaries (a multi-line string or
//! block comment is a single span). [`crate::reflow::reflow`] turns it into
//! self-contained lines.

use std::sync::LazyLock;

use syntect::easy::HighlightLines;
use syntect::highlighting::{Style, ThemeSet};
use syntect::html::{styled_line_to_highlighted_html, IncludeBackground};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;
use tracing::warn;

use crate::overlay::escape_html;

static PS: LazyLock<SyntaxSet> = LazyLock::new(SyntaxSet::load_defaults_newlines);
static TS: LazyLock<ThemeSet> = LazyLock::new(ThemeSet::load_defaults);

pub const DEFAULT_THEME: &str = "base16-ocean.dark";

/// Names of the bundled highlighting themes, sorted.
pub fn theme_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = TS.themes.keys().map(String::as_str).collect();
    names.sort_unstable();
    names
}

/// Highlights `source` as the language for `extension` (e.g. `"py"`).
///
/// Unknown extensions are treated as plain text and unknown themes fall back
/// to [`DEFAULT_THEME`]. If highlighting fails the source is returned
/// HTML-escaped without styling.
pub fn highlight_to_markup(source: &str, extension: &str, theme: &str) -> String {
    let source = source.replace("\r\n", "\n");
    let syntax = PS
        .find_syntax_by_extension(extension)
        .unwrap_or_else(|| PS.find_syntax_plain_text());
    let Some(theme) = TS.themes.get(theme).or_else(|| TS.themes.get(DEFAULT_THEME)) else {
        return escape_html(&source);
    };

    let mut h = HighlightLines::new(syntax, theme);
    let mut regions: Vec<(Style, &str)> = Vec::new();
    for line in LinesWithEndings::from(&source) {
        match h.highlight_line(line, &PS) {
            Ok(ranges) => regions.extend(ranges),
            Err(err) => {
                warn!(error = %err, "highlighting failed, showing plain source");
                return escape_html(&source);
            }
        }
    }

    let merged = merge_regions(&regions);
    let merged: Vec<(Style, &str)> = merged.iter().map(|(style, text)| (*style, text.as_str())).collect();
    match styled_line_to_highlighted_html(&merged, IncludeBackground::No) {
        Ok(markup) => markup,
        Err(err) => {
            warn!(error = %err, "highlighting failed, showing plain source");
            escape_html(&source)
        }
    }
}

/// Joins neighbouring regions with the same style so that a construct
/// spanning several lines ends up in one span.
fn merge_regions(regions: &[(Style, &str)]) -> Vec<(Style, String)> {
    let mut merged: Vec<(Style, String)> = Vec::with_capacity(regions.len());
    for &(style, text) in regions {
        match merged.last_mut() {
            Some((last, acc)) if *last == style => acc.push_str(text),
            _ => merged.push((style, text.to_owned())),
        }
    }
    merged
}
