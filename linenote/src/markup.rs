//! Converts one reflowed line of highlighter markup into ratatui spans.
//!
//! Only the inline `style` attribute the highlighter writes is understood:
//! `color`, `background-color`, `font-weight:bold`, `font-style:italic` and
//! `text-decoration:underline`. Other tags and attributes pass their text
//! through unstyled.

use linenote_core::reflow::{decode_entities, tokenize, Token};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};

/// Renders `markup` (one self-contained line) as a styled ratatui line.
///
/// Malformed markup degrades to its raw text rather than failing.
pub fn to_line(markup: &str) -> Line<'static> {
    let mut stack: Vec<Style> = Vec::new();
    let mut spans: Vec<Span<'static>> = Vec::new();
    for token in tokenize(markup) {
        match token {
            Ok(Token::Open { raw, .. }) => {
                let base = stack.last().copied().unwrap_or_default();
                stack.push(base.patch(style_attr(raw).map(parse_style).unwrap_or_default()));
            }
            Ok(Token::Close { .. }) => {
                stack.pop();
            }
            Ok(Token::Void { .. }) => {}
            Ok(Token::Text(text)) => {
                let style = stack.last().copied().unwrap_or_default();
                spans.push(Span::styled(expand_tabs(&decode_entities(text)), style));
            }
            Err(err) => {
                let rest: String = markup.chars().skip(err.column - 1).collect();
                spans.push(Span::raw(rest));
            }
        }
    }
    Line::from(spans)
}

fn expand_tabs(text: &str) -> String {
    text.replace('\t', "    ")
}

/// Extracts the value of the `style` attribute from a raw opening tag.
fn style_attr(raw: &str) -> Option<&str> {
    let start = raw.find("style=")? + "style=".len();
    let rest = &raw[start..];
    let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let rest = &rest[1..];
    let end = rest.find(quote)?;
    Some(&rest[..end])
}

fn parse_style(css: &str) -> Style {
    let mut style = Style::default();
    for decl in css.split(';') {
        let Some((prop, value)) = decl.split_once(':') else {
            continue;
        };
        match (prop.trim(), value.trim()) {
            ("color", v) => {
                if let Some(c) = parse_color(v) {
                    style = style.fg(c);
                }
            }
            ("background-color", v) => {
                if let Some(c) = parse_color(v) {
                    style = style.bg(c);
                }
            }
            ("font-weight", "bold") => style = style.add_modifier(Modifier::BOLD),
            ("font-style", "italic") => style = style.add_modifier(Modifier::ITALIC),
            ("text-decoration", "underline") => style = style.add_modifier(Modifier::UNDERLINED),
            _ => {}
        }
    }
    style
}

/// Parses `#rgb`, `#rrggbb` and `#rrggbbaa` (alpha ignored).
fn parse_color(value: &str) -> Option<Color> {
    let hex = value.strip_prefix('#').filter(|h| h.is_ascii())?;
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        3 => {
            let mut it = hex.chars().map(|c| c.to_digit(16).map(|d| (d * 17) as u8));
            Some(Color::Rgb(it.next()??, it.next()??, it.next()??))
        }
        6 | 8 => Some(Color::Rgb(channel(&hex[0..2])?, channel(&hex[2..4])?, channel(&hex[4..6])?)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_styles_accumulate() {
        let line = to_line(
            r#"<span style="color:#ff0000;"><span style="font-weight:bold;">a</span>b</span>"#,
        );
        assert_eq!(line.spans.len(), 2);
        assert_eq!(line.spans[0].content, "a");
        assert_eq!(line.spans[0].style.fg, Some(Color::Rgb(255, 0, 0)));
        assert!(line.spans[0].style.add_modifier.contains(Modifier::BOLD));
        assert_eq!(line.spans[1].content, "b");
        assert!(!line.spans[1].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn entities_are_decoded() {
        let line = to_line("if a &lt; b &amp;&amp; c");
        assert_eq!(line.spans[0].content, "if a < b && c");
    }

    #[test]
    fn short_hex_and_unknown_props() {
        assert_eq!(parse_color("#fff"), Some(Color::Rgb(255, 255, 255)));
        assert_eq!(parse_color("red"), None);
        assert_eq!(parse_style("margin:0"), Style::default());
    }

    #[test]
    fn non_ascii_color_is_ignored() {
        assert_eq!(parse_color("#ééé"), None);
        assert_eq!(parse_color("#a€bc"), None);
        assert_eq!(parse_color("#a€bcdef"), None);
        assert_eq!(parse_color("#ffé"), None);
        assert_eq!(parse_style("color:#ééé;font-weight:bold"), Style::default().add_modifier(Modifier::BOLD));
    }

    #[test]
    fn broken_tag_shows_raw_text() {
        let line = to_line("x <span style=");
        let text: String = line.spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(text, "x <span style=");
    }
}
