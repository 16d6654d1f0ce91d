//! Line reflow for highlighted markup.
//!
//! The highlighter emits one block of inline markup for a whole file, and
//! spans routinely run across line breaks (a block comment, a string with an
//! embedded newline, a token whose text ends in `\n`). The review surface
//! needs one independently well-formed unit per line, so this module splits
//! the block on `\n` while carrying a stack of open tags across the break:
//!
//! ```text
//! "<b>foo\nbar</b>\nbaz"  ->  "<b>foo</b>"  "<b>bar</b>"  "baz"
//! ```
//!
//! Every line starts by reopening whatever was open at the end of the
//! previous line (the original opening-tag text, attributes and all) and ends
//! by closing whatever is still open. Closing tags must close the most
//! recently opened tag; anything else is a [`StructuralError`].
//!
//! The scan only ever slices the input at `<`, `>` and `\n`. Those are ASCII,
//! and in UTF-8 an ASCII byte never occurs inside a multi-byte character, so
//! a line can never be cut through the middle of a character.

use std::borrow::Cow;
use std::ops::Range;

use crate::error::StructuralError;
use crate::types::LineNumber;

/// Elements that never have a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// One piece of a line of markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    /// `<span style="...">`: `raw` is the full tag text, used to reopen it.
    Open { name: &'a str, raw: &'a str },
    Close { name: &'a str },
    /// Self-closing tags, void elements, comments and declarations.
    Void { raw: &'a str },
    Text(&'a str),
}

/// A `<` that starts a tag but has no matching `>` on the same line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnterminatedTag {
    /// 1-based character column of the `<`.
    pub column: usize,
}

/// Splits one line of markup into tokens.
pub fn tokenize(line: &str) -> Tokens<'_> {
    Tokens { src: line, pos: 0 }
}

pub struct Tokens<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Iterator for Tokens<'a> {
    type Item = Result<Token<'a>, UnterminatedTag>;

    fn next(&mut self) -> Option<Self::Item> {
        let src = self.src;
        if self.pos >= src.len() {
            return None;
        }
        let bytes = src.as_bytes();

        if starts_tag(bytes, self.pos) {
            let start = self.pos;
            let Some(end) = tag_end(bytes, start) else {
                self.pos = src.len();
                let column = src[..start].chars().count() + 1;
                return Some(Err(UnterminatedTag { column }));
            };
            self.pos = end;
            return Some(Ok(classify(&src[start..end])));
        }

        // Text runs until the next `<` that actually starts a tag.
        let start = self.pos;
        let mut cursor = start;
        loop {
            match src[cursor..].find('<') {
                Some(offset) if starts_tag(bytes, cursor + offset) => {
                    cursor += offset;
                    break;
                }
                Some(offset) => cursor += offset + 1,
                None => {
                    cursor = src.len();
                    break;
                }
            }
        }
        self.pos = cursor;
        Some(Ok(Token::Text(&src[start..cursor])))
    }
}

fn starts_tag(bytes: &[u8], at: usize) -> bool {
    bytes.get(at) == Some(&b'<')
        && matches!(bytes.get(at + 1), Some(c) if c.is_ascii_alphabetic() || matches!(c, b'/' | b'!' | b'?'))
}

/// Byte offset one past the `>` closing the tag at `start`, honouring quoted
/// attribute values.
fn tag_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (i, &b) in bytes.iter().enumerate().skip(start + 1) {
        match (quote, b) {
            (Some(q), _) if b == q => quote = None,
            (Some(_), _) => {}
            (None, b'"' | b'\'') => quote = Some(b),
            (None, b'>') => return Some(i + 1),
            (None, _) => {}
        }
    }
    None
}

fn classify(raw: &str) -> Token<'_> {
    let inner = &raw[1..raw.len() - 1];
    if inner.starts_with('!') || inner.starts_with('?') {
        return Token::Void { raw };
    }
    if let Some(rest) = inner.strip_prefix('/') {
        return Token::Close { name: tag_name(rest) };
    }
    let name = tag_name(inner);
    let is_void = VOID_ELEMENTS.iter().any(|v| v.eq_ignore_ascii_case(name));
    if inner.ends_with('/') || is_void {
        Token::Void { raw }
    } else {
        Token::Open { name, raw }
    }
}

fn tag_name(s: &str) -> &str {
    let end = s
        .find(|c: char| c.is_ascii_whitespace() || c == '/' || c == '>')
        .unwrap_or(s.len());
    &s[..end]
}

/// One reflowed line: the self-contained markup plus where the line's own
/// slice of the source sits inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflowedLine {
    pub content: String,
    pub logical: Range<usize>,
}

impl ReflowedLine {
    /// The line's slice of the original block, without the reopened prefix
    /// or the closing suffix.
    pub fn logical(&self) -> &str {
        &self.content[self.logical.clone()]
    }
}

struct OpenTag<'a> {
    name: &'a str,
    raw: &'a str,
}

/// Re-segments a highlighted block into one well-formed unit per line.
///
/// Returns one entry per `\n`-separated line (a trailing `\n` produces a final
/// empty line). Nothing is returned on error: a malformed block never yields
/// a partial set of lines.
///
/// # Errors
///
/// Any [`StructuralError`]: a closing tag with nothing open, a closing tag
/// that does not match the innermost open tag, a tag with no `>` on its line,
/// or tags left open after the last line.
pub fn reflow(source: &str) -> Result<Vec<ReflowedLine>, StructuralError> {
    let mut stack: Vec<OpenTag<'_>> = Vec::new();
    let mut lines = Vec::new();

    for (idx, slice) in source.split('\n').enumerate() {
        let line = idx as LineNumber + 1;
        let prefix_len: usize = stack.iter().map(|t| t.raw.len()).sum();

        let mut content = String::with_capacity(prefix_len + slice.len());
        for tag in &stack {
            content.push_str(tag.raw);
        }
        let start = content.len();
        content.push_str(slice);
        let end = content.len();

        for token in tokenize(slice) {
            let token = token
                .map_err(|e| StructuralError::UnterminatedTag { line, column: e.column })?;
            match token {
                Token::Open { name, raw } => stack.push(OpenTag { name, raw }),
                Token::Close { name } => match stack.pop() {
                    None => {
                        return Err(StructuralError::UnbalancedClose { tag: name.to_owned(), line })
                    }
                    Some(top) if !top.name.eq_ignore_ascii_case(name) => {
                        return Err(StructuralError::MismatchedClose {
                            expected: top.name.to_owned(),
                            found: name.to_owned(),
                            line,
                        })
                    }
                    Some(_) => {}
                },
                Token::Void { .. } | Token::Text(_) => {}
            }
        }

        for tag in stack.iter().rev() {
            content.push_str("</");
            content.push_str(tag.name);
            content.push('>');
        }
        lines.push(ReflowedLine { content, logical: start..end });
    }

    if !stack.is_empty() {
        return Err(StructuralError::Unclosed {
            tags: stack.iter().map(|t| t.name.to_owned()).collect(),
        });
    }
    Ok(lines)
}

/// The visible text of a markup fragment: tags dropped, entities decoded.
///
/// An unterminated tag is kept as literal text rather than dropped.
pub fn text_content(markup: &str) -> String {
    let mut out = String::with_capacity(markup.len());
    for token in tokenize(markup) {
        match token {
            Ok(Token::Text(t)) => out.push_str(&decode_entities(t)),
            Ok(_) => {}
            Err(e) => {
                let rest: String = markup.chars().skip(e.column - 1).collect();
                out.push_str(&rest);
            }
        }
    }
    out
}

/// Decodes the character references a highlighter emits (`&lt;`, `&amp;`,
/// `&#39;`, `&#x27;`, ...). Unknown references are left as written.
pub fn decode_entities(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let decoded = after.find(';').filter(|&semi| semi <= 10).and_then(|semi| {
            let ch = match &after[..semi] {
                "lt" => Some('<'),
                "gt" => Some('>'),
                "amp" => Some('&'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                num => num
                    .strip_prefix("#x")
                    .or_else(|| num.strip_prefix("#X"))
                    .map(|hex| u32::from_str_radix(hex, 16))
                    .or_else(|| num.strip_prefix('#').map(str::parse::<u32>))
                    .and_then(Result::ok)
                    .and_then(char::from_u32),
            };
            ch.map(|c| (c, semi))
        });
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &after[semi + 1..];
            }
            None => {
                out.push('&');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(src: &str) -> Vec<String> {
        reflow(src).unwrap().into_iter().map(|l| l.content).collect()
    }

    #[test]
    fn bold_span_across_two_lines() {
        assert_eq!(contents("<b>foo\nbar</b>\nbaz"), ["<b>foo</b>", "<b>bar</b>", "baz"]);
    }

    #[test]
    fn nested_tags_reopen_in_open_order() {
        let out = contents("<i><b>a\nb</b>c\nd</i>");
        assert_eq!(out, ["<i><b>a</b></i>", "<i><b>b</b>c</i>", "<i>d</i>"]);
    }

    #[test]
    fn reopened_tag_keeps_its_attributes() {
        let out = contents("<span style=\"color:#ff0000;\">// a\n</span>x");
        assert_eq!(out[0], "<span style=\"color:#ff0000;\">// a</span>");
        assert_eq!(out[1], "<span style=\"color:#ff0000;\"></span>x");
    }

    #[test]
    fn tag_closed_on_same_line_leaves_stack_alone() {
        assert_eq!(contents("<b>x</b>\ny"), ["<b>x</b>", "y"]);
    }

    #[test]
    fn empty_line_gets_only_the_wrapper() {
        assert_eq!(contents("<b>a\n\nb</b>"), ["<b>a</b>", "<b></b>", "<b>b</b>"]);
    }

    #[test]
    fn trailing_newline_yields_final_empty_line() {
        assert_eq!(contents("a\n"), ["a", ""]);
    }

    #[test]
    fn logical_slices_round_trip() {
        let src = "<span class=\"c\">/* one\n  two */</span>\n<b>x</b> &lt; y\n\n<i>é\nü</i>";
        let lines = reflow(src).unwrap();
        let joined: Vec<&str> = lines.iter().map(ReflowedLine::logical).collect();
        assert_eq!(joined.join("\n"), src);
    }

    /// Small xorshift generator so the nested-markup cases are reproducible.
    struct Rng(u64);

    impl Rng {
        fn below(&mut self, n: u64) -> u64 {
            self.0 ^= self.0 << 13;
            self.0 ^= self.0 >> 7;
            self.0 ^= self.0 << 17;
            self.0 % n
        }
    }

    /// Appends a random well-formed run of text, breaks and nested spans.
    fn nested_markup(rng: &mut Rng, depth: u32, out: &mut String) {
        const TEXT: &[&str] = &["x", "é", "&lt;", " ", "ü2", "<br>", "<!-- c -->"];
        const TAGS: &[(&str, &str)] = &[
            ("<b>", "</b>"),
            ("<i>", "</i>"),
            ("<span style=\"color:#abcdef;\">", "</span>"),
        ];
        for _ in 0..rng.below(5) + 1 {
            match rng.below(4) {
                0 => out.push('\n'),
                1 if depth > 0 => {
                    let (open, close) = TAGS[rng.below(TAGS.len() as u64) as usize];
                    out.push_str(open);
                    nested_markup(rng, depth - 1, out);
                    out.push_str(close);
                }
                _ => out.push_str(TEXT[rng.below(TEXT.len() as u64) as usize]),
            }
        }
    }

    fn assert_balanced(content: &str) {
        let mut stack = Vec::new();
        for token in tokenize(content) {
            match token.unwrap() {
                Token::Open { name, .. } => stack.push(name),
                Token::Close { name } => assert_eq!(stack.pop(), Some(name), "in {content:?}"),
                Token::Void { .. } | Token::Text(_) => {}
            }
        }
        assert!(stack.is_empty(), "left open in {content:?}: {stack:?}");
    }

    #[test]
    fn generated_nested_blocks_reflow_cleanly() {
        for seed in 1..=300u64 {
            let mut rng = Rng(seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1);
            let mut src = String::new();
            nested_markup(&mut rng, 4, &mut src);

            let lines = reflow(&src).unwrap_or_else(|e| panic!("seed {seed}: {e} in {src:?}"));
            let source_lines: Vec<&str> = src.split('\n').collect();
            assert_eq!(lines.len(), source_lines.len(), "seed {seed}");

            let joined: Vec<&str> = lines.iter().map(ReflowedLine::logical).collect();
            assert_eq!(joined.join("\n"), src, "seed {seed}");

            for (line, raw) in lines.iter().zip(&source_lines) {
                assert_balanced(&line.content);
                assert_eq!(text_content(&line.content), text_content(raw), "seed {seed}");
            }
        }
    }

    #[test]
    fn text_content_matches_source_text_line_by_line() {
        let src = "<b>foo\nbar</b>\n&lt;baz&gt;";
        let lines = reflow(src).unwrap();
        let text: Vec<String> = lines.iter().map(|l| text_content(&l.content)).collect();
        assert_eq!(text, ["foo", "bar", "<baz>"]);
    }

    #[test]
    fn stray_close_is_a_structural_error() {
        let err = reflow("a\nb</b>").unwrap_err();
        assert_eq!(err, StructuralError::UnbalancedClose { tag: "b".into(), line: 2 });
    }

    #[test]
    fn out_of_order_close_is_rejected() {
        let err = reflow("<b><i>x</b></i>").unwrap_err();
        assert!(matches!(err, StructuralError::MismatchedClose { line: 1, .. }));
    }

    #[test]
    fn unclosed_at_end_is_rejected() {
        let err = reflow("<b>x\ny").unwrap_err();
        assert_eq!(err, StructuralError::Unclosed { tags: vec!["b".into()] });
    }

    #[test]
    fn unterminated_tag_reports_char_column() {
        let err = reflow("ok\néé<span").unwrap_err();
        assert_eq!(err, StructuralError::UnterminatedTag { line: 2, column: 3 });
    }

    #[test]
    fn void_and_self_closing_tags_do_not_push() {
        assert_eq!(contents("a<br>b<img src=x/>\n<!-- c -->d"), ["a<br>b<img src=x/>", "<!-- c -->d"]);
    }

    #[test]
    fn bare_less_than_is_text() {
        let toks: Vec<_> = tokenize("a < b <3").map(Result::unwrap).collect();
        assert_eq!(toks, [Token::Text("a < b <3")]);
    }

    #[test]
    fn quoted_gt_inside_attribute() {
        let toks: Vec<_> = tokenize("<a title=\"x>y\">t</a>").map(Result::unwrap).collect();
        assert_eq!(
            toks,
            [
                Token::Open { name: "a", raw: "<a title=\"x>y\">" },
                Token::Text("t"),
                Token::Close { name: "a" },
            ]
        );
    }

    #[test]
    fn entities_decode() {
        assert_eq!(decode_entities("&lt;a&gt; &amp; &#39;b&#x27; &bogus; &"), "<a> & 'b' &bogus; &");
    }
}
