use crate::ast::{Inline, InlineKind, InlineSeq};
use crate::delimiter::TRIGGERS;
use crate::diagnostic::W_MATH_INLINE_TRUNCATED;
use crate::math::InlineMathParser;
use crate::parser::{ParseContext, unescape_backslash_punct};
use crate::reader::{LineReader, trim_line_end};
use crate::span::Span;

/// An inline construct dispatched on its first byte.
trait InlineParser {
    fn triggers(&self) -> &'static [u8];

    /// Parses at the cursor. Must not consume anything when it returns `None`.
    fn parse(&self, reader: &mut LineReader<'_>, context: &mut ParseContext) -> Option<Inline>;
}

/// Bytes the scan loop handles itself when no parser claims them: emphasis
/// runs and link brackets.
const STRUCTURAL: &[u8] = b"*_[]";

/// Inline parsers in priority order plus a lookup table of trigger bytes.
pub(crate) struct InlineParsers {
    parsers: Vec<Box<dyn InlineParser>>,
    triggers: [bool; 256],
}

impl InlineParsers {
    pub(crate) fn new() -> Self {
        // Math comes first: `\(` and `\[` are openers, not escapes, and no
        // byte inside a region reaches code spans, emphasis or links.
        let parsers: Vec<Box<dyn InlineParser>> = vec![
            Box::new(MathInlineParser(InlineMathParser::new())),
            Box::new(EscapeParser),
            Box::new(CodeSpanParser),
        ];
        let mut triggers = [false; 256];
        for parser in &parsers {
            for byte in parser.triggers() {
                triggers[*byte as usize] = true;
            }
        }
        for byte in STRUCTURAL {
            triggers[*byte as usize] = true;
        }
        Self { parsers, triggers }
    }

    pub(crate) fn parse(
        &self,
        mut reader: LineReader<'_>,
        context: &mut ParseContext,
    ) -> InlineSeq {
        let mut scan = InlineScan::default();
        'lines: while let Some((line, segment)) = reader.peek_line() {
            let body = trim_line_end(line);
            for (idx, byte) in body.bytes().enumerate() {
                if !self.triggers[byte as usize] {
                    continue;
                }
                scan.push_text(&body[..idx], segment.start);
                reader.advance(idx);
                match self.parse_at(&mut reader, byte, context) {
                    Some(inline) => scan.out.push(inline),
                    None => scan.structural(&mut reader, byte),
                }
                continue 'lines;
            }

            reader.advance_line();
            if reader.peek_line().is_none() {
                scan.push_text(body.trim_end(), segment.start);
                break;
            }
            let text = body.trim_end_matches([' ', '\t']);
            scan.push_text(text, segment.start);
            let span = Span {
                start: segment.start + text.len(),
                end: segment.end,
            };
            let kind = if body[text.len()..].starts_with("  ") {
                InlineKind::HardBreak
            } else {
                InlineKind::SoftBreak
            };
            scan.out.push(Inline { span, kind });
        }
        scan.finish()
    }

    fn parse_at(
        &self,
        reader: &mut LineReader<'_>,
        byte: u8,
        context: &mut ParseContext,
    ) -> Option<Inline> {
        let saved = reader.position();
        for parser in &self.parsers {
            if !parser.triggers().contains(&byte) {
                continue;
            }
            if let Some(inline) = parser.parse(reader, context) {
                return Some(inline);
            }
            debug_assert_eq!(reader.position(), saved, "inline parser consumed on a miss");
            reader.set_position(saved);
        }
        None
    }
}

/// A run of `*` or `_` that may open or close emphasis.
#[derive(Clone, Copy, Debug)]
struct EmphasisRun {
    ch: u8,
    len: usize,
    /// Index of the run's text node in the output.
    node: usize,
    can_open: bool,
    can_close: bool,
    /// Flanking on both sides, before any matching.
    both: bool,
}

#[derive(Clone, Copy, Debug)]
struct Bracket {
    node: usize,
    active: bool,
}

/// Output of one inline scan plus the delimiter and bracket stacks.
#[derive(Default)]
struct InlineScan {
    out: InlineSeq,
    runs: Vec<EmphasisRun>,
    brackets: Vec<Bracket>,
}

impl InlineScan {
    /// Pushes a text node. Adjacent text is merged once the scan finishes so
    /// delimiter nodes keep their own index until then.
    fn push_text(&mut self, text: &str, start: usize) {
        if text.is_empty() {
            return;
        }
        self.out.push(Inline {
            span: Span {
                start,
                end: start + text.len(),
            },
            kind: InlineKind::Text(text.to_string()),
        });
    }

    /// Handles a trigger byte that no inline parser took.
    fn structural(&mut self, reader: &mut LineReader<'_>, byte: u8) {
        let Some((rest, segment)) = reader.peek_line() else {
            return;
        };
        let rest = trim_line_end(rest);
        match byte {
            b'*' | b'_' => {
                let len = rest.bytes().take_while(|b| *b == byte).count();
                let before = reader.line_prefix().chars().next_back();
                let after = rest[len..].chars().next();
                let (can_open, can_close) = flanking(byte, before, after);
                self.push_text(&rest[..len], segment.start);
                if can_open || can_close {
                    self.runs.push(EmphasisRun {
                        ch: byte,
                        len,
                        node: self.out.len() - 1,
                        can_open,
                        can_close,
                        both: can_open && can_close,
                    });
                }
                reader.advance(len);
            }
            b'[' => {
                self.push_text("[", segment.start);
                self.brackets.push(Bracket {
                    node: self.out.len() - 1,
                    active: true,
                });
                reader.advance(1);
            }
            b']' => match self.close_link(rest, segment) {
                Some(link) => {
                    reader.advance(link.span.end - segment.start);
                    self.out.push(link);
                }
                None => {
                    self.push_text("]", segment.start);
                    reader.advance(1);
                }
            },
            _ => {
                // An unmatched `\(` `\)` `\[` `\]` stays literal as a pair, so
                // the bracket never opens a link.
                let bracket_escape = byte == b'\\'
                    && rest
                        .as_bytes()
                        .get(1)
                        .is_some_and(|next| b"()[]".contains(next));
                let len = if bracket_escape { 2 } else { 1 };
                // Triggers are ASCII, so these bytes are whole chars.
                self.push_text(&rest[..len], segment.start);
                reader.advance(len);
            }
        }
    }

    /// Closes the innermost bracket as an inline link when `rest` (starting at
    /// the `]`) continues with a destination.
    fn close_link(&mut self, rest: &str, segment: Span) -> Option<Inline> {
        let opener_pos = self.brackets.len().checked_sub(1)?;
        let opener = self.brackets[opener_pos];
        let tail = if opener.active && opener.node < self.out.len() {
            parse_link_tail(&rest[1..])
        } else {
            None
        };
        let Some((url, title, consumed)) = tail else {
            self.brackets.pop();
            return None;
        };

        let mut children = self.out.split_off(opener.node + 1);
        let start = self.out[opener.node].span.start;
        self.out.truncate(opener.node);

        let (mut inner, outer): (Vec<EmphasisRun>, Vec<EmphasisRun>) =
            std::mem::take(&mut self.runs)
                .into_iter()
                .partition(|run| run.node > opener.node);
        for run in &mut inner {
            run.node -= opener.node + 1;
        }
        self.runs = outer;
        process_emphasis(&mut children, &mut inner);

        // Links do not nest.
        for bracket in &mut self.brackets[..opener_pos] {
            bracket.active = false;
        }
        self.brackets.truncate(opener_pos);

        Some(Inline {
            span: Span {
                start,
                end: segment.start + 1 + consumed,
            },
            kind: InlineKind::Link {
                url,
                title,
                children,
            },
        })
    }

    fn finish(mut self) -> InlineSeq {
        process_emphasis(&mut self.out, &mut self.runs);
        merge_text(self.out)
    }
}

/// Whether a delimiter run can open and close emphasis, given the characters
/// around it. Line edges count as whitespace.
fn flanking(ch: u8, before: Option<char>, after: Option<char>) -> (bool, bool) {
    let before_space = before.is_none_or(char::is_whitespace);
    let after_space = after.is_none_or(char::is_whitespace);
    let before_punct = before.is_some_and(is_punctuation);
    let after_punct = after.is_some_and(is_punctuation);

    let left = !after_space && (!after_punct || before_space || before_punct);
    let right = !before_space && (!before_punct || after_space || after_punct);
    if ch == b'_' {
        (left && (!right || before_punct), right && (!left || after_punct))
    } else {
        (left, right)
    }
}

fn is_punctuation(ch: char) -> bool {
    !ch.is_whitespace() && !ch.is_alphanumeric()
}

fn process_emphasis(out: &mut InlineSeq, runs: &mut Vec<EmphasisRun>) {
    while let Some(closer_idx) = runs.iter().position(|run| run.can_close) {
        let closer = runs[closer_idx];
        let opener = (0..closer_idx).rev().find_map(|idx| {
            let opener = &runs[idx];
            if opener.ch != closer.ch || !opener.can_open {
                return None;
            }
            let width = if opener.len >= 2 && closer.len >= 2 { 2 } else { 1 };
            if multiple_of_three_blocked(opener, &closer) {
                return None;
            }
            Some((idx, width))
        });
        match opener {
            Some((opener_idx, width)) => apply_emphasis(out, runs, opener_idx, closer_idx, width),
            None => runs[closer_idx].can_close = false,
        }
    }
}

/// A run that can both open and close does not pair with one whose length
/// makes the sum a multiple of three, unless both are.
fn multiple_of_three_blocked(opener: &EmphasisRun, closer: &EmphasisRun) -> bool {
    if !opener.both && !closer.both {
        return false;
    }
    if (opener.len + closer.len) % 3 != 0 {
        return false;
    }
    opener.len % 3 != 0 || closer.len % 3 != 0
}

/// Wraps the nodes between two runs in an emphasis node, keeping any unused
/// delimiter characters as text, and re-indexes the remaining runs.
fn apply_emphasis(
    out: &mut InlineSeq,
    runs: &mut Vec<EmphasisRun>,
    opener_idx: usize,
    closer_idx: usize,
    width: usize,
) {
    let opener = runs[opener_idx];
    let closer = runs[closer_idx];
    if opener.node >= closer.node || closer.node >= out.len() {
        runs[closer_idx].can_close = false;
        return;
    }

    let removed: InlineSeq = out.drain(opener.node..=closer.node).collect();
    let removed_len = removed.len();
    let mut nodes = removed.into_iter();
    let (Some(open_node), Some(close_node)) = (nodes.next(), nodes.next_back()) else {
        runs.clear();
        return;
    };
    let children: InlineSeq = nodes.collect();

    let open_rest = opener.len - width;
    let close_rest = closer.len - width;
    let mut replacement = Vec::with_capacity(3);
    if open_rest > 0 {
        replacement.push(run_text(opener.ch, open_rest, open_node.span.start));
    }
    let span = Span {
        start: open_node.span.start + open_rest,
        end: close_node.span.end - close_rest,
    };
    let kind = if width == 2 {
        InlineKind::Strong(children)
    } else {
        InlineKind::Emph(children)
    };
    replacement.push(Inline { span, kind });
    if close_rest > 0 {
        replacement.push(run_text(
            closer.ch,
            close_rest,
            close_node.span.end - close_rest,
        ));
    }
    let added = replacement.len();
    out.splice(opener.node..opener.node, replacement);

    // Runs between the pair are dropped; runs after it shift.
    let mut next: Vec<EmphasisRun> = runs
        .iter()
        .copied()
        .filter(|run| run.node < opener.node)
        .collect();
    if open_rest > 0 {
        next.push(EmphasisRun {
            len: open_rest,
            ..opener
        });
    }
    if close_rest > 0 {
        next.push(EmphasisRun {
            len: close_rest,
            node: opener.node + added - 1,
            ..closer
        });
    }
    next.extend(
        runs.iter()
            .copied()
            .filter(|run| run.node > closer.node)
            .map(|run| EmphasisRun {
                node: run.node - removed_len + added,
                ..run
            }),
    );
    *runs = next;
}

fn run_text(ch: u8, len: usize, start: usize) -> Inline {
    Inline {
        span: Span {
            start,
            end: start + len,
        },
        kind: InlineKind::Text((ch as char).to_string().repeat(len)),
    }
}

/// Merges adjacent text nodes whose spans touch, recursing into containers.
fn merge_text(inlines: InlineSeq) -> InlineSeq {
    let mut out: InlineSeq = Vec::with_capacity(inlines.len());
    for mut inline in inlines {
        match &mut inline.kind {
            InlineKind::Emph(children)
            | InlineKind::Strong(children)
            | InlineKind::Link { children, .. } => {
                *children = merge_text(std::mem::take(children));
            }
            _ => {}
        }
        if let InlineKind::Text(text) = &inline.kind
            && let Some(Inline {
                span: last_span,
                kind: InlineKind::Text(last),
            }) = out.last_mut()
            && last_span.end == inline.span.start
        {
            last.push_str(text);
            last_span.end = inline.span.end;
            continue;
        }
        out.push(inline);
    }
    out
}

/// Parses `(destination "title")` right after a closing bracket. Returns the
/// destination, the title and the number of bytes consumed.
fn parse_link_tail(text: &str) -> Option<(String, Option<String>, usize)> {
    let bytes = text.as_bytes();
    if bytes.first() != Some(&b'(') {
        return None;
    }
    let mut idx = skip_spaces(bytes, 1);
    let (url, url_end) = if bytes.get(idx) == Some(&b'<') {
        let len = text[idx + 1..].find(['>', '<'])?;
        let close = idx + 1 + len;
        if bytes[close] != b'>' {
            return None;
        }
        (&text[idx + 1..close], close + 1)
    } else {
        let start = idx;
        let mut depth = 0usize;
        while let Some(&byte) = bytes.get(idx) {
            match byte {
                b'\\' if bytes.get(idx + 1).is_some_and(u8::is_ascii_punctuation) => idx += 2,
                b'(' => {
                    depth += 1;
                    idx += 1;
                }
                b')' if depth == 0 => break,
                b')' => {
                    depth -= 1;
                    idx += 1;
                }
                b' ' | b'\t' => break,
                _ if byte.is_ascii_control() => return None,
                _ => idx += 1,
            }
        }
        (&text[start..idx], idx)
    };

    idx = skip_spaces(bytes, url_end);
    let mut title = None;
    if idx > url_end
        && let Some(&quote) = bytes.get(idx)
        && matches!(quote, b'"' | b'\'')
    {
        let len = text[idx + 1..].find(quote as char)?;
        title = Some(unescape_backslash_punct(&text[idx + 1..idx + 1 + len]));
        idx = skip_spaces(bytes, idx + 2 + len);
    }
    if bytes.get(idx) != Some(&b')') {
        return None;
    }
    Some((unescape_backslash_punct(url), title, idx + 1))
}

fn skip_spaces(bytes: &[u8], mut idx: usize) -> usize {
    while bytes.get(idx).is_some_and(|b| *b == b' ' || *b == b'\t') {
        idx += 1;
    }
    idx
}

struct MathInlineParser(InlineMathParser);

impl InlineParser for MathInlineParser {
    fn triggers(&self) -> &'static [u8] {
        TRIGGERS
    }

    fn parse(&self, reader: &mut LineReader<'_>, context: &mut ParseContext) -> Option<Inline> {
        let scanned = self.0.parse(reader)?;
        if let Some(dropped) = scanned.dropped {
            context.warn(
                dropped,
                W_MATH_INLINE_TRUNCATED,
                "text after a math opener is not part of a region closed on the next line",
            );
        }
        Some(Inline {
            span: scanned.span,
            kind: InlineKind::Math(scanned.unit),
        })
    }
}

struct EscapeParser;

impl InlineParser for EscapeParser {
    fn triggers(&self) -> &'static [u8] {
        b"\\"
    }

    fn parse(&self, reader: &mut LineReader<'_>, _context: &mut ParseContext) -> Option<Inline> {
        let (line, segment) = reader.peek_line()?;
        let next = *line.as_bytes().get(1)?;
        // `\(` `\)` `\[` `\]` are math delimiters and stay literal when
        // they do not form a region.
        if next.is_ascii_punctuation() && !b"()[]".contains(&next) {
            reader.advance(2);
            return Some(Inline {
                span: Span {
                    start: segment.start,
                    end: segment.start + 2,
                },
                kind: InlineKind::Text((next as char).to_string()),
            });
        }
        if trim_line_end(line).len() == 1 {
            // A backslash at the end of a line is a hard break, unless the
            // line is the last one.
            let saved = reader.position();
            reader.advance_line();
            if reader.peek_line().is_none() {
                reader.set_position(saved);
                return None;
            }
            return Some(Inline {
                span: segment,
                kind: InlineKind::HardBreak,
            });
        }
        None
    }
}

struct CodeSpanParser;

impl InlineParser for CodeSpanParser {
    fn triggers(&self) -> &'static [u8] {
        b"`"
    }

    fn parse(&self, reader: &mut LineReader<'_>, _context: &mut ParseContext) -> Option<Inline> {
        let (line, segment) = reader.peek_line()?;
        let body = trim_line_end(line);
        let bytes = body.as_bytes();
        let run_len = count_run(bytes, 0, b'`');
        let mut i = run_len;
        while i < bytes.len() {
            if bytes[i] != b'`' {
                i += 1;
                continue;
            }
            let close_len = count_run(bytes, i, b'`');
            if close_len == run_len {
                let mut content = &body[run_len..i];
                if content.len() >= 2
                    && content.starts_with(' ')
                    && content.ends_with(' ')
                    && content.bytes().any(|b| b != b' ')
                {
                    content = &content[1..content.len() - 1];
                }
                reader.advance(i + run_len);
                return Some(Inline {
                    span: Span {
                        start: segment.start,
                        end: segment.start + i + run_len,
                    },
                    kind: InlineKind::CodeSpan(content.to_string()),
                });
            }
            i += close_len;
        }
        // An unmatched backtick run is literal text as a whole.
        reader.advance(run_len);
        Some(Inline {
            span: Span {
                start: segment.start,
                end: segment.start + run_len,
            },
            kind: InlineKind::Text(body[..run_len].to_string()),
        })
    }
}

fn count_run(bytes: &[u8], start: usize, needle: u8) -> usize {
    bytes[start..].iter().take_while(|b| **b == needle).count()
}

#[cfg(test)]
mod tests {
    use super::{flanking, parse_link_tail};
    use crate::ast::{BlockKind, InlineKind};
    use crate::diagnostic::W_MATH_INLINE_TRUNCATED;
    use crate::parser::parse;

    fn paragraph(source: &str) -> Vec<InlineKind> {
        let result = parse(source);
        let Some(BlockKind::Paragraph { content }) =
            result.document.blocks.first().map(|block| &block.kind)
        else {
            panic!("expected paragraph for {source:?}");
        };
        content.iter().map(|inline| inline.kind.clone()).collect()
    }

    fn text(value: &str) -> InlineKind {
        InlineKind::Text(value.to_string())
    }

    #[test]
    fn flanking_rules() {
        assert_eq!(flanking(b'*', None, Some('a')), (true, false));
        assert_eq!(flanking(b'*', Some('a'), None), (false, true));
        assert_eq!(flanking(b'*', Some('a'), Some('b')), (true, true));
        assert_eq!(flanking(b'_', Some('a'), Some('b')), (false, false));
        assert_eq!(flanking(b'*', Some(' '), Some(' ')), (false, false));
    }

    #[test]
    fn emphasis_markers_inside_math_stay_math() {
        let kinds = paragraph("$a_1 * b_2$ and *x* or __y__\n");
        let InlineKind::Math(unit) = &kinds[0] else {
            panic!("expected math, got {kinds:?}");
        };
        assert_eq!(unit.source(), "a_1 * b_2");
        assert_eq!(kinds[1], text(" and "));
        assert_eq!(kinds[2], InlineKind::Emph(vec![inline_text(17, "x")]));
        assert_eq!(kinds[3], text(" or "));
        assert_eq!(kinds[4], InlineKind::Strong(vec![inline_text(25, "y")]));
    }

    fn inline_text(start: usize, value: &str) -> crate::ast::Inline {
        crate::ast::Inline {
            span: crate::span::Span {
                start,
                end: start + value.len(),
            },
            kind: text(value),
        }
    }

    #[test]
    fn emphasis_wraps_math() {
        let kinds = paragraph("see *the $x$ value*\n");
        assert_eq!(kinds[0], text("see "));
        let InlineKind::Emph(children) = &kinds[1] else {
            panic!("expected emphasis, got {kinds:?}");
        };
        assert_eq!(children[0].kind, text("the "));
        assert!(matches!(children[1].kind, InlineKind::Math(_)));
        assert_eq!(children[2].kind, text(" value"));
    }

    #[test]
    fn unmatched_runs_stay_text() {
        assert_eq!(paragraph("a * b\n"), vec![text("a * b")]);
        assert_eq!(paragraph("snake_case_name\n"), vec![text("snake_case_name")]);
        assert_eq!(paragraph("**open\n"), vec![text("**open")]);
    }

    #[test]
    fn inline_links() {
        let kinds = paragraph("see [the *docs*](https://example.com \"Docs\") now\n");
        assert_eq!(kinds[0], text("see "));
        let InlineKind::Link {
            url,
            title,
            children,
        } = &kinds[1]
        else {
            panic!("expected link, got {kinds:?}");
        };
        assert_eq!(url, "https://example.com");
        assert_eq!(title.as_deref(), Some("Docs"));
        assert_eq!(children[0].kind, text("the "));
        assert!(matches!(children[1].kind, InlineKind::Emph(_)));
        assert_eq!(kinds[2], text(" now"));
    }

    #[test]
    fn link_text_may_hold_math() {
        let kinds = paragraph("[area $\\pi r^2$](#area)\n");
        let InlineKind::Link { url, children, .. } = &kinds[0] else {
            panic!("expected link, got {kinds:?}");
        };
        assert_eq!(url, "#area");
        assert!(matches!(children[1].kind, InlineKind::Math(_)));
    }

    #[test]
    fn brackets_without_destination_are_text() {
        assert_eq!(paragraph("[a] and [b](\n"), vec![text("[a] and [b](")]);
        assert_eq!(paragraph("\\[x](y)\n"), vec![text("\\[x](y)")]);
    }

    #[test]
    fn link_tail_forms() {
        assert_eq!(
            parse_link_tail("(<a b>)"),
            Some(("a b".to_string(), None, 7))
        );
        assert_eq!(
            parse_link_tail("(f(x) 'T')"),
            Some(("f(x)".to_string(), Some("T".to_string()), 10))
        );
        assert_eq!(parse_link_tail("(a b)"), None);
        assert_eq!(parse_link_tail("x"), None);
    }

    #[test]
    fn two_line_inline_math_reports_dropped_text() {
        let result = parse("see $a +\nb$ tail\n");
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].code, W_MATH_INLINE_TRUNCATED);
        assert_eq!(result.diagnostics[0].range.start.character, 5);
        assert_eq!(result.diagnostics[0].range.end.character, 8);

        let quiet = parse("see $\nb$ tail\n");
        assert!(quiet.diagnostics.is_empty());
    }
}
