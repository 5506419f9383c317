use crate::span::Span;

/// Opaque cursor into a [`LineReader`]: a line index plus a byte offset
/// within that line.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ReaderPosition {
    line: usize,
    offset: usize,
}

/// Line-oriented view over a source buffer.
///
/// Lines are stored as spans into the source and keep their line terminator,
/// so the text of a line may end with `\n` or `\r\n`. The reader never copies
/// the source; every `&str` it hands out borrows from the original buffer.
#[derive(Clone, Debug)]
pub struct LineReader<'a> {
    source: &'a str,
    lines: Vec<Span>,
    line: usize,
    offset: usize,
}

impl<'a> LineReader<'a> {
    /// Reader over every line of `source`.
    pub fn new(source: &'a str) -> Self {
        Self::from_lines(source, split_lines(source))
    }

    /// Reader over an explicit list of line spans, e.g. the lines of one
    /// paragraph. Spans must lie on char boundaries of `source`.
    pub fn from_lines(source: &'a str, lines: Vec<Span>) -> Self {
        Self {
            source,
            lines,
            line: 0,
            offset: 0,
        }
    }

    /// Unconsumed remainder of the current line and its span, or `None` at
    /// the end of the input.
    pub fn peek_line(&self) -> Option<(&'a str, Span)> {
        let line = self.lines.get(self.line)?;
        let segment = line.shrink_front(self.offset);
        Some((&self.source[segment.start..segment.end], segment))
    }

    /// Moves to the start of the next line.
    pub fn advance_line(&mut self) {
        if self.line < self.lines.len() {
            self.line += 1;
        }
        self.offset = 0;
    }

    /// Consumes `n` bytes of the current line, stopping at the line end.
    pub fn advance(&mut self, n: usize) {
        if let Some(line) = self.lines.get(self.line) {
            self.offset = (self.offset + n).min(line.len());
        }
    }

    pub fn position(&self) -> ReaderPosition {
        ReaderPosition {
            line: self.line,
            offset: self.offset,
        }
    }

    /// Restores a position previously returned by [`LineReader::position`].
    ///
    /// # Panics
    ///
    /// Panics if the position does not belong to this reader. A saved
    /// position can always be restored, so a failure here is a bug in the
    /// caller rather than a property of the input.
    pub fn set_position(&mut self, position: ReaderPosition) {
        let valid = match self.lines.get(position.line) {
            Some(line) => position.offset <= line.len(),
            None => position.line == self.lines.len() && position.offset == 0,
        };
        assert!(valid, "reader position {position:?} is out of range");
        self.line = position.line;
        self.offset = position.offset;
    }

    /// Already consumed part of the current line.
    pub fn line_prefix(&self) -> &'a str {
        match self.lines.get(self.line) {
            Some(line) => &self.source[line.start..line.start + self.offset],
            None => "",
        }
    }

    /// Absolute byte offset of the cursor in the source.
    pub fn source_offset(&self) -> usize {
        match self.lines.get(self.line) {
            Some(line) => line.start + self.offset,
            None => self.lines.last().map_or(0, |line| line.end),
        }
    }

    /// Text of an arbitrary span of the source.
    pub fn value(&self, span: Span) -> &'a str {
        &self.source[span.start..span.end]
    }

    pub fn source(&self) -> &'a str {
        self.source
    }
}

/// Splits `source` into line spans that include their terminator.
pub fn split_lines(source: &str) -> Vec<Span> {
    let mut lines = Vec::new();
    let mut start = 0;
    for (idx, byte) in source.bytes().enumerate() {
        if byte == b'\n' {
            lines.push(Span {
                start,
                end: idx + 1,
            });
            start = idx + 1;
        }
    }
    if start < source.len() {
        lines.push(Span {
            start,
            end: source.len(),
        });
    }
    lines
}

/// Strips a trailing `\n` or `\r\n`.
pub(crate) fn trim_line_end(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

pub(crate) fn is_blank(line: &str) -> bool {
    line.bytes().all(|b| b.is_ascii_whitespace())
}

#[cfg(test)]
mod tests {
    use super::{LineReader, split_lines};
    use crate::span::Span;

    #[test]
    fn lines_keep_terminators() {
        assert_eq!(
            split_lines("a\nbc\n\nd"),
            vec![
                Span { start: 0, end: 2 },
                Span { start: 2, end: 5 },
                Span { start: 5, end: 6 },
                Span { start: 6, end: 7 },
            ]
        );
        assert!(split_lines("").is_empty());
        assert_eq!(split_lines("x\n").len(), 1);
    }

    #[test]
    fn advance_is_clamped_to_line() {
        let mut reader = LineReader::new("abc\ndef\n");
        reader.advance(2);
        assert_eq!(reader.peek_line().map(|(text, _)| text), Some("c\n"));
        reader.advance(10);
        assert_eq!(reader.peek_line().map(|(text, _)| text), Some(""));
        reader.advance_line();
        assert_eq!(reader.peek_line().map(|(text, _)| text), Some("def\n"));
        assert_eq!(reader.source_offset(), 4);
        reader.advance_line();
        assert!(reader.peek_line().is_none());
        assert_eq!(reader.source_offset(), 8);
    }

    #[test]
    fn position_round_trips() {
        let mut reader = LineReader::new("one\ntwo\nthree\n");
        reader.advance(1);
        let saved = reader.position();
        reader.advance_line();
        reader.advance_line();
        reader.advance(3);
        reader.set_position(saved);
        assert_eq!(reader.position(), saved);
        assert_eq!(reader.peek_line().map(|(text, _)| text), Some("ne\n"));
    }

    #[test]
    fn eof_position_is_restorable() {
        let mut reader = LineReader::new("a\n");
        reader.advance_line();
        let end = reader.position();
        let mut other = LineReader::new("a\n");
        other.set_position(end);
        assert!(other.peek_line().is_none());
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn foreign_position_panics() {
        let mut long = LineReader::new("a\nb\nc\n");
        long.advance_line();
        long.advance_line();
        let position = long.position();
        let mut short = LineReader::new("a\n");
        short.set_position(position);
    }

    #[test]
    fn line_prefix_tracks_consumed_bytes() {
        let mut reader = LineReader::new("ab*c\nd\n");
        assert_eq!(reader.line_prefix(), "");
        reader.advance(2);
        assert_eq!(reader.line_prefix(), "ab");
        reader.advance_line();
        assert_eq!(reader.line_prefix(), "");
        reader.advance_line();
        assert_eq!(reader.line_prefix(), "");
    }

    #[test]
    fn value_extracts_ranges() {
        let reader = LineReader::new("hello world");
        assert_eq!(reader.value(Span { start: 6, end: 11 }), "world");
    }
}
