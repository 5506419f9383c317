use crate::span::Span;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Position {
    pub line: usize,
    /// Character (not byte) offset from the start of the line.
    pub character: usize,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

/// Maps byte offsets of one source text to line/character positions.
#[derive(Clone, Debug)]
pub struct SourceMap {
    source: String,
    line_starts: Vec<usize>,
}

impl SourceMap {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (idx, byte) in source.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(idx + 1);
            }
        }
        Self {
            source: source.to_string(),
            line_starts,
        }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    pub fn position(&self, offset: usize) -> Position {
        let offset = offset.min(self.source.len());
        let line = match self.line_starts.binary_search(&offset) {
            Ok(index) => index,
            Err(index) => index.saturating_sub(1),
        };
        let line_start = self.line_starts[line];
        let character = match self.source.get(line_start..offset) {
            Some(prefix) => prefix.chars().count(),
            None => offset - line_start,
        };
        Position { line, character }
    }

    pub fn range(&self, span: Span) -> Range {
        Range {
            start: self.position(span.start),
            end: self.position(span.end),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Position, SourceMap};
    use crate::span::Span;

    #[test]
    fn positions_are_line_based() {
        let source = "a\nb\n";
        let map = SourceMap::new(source);

        assert_eq!(map.line_count(), 3);
        assert_eq!(
            map.position(2),
            Position {
                line: 1,
                character: 0
            }
        );
        assert_eq!(
            map.position(4),
            Position {
                line: 2,
                character: 0
            }
        );

        let range = map.range(Span { start: 0, end: 3 });
        assert_eq!(range.start.line, 0);
        assert_eq!(range.end.line, 1);
    }

    #[test]
    fn characters_count_code_points() {
        let map = SourceMap::new("é $x$\n");
        // `é` is two bytes, so the `$` at byte 3 is character 2.
        assert_eq!(
            map.position(3),
            Position {
                line: 0,
                character: 2
            }
        );
    }
}
