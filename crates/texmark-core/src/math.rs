use tracing::{debug, trace};

use crate::delimiter::{Delimiter, Flavor, classify};
use crate::reader::{LineReader, is_blank, trim_line_end};
use crate::span::Span;

/// Extracted TeX source of one math region and its flavor.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct MathUnit {
    source: String,
    flavor: Flavor,
}

impl MathUnit {
    pub fn new(source: impl Into<String>, flavor: Flavor) -> Self {
        debug_assert!(flavor.is_valid(), "ambiguous flavor {flavor:?}");
        Self {
            source: source.into(),
            flavor,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn flavor(&self) -> Flavor {
        self.flavor
    }
}

/// A math unit together with the span of the full delimited region.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ScannedMath {
    pub unit: MathUnit,
    pub span: Span,
    /// Text inside the region that is not part of the unit's source: the
    /// rest of the opening line of a region closed on the following line.
    pub dropped: Option<Span>,
}

/// Recognizes a math region that starts at the reader's cursor and closes on
/// the same line or on the line after it.
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineMathParser;

impl InlineMathParser {
    pub fn new() -> Self {
        Self
    }

    /// Scans one region. On a miss the reader position is left untouched.
    pub fn parse(&self, reader: &mut LineReader<'_>) -> Option<ScannedMath> {
        let (line, segment) = reader.peek_line()?;
        let delimiter = classify(line)?;
        let body = &line[delimiter.begin.len()..];

        if let Some(stop) = body.find(delimiter.end) {
            reader.advance(delimiter.begin.len() + stop + delimiter.end.len());
            let span = Span {
                start: segment.start,
                end: reader.source_offset(),
            };
            trace!(?span, flavor = ?delimiter.flavor, "inline math");
            return Some(ScannedMath {
                unit: MathUnit::new(&body[..stop], delimiter.flavor),
                span,
                dropped: None,
            });
        }

        // One line of lookahead, committed only if the closer is there.
        let saved = reader.position();
        reader.advance_line();
        let found = reader
            .peek_line()
            .and_then(|(next, _)| next.find(delimiter.end).map(|stop| (next, stop)));
        let Some((next, stop)) = found else {
            reader.set_position(saved);
            return None;
        };
        reader.advance(stop + delimiter.end.len());
        let span = Span {
            start: segment.start,
            end: reader.source_offset(),
        };
        let rest = trim_line_end(body).trim_end();
        let dropped = (!rest.trim_start().is_empty()).then(|| {
            let start = segment.start + delimiter.begin.len();
            Span {
                start,
                end: start + rest.len(),
            }
        });
        trace!(?span, flavor = ?delimiter.flavor, "inline math across lines");
        Some(ScannedMath {
            unit: MathUnit::new(&next[..stop], delimiter.flavor),
            span,
            dropped,
        })
    }
}

/// Opens multi-line math regions once a closing delimiter is known to exist.
#[derive(Clone, Copy, Debug, Default)]
pub struct BlockMathParser;

/// Outcome of feeding one line to an open [`MathBlockState`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MathBlockStep {
    /// The line was accumulated; the reader is at the start of the next line.
    Continue,
    /// The closer was consumed; the reader is right after it.
    Close,
}

/// Why an opener did not start a block region.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OpenMiss {
    /// The line does not start with an opener.
    NotAnOpener,
    /// The closer is on the same line, which makes it inline math.
    ClosedOnSameLine,
    /// No later line confirms the close.
    Unconfirmed(Flavor),
}

impl BlockMathParser {
    pub fn new() -> Self {
        Self
    }

    /// Tries to open a block region at the cursor.
    ///
    /// Nothing is consumed unless the region is opened. On success the
    /// opener is consumed, the rest of its line seeds the accumulator and
    /// the reader moves to the next line.
    pub fn open(&self, reader: &mut LineReader<'_>) -> Result<MathBlockState, OpenMiss> {
        let (line, segment) = reader.peek_line().ok_or(OpenMiss::NotAnOpener)?;
        let delimiter = classify(line).ok_or(OpenMiss::NotAnOpener)?;
        if line[delimiter.begin.len()..].contains(delimiter.end) {
            return Err(OpenMiss::ClosedOnSameLine);
        }
        if !confirm_close(reader, delimiter) {
            debug!(
                offset = segment.start,
                opener = delimiter.begin,
                "math opener without a closing line"
            );
            return Err(OpenMiss::Unconfirmed(delimiter.flavor));
        }

        let seed = segment.shrink_front(delimiter.begin.len());
        reader.advance_line();
        debug!(offset = segment.start, flavor = ?delimiter.flavor, "math block opened");
        Ok(MathBlockState {
            flavor: delimiter.flavor,
            closer: delimiter.end,
            segments: vec![seed],
            span: segment,
        })
    }
}

/// Walks forward from the line after the cursor looking for a line that
/// contains the closer exactly once. The walk aborts at a blank line, at a
/// line with two or more closers, at a line that holds the opener again (for
/// delimiters whose opener differs from the closer) and at the end of input.
/// The reader position is always restored.
///
/// Every line that can start a region of the same delimiter stops the walk,
/// so walks from successive openers never overlap.
fn confirm_close(reader: &mut LineReader<'_>, delimiter: &Delimiter) -> bool {
    let saved = reader.position();
    let confirmed = loop {
        reader.advance_line();
        let Some((line, _)) = reader.peek_line() else {
            break false;
        };
        if is_blank(line) || (delimiter.begin != delimiter.end && line.contains(delimiter.begin)) {
            break false;
        }
        match line.matches(delimiter.end).count() {
            0 => continue,
            1 => break true,
            _ => break false,
        }
    };
    reader.set_position(saved);
    confirmed
}

/// Accumulator of an open block region. Owns the flavor fixed at open time
/// and the line segments collected so far.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MathBlockState {
    flavor: Flavor,
    closer: &'static str,
    segments: Vec<Span>,
    span: Span,
}

impl MathBlockState {
    pub fn flavor(&self) -> Flavor {
        self.flavor
    }

    /// Feeds the current line to the region.
    pub fn proceed(&mut self, reader: &mut LineReader<'_>) -> MathBlockStep {
        let Some((line, segment)) = reader.peek_line() else {
            return MathBlockStep::Close;
        };
        if let Some(stop) = line.find(self.closer) {
            self.segments.push(Span {
                start: segment.start,
                end: segment.start + stop,
            });
            reader.advance(stop + self.closer.len());
            self.span.end = reader.source_offset();
            return MathBlockStep::Close;
        }
        self.segments.push(segment);
        self.span.end = segment.end;
        reader.advance_line();
        MathBlockStep::Continue
    }

    /// Materializes the accumulated segments into one unit. Segments are
    /// joined in order; only the whitespace at the region's edges (the rest
    /// of the opening line, the line break before the closer) is trimmed.
    pub fn close(self, reader: &LineReader<'_>) -> ScannedMath {
        let mut source = String::new();
        for segment in &self.segments {
            source.push_str(reader.value(*segment));
        }
        ScannedMath {
            unit: MathUnit::new(source.trim(), self.flavor),
            span: self.span,
            dropped: None,
        }
    }
}
