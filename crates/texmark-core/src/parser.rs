use tracing::debug;

use crate::ast::{Block, BlockKind, CodeBlock, Document, InlineSeq, List, ListItem};
use crate::delimiter::{TRIGGERS, classify};
use crate::diagnostic::{Diagnostic, DiagnosticSeverity, W_MATH_UNCLOSED};
use crate::inline::InlineParsers;
use crate::math::{BlockMathParser, MathBlockState, MathBlockStep, OpenMiss};
use crate::reader::{LineReader, is_blank, trim_line_end};
use crate::source_map::SourceMap;
use crate::span::Span;

#[derive(Debug)]
pub struct ParseResult {
    pub document: Document,
    pub diagnostics: Vec<Diagnostic>,
    pub source_map: SourceMap,
}

/// Parses a markdown document with TeX math regions.
///
/// Parsing never fails: text that does not form a construct is kept as
/// paragraph text.
pub fn parse(source: &str) -> ParseResult {
    let mut parser = Parser::new(source);
    let blocks = parser.parse_blocks(&mut LineReader::new(source));
    let document = Document {
        span: Span {
            start: 0,
            end: source.len(),
        },
        blocks,
    };
    let ParseContext {
        mut diagnostics,
        source_map,
    } = parser.context;
    // List items are parsed when the list closes, after later siblings warned.
    diagnostics.sort_by_key(|diag| (diag.range.start.line, diag.range.start.character));
    debug!(
        blocks = document.blocks.len(),
        diagnostics = diagnostics.len(),
        "parsed document"
    );
    ParseResult {
        document,
        diagnostics,
        source_map,
    }
}

/// State shared by block and inline parsers during one parse.
pub(crate) struct ParseContext {
    diagnostics: Vec<Diagnostic>,
    source_map: SourceMap,
}

impl ParseContext {
    pub(crate) fn warn(&mut self, span: Span, code: &'static str, message: &str) {
        let range = self.source_map.range(span);
        self.diagnostics.push(Diagnostic::new(
            range,
            DiagnosticSeverity::Warning,
            code,
            message,
        ));
    }
}

struct Parser {
    block_parsers: Vec<Box<dyn BlockParser>>,
    inline_parsers: InlineParsers,
    context: ParseContext,
}

/// What an open block did with the current line.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum BlockState {
    /// The line belongs to the block; the reader is on the next line.
    Continue,
    /// The block ended inside the line; the reader is after its last byte.
    Close,
    /// The line does not belong to the block and was not consumed.
    Reject,
}

/// A block construct tried at the start of a line.
trait BlockParser {
    /// Bytes, after up to three spaces of indentation, that may start the
    /// construct.
    fn triggers(&self) -> &'static [u8];

    /// Whether `line` (without its indentation) may end an open paragraph by
    /// starting this construct.
    fn can_interrupt_paragraph(&self, line: &str) -> bool;

    /// Whether the construct may start after four or more columns of
    /// indentation.
    fn can_accept_indented_line(&self) -> bool {
        false
    }

    /// Opens the construct at the cursor. Must not consume anything when it
    /// returns `None`.
    fn open(
        &self,
        reader: &mut LineReader<'_>,
        context: &mut ParseContext,
    ) -> Option<Box<dyn OpenBlock>>;
}

trait OpenBlock {
    fn proceed(&mut self, reader: &mut LineReader<'_>) -> BlockState;

    /// Builds the block. Containers parse their collected lines here.
    fn close(self: Box<Self>, reader: &LineReader<'_>, parser: &mut Parser) -> Block;

    /// Whether interrupting block parsers are tried before `proceed`.
    fn interruptible(&self) -> bool {
        false
    }
}

impl Parser {
    fn new(source: &str) -> Self {
        // Priority order: earlier parsers win on the same line.
        let block_parsers: Vec<Box<dyn BlockParser>> = vec![
            Box::new(FencedCodeParser),
            Box::new(MathBlockParser(BlockMathParser::new())),
            Box::new(AtxHeadingParser),
            Box::new(ThematicBreakParser),
            Box::new(ListParser),
        ];
        Self {
            block_parsers,
            inline_parsers: InlineParsers::new(),
            context: ParseContext {
                diagnostics: Vec::new(),
                source_map: SourceMap::new(source),
            },
        }
    }

    fn parse_blocks(&mut self, reader: &mut LineReader<'_>) -> Vec<Block> {
        let mut blocks = Vec::new();
        let mut open: Option<Box<dyn OpenBlock>> = None;

        while let Some((line, _)) = reader.peek_line() {
            if let Some(mut current) = open.take() {
                if current.interruptible()
                    && let Some(next) = self.try_open(reader, true)
                {
                    blocks.push(current.close(reader, self));
                    open = Some(next);
                    continue;
                }
                match current.proceed(reader) {
                    BlockState::Continue => {
                        open = Some(current);
                        continue;
                    }
                    BlockState::Close => {
                        blocks.push(current.close(reader, self));
                        skip_blank_rest(reader);
                        continue;
                    }
                    BlockState::Reject => {
                        blocks.push(current.close(reader, self));
                    }
                }
            }

            if is_blank(line) {
                reader.advance_line();
                continue;
            }
            open = Some(match self.try_open(reader, false) {
                Some(block) => block,
                None => Paragraph::open(reader),
            });
        }

        if let Some(current) = open {
            blocks.push(current.close(reader, self));
        }
        blocks
    }

    fn try_open(
        &mut self,
        reader: &mut LineReader<'_>,
        interrupting: bool,
    ) -> Option<Box<dyn OpenBlock>> {
        let (line, _) = reader.peek_line()?;
        let (indent, columns) = leading_indent(line);
        let rest = trim_line_end(&line[indent..]);
        let first = *rest.as_bytes().first()?;
        let saved = reader.position();
        reader.advance(indent);
        for parser in &self.block_parsers {
            if interrupting && !parser.can_interrupt_paragraph(rest) {
                continue;
            }
            if columns > 3 && !parser.can_accept_indented_line() {
                continue;
            }
            if !parser.triggers().contains(&first) {
                continue;
            }
            if let Some(block) = parser.open(reader, &mut self.context) {
                return Some(block);
            }
        }
        reader.set_position(saved);
        None
    }

    fn parse_inlines(&mut self, reader: LineReader<'_>) -> InlineSeq {
        self.inline_parsers.parse(reader, &mut self.context)
    }
}

fn skip_blank_rest(reader: &mut LineReader<'_>) {
    if let Some((rest, _)) = reader.peek_line()
        && is_blank(rest)
    {
        reader.advance_line();
    }
}

/// Byte length and column width of the leading spaces and tabs.
fn leading_indent(text: &str) -> (usize, usize) {
    leading_indent_from(text, 0)
}

/// Like [`leading_indent`] for text that starts at `column`; returns the byte
/// length and the column the whitespace ends at.
fn leading_indent_from(text: &str, column: usize) -> (usize, usize) {
    let bytes = text.as_bytes();
    let mut columns = column;
    for (idx, byte) in bytes.iter().enumerate() {
        match advance_column(columns, *byte) {
            Some(next) => columns = next,
            None => return (idx, columns),
        }
    }
    (bytes.len(), columns)
}

fn advance_column(columns: usize, byte: u8) -> Option<usize> {
    match byte {
        b' ' => Some(columns + 1),
        b'\t' => Some(columns + (4 - (columns % 4))),
        _ => None,
    }
}

/// Bytes of indentation covering at least `required` columns, or `None` when
/// the line is indented less.
fn indent_prefix_len(text: &str, required: usize) -> Option<usize> {
    if required == 0 {
        return Some(0);
    }
    let mut columns = 0;
    for (idx, byte) in text.bytes().enumerate() {
        columns = advance_column(columns, byte)?;
        if columns >= required {
            return Some(idx + 1);
        }
    }
    None
}

fn is_space_or_tab(byte: u8) -> bool {
    byte == b' ' || byte == b'\t'
}

/// Span of `segment` without its line terminator.
fn content_span(reader: &LineReader<'_>, segment: Span) -> Span {
    let text = trim_line_end(reader.value(segment));
    Span {
        start: segment.start,
        end: segment.start + text.len(),
    }
}

/// Whether a line (without its indentation) would start a block other than a
/// paragraph. Such lines never continue a paragraph lazily.
fn starts_block(text: &str) -> bool {
    is_thematic_break_line(text)
        || parse_atx_heading(text).is_some()
        || parse_fence_open(text).is_some()
        || parse_list_marker(text, 0).is_some()
        || classify(text).is_some_and(|delimiter| {
            delimiter.flavor.is_display() && !text[delimiter.begin.len()..].contains(delimiter.end)
        })
}

struct Paragraph {
    lines: Vec<Span>,
}

impl Paragraph {
    fn open(reader: &mut LineReader<'_>) -> Box<dyn OpenBlock> {
        let mut paragraph = Paragraph { lines: Vec::new() };
        paragraph.push_line(reader);
        Box::new(paragraph)
    }

    fn push_line(&mut self, reader: &mut LineReader<'_>) {
        if let Some((line, segment)) = reader.peek_line() {
            let indent = line.bytes().take_while(|b| is_space_or_tab(*b)).count();
            self.lines.push(segment.shrink_front(indent));
        }
        reader.advance_line();
    }
}

impl OpenBlock for Paragraph {
    fn proceed(&mut self, reader: &mut LineReader<'_>) -> BlockState {
        match reader.peek_line() {
            Some((line, _)) if !is_blank(line) => {
                self.push_line(reader);
                BlockState::Continue
            }
            _ => BlockState::Reject,
        }
    }

    fn close(self: Box<Self>, reader: &LineReader<'_>, parser: &mut Parser) -> Block {
        let start = self.lines.first().map_or(0, |line| line.start);
        let end = self
            .lines
            .last()
            .map_or(start, |line| content_span(reader, *line).end);
        let content = parser.parse_inlines(LineReader::from_lines(reader.source(), self.lines));
        Block {
            span: Span { start, end },
            kind: BlockKind::Paragraph { content },
        }
    }

    fn interruptible(&self) -> bool {
        true
    }
}

struct MathBlockParser(BlockMathParser);

struct MathBlock(MathBlockState);

impl BlockParser for MathBlockParser {
    fn triggers(&self) -> &'static [u8] {
        TRIGGERS
    }

    fn can_interrupt_paragraph(&self, _line: &str) -> bool {
        true
    }

    fn can_accept_indented_line(&self) -> bool {
        true
    }

    fn open(
        &self,
        reader: &mut LineReader<'_>,
        context: &mut ParseContext,
    ) -> Option<Box<dyn OpenBlock>> {
        let start = reader.source_offset();
        match self.0.open(reader) {
            Ok(state) => Some(Box::new(MathBlock(state))),
            Err(OpenMiss::Unconfirmed(flavor)) if flavor.is_display() => {
                context.warn(
                    Span {
                        start,
                        end: start + 1,
                    },
                    W_MATH_UNCLOSED,
                    "display math opener has no closing delimiter; kept as text",
                );
                None
            }
            Err(_) => None,
        }
    }
}

impl OpenBlock for MathBlock {
    fn proceed(&mut self, reader: &mut LineReader<'_>) -> BlockState {
        match self.0.proceed(reader) {
            MathBlockStep::Continue => BlockState::Continue,
            MathBlockStep::Close => BlockState::Close,
        }
    }

    fn close(self: Box<Self>, reader: &LineReader<'_>, _parser: &mut Parser) -> Block {
        let scanned = self.0.close(reader);
        Block {
            span: scanned.span,
            kind: BlockKind::MathBlock(scanned.unit),
        }
    }
}

struct FencedCodeParser;

struct FencedCode {
    fence_char: u8,
    fence_len: usize,
    lang: Option<String>,
    lines: Vec<Span>,
    span: Span,
}

impl BlockParser for FencedCodeParser {
    fn triggers(&self) -> &'static [u8] {
        b"`~"
    }

    fn can_interrupt_paragraph(&self, _line: &str) -> bool {
        true
    }

    fn open(
        &self,
        reader: &mut LineReader<'_>,
        _context: &mut ParseContext,
    ) -> Option<Box<dyn OpenBlock>> {
        let (line, segment) = reader.peek_line()?;
        let (fence_len, fence_char, info) = parse_fence_open(trim_line_end(line))?;
        let lang = info
            .split_whitespace()
            .next()
            .map(unescape_backslash_punct);
        let span = content_span(reader, segment);
        reader.advance_line();
        Some(Box::new(FencedCode {
            fence_char,
            fence_len,
            lang,
            lines: Vec::new(),
            span,
        }))
    }
}

impl OpenBlock for FencedCode {
    fn proceed(&mut self, reader: &mut LineReader<'_>) -> BlockState {
        let Some((line, segment)) = reader.peek_line() else {
            return BlockState::Reject;
        };
        if is_fence_close(trim_line_end(line), self.fence_len, self.fence_char) {
            self.span.end = content_span(reader, segment).end;
            reader.advance(line.len());
            return BlockState::Close;
        }
        self.lines.push(segment);
        self.span.end = content_span(reader, segment).end;
        reader.advance_line();
        BlockState::Continue
    }

    fn close(self: Box<Self>, reader: &LineReader<'_>, _parser: &mut Parser) -> Block {
        let mut text = String::new();
        for line in &self.lines {
            text.push_str(reader.value(*line));
        }
        Block {
            span: self.span,
            kind: BlockKind::CodeBlock(CodeBlock {
                lang: self.lang,
                text,
            }),
        }
    }
}

/// Returns (fence_len, fence_char, info) for an opening code fence.
fn parse_fence_open(text: &str) -> Option<(usize, u8, &str)> {
    let fence_char = if text.starts_with("```") {
        b'`'
    } else if text.starts_with("~~~") {
        b'~'
    } else {
        return None;
    };
    let fence_len = text
        .as_bytes()
        .iter()
        .take_while(|b| **b == fence_char)
        .count();
    let info = text[fence_len..].trim_matches(|ch| ch == ' ' || ch == '\t');
    if fence_char == b'`' && info.contains('`') {
        return None;
    }
    Some((fence_len, fence_char, info))
}

fn is_fence_close(text: &str, fence_len: usize, fence_char: u8) -> bool {
    let bytes = text.as_bytes();
    let mut idx = 0;
    while idx < bytes.len() && idx < 3 && bytes[idx] == b' ' {
        idx += 1;
    }
    let rest = &bytes[idx..];
    let count = rest.iter().take_while(|b| **b == fence_char).count();
    count >= fence_len && rest[count..].iter().all(|b| is_space_or_tab(*b))
}

pub(crate) fn unescape_backslash_punct(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\\'
            && let Some(next) = chars.peek().copied()
            && next.is_ascii_punctuation()
        {
            out.push(next);
            chars.next();
            continue;
        }
        out.push(ch);
    }
    out
}

struct AtxHeadingParser;

/// Single-line block; rejects every following line.
struct AtxHeading {
    level: u8,
    title: Span,
    span: Span,
}

impl BlockParser for AtxHeadingParser {
    fn triggers(&self) -> &'static [u8] {
        b"#"
    }

    fn can_interrupt_paragraph(&self, _line: &str) -> bool {
        true
    }

    fn open(
        &self,
        reader: &mut LineReader<'_>,
        _context: &mut ParseContext,
    ) -> Option<Box<dyn OpenBlock>> {
        let (line, segment) = reader.peek_line()?;
        let (level, content_start, content_end) = parse_atx_heading(trim_line_end(line))?;
        let heading = AtxHeading {
            level,
            title: Span {
                start: segment.start + content_start,
                end: segment.start + content_end,
            },
            span: content_span(reader, segment),
        };
        reader.advance_line();
        Some(Box::new(heading))
    }
}

impl OpenBlock for AtxHeading {
    fn proceed(&mut self, _reader: &mut LineReader<'_>) -> BlockState {
        BlockState::Reject
    }

    fn close(self: Box<Self>, reader: &LineReader<'_>, parser: &mut Parser) -> Block {
        let title = if self.title.is_empty() {
            Vec::new()
        } else {
            parser.parse_inlines(LineReader::from_lines(reader.source(), vec![self.title]))
        };
        Block {
            span: self.span,
            kind: BlockKind::Heading {
                level: self.level,
                title,
            },
        }
    }
}

/// Returns (level, content_start, content_end) of an ATX heading line.
fn parse_atx_heading(text: &str) -> Option<(u8, usize, usize)> {
    let bytes = text.as_bytes();
    let level = bytes.iter().take_while(|b| **b == b'#').count();
    if level == 0 || level > 6 {
        return None;
    }
    if level < bytes.len() && !is_space_or_tab(bytes[level]) {
        return None;
    }
    let mut content_start = level;
    while content_start < bytes.len() && is_space_or_tab(bytes[content_start]) {
        content_start += 1;
    }
    let mut content_end = bytes.len();
    while content_end > content_start && is_space_or_tab(bytes[content_end - 1]) {
        content_end -= 1;
    }
    // Optional closing sequence: a run of `#` preceded by a space.
    let mut hash_start = content_end;
    while hash_start > content_start && bytes[hash_start - 1] == b'#' {
        hash_start -= 1;
    }
    if hash_start < content_end
        && (hash_start == content_start || is_space_or_tab(bytes[hash_start - 1]))
    {
        content_end = hash_start;
        while content_end > content_start && is_space_or_tab(bytes[content_end - 1]) {
            content_end -= 1;
        }
    }
    Some((level as u8, content_start, content_end))
}

struct ThematicBreakParser;

struct ThematicBreak {
    span: Span,
}

impl BlockParser for ThematicBreakParser {
    fn triggers(&self) -> &'static [u8] {
        b"-*_"
    }

    fn can_interrupt_paragraph(&self, _line: &str) -> bool {
        true
    }

    fn open(
        &self,
        reader: &mut LineReader<'_>,
        _context: &mut ParseContext,
    ) -> Option<Box<dyn OpenBlock>> {
        let (line, segment) = reader.peek_line()?;
        if !is_thematic_break_line(trim_line_end(line)) {
            return None;
        }
        let span = content_span(reader, segment);
        reader.advance_line();
        Some(Box::new(ThematicBreak { span }))
    }
}

impl OpenBlock for ThematicBreak {
    fn proceed(&mut self, _reader: &mut LineReader<'_>) -> BlockState {
        BlockState::Reject
    }

    fn close(self: Box<Self>, _reader: &LineReader<'_>, _parser: &mut Parser) -> Block {
        Block {
            span: self.span,
            kind: BlockKind::ThematicBreak,
        }
    }
}

fn is_thematic_break_line(text: &str) -> bool {
    let mut marker: Option<u8> = None;
    let mut count = 0;
    for b in text.bytes() {
        if is_space_or_tab(b) {
            continue;
        }
        match marker {
            None if matches!(b, b'-' | b'*' | b'_') => marker = Some(b),
            Some(current) if current == b => {}
            _ => return false,
        }
        count += 1;
    }
    count >= 3
}

struct ListParser;

/// A parsed bullet or ordered list marker.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct ListMarker {
    ordered: bool,
    start: Option<u64>,
    /// `-`, `+` or `*` for bullets; `.` or `)` for ordered markers.
    delimiter: u8,
    /// Bytes from the marker to the item's first content byte.
    content_offset: usize,
    /// Column continuation lines must reach to belong to the item.
    content_indent: usize,
    empty: bool,
}

/// Parses a list marker at the start of `text`, which begins at `column` of
/// its line.
fn parse_list_marker(text: &str, column: usize) -> Option<ListMarker> {
    if is_thematic_break_line(text) {
        return None;
    }
    let bytes = text.as_bytes();
    let first = *bytes.first()?;
    let (ordered, start, width, delimiter) = if matches!(first, b'-' | b'+' | b'*') {
        (false, None, 1, first)
    } else {
        let digits = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
        if digits == 0 || digits > 9 {
            return None;
        }
        let delimiter = *bytes.get(digits)?;
        if delimiter != b'.' && delimiter != b')' {
            return None;
        }
        (true, text[..digits].parse::<u64>().ok(), digits + 1, delimiter)
    };

    let marker_end = column + width;
    let (space_bytes, space_end) = leading_indent_from(&text[width..], marker_end);
    let padding = space_end - marker_end;
    if width + space_bytes == text.len() {
        return Some(ListMarker {
            ordered,
            start,
            delimiter,
            content_offset: text.len(),
            content_indent: marker_end + 1,
            empty: true,
        });
    }
    if padding == 0 {
        return None;
    }
    // Five or more columns of padding: the content starts one column after
    // the marker and the rest is part of it.
    let (content_offset, padding) = if padding > 4 {
        (width + 1, 1)
    } else {
        (width + space_bytes, padding)
    };
    Some(ListMarker {
        ordered,
        start,
        delimiter,
        content_offset,
        content_indent: marker_end + padding,
        empty: false,
    })
}

impl BlockParser for ListParser {
    fn triggers(&self) -> &'static [u8] {
        b"-+*0123456789"
    }

    fn can_interrupt_paragraph(&self, line: &str) -> bool {
        parse_list_marker(line, 0)
            .is_some_and(|marker| !marker.empty && (!marker.ordered || marker.start == Some(1)))
    }

    fn open(
        &self,
        reader: &mut LineReader<'_>,
        _context: &mut ParseContext,
    ) -> Option<Box<dyn OpenBlock>> {
        let (line, _) = reader.peek_line()?;
        let column = leading_indent(reader.line_prefix()).1;
        let marker = parse_list_marker(trim_line_end(line), column)?;
        let mut list = ListBlock {
            ordered: marker.ordered,
            start: marker.start,
            delimiter: marker.delimiter,
            items: Vec::new(),
            blanks: Vec::new(),
            loose: false,
            lazy: false,
        };
        list.push_item(reader, &marker);
        debug!(ordered = marker.ordered, "list opened");
        Some(Box::new(list))
    }
}

/// Open list. Item lines are collected with the item's indentation removed
/// and parsed as blocks when the list closes.
struct ListBlock {
    ordered: bool,
    start: Option<u64>,
    delimiter: u8,
    items: Vec<OpenItem>,
    /// Blank lines not yet known to be inside an item.
    blanks: Vec<Span>,
    loose: bool,
    /// Whether the last line may be continued lazily by an unindented line.
    lazy: bool,
}

struct OpenItem {
    content_indent: usize,
    lines: Vec<Span>,
    span: Span,
    has_content: bool,
    /// An item that began with a blank line takes no further content.
    ended: bool,
}

impl ListBlock {
    /// Starts a new item at the marker under the cursor and moves to the next
    /// line.
    fn push_item(&mut self, reader: &mut LineReader<'_>, marker: &ListMarker) {
        if let Some((line, segment)) = reader.peek_line() {
            let mut item = OpenItem {
                content_indent: marker.content_indent,
                lines: Vec::new(),
                span: content_span(reader, segment),
                has_content: !marker.empty,
                ended: false,
            };
            self.lazy = false;
            if !marker.empty {
                item.lines.push(segment.shrink_front(marker.content_offset));
                self.lazy = !starts_block(trim_line_end(&line[marker.content_offset..]));
            }
            self.items.push(item);
        }
        self.blanks.clear();
        reader.advance_line();
    }

    fn same_list(&self, marker: &ListMarker) -> bool {
        marker.ordered == self.ordered && marker.delimiter == self.delimiter
    }
}

impl OpenBlock for ListBlock {
    fn proceed(&mut self, reader: &mut LineReader<'_>) -> BlockState {
        let Some((line, segment)) = reader.peek_line() else {
            return BlockState::Reject;
        };
        if is_blank(line) {
            if let Some(item) = self.items.last_mut()
                && !item.has_content
            {
                item.ended = true;
            }
            self.blanks.push(segment);
            self.lazy = false;
            reader.advance_line();
            return BlockState::Continue;
        }

        let text = trim_line_end(line);
        if let Some(item) = self.items.last_mut()
            && !item.ended
            && let Some(skip) = indent_prefix_len(text, item.content_indent)
        {
            item.lines.append(&mut self.blanks);
            item.lines.push(segment.shrink_front(skip));
            item.span.end = content_span(reader, segment).end;
            item.has_content = true;
            self.lazy = !starts_block(text[skip..].trim_start_matches([' ', '\t']));
            reader.advance_line();
            return BlockState::Continue;
        }

        let (indent, columns) = leading_indent(text);
        if columns <= 3
            && let Some(marker) = parse_list_marker(&text[indent..], columns)
            && self.same_list(&marker)
        {
            if !self.blanks.is_empty() {
                self.loose = true;
            }
            reader.advance(indent);
            self.push_item(reader, &marker);
            return BlockState::Continue;
        }

        if self.blanks.is_empty()
            && self.lazy
            && !starts_block(&text[indent..])
            && let Some(item) = self.items.last_mut()
        {
            item.lines.push(segment.shrink_front(indent));
            item.span.end = content_span(reader, segment).end;
            reader.advance_line();
            return BlockState::Continue;
        }
        BlockState::Reject
    }

    fn close(self: Box<Self>, reader: &LineReader<'_>, parser: &mut Parser) -> Block {
        let source = reader.source();
        let mut tight = !self.loose;
        let mut items = Vec::with_capacity(self.items.len());
        for item in self.items {
            let blocks = parser.parse_blocks(&mut LineReader::from_lines(source, item.lines));
            // A blank line between two blocks of one item makes the list loose.
            if blocks.windows(2).any(|pair| {
                source
                    .get(pair[0].span.end..pair[1].span.start)
                    .is_some_and(|gap| gap.matches('\n').count() >= 2)
            }) {
                tight = false;
            }
            items.push(ListItem {
                span: item.span,
                blocks,
            });
        }
        let span = match (items.first(), items.last()) {
            (Some(first), Some(last)) => first.span.join(last.span),
            _ => Span::default(),
        };
        Block {
            span,
            kind: BlockKind::List(List {
                ordered: self.ordered,
                start: self.start,
                tight,
                items,
            }),
        }
    }
}
