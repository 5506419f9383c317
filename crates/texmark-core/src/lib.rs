//! Markdown with TeX math regions, rendered to HTML and MathML.
//!
//! [`parse`] recognizes `$…$`, `$$…$$`, `\(…\)` and `\[…\]` regions inside an
//! otherwise small markdown dialect; [`emit_html`] renders every region
//! through a [`MathRenderer`].

mod ast;
mod config;
mod delimiter;
mod diagnostic;
mod emit;
mod engine;
mod inline;
mod math;
mod parser;
mod reader;
mod render;
mod source_map;
mod span;

pub use ast::{
    Block, BlockKind, CodeBlock, Document, Inline, InlineKind, InlineSeq, List, ListItem,
};
pub use config::{Config, ConfigError, DEFAULT_CACHE_SIZE, parse_macro_arg};
pub use delimiter::{CATALOG, Delimiter, Flavor, classify, closer_for};
pub use diagnostic::{
    Diagnostic, DiagnosticSeverity, W_MATH_INLINE_TRUNCATED, W_MATH_RENDER, W_MATH_UNCLOSED,
};
pub use emit::{EmitResult, HtmlEmitOptions, emit_html, emit_html_sanitized};
pub use engine::{CachedEngine, LatexEngine, MacroTable, MathEngine, RenderError};
pub use math::{
    BlockMathParser, InlineMathParser, MathBlockState, MathBlockStep, MathUnit, OpenMiss,
    ScannedMath,
};
pub use parser::{ParseResult, parse};
pub use reader::{LineReader, ReaderPosition, split_lines};
pub use render::{MathFallback, MathRenderer};
pub use source_map::{Position, Range, SourceMap};
pub use span::Span;
