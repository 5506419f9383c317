use crate::math::MathUnit;
use crate::span::Span;

pub type InlineSeq = Vec<Inline>;

#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub span: Span,
    pub blocks: Vec<Block>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub span: Span,
    pub kind: BlockKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum BlockKind {
    Paragraph { content: InlineSeq },
    Heading { level: u8, title: InlineSeq },
    CodeBlock(CodeBlock),
    // The unit is opaque: its text is never parsed as markdown.
    MathBlock(MathUnit),
    List(List),
    ThematicBreak,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CodeBlock {
    pub lang: Option<String>,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct List {
    pub ordered: bool,
    /// First number of an ordered list.
    pub start: Option<u64>,
    /// Tight lists render their single-paragraph items without `<p>`.
    pub tight: bool,
    pub items: Vec<ListItem>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ListItem {
    pub span: Span,
    pub blocks: Vec<Block>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Inline {
    pub span: Span,
    pub kind: InlineKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum InlineKind {
    Text(String),
    CodeSpan(String),
    Emph(InlineSeq),
    Strong(InlineSeq),
    Link {
        url: String,
        title: Option<String>,
        children: InlineSeq,
    },
    SoftBreak,
    HardBreak,
    Math(MathUnit),
}

impl Document {
    /// Every math unit in document order, with the span of its region.
    pub fn math_units(&self) -> Vec<(&MathUnit, Span)> {
        let mut out = Vec::new();
        collect_block_math(&self.blocks, &mut out);
        out
    }
}

fn collect_block_math<'a>(blocks: &'a [Block], out: &mut Vec<(&'a MathUnit, Span)>) {
    for block in blocks {
        match &block.kind {
            BlockKind::MathBlock(unit) => out.push((unit, block.span)),
            BlockKind::Paragraph { content } | BlockKind::Heading { title: content, .. } => {
                collect_inline_math(content, out);
            }
            BlockKind::List(list) => {
                for item in &list.items {
                    collect_block_math(&item.blocks, out);
                }
            }
            BlockKind::CodeBlock(_) | BlockKind::ThematicBreak => {}
        }
    }
}

fn collect_inline_math<'a>(inlines: &'a [Inline], out: &mut Vec<(&'a MathUnit, Span)>) {
    for inline in inlines {
        match &inline.kind {
            InlineKind::Math(unit) => out.push((unit, inline.span)),
            InlineKind::Emph(children)
            | InlineKind::Strong(children)
            | InlineKind::Link { children, .. } => collect_inline_math(children, out),
            InlineKind::Text(_)
            | InlineKind::CodeSpan(_)
            | InlineKind::SoftBreak
            | InlineKind::HardBreak => {}
        }
    }
}
