use crate::ast::{Block, BlockKind, CodeBlock, Document, Inline, InlineKind, List};
use crate::diagnostic::{Diagnostic, DiagnosticSeverity, W_MATH_RENDER};
use crate::math::MathUnit;
use crate::render::{MathRenderer, escape_html};
use crate::source_map::SourceMap;
use crate::span::Span;
use ammonia::Builder;
use std::collections::{HashMap, HashSet};

#[derive(Clone, Copy, Debug, Default)]
pub struct HtmlEmitOptions {
    /// Emit code blocks as plain `<pre><code>` instead of a figure with one
    /// span per line.
    pub simple_code_blocks: bool,
}

#[derive(Clone, Debug, Default)]
pub struct EmitResult {
    pub html: String,
    pub diagnostics: Vec<Diagnostic>,
}

/// Emits raw, un-sanitized HTML for a document.
///
/// Every math unit is handed to `renderer`; failed units are replaced by the
/// renderer's fallback markup and reported as `W_MATH_RENDER` warnings.
pub fn emit_html(
    document: &Document,
    source_map: &SourceMap,
    renderer: &MathRenderer,
    options: &HtmlEmitOptions,
) -> EmitResult {
    // Deterministic formatting: 2-space indentation and LF newlines.
    let mut emitter = Emitter {
        writer: HtmlWriter::new(),
        renderer,
        source_map,
        options,
        diagnostics: Vec::new(),
        heading_ids: HashMap::new(),
    };
    for block in &document.blocks {
        emitter.block(block);
    }
    EmitResult {
        html: emitter.writer.finish(),
        diagnostics: emitter.diagnostics,
    }
}

/// Like [`emit_html`], then sanitizes the output with an allow-list that keeps
/// the markup this crate produces, MathML included.
pub fn emit_html_sanitized(
    document: &Document,
    source_map: &SourceMap,
    renderer: &MathRenderer,
    options: &HtmlEmitOptions,
) -> EmitResult {
    let raw = emit_html(document, source_map, renderer, options);
    EmitResult {
        html: sanitize(&raw.html),
        diagnostics: raw.diagnostics,
    }
}

fn sanitize(raw_html: &str) -> String {
    let tags: HashSet<&'static str> = [
        "a", "br", "code", "div", "em", "figure", "h1", "h2", "h3", "h4", "h5", "h6", "hr", "li",
        "ol", "p", "pre", "span", "strong", "ul",
    ]
    .iter()
    .chain(MATHML_TAGS)
    .copied()
    .collect();

    let generic_attributes: HashSet<&'static str> = ["class"].iter().copied().collect();

    let mut tag_attributes: HashMap<&'static str, HashSet<&'static str>> = HashMap::new();
    tag_attributes.insert("span", ["data-line"].iter().copied().collect());
    tag_attributes.insert("figure", ["data-lang"].iter().copied().collect());
    tag_attributes.insert("a", ["href", "title"].iter().copied().collect());
    tag_attributes.insert("ol", ["start"].iter().copied().collect());
    for heading in ["h1", "h2", "h3", "h4", "h5", "h6"] {
        tag_attributes.insert(heading, ["id"].iter().copied().collect());
    }
    for &(tag, attributes) in MATHML_ATTRIBUTES {
        tag_attributes.insert(tag, attributes.iter().copied().collect());
    }

    Builder::new()
        .tags(tags)
        .generic_attributes(generic_attributes)
        .tag_attributes(tag_attributes)
        .clean(raw_html)
        .to_string()
}

const MATHML_TAGS: &[&str] = &[
    "math",
    "semantics",
    "annotation",
    "mrow",
    "mi",
    "mn",
    "mo",
    "ms",
    "mtext",
    "mspace",
    "msub",
    "msup",
    "msubsup",
    "mfrac",
    "msqrt",
    "mroot",
    "mover",
    "munder",
    "munderover",
    "mmultiscripts",
    "mprescripts",
    "none",
    "mtable",
    "mtr",
    "mtd",
    "mlabeledtr",
    "mstyle",
    "mpadded",
    "mphantom",
    "menclose",
    "merror",
];

const MATHML_ATTRIBUTES: &[(&str, &[&str])] = &[
    ("math", &["display", "xmlns"]),
    ("annotation", &["encoding"]),
    ("mi", &["mathvariant"]),
    (
        "mo",
        &[
            "accent",
            "fence",
            "largeop",
            "lspace",
            "maxsize",
            "minsize",
            "movablelimits",
            "rspace",
            "separator",
            "stretchy",
            "symmetric",
        ],
    ),
    ("mspace", &["width", "height", "depth"]),
    ("mfrac", &["linethickness"]),
    ("mover", &["accent"]),
    ("munder", &["accentunder"]),
    ("munderover", &["accent", "accentunder"]),
    (
        "mtable",
        &["columnalign", "columnspacing", "rowspacing", "displaystyle"],
    ),
    ("mtr", &["columnalign"]),
    ("mtd", &["columnalign", "columnspan", "rowspan"]),
    (
        "mstyle",
        &[
            "displaystyle",
            "scriptlevel",
            "mathcolor",
            "mathbackground",
            "mathsize",
            "mathvariant",
        ],
    ),
    ("mpadded", &["width", "height", "depth", "lspace", "voffset"]),
    ("menclose", &["notation"]),
];

struct HtmlWriter {
    out: String,
    indent: usize,
}

impl HtmlWriter {
    fn new() -> Self {
        Self {
            out: String::new(),
            indent: 0,
        }
    }

    fn line(&mut self, line: &str) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
        self.out.push_str(line);
        self.out.push('\n');
    }

    fn finish(mut self) -> String {
        if self.out.ends_with('\n') {
            self.out.pop();
        }
        self.out
    }
}

struct Emitter<'a> {
    writer: HtmlWriter,
    renderer: &'a MathRenderer,
    source_map: &'a SourceMap,
    options: &'a HtmlEmitOptions,
    diagnostics: Vec<Diagnostic>,
    /// Times each heading slug was handed out.
    heading_ids: HashMap<String, usize>,
}

impl Emitter<'_> {
    fn block(&mut self, block: &Block) {
        match &block.kind {
            BlockKind::Paragraph { content } => {
                let html = self.inlines(content);
                self.writer.line(&format!("<p>{html}</p>"));
            }
            BlockKind::Heading { level, title } => {
                let id = self.heading_id(title);
                let html = self.inlines(title);
                self.writer.line(&format!(
                    "<h{level} id=\"{}\">{html}</h{level}>",
                    escape_attr(&id)
                ));
            }
            BlockKind::CodeBlock(code) => self.code_block(code),
            BlockKind::MathBlock(unit) => {
                let markup = self.math(unit, block.span);
                if markup.is_empty() {
                    self.writer.line("<div class=\"texmark-math-block\"></div>");
                } else {
                    self.writer.line("<div class=\"texmark-math-block\">");
                    self.writer.indent += 1;
                    self.writer.line(&markup);
                    self.writer.indent -= 1;
                    self.writer.line("</div>");
                }
            }
            BlockKind::List(list) => self.list(list),
            BlockKind::ThematicBreak => self.writer.line("<hr />"),
        }
    }

    fn list(&mut self, list: &List) {
        let tag = if list.ordered { "ol" } else { "ul" };
        let start_attr = match list.start {
            Some(start) if list.ordered && start != 1 => format!(" start=\"{start}\""),
            _ => String::new(),
        };
        self.writer.line(&format!("<{tag}{start_attr}>"));
        self.writer.indent += 1;
        for item in &list.items {
            if item.blocks.is_empty() {
                self.writer.line("<li></li>");
                continue;
            }
            self.writer.line("<li>");
            self.writer.indent += 1;
            match item.blocks.as_slice() {
                // A tight item with one paragraph holds its inlines directly.
                [
                    Block {
                        kind: BlockKind::Paragraph { content },
                        ..
                    },
                ] if list.tight => {
                    let html = self.inlines(content);
                    self.writer.line(&html);
                }
                blocks => {
                    for child in blocks {
                        self.block(child);
                    }
                }
            }
            self.writer.indent -= 1;
            self.writer.line("</li>");
        }
        self.writer.indent -= 1;
        self.writer.line(&format!("</{tag}>"));
    }

    /// Unique `id` for a heading, derived from its text.
    fn heading_id(&mut self, title: &[Inline]) -> String {
        let mut text = String::new();
        plain_text(title, &mut text);
        let base = slugify(&text);
        let seen = self.heading_ids.entry(base.clone()).or_insert(0);
        *seen += 1;
        if *seen == 1 {
            base
        } else {
            format!("{base}-{}", *seen - 1)
        }
    }

    fn code_block(&mut self, code: &CodeBlock) {
        let lang = code.lang.as_deref();
        let code_class = lang
            .map(|value| format!(" class=\"language-{}\"", escape_attr(value)))
            .unwrap_or_default();

        if self.options.simple_code_blocks {
            // Written without indentation so the text is preserved exactly.
            let writer = &mut self.writer;
            writer.out.push_str(&format!("<pre><code{code_class}>"));
            writer.out.push_str(&escape_html(&code.text));
            writer.out.push_str("</code></pre>\n");
            return;
        }

        let lang_attr = lang
            .map(|value| format!(" data-lang=\"{}\"", escape_attr(value)))
            .unwrap_or_default();
        let writer = &mut self.writer;
        writer.line(&format!(
            "<figure class=\"texmark-codeblock\"{lang_attr}>"
        ));
        writer.indent += 1;
        writer.line("<pre>");
        writer.indent += 1;
        writer.line(&format!("<code{code_class}>"));
        writer.indent += 1;
        for (idx, line) in code.text.lines().enumerate() {
            writer.line(&format!(
                "<span class=\"line\" data-line=\"{}\">{}</span>",
                idx + 1,
                escape_html(line)
            ));
        }
        writer.indent -= 1;
        writer.line("</code>");
        writer.indent -= 1;
        writer.line("</pre>");
        writer.indent -= 1;
        writer.line("</figure>");
    }

    fn inlines(&mut self, inlines: &[Inline]) -> String {
        let mut out = String::new();
        for inline in inlines {
            match &inline.kind {
                InlineKind::Text(text) => out.push_str(&escape_html(text)),
                InlineKind::CodeSpan(text) => {
                    out.push_str("<code>");
                    out.push_str(&escape_html(text));
                    out.push_str("</code>");
                }
                InlineKind::Emph(children) => {
                    out.push_str("<em>");
                    out.push_str(&self.inlines(children));
                    out.push_str("</em>");
                }
                InlineKind::Strong(children) => {
                    out.push_str("<strong>");
                    out.push_str(&self.inlines(children));
                    out.push_str("</strong>");
                }
                InlineKind::Link {
                    url,
                    title,
                    children,
                } => {
                    out.push_str("<a href=\"");
                    out.push_str(&escape_url_attr(url));
                    out.push('"');
                    if let Some(title) = title {
                        out.push_str(" title=\"");
                        out.push_str(&escape_attr(title));
                        out.push('"');
                    }
                    out.push('>');
                    out.push_str(&self.inlines(children));
                    out.push_str("</a>");
                }
                InlineKind::SoftBreak => out.push('\n'),
                InlineKind::HardBreak => out.push_str("<br />\n"),
                InlineKind::Math(unit) => {
                    out.push_str("<span class=\"texmark-math-inline\">");
                    out.push_str(&self.math(unit, inline.span));
                    out.push_str("</span>");
                }
            }
        }
        out
    }

    fn math(&mut self, unit: &MathUnit, span: Span) -> String {
        let (markup, error) = self.renderer.render_or_fallback(unit);
        if let Some(error) = error {
            self.diagnostics.push(Diagnostic::new(
                self.source_map.range(span),
                DiagnosticSeverity::Warning,
                W_MATH_RENDER,
                format!("math could not be rendered: {error}"),
            ));
        }
        markup
    }
}

/// Text content of inlines; math contributes its TeX source.
fn plain_text(inlines: &[Inline], out: &mut String) {
    for inline in inlines {
        match &inline.kind {
            InlineKind::Text(text) | InlineKind::CodeSpan(text) => out.push_str(text),
            InlineKind::Math(unit) => out.push_str(unit.source()),
            InlineKind::Emph(children)
            | InlineKind::Strong(children)
            | InlineKind::Link { children, .. } => plain_text(children, out),
            InlineKind::SoftBreak | InlineKind::HardBreak => out.push(' '),
        }
    }
}

/// Lowercased alphanumerics, `-` and `_`; whitespace runs become one `-`.
fn slugify(text: &str) -> String {
    let mut slug = String::new();
    for ch in text.chars() {
        if ch.is_alphanumeric() || ch == '_' || ch == '-' {
            slug.extend(ch.to_lowercase());
        } else if ch.is_whitespace() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "heading".to_string()
    } else {
        slug.to_string()
    }
}

fn escape_url_attr(text: &str) -> String {
    let mut encoded = String::new();
    for &byte in text.as_bytes() {
        match byte {
            b' ' => encoded.push_str("%20"),
            b'\\' => encoded.push_str("%5C"),
            0x00..=0x1F | 0x7F..=0xFF => encoded.push_str(&format!("%{byte:02X}")),
            _ => encoded.push(byte as char),
        }
    }
    escape_attr(&encoded)
}

fn escape_attr(text: &str) -> String {
    let mut out = String::new();
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{HtmlEmitOptions, emit_html, emit_html_sanitized, sanitize, slugify};
    use crate::diagnostic::W_MATH_RENDER;
    use crate::engine::{MathEngine, RenderError};
    use crate::parser::parse;
    use crate::render::{MathFallback, MathRenderer};

    struct Echo;

    impl MathEngine for Echo {
        fn text_style(&self, tex: &str) -> Result<String, RenderError> {
            if tex.contains("bad") {
                return Err(RenderError::InvalidTex {
                    message: "rejected".to_string(),
                });
            }
            Ok(format!("<math><mi>{tex}</mi></math>"))
        }

        fn display_style(&self, tex: &str) -> Result<String, RenderError> {
            Ok(format!("<math display=\"block\"><mi>{tex}</mi></math>"))
        }
    }

    fn emit(source: &str, renderer: &MathRenderer) -> super::EmitResult {
        let parsed = parse(source);
        emit_html(
            &parsed.document,
            &parsed.source_map,
            renderer,
            &HtmlEmitOptions::default(),
        )
    }

    #[test]
    fn inline_and_block_wrappers() {
        let result = emit("Take $a$ now.\n\n$$\nb\n$$\n", &MathRenderer::new(Echo));
        assert_eq!(
            result.html,
            "<p>Take <span class=\"texmark-math-inline\"><math><mi>a</mi></math></span> now.</p>\n\
             <div class=\"texmark-math-block\">\n  <math display=\"block\"><mi>b</mi></math>\n</div>"
        );
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn render_failure_is_reported() {
        let result = emit("x $bad$ y\n", &MathRenderer::new(Echo));
        assert_eq!(
            result.html,
            "<p>x <span class=\"texmark-math-inline\"><code class=\"texmark-math-error\">bad</code></span> y</p>"
        );
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].code, W_MATH_RENDER);
        assert_eq!(result.diagnostics[0].range.start.character, 2);
        assert_eq!(result.diagnostics[0].range.end.character, 7);

        let empty = MathRenderer::new(Echo).with_fallback(MathFallback::Empty);
        let result = emit("x $bad$ y\n", &empty);
        assert_eq!(
            result.html,
            "<p>x <span class=\"texmark-math-inline\"></span> y</p>"
        );
        assert_eq!(result.diagnostics.len(), 1);
    }

    #[test]
    fn code_blocks_are_escaped() {
        let parsed = parse("```rs\nif a < b {}\n```\n");
        let renderer = MathRenderer::new(Echo);
        let figure = emit_html(
            &parsed.document,
            &parsed.source_map,
            &renderer,
            &HtmlEmitOptions::default(),
        );
        assert!(figure.html.contains("data-lang=\"rs\""));
        assert!(
            figure
                .html
                .contains("<span class=\"line\" data-line=\"1\">if a &lt; b {}</span>")
        );

        let options = HtmlEmitOptions {
            simple_code_blocks: true,
        };
        let simple = emit_html(&parsed.document, &parsed.source_map, &renderer, &options);
        assert_eq!(
            simple.html,
            "<pre><code class=\"language-rs\">if a &lt; b {}\n</code></pre>"
        );
    }

    #[test]
    fn sanitizer_keeps_mathml_and_drops_scripts() {
        let html = sanitize(
            "<p><span class=\"texmark-math-inline\"><math display=\"block\"><mi>a</mi></math></span>\
             <script>alert(1)</script><span onclick=\"x()\">b</span></p>",
        );
        assert!(html.contains("<math display=\"block\"><mi>a</mi></math>"));
        assert!(html.contains("texmark-math-inline"));
        assert!(!html.contains("script"));
        assert!(!html.contains("onclick"));
    }

    #[test]
    fn sanitized_emit_matches_raw_for_plain_markup() {
        let parsed = parse("# T\n\nSee $a$.\n");
        let renderer = MathRenderer::new(Echo);
        let options = HtmlEmitOptions::default();
        let raw = emit_html(&parsed.document, &parsed.source_map, &renderer, &options);
        let clean = emit_html_sanitized(&parsed.document, &parsed.source_map, &renderer, &options);
        assert_eq!(raw.html, clean.html);
    }

    #[test]
    fn lists_render_items() {
        let result = emit(
            "- take $a$\n- $$\n  b\n  $$\n\n7. one\n\n8. two\n",
            &MathRenderer::new(Echo),
        );
        assert_eq!(
            result.html,
            "<ul>\n  <li>\n    take <span class=\"texmark-math-inline\"><math><mi>a</mi></math></span>\n  </li>\n  \
             <li>\n    <div class=\"texmark-math-block\">\n      <math display=\"block\"><mi>b</mi></math>\n    </div>\n  </li>\n\
             </ul>\n\
             <ol start=\"7\">\n  <li>\n    <p>one</p>\n  </li>\n  <li>\n    <p>two</p>\n  </li>\n</ol>"
        );
    }

    #[test]
    fn emphasis_and_links() {
        let result = emit("[c](x y) and [d]\n", &MathRenderer::new(Echo));
        assert_eq!(result.html, "<p>[c](x y) and [d]</p>");

        let result = emit(
            "*a* **b** [c $x$](<https://e.com/a b> \"T&C\")\n",
            &MathRenderer::new(Echo),
        );
        assert_eq!(
            result.html,
            "<p><em>a</em> <strong>b</strong> <a href=\"https://e.com/a%20b\" title=\"T&amp;C\">c \
             <span class=\"texmark-math-inline\"><math><mi>x</mi></math></span></a></p>"
        );
    }

    #[test]
    fn heading_ids_are_unique_slugs() {
        let result = emit("# Área $x$\n\n# Área $x$\n\n## ?!\n", &MathRenderer::new(Echo));
        let lines: Vec<_> = result.html.lines().collect();
        assert!(lines[0].starts_with("<h1 id=\"área-x\">"));
        assert!(lines[1].starts_with("<h1 id=\"área-x-1\">"));
        assert_eq!(lines[2], "<h2 id=\"heading\">?!</h2>");
        assert_eq!(slugify("  Mixed  Case_Name - 2 "), "mixed-case_name--2");
    }

    #[test]
    fn sanitizer_keeps_structure_markup() {
        let parsed = parse("# Title\n\n3. *a* [b](#t)\n");
        let renderer = MathRenderer::new(Echo);
        let clean = emit_html_sanitized(
            &parsed.document,
            &parsed.source_map,
            &renderer,
            &HtmlEmitOptions::default(),
        );
        assert!(clean.html.contains("<h1 id=\"title\">Title</h1>"));
        assert!(clean.html.contains("<ol start=\"3\">"));
        assert!(clean.html.contains("<em>a</em>"));
        assert!(clean.html.contains("href=\"#t\""));
    }
}
