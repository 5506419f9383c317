use texmark_core::{
    BlockKind, BlockMathParser, Flavor, InlineKind, InlineMathParser, LatexEngine, LineReader,
    MacroTable, MathBlockStep, MathRenderer, MathUnit, OpenMiss, parse,
};

fn inline_units(source: &str) -> Vec<MathUnit> {
    parse(source)
        .document
        .math_units()
        .into_iter()
        .map(|(unit, _)| unit.clone())
        .collect()
}

#[test]
fn same_line_closer_yields_exact_source() {
    let source = "\\(a^2 + b\\) rest";
    let mut reader = LineReader::new(source);
    let scanned = InlineMathParser::new().parse(&mut reader).expect("math");
    assert_eq!(scanned.unit.source(), "a^2 + b");
    assert_eq!(scanned.unit.flavor(), Flavor::INLINE_AMS);
    assert_eq!(reader.source_offset(), "\\(a^2 + b\\)".len());
    assert_eq!(reader.peek_line().map(|(rest, _)| rest), Some(" rest"));
}

#[test]
fn double_dollar_is_one_display_region() {
    let units = inline_units("before $$a$$ after\n");
    assert_eq!(units, vec![MathUnit::new("a", Flavor::DISPLAY_DOLLAR)]);

    let units = inline_units("$$\na\n$$\n");
    assert_eq!(units, vec![MathUnit::new("a", Flavor::DISPLAY_DOLLAR)]);
}

#[test]
fn failed_lookahead_keeps_position() {
    let source = "$x and\nnothing here\n";
    let mut reader = LineReader::new(source);
    let before = reader.position();
    assert!(InlineMathParser::new().parse(&mut reader).is_none());
    assert_eq!(reader.position(), before);

    let source = "\\[\nno closer\n";
    let mut reader = LineReader::new(source);
    let before = reader.position();
    assert_eq!(
        BlockMathParser::new().open(&mut reader).err(),
        Some(OpenMiss::Unconfirmed(Flavor::DISPLAY_AMS))
    );
    assert_eq!(reader.position(), before);
}

#[test]
fn block_opener_closed_on_same_line_is_not_a_block() {
    let mut reader = LineReader::new("$$x$$\n");
    assert_eq!(
        BlockMathParser::new().open(&mut reader).err(),
        Some(OpenMiss::ClosedOnSameLine)
    );

    let parsed = parse("$$x$$\n");
    let BlockKind::Paragraph { content } = &parsed.document.blocks[0].kind else {
        panic!("expected paragraph");
    };
    assert!(matches!(&content[0].kind, InlineKind::Math(unit) if unit.source() == "x"));
}

#[test]
fn inline_dollar_in_prose() {
    let units = inline_units("The value is $x^2$ today.\n");
    assert_eq!(units, vec![MathUnit::new("x^2", Flavor::INLINE_DOLLAR)]);
}

#[test]
fn bracket_block_across_lines() {
    let mut reader = LineReader::new("\\[\nx + y\n\\]\n");
    let mut state = BlockMathParser::new().open(&mut reader).expect("open");
    assert_eq!(state.flavor(), Flavor::DISPLAY_AMS);
    assert_eq!(state.proceed(&mut reader), MathBlockStep::Continue);
    assert_eq!(state.proceed(&mut reader), MathBlockStep::Close);
    let scanned = state.close(&reader);
    assert_eq!(scanned.unit, MathUnit::new("x + y", Flavor::DISPLAY_AMS));

    let units = inline_units("\\[\nx + y\n\\]\n");
    assert_eq!(units, vec![MathUnit::new("x + y", Flavor::DISPLAY_AMS)]);
}

#[test]
fn unterminated_opener_stays_literal() {
    let source = "\\(unterminated\n";
    let parsed = parse(source);
    assert!(parsed.document.math_units().is_empty());
    let BlockKind::Paragraph { content } = &parsed.document.blocks[0].kind else {
        panic!("expected paragraph");
    };
    let text: String = content
        .iter()
        .map(|inline| match &inline.kind {
            InlineKind::Text(text) => text.as_str(),
            _ => "",
        })
        .collect();
    assert_eq!(text, "\\(unterminated");
}

#[test]
fn rendering_twice_is_identical() {
    let renderer = MathRenderer::new(LatexEngine::with_macros(MacroTable::new([(
        "half",
        "\\frac{1}{2}",
    )])));
    let unit = MathUnit::new("\\half x", Flavor::DISPLAY_AMS);
    let first = renderer.render(&unit).expect("render");
    let second = renderer.render(&unit).expect("render");
    assert_eq!(first, second);
}

#[test]
fn math_inside_code_is_not_scanned() {
    assert!(inline_units("`$x$`\n").is_empty());
    assert!(inline_units("```\n$$\nx\n$$\n```\n").is_empty());
}

#[test]
fn inline_region_does_not_cross_paragraphs() {
    // The closer sits in the next paragraph, so it is out of reach.
    assert!(inline_units("cost $5\n\nand $\n").is_empty());
}

#[test]
fn crlf_sources_scan_like_lf() {
    let units = inline_units("\\[\r\nx\r\n\\]\r\n");
    assert_eq!(units, vec![MathUnit::new("x", Flavor::DISPLAY_AMS)]);

    let units = inline_units("- a $y$\r\n- $$\r\n  b\r\n  $$\r\n");
    assert_eq!(
        units,
        vec![
            MathUnit::new("y", Flavor::INLINE_DOLLAR),
            MathUnit::new("b", Flavor::DISPLAY_DOLLAR),
        ]
    );
}

#[test]
fn unconfirmed_opener_does_not_reach_past_a_blank_line() {
    let source = "$$ price list\n\nFirst paragraph.\n\n# Heading\n\nLast $$ done\n";
    let parsed = parse(source);
    assert!(parsed.document.math_units().is_empty());
    assert!(
        parsed
            .document
            .blocks
            .iter()
            .any(|block| matches!(block.kind, BlockKind::Heading { .. }))
    );
}

#[test]
fn repeated_openers_each_stay_literal() {
    let source = "\\[ open\n".repeat(2_000);
    let parsed = parse(&source);
    assert!(parsed.document.math_units().is_empty());
    // Each walk stops at the next line's opener, so every line warns once.
    assert_eq!(parsed.diagnostics.len(), 2_000);
    assert_eq!(parsed.document.blocks.len(), 1);
}
