use crate::source_map::Range;

/// A display-math opener at the start of a line never found its closer and
/// was kept as text.
pub const W_MATH_UNCLOSED: &str = "W_MATH_UNCLOSED";
/// An inline region closed on the line after its opener; the text after the
/// opener was left out of the unit.
pub const W_MATH_INLINE_TRUNCATED: &str = "W_MATH_INLINE_TRUNCATED";
/// The math engine rejected a region; fallback markup was emitted instead.
pub const W_MATH_RENDER: &str = "W_MATH_RENDER";

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Diagnostic {
    pub range: Range,
    pub severity: DiagnosticSeverity,
    pub code: &'static str,
    pub message: String,
}

impl Diagnostic {
    pub fn new(
        range: Range,
        severity: DiagnosticSeverity,
        code: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            range,
            severity,
            code,
            message: message.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DiagnosticSeverity {
    Warning,
}

impl DiagnosticSeverity {
    pub fn label(self) -> &'static str {
        match self {
            DiagnosticSeverity::Warning => "warning",
        }
    }
}
