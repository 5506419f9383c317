use serde::Deserialize;
use tracing::warn;

use crate::engine::{MathEngine, RenderError};
use crate::math::MathUnit;

/// What to emit in place of a unit the engine could not convert.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MathFallback {
    /// The escaped TeX source, marked with an error class.
    #[default]
    Source,
    /// Nothing; the failure is only reported as a diagnostic.
    Empty,
}

/// Turns math units into markup through a [`MathEngine`].
pub struct MathRenderer {
    engine: Box<dyn MathEngine + Send + Sync>,
    fallback: MathFallback,
}

impl MathRenderer {
    pub fn new(engine: impl MathEngine + Send + Sync + 'static) -> Self {
        Self {
            engine: Box::new(engine),
            fallback: MathFallback::default(),
        }
    }

    pub fn with_fallback(mut self, fallback: MathFallback) -> Self {
        self.fallback = fallback;
        self
    }

    /// Inline units use text style, everything else display style.
    pub fn render(&self, unit: &MathUnit) -> Result<String, RenderError> {
        if unit.flavor().is_inline() {
            self.engine.text_style(unit.source())
        } else {
            self.engine.display_style(unit.source())
        }
    }

    /// Renders `unit`, substituting the fallback markup on failure. The error
    /// is handed back so the caller can report it.
    pub fn render_or_fallback(&self, unit: &MathUnit) -> (String, Option<RenderError>) {
        match self.render(unit) {
            Ok(markup) => (markup, None),
            Err(err) => {
                warn!(source = unit.source(), error = %err, "math render failed");
                (self.fallback_markup(unit), Some(err))
            }
        }
    }

    pub fn fallback_markup(&self, unit: &MathUnit) -> String {
        match self.fallback {
            MathFallback::Source => format!(
                "<code class=\"texmark-math-error\">{}</code>",
                escape_html(unit.source())
            ),
            MathFallback::Empty => String::new(),
        }
    }
}

pub(crate) fn escape_html(text: &str) -> String {
    let mut out = String::new();
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}
