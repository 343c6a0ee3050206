//! Plain-text rendering of a diagnostics collection.

use super::collection::Diagnostics;

/// Renders diagnostics one per line, errors before warnings.
pub struct DiagnosticsPrinter<'a> {
    diagnostics: &'a Diagnostics,
}

impl<'a> DiagnosticsPrinter<'a> {
    pub fn new(diagnostics: &'a Diagnostics) -> Self {
        Self { diagnostics }
    }

    pub fn render(&self) -> String {
        let mut lines: Vec<String> = Vec::with_capacity(self.diagnostics.len());
        for msg in self.diagnostics.iter().filter(|d| d.is_error()) {
            lines.push(msg.to_string());
        }
        for msg in self.diagnostics.iter().filter(|d| d.is_warning()) {
            lines.push(msg.to_string());
        }
        lines.join("\n")
    }
}
