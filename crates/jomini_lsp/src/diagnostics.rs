//! Conversion from the core diagnostic model to LSP diagnostics.
//!
//! The core model stays protocol-free; everything LSP-specific (UTF-16
//! ranges, `DiagnosticRelatedInformation`, code strings) happens here, at
//! the very edge.

use tower_lsp::lsp_types::{
    Diagnostic, DiagnosticRelatedInformation, DiagnosticSeverity, Location, NumberOrString, Url,
};

use jomini_base::Severity;

use crate::line_index::LineIndex;

pub fn convert_all(
    diagnostics: &[jomini_base::Diagnostic],
    line_index: &LineIndex,
    uri: &Url,
) -> Vec<Diagnostic> {
    diagnostics
        .iter()
        .map(|d| convert(d, line_index, uri))
        .collect()
}

pub fn convert(
    diagnostic: &jomini_base::Diagnostic,
    line_index: &LineIndex,
    uri: &Url,
) -> Diagnostic {
    let related_information: Vec<DiagnosticRelatedInformation> = diagnostic
        .related
        .iter()
        .filter_map(|related| {
            let target = match &related.file {
                Some(file) => Url::parse(file).ok()?,
                None => uri.clone(),
            };
            Some(DiagnosticRelatedInformation {
                location: Location {
                    uri: target,
                    // Ranges for other files were precomputed at index time
                    // and travel as spans of *that* file; same-file spans
                    // convert through our line index.
                    range: line_index.range(related.span),
                },
                message: related.message.clone(),
            })
        })
        .collect();

    Diagnostic {
        range: line_index.range(diagnostic.span),
        severity: Some(severity(diagnostic.severity)),
        code: Some(NumberOrString::String(diagnostic.code.clone())),
        source: Some("jomini-ls".to_string()),
        message: diagnostic.message.clone(),
        related_information: if related_information.is_empty() {
            None
        } else {
            Some(related_information)
        },
        ..Default::default()
    }
}

fn severity(severity: Severity) -> DiagnosticSeverity {
    match severity {
        Severity::Error => DiagnosticSeverity::ERROR,
        Severity::Warning => DiagnosticSeverity::WARNING,
        Severity::Info => DiagnosticSeverity::INFORMATION,
        Severity::Hint => DiagnosticSeverity::HINT,
    }
}
