// Analysis report presentation helpers
use serde::Serialize;

/// Characters of analysis text shown before the report card collapses
pub const ANALYSIS_PREVIEW_CHARS: usize = 300;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportPreview {
    pub text: String,
    /// Drives the expand/collapse affordance in the report card
    pub is_truncated: bool,
}

/// Collapsed preview of the analysis text
pub fn preview_analysis(analysis: &str) -> ReportPreview {
    preview_with_limit(analysis, ANALYSIS_PREVIEW_CHARS)
}

/// Truncation counts characters, not bytes, so accented text never splits a
/// code point
pub fn preview_with_limit(analysis: &str, limit: usize) -> ReportPreview {
    match analysis.char_indices().nth(limit) {
        Some((byte_offset, _)) => ReportPreview {
            text: analysis[..byte_offset].to_string(),
            is_truncated: true,
        },
        None => ReportPreview {
            text: analysis.to_string(),
            is_truncated: false,
        },
    }
}
