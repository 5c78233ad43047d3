//! Scanner for the templated-expression injection signature.

use regex::Regex;

use crate::error_handling::types::DetectionError;

/// Shortest span opening with `${` and closing at the first `}`.
const SIGNATURE_PATTERN: &str = r"\$\{[^}]*\}";

/// A single signature hit in one inspectable surface of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureMatch {
    /// The literal substring that matched, exactly as the client sent it.
    pub payload: String,
}

/// Stateless scanner for the `${...}` exploitation signature.
///
/// Input is matched raw: no URL decoding, no case folding, no normalization.
/// The signature must appear literally in the scanned text. Safe to share
/// across tasks without synchronization.
pub struct ExploitDetector {
    pattern: Regex,
}

impl ExploitDetector {
    pub fn new() -> Result<Self, DetectionError> {
        Ok(Self {
            pattern: Regex::new(SIGNATURE_PATTERN)?,
        })
    }

    /// First (leftmost) match of the signature in `text`, if any.
    pub fn scan(&self, text: &str) -> Option<SignatureMatch> {
        self.pattern.find(text).map(|m| SignatureMatch {
            payload: m.as_str().to_string(),
        })
    }

    /// Location tag for a header surface, preserving the header's original case.
    pub fn header_location(name: &str) -> String {
        format!("header-{}", name)
    }

    /// Location tag for the request-line surface.
    pub const REQUEST_LOCATION: &'static str = "request";
}
