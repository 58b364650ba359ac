//! XML text utilities for descriptor and geometry payloads
//!
//! XML embedded in ADARA packets is word padded and occasionally carries stray
//! control characters from the publishing IOC. This module cleans the text
//! without parsing it.

use crate::{ListenerError, Result};

/// Decode a possibly null-terminated byte run as UTF-8, replacing invalid sequences.
pub fn extract_null_terminated(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Strip control characters (except newline, carriage return and tab) from XML text.
///
/// Returns an error if nothing but whitespace remains.
pub fn sanitize_xml(xml: &str, context: &str) -> Result<String> {
    let cleaned: String = xml
        .chars()
        .filter(|ch| !matches!(ch, '\x00'..='\x08' | '\x0B'..='\x0C' | '\x0E'..='\x1F'))
        .collect();

    if cleaned.trim().is_empty() {
        return Err(ListenerError::parse(context, "XML is empty after cleaning"));
    }

    Ok(cleaned)
}
