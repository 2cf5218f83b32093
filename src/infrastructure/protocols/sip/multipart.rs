//! Multipart body handling for SIPREC offers
//!
//! A SIPREC INVITE carries a `multipart/mixed` body with an SDP part and a
//! recording metadata part.

use bytes::Bytes;

/// Marker every admitted recording offer's Content-Type contains
pub const MULTIPART_MIXED: &str = "multipart/mixed";

/// One MIME part
#[derive(Debug, Clone, PartialEq)]
pub struct MimePart {
    pub content_type: Option<String>,
    pub content: Bytes,
}

/// Case-insensitive check for the multipart indicator
pub fn is_multipart(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains(MULTIPART_MIXED)
}

/// Extract the `boundary` parameter of a Content-Type value
pub fn boundary(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if name.trim().eq_ignore_ascii_case("boundary") {
            Some(value.trim().trim_matches('"').to_string())
        } else {
            None
        }
    })
}

/// Split a multipart body into its parts
pub fn parse_parts(body: &[u8], boundary: &str) -> Vec<MimePart> {
    let text = String::from_utf8_lossy(body);
    let delimiter = format!("--{}", boundary);
    let mut parts = Vec::new();

    for chunk in text.split(delimiter.as_str()).skip(1) {
        // The closing delimiter is followed by "--"
        if chunk.starts_with("--") {
            break;
        }
        let chunk = chunk.trim_start_matches("\r\n").trim_start_matches('\n');
        let (head, content) = match chunk.split_once("\r\n\r\n") {
            Some(split) => split,
            None => match chunk.split_once("\n\n") {
                Some(split) => split,
                None => ("", chunk),
            },
        };

        let content_type = head.lines().find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.trim().eq_ignore_ascii_case("Content-Type") {
                Some(value.trim().to_string())
            } else {
                None
            }
        });

        let content = content
            .strip_suffix("\r\n")
            .or_else(|| content.strip_suffix('\n'))
            .unwrap_or(content);

        parts.push(MimePart {
            content_type,
            content: Bytes::from(content.to_string()),
        });
    }

    parts
}

/// The first part whose Content-Type starts with `wanted`
pub fn find_part(body: &[u8], content_type: &str, wanted: &str) -> Option<MimePart> {
    let boundary = boundary(content_type)?;
    parse_parts(body, &boundary).into_iter().find(|part| {
        part.content_type
            .as_deref()
            .map(|ct| ct.to_ascii_lowercase().starts_with(wanted))
            .unwrap_or(false)
    })
}
