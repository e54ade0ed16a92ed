use std::path::Path;

const MAX_FILENAME_BYTES: usize = 255;
const FALLBACK_FILENAME: &str = "file";

/// Turns a provider-supplied title into a name safe to create inside the data
/// directory. Path components are stripped, reserved and control characters
/// replaced, and the result capped at 255 bytes. Names that end up empty or
/// hidden fall back to `file`.
pub fn sanitize_filename(filename: &str) -> String {
    // Titles may contain either separator; keep only the last component.
    let last = filename.rsplit(['/', '\\']).next().unwrap_or("");
    let name = Path::new(last)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    if name != filename {
        tracing::warn!("Path components stripped from filename: {}", filename);
    }

    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_control()
                || c == ':'
                || c == '*'
                || c == '?'
                || c == '"'
                || c == '<'
                || c == '>'
                || c == '|'
                || c == ';'
            {
                '_'
            } else {
                c
            }
        })
        .collect();
    let sanitized = sanitized.trim().trim_start_matches('.').to_string();

    if sanitized.is_empty() {
        return FALLBACK_FILENAME.to_string();
    }

    // Limit length safely for UTF-8
    if sanitized.len() > MAX_FILENAME_BYTES {
        let mut end = MAX_FILENAME_BYTES;
        while !sanitized.is_char_boundary(end) {
            end -= 1;
        }
        sanitized[..end].to_string()
    } else {
        sanitized
    }
}
