use std::path::Path;

const KB: f64 = 1024.0;
const MB: f64 = 1024.0 * 1024.0;

/// Size as shown in listings: MB once the file reaches one megabyte, KB otherwise.
pub fn listing_size(bytes: u64) -> String {
    let kb = bytes as f64 / KB;
    let mb = kb / KB;
    if mb >= 1.0 {
        format!("{:.2} MB", mb)
    } else {
        format!("{:.2} KB", kb)
    }
}

/// Size as shown after an upload. Small files stay in bytes and an unknown
/// size is reported literally.
pub fn upload_size(bytes: Option<u64>) -> String {
    match bytes {
        Some(b) if b as f64 > MB => format!("{:.2} MB", b as f64 / MB),
        Some(b) if b as f64 > KB => format!("{:.2} KB", b as f64 / KB),
        Some(b) => format!("{} bytes", b),
        None => "unknown bytes".to_string(),
    }
}

/// Guesses a MIME type from a local file's extension.
pub fn infer_mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("txt") => "text/plain",
        Some("html") => "text/html",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("pdf") => "application/pdf",
        Some("doc") => "application/msword",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => "application/octet-stream",
    }
}

/// Escapes a value for use inside a single-quoted Drive query literal.
pub fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Joins the optional Drive search constraints with `and`.
///
/// Returns `None` when no constraint was given so the request lists everything.
pub fn build_files_query(
    folder_id: Option<&str>,
    mime_type: Option<&str>,
    name_contains: Option<&str>,
) -> Option<String> {
    let mut clauses = Vec::new();

    if let Some(folder) = folder_id.filter(|f| !f.is_empty()) {
        clauses.push(format!("'{}' in parents", escape_query_value(folder)));
    }
    if let Some(mime) = mime_type.filter(|m| !m.is_empty()) {
        clauses.push(format!("mimeType='{}'", escape_query_value(mime)));
    }
    if let Some(name) = name_contains.filter(|n| !n.is_empty()) {
        clauses.push(format!("name contains '{}'", escape_query_value(name)));
    }

    if clauses.is_empty() {
        None
    } else {
        Some(clauses.join(" and "))
    }
}
