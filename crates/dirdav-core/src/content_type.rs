//! MIME type inference and `Accept` negotiation.

/// Infer a MIME type from a file name's extension.
///
/// Returns `None` for names without a known extension.
pub fn infer(name: &str) -> Option<&'static str> {
    let (_, ext) = name.rsplit_once('.')?;
    let mime = match ext.to_ascii_lowercase().as_str() {
        "txt" | "text" | "log" => "text/plain",
        "htm" | "html" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",
        "md" | "markdown" => "text/markdown",
        "xml" => "application/xml",
        "js" | "mjs" => "text/javascript",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "ico" => "image/vnd.microsoft.icon",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "bin" => "application/octet-stream",
        _ => return None,
    };
    Some(mime)
}

/// Pick the content type to report for `name` given an `Accept` value.
///
/// With no `Accept` value the inferred type is returned as is. Otherwise the
/// inferred type is returned only if some range in `accepts` admits it;
/// ranges with `q=0` never match.
pub fn negotiate(name: &str, accepts: Option<&str>) -> Option<String> {
    let inferred = infer(name)?;
    let Some(accepts) = accepts else {
        return Some(inferred.to_string());
    };

    let (major, _) = inferred.split_once('/')?;
    accepts
        .split(',')
        .filter_map(parse_range)
        .any(|range| {
            range == "*/*"
                || range.eq_ignore_ascii_case(inferred)
                || range
                    .strip_suffix("/*")
                    .is_some_and(|m| m.eq_ignore_ascii_case(major))
        })
        .then(|| inferred.to_string())
}

/// The media range of one `Accept` element, or `None` if it is refused.
fn parse_range(element: &str) -> Option<&str> {
    let mut parts = element.split(';').map(str::trim);
    let range = parts.next().filter(|r| !r.is_empty())?;
    for param in parts {
        if let Some(q) = param.strip_prefix("q=")
            && q.parse::<f32>().is_ok_and(|q| q <= 0.0)
        {
            return None;
        }
    }
    Some(range)
}
