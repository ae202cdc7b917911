//! Content-type registry: file-extension lookup and media-range matching.
//!
//! An explicit collaborator instance rather than a process-wide table, so
//! embedding applications can extend or replace it per router.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Arc;

static SHARED: Lazy<Arc<ContentTypeRegistry>> =
    Lazy::new(|| Arc::new(ContentTypeRegistry::default()));

/// Maps file extensions to content types and resolves wildcard media
/// ranges (`type/*`, `*/subtype`) against them.
#[derive(Debug, Clone)]
pub struct ContentTypeRegistry {
    by_extension: HashMap<String, String>,
}

impl Default for ContentTypeRegistry {
    fn default() -> Self {
        let mut by_extension = HashMap::new();
        for (ext, ct) in [
            ("html", "text/html"),
            ("htm", "text/html"),
            ("css", "text/css"),
            ("js", "application/javascript"),
            ("mjs", "application/javascript"),
            ("json", "application/json"),
            ("txt", "text/plain"),
            ("md", "text/markdown"),
            ("csv", "text/csv"),
            ("xml", "application/xml"),
            ("png", "image/png"),
            ("jpg", "image/jpeg"),
            ("jpeg", "image/jpeg"),
            ("gif", "image/gif"),
            ("svg", "image/svg+xml"),
            ("ico", "image/x-icon"),
            ("pdf", "application/pdf"),
            ("wasm", "application/wasm"),
            ("woff", "font/woff"),
            ("woff2", "font/woff2"),
            ("bin", "application/octet-stream"),
        ] {
            by_extension.insert(ext.to_string(), ct.to_string());
        }
        Self { by_extension }
    }
}

fn extension_of(path: &str) -> Option<&str> {
    let name = path.rsplit('/').next()?;
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext)
}

impl ContentTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide default registry, for entities that do not need a
    /// customised one.
    pub fn shared() -> Arc<ContentTypeRegistry> {
        SHARED.clone()
    }

    /// Register or replace the content type for a file extension.
    pub fn register(&mut self, extension: &str, content_type: &str) {
        self.by_extension
            .insert(extension.to_ascii_lowercase(), content_type.to_string());
    }

    /// Content type for a URL path, by its file extension.
    pub fn by_path(&self, path: &str) -> Option<&str> {
        let ext = extension_of(path)?.to_ascii_lowercase();
        self.by_extension.get(&ext).map(|s| s.as_str())
    }

    /// Resolve a wildcard media range against the registry using the URL
    /// path's extension: `text/*` with `/docs/readme.txt` yields
    /// `text/plain`. A concrete range resolves to itself.
    pub fn resolve(&self, media_range: &str, path: &str) -> Option<String> {
        if !media_range.contains('*') {
            return Some(media_range.to_string());
        }
        let concrete = self.by_path(path)?;
        if media_range_matches(media_range, concrete) {
            Some(concrete.to_string())
        } else {
            None
        }
    }
}

/// Match a media range (`*/*`, `type/*`, `*/subtype`, or concrete) against
/// a concrete media type, case-insensitively.
pub fn media_range_matches(range: &str, concrete: &str) -> bool {
    let Some((rt, rs)) = range.split_once('/') else {
        return false;
    };
    let Some((ct, cs)) = concrete.split_once('/') else {
        return false;
    };
    (rt == "*" || rt.eq_ignore_ascii_case(ct)) && (rs == "*" || rs.eq_ignore_ascii_case(cs))
}
