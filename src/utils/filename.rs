use sha2::{Digest, Sha256};
use url::Url;

/// Extension used when the URL's last segment has none.
pub const DEFAULT_EXTENSION: &str = "jpg";

/// Derive the local filename for an image URL.
///
/// The last path segment is kept as-is when it has an extension, otherwise
/// `.jpg` is appended. URLs that don't parse or end in `/` get a name built
/// from a hash of the URL.
pub fn derive_filename(url: &str) -> String {
    let base = Url::parse(url).ok().and_then(|parsed| {
        parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
    });

    match base {
        Some(name) if name.contains('.') => name,
        Some(name) => format!("{}.{}", name, DEFAULT_EXTENSION),
        None => fallback_filename(url),
    }
}

/// Name derived only from a hash of the URL
pub fn fallback_filename(url: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(url.as_bytes()));
    format!("url-{}.{}", &digest[..16], DEFAULT_EXTENSION)
}
