//! URL to cache filename derivation

use sha2::{Digest, Sha256};
use url::Url;

/// Longest extension carried over from the URL path onto the filename.
const MAX_EXTENSION_LEN: usize = 5;

/// Derive the on-disk filename for a source URL.
///
/// The stem is the hex SHA-256 of the URL string itself, so the mapping is
/// stable across processes. When the URL path ends in a short alphanumeric
/// extension it is appended (lowercased) as a content-type hint. Strings that
/// do not parse as URLs still hash; they just get no extension.
pub fn derive_filename(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let stem = hex::encode(hasher.finalize());

    match extension_of(url) {
        Some(ext) => format!("{}.{}", stem, ext),
        None => stem,
    }
}

fn extension_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let last_segment = parsed.path_segments()?.next_back()?;
    let (_, ext) = last_segment.rsplit_once('.')?;

    if ext.is_empty()
        || ext.len() > MAX_EXTENSION_LEN
        || !ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }

    Some(ext.to_ascii_lowercase())
}
