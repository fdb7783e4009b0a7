//! Validation and encoding of cache path components
//!
//! Package names and revisions end up as file names under the cache root,
//! so anything that could escape the root or collide with the cache's own
//! bookkeeping directories is rejected here.

use crate::{Error, Result};

/// Check that `value` can be used as part of a cache file name.
///
/// Rejects empty strings, `.`/`..`, leading dots (reserved for
/// `.locks` and `.staging`), backslashes and NUL bytes. Forward slashes are
/// allowed because scoped package names contain one; they are encoded by
/// [`encode_component`].
pub fn validate_path_identifier(value: &str) -> Result<()> {
    let reason = if value.is_empty() {
        Some("must not be empty")
    } else if value.starts_with('.') {
        Some("must not start with '.'")
    } else if value.contains('\\') {
        Some("must not contain '\\'")
    } else if value.contains('\0') {
        Some("must not contain NUL")
    } else if value.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
        Some("must not contain empty or relative segments")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(Error::InvalidIdentifier {
            value: value.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

/// Validate `value` and encode it into a single file name component.
///
/// `%` becomes `%25` and `/` becomes `%2f`, so a single component maps
/// injectively: `@scope/pkg` and `@scope%2fpkg` never encode alike. Joined
/// stems are not injective; see [`entry_stem`](crate::entry_stem).
pub fn encode_component(value: &str) -> Result<String> {
    validate_path_identifier(value)?;
    Ok(value.replace('%', "%25").replace('/', "%2f"))
}
