//! key — key-descriptor parsing.
//!
//! A descriptor is an opaque byte string `scheme:options:secret`, split
//! literally: the first `:` ends the scheme, the last `:` starts the secret.
//! Everything between is the option list (comma-separated tokens). The
//! parser is dumb on purpose — it only tokenizes; validating the option set
//! is the scheme constructor's job.

use crate::error::{Error, Result};

/// Borrowed view of a parsed key descriptor.
#[derive(Debug, Clone, Copy)]
pub struct ParsedKey<'a> {
    pub scheme: &'a [u8],
    pub options: &'a [u8],
    pub secret: &'a [u8],
}

/// Split a descriptor on its first and last `:`.
///
/// Fails with `Error::Key` when either separator is missing (fewer than two
/// colons) or the secret is empty.
pub fn parse_key(key: &[u8]) -> Result<ParsedKey<'_>> {
    let first = key.iter().position(|&b| b == b':').ok_or(Error::Key)?;
    let last = key.iter().rposition(|&b| b == b':').ok_or(Error::Key)?;
    if last == first {
        // Only one separator: no options field at all.
        return Err(Error::Key);
    }
    let secret = &key[last + 1..];
    if secret.is_empty() {
        return Err(Error::Key);
    }
    Ok(ParsedKey {
        scheme: &key[..first],
        options: &key[first + 1..last],
        secret,
    })
}

/// Iterate non-empty comma-separated option tokens.
pub fn split_options(options: &[u8]) -> impl Iterator<Item = &[u8]> {
    options.split(|&b| b == b',').filter(|t| !t.is_empty())
}

/// Scheme prefix of a raw descriptor (bytes before the first `:`), used for
/// registry lookup before any full parse happens.
pub fn scheme_of(key: &[u8]) -> Option<&[u8]> {
    key.iter().position(|&b| b == b':').map(|i| &key[..i])
}
