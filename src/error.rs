//! Error taxonomy for the page codec.
//!
//! Four kinds, matching what the host shim has to distinguish:
//! - `Key`    — key descriptor malformed or missing a secret (attach fails).
//! - `Misuse` — unrecognized option, bad reserve, wrong-direction call.
//! - `Prng`   — the system CSPRNG failed on an encode.
//! - `Codec`  — tag verification failed, or the bootstrap could not
//!              initialize the cipher.
//!
//! Errors are never retried inside the codec; they surface synchronously and
//! the shim maps them to null pointers / status codes for the host. Messages
//! for crypto failures stay deliberately terse.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Key descriptor malformed or missing a secret.
    #[error("codec key is malformed or does not match a registered scheme")]
    Key,

    /// Configuration or calling-convention misuse.
    #[error("{0}")]
    Misuse(String),

    /// The platform CSPRNG failed or returned short.
    #[error("system random generator failed")]
    Prng,

    /// Page authentication or codec bootstrap failure.
    #[error("codec failure: {0}")]
    Codec(&'static str),
}
