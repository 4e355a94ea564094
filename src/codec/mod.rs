//! Content codecs.
//!
//! A codec turns request bytes of one media type into a [`TreeValue`] and back.
//! Only JSON is registered. Bodies whose media type has no codec are never
//! passed through: the caller replaces them with an empty body.

mod json;

pub use json::JsonCodec;

use crate::models::TreeValue;
use thiserror::Error;

/// Underlying parser or serializer error of a codec.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while decoding or encoding a body.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The body is not valid for its declared media type.
    #[error("malformed {media_type} body: {source}")]
    Decode {
        /// Declared media type.
        media_type: &'static str,
        /// Parser error.
        #[source]
        source: BoxError,
    },

    /// The redacted tree could not be serialized.
    #[error("failed to encode {media_type} body: {source}")]
    Encode {
        /// Target media type.
        media_type: &'static str,
        /// Serializer error.
        #[source]
        source: BoxError,
    },
}

/// A structured text encoding.
pub trait ContentCodec: Send + Sync {
    /// Lowercase media type handled by this codec, without parameters.
    fn media_type(&self) -> &'static str;

    /// Decodes raw bytes into a tree.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Decode`] for malformed input.
    fn decode(&self, bytes: &[u8]) -> Result<TreeValue, CodecError>;

    /// Encodes a tree deterministically.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] if serialization fails.
    fn encode(&self, value: &TreeValue) -> Result<Vec<u8>, CodecError>;
}

static JSON: JsonCodec = JsonCodec;

static CODECS: &[&dyn ContentCodec] = &[&JSON];

/// Strips parameters (`; charset=...`) and surrounding whitespace from a
/// `Content-Type` header value.
#[must_use]
pub fn media_type(content_type: &str) -> &str {
    content_type
        .split_once(';')
        .map_or(content_type, |(media, _)| media)
        .trim()
}

/// Finds the codec for a `Content-Type` header value.
///
/// Comparison ignores case and parameters. Returns `None` for an empty or
/// unrecognized media type.
#[must_use]
pub fn codec_for(content_type: &str) -> Option<&'static dyn ContentCodec> {
    let media = media_type(content_type);
    if media.is_empty() {
        return None;
    }
    CODECS
        .iter()
        .copied()
        .find(|codec| codec.media_type().eq_ignore_ascii_case(media))
}
