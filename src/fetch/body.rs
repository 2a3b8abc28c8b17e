//! Bounded body reading and charset decoding

use bytes::Bytes;
use encoding_rs::{Encoding, UTF_8};
use futures::{pin_mut, Stream, StreamExt};

/// Why a body could not be read
#[derive(Debug)]
pub(crate) enum BodyError<E> {
    /// The next chunk would have pushed the body past the cap
    TooLarge,

    /// The underlying stream failed
    Stream(E),
}

/// Collects a chunked body, refusing to hold more than `max_bytes`
///
/// The check happens before a chunk is appended, so at most `max_bytes` of
/// body plus the one offending chunk are ever in memory.
pub(crate) async fn read_capped<S, E>(stream: S, max_bytes: usize) -> Result<Vec<u8>, BodyError<E>>
where
    S: Stream<Item = Result<Bytes, E>>,
{
    pin_mut!(stream);

    let mut body = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(BodyError::Stream)?;
        if body.len() + chunk.len() > max_bytes {
            return Err(BodyError::TooLarge);
        }
        body.extend_from_slice(&chunk);
    }

    Ok(body)
}

/// Extracts the `charset` parameter from a Content-Type value
pub(crate) fn charset_from_content_type(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if name.trim().eq_ignore_ascii_case("charset") {
            Some(value.trim().trim_matches('"'))
        } else {
            None
        }
    })
}

/// Decodes a body with the declared charset, falling back to UTF-8
///
/// Malformed sequences become U+FFFD. A byte order mark overrides the
/// declared charset.
pub(crate) fn decode_text(body: &[u8], content_type: Option<&str>) -> String {
    let encoding = content_type
        .and_then(charset_from_content_type)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(UTF_8);

    let (text, _, _) = encoding.decode(body);
    text.into_owned()
}
