//! Attachment retrieval.
//!
//! Parts are located through the message's BODYSTRUCTURE, fetched whole
//! under the large read policy and decoded from their transfer encoding.
//! Several parts of one message share a single session.

use mailwire_imap::Session;
use mailwire_imap::parser::BodyPart;
use mailwire_mime::TransferEncoding;
use mailwire_mime::media_type::{self, OCTET_STREAM};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use crate::{Error, Result};

/// A decoded attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedAttachment {
    /// Message UID.
    pub uid: u32,
    /// Part locator.
    pub locator: String,
    /// Filename.
    pub filename: String,
    /// Resolved media type.
    pub media_type: String,
    /// Decoded content.
    pub data: Vec<u8>,
}

impl DownloadedAttachment {
    /// Converts into an attachment for an outgoing message.
    #[must_use]
    pub fn into_outgoing(self) -> mailwire_mime::Attachment {
        mailwire_mime::Attachment::new(self.filename, self.data).with_media_type(self.media_type)
    }
}

/// Decodes part content from its declared transfer encoding.
///
/// Unknown encodings are treated as Base64; content that fails to decode is
/// returned as is.
#[must_use]
pub fn decode_part(raw: &[u8], encoding: &str) -> Vec<u8> {
    match TransferEncoding::from_name(encoding) {
        Some(TransferEncoding::SevenBit | TransferEncoding::EightBit | TransferEncoding::Binary) => {
            raw.to_vec()
        }
        Some(TransferEncoding::QuotedPrintable) => mailwire_mime::encoding::decode_quoted_printable(raw),
        Some(TransferEncoding::Base64) | None => TransferEncoding::Base64
            .decode(raw)
            .unwrap_or_else(|e| {
                warn!(encoding, error = %e, "attachment did not decode, keeping raw bytes");
                raw.to_vec()
            }),
    }
}

/// Media type for downloaded content: extension, then magic bytes, then the
/// declared type, then `application/octet-stream`.
#[must_use]
pub fn resolve_media_type(filename: &str, data: &[u8], declared: &str) -> String {
    match media_type::from_extension(filename) {
        OCTET_STREAM => media_type::resolve(data, Some(declared)),
        by_extension => by_extension.to_string(),
    }
}

/// Fetches the parts at `locators` of message `uid` over one session.
///
/// The outer error covers the structure lookup; each part then succeeds or
/// fails on its own. After a transport error the remaining parts are not
/// attempted.
pub(crate) async fn fetch_parts<S>(
    session: &mut Session<S>,
    uid: u32,
    locators: &[String],
) -> Result<Vec<Result<DownloadedAttachment>>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let structure = session
        .fetch_structure(uid)
        .await
        .map_err(attachment_error)?;

    let mut results = Vec::with_capacity(locators.len());
    let mut broken = None;

    for locator in locators {
        if let Some(reason) = &broken {
            results.push(Err(Error::AttachmentFailed(format!(
                "part {locator} skipped: {reason}"
            ))));
            continue;
        }

        let Some(part) = structure.as_ref().and_then(|s| s.find(locator)) else {
            results.push(Err(Error::AttachmentNotFound {
                uid,
                locator: locator.clone(),
            }));
            continue;
        };

        match session.fetch_part(uid, locator).await {
            Ok(raw) => {
                let attachment = decode(uid, part, &raw);
                debug!(uid, locator = %locator, bytes = attachment.data.len(), "attachment fetched");
                results.push(Ok(attachment));
            }
            Err(e) => {
                if e.is_transport() {
                    broken = Some(e.to_string());
                }
                results.push(Err(attachment_error(e)));
            }
        }
    }

    Ok(results)
}

fn decode(uid: u32, part: &BodyPart, raw: &[u8]) -> DownloadedAttachment {
    let data = decode_part(raw, &part.encoding);
    let filename = part
        .filename()
        .unwrap_or_else(|| format!("attachment-{}", part.locator));
    let media_type = resolve_media_type(&filename, &data, &part.media_type);
    DownloadedAttachment {
        uid,
        locator: part.locator.clone(),
        filename,
        media_type,
        data,
    }
}

/// Transport failures keep their class; refusals become `AttachmentFailed`.
fn attachment_error(e: mailwire_imap::Error) -> Error {
    if e.is_transport() {
        e.into()
    } else {
        Error::AttachmentFailed(e.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_part_encodings() {
        assert_eq!(decode_part(b"SGVs\r\nbG8=", "base64"), b"Hello");
        assert_eq!(decode_part(b"SGVsbG8", "BASE64"), b"Hello");
        assert_eq!(decode_part(b"caf=C3=A9", "quoted-printable"), "café".as_bytes());
        assert_eq!(decode_part(b"raw\r\nbytes", "7bit"), b"raw\r\nbytes");
        assert_eq!(decode_part(b"\x00\x01", "binary"), b"\x00\x01");
    }

    #[test]
    fn test_unknown_encoding_assumed_base64() {
        assert_eq!(decode_part(b"SGVsbG8=", "x-uuencode"), b"Hello");
    }

    #[test]
    fn test_undecodable_kept_raw() {
        assert_eq!(decode_part(b"not base64!!", "base64"), b"not base64!!");
    }

    #[test]
    fn test_media_type_order() {
        // extension wins over sniffed bytes
        assert_eq!(resolve_media_type("notes.txt", b"%PDF-1.7", "application/pdf"), "text/plain");
        // no useful extension: sniff
        assert_eq!(resolve_media_type("scan", b"\x89PNG\r\n\x1a\n....", "application/octet-stream"), "image/png");
        // nothing sniffable: declared
        assert_eq!(resolve_media_type("data.bin", b"....", "Application/X-Custom"), "application/x-custom");
        assert_eq!(resolve_media_type("blob", b"", ""), OCTET_STREAM);
    }
}
