//! Frame codec.
//!
//! Turns inbound connection messages into `RawFrame`s and `RawFrame`s into
//! `DecodedImage`s. Each deployment picks one canonical inbound format; the
//! codec never guesses between binary and JSON envelopes.

use std::str::FromStr;

use anyhow::anyhow;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::ImageFormat;
use serde::Deserialize;
use thiserror::Error;

use crate::error::{DecodeError, ProtocolViolation};
use crate::frame::{DecodedImage, ImageEncoding, RawFrame};

/// One message received over the persistent connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundMessage {
    Binary(Vec<u8>),
    Text(String),
    Close,
}

impl InboundMessage {
    fn kind(&self) -> &'static str {
        match self {
            InboundMessage::Binary(_) => "binary",
            InboundMessage::Text(_) => "text",
            InboundMessage::Close => "close",
        }
    }
}

/// Canonical inbound frame encoding for a deployment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InboundFormat {
    /// Each binary message carries one encoded image.
    #[default]
    Binary,
    /// Each text message is `{"frame": "<base64>"}`, optionally `data:` prefixed.
    JsonBase64,
}

impl FromStr for InboundFormat {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "binary" => Ok(InboundFormat::Binary),
            "json_base64" | "json" => Ok(InboundFormat::JsonBase64),
            other => Err(anyhow!(
                "unknown inbound format '{}'; expected binary or json_base64",
                other
            )),
        }
    }
}

/// Why an inbound message did not yield a frame.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InboundError {
    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

#[derive(Deserialize)]
struct FrameEnvelope {
    frame: String,
}

/// Extract the frame carried by one inbound message.
///
/// `Close` is not a frame; callers handle it before calling this.
pub fn frame_from_message(
    message: InboundMessage,
    format: InboundFormat,
    max_frame_bytes: usize,
) -> Result<RawFrame, InboundError> {
    match (format, message) {
        (InboundFormat::Binary, InboundMessage::Binary(bytes)) => {
            check_size(bytes.len(), max_frame_bytes)?;
            Ok(RawFrame::new(bytes, ImageEncoding::Auto))
        }
        (InboundFormat::JsonBase64, InboundMessage::Text(text)) => {
            parse_envelope(&text, max_frame_bytes)
        }
        (format, other) => Err(ProtocolViolation::UnexpectedMessageKind {
            expected: match format {
                InboundFormat::Binary => "binary",
                InboundFormat::JsonBase64 => "text",
            },
            got: other.kind(),
        }
        .into()),
    }
}

fn parse_envelope(text: &str, max_frame_bytes: usize) -> Result<RawFrame, InboundError> {
    let envelope: FrameEnvelope = serde_json::from_str(text)
        .map_err(|e| ProtocolViolation::MalformedEnvelope(e.to_string()))?;

    let (encoding, payload) = split_data_url(&envelope.frame);
    let payload = payload.trim();

    // Reject before allocating when the encoded length already implies an oversized frame.
    let estimated = payload.len() / 4 * 3;
    check_size(estimated.saturating_sub(2), max_frame_bytes)?;

    let bytes = STANDARD
        .decode(payload)
        .map_err(|e| DecodeError::InvalidBase64(e.to_string()))?;
    check_size(bytes.len(), max_frame_bytes)?;
    Ok(RawFrame::new(bytes, encoding))
}

/// Split `data:<mime>;base64,<payload>` into its declared encoding and payload.
fn split_data_url(frame: &str) -> (ImageEncoding, &str) {
    let Some(rest) = frame.strip_prefix("data:") else {
        return (ImageEncoding::Auto, frame);
    };
    match rest.split_once(',') {
        Some((header, payload)) => {
            let mime = header.split(';').next().unwrap_or_default();
            (ImageEncoding::from_mime(mime), payload)
        }
        None => (ImageEncoding::Auto, rest),
    }
}

fn check_size(size: usize, limit: usize) -> Result<(), ProtocolViolation> {
    if size > limit {
        return Err(ProtocolViolation::FrameTooLarge { size, limit });
    }
    Ok(())
}

/// Decode a frame into an RGB raster at its native size.
pub fn decode(raw: &RawFrame) -> Result<DecodedImage, DecodeError> {
    let bytes = raw.bytes();
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }

    let actual = match image::guess_format(bytes) {
        Ok(ImageFormat::Jpeg) => ImageEncoding::Jpeg,
        Ok(ImageFormat::Png) => ImageEncoding::Png,
        _ => return Err(DecodeError::UnrecognizedEncoding),
    };
    let declared = raw.encoding();
    if declared != ImageEncoding::Auto && declared != actual {
        return Err(DecodeError::EncodingMismatch {
            declared: declared.as_str(),
            actual: actual.as_str(),
        });
    }

    let format = match actual {
        ImageEncoding::Png => ImageFormat::Png,
        _ => ImageFormat::Jpeg,
    };
    let image = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| DecodeError::Malformed(e.to_string()))?;
    Ok(DecodedImage::new(image.to_rgb8()))
}
