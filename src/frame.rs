//! Frame containers.
//!
//! - `RawFrame`: the encoded bytes of one inbound frame. Owned by the call that
//!   decodes it, not `Clone`, zeroized on drop.
//! - `DecodedImage`: the RGB raster produced from a `RawFrame`. Owned by one
//!   orchestration call and shared read-only with that frame's detectors.

use image::RgbImage;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

/// Encoding declared by the sender of a frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ImageEncoding {
    /// No declaration; the codec sniffs the magic bytes.
    #[default]
    Auto,
    Jpeg,
    Png,
}

impl ImageEncoding {
    /// Parse a mime type such as `image/jpeg`. Unknown types fall back to `Auto`.
    pub fn from_mime(mime: &str) -> Self {
        match mime.trim().to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => ImageEncoding::Jpeg,
            "image/png" => ImageEncoding::Png,
            _ => ImageEncoding::Auto,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageEncoding::Auto => "auto",
            ImageEncoding::Jpeg => "jpeg",
            ImageEncoding::Png => "png",
        }
    }
}

// ----------------------------------------------------------------------------
// RawFrame
// ----------------------------------------------------------------------------

/// Encoded bytes of one frame plus the encoding the peer declared.
///
/// There is no `Clone` impl: a frame has exactly one owner, the orchestration
/// call, and is discarded once that call has decoded it.
pub struct RawFrame {
    data: Vec<u8>,
    encoding: ImageEncoding,
}

impl RawFrame {
    pub fn new(data: Vec<u8>, encoding: ImageEncoding) -> Self {
        Self { data, encoding }
    }

    pub fn encoding(&self) -> ImageEncoding {
        self.encoding
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Short hex digest for log correlation. Never log frame bytes.
    pub fn digest(&self) -> String {
        let hash = Sha256::digest(&self.data);
        hex::encode(&hash[..6])
    }
}

impl std::fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawFrame")
            .field("len", &self.data.len())
            .field("encoding", &self.encoding)
            .finish()
    }
}

impl Drop for RawFrame {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}

// ----------------------------------------------------------------------------
// DecodedImage
// ----------------------------------------------------------------------------

/// Decoded raster in RGB8 channel order.
#[derive(Debug)]
pub struct DecodedImage {
    pixels: RgbImage,
}

impl DecodedImage {
    pub fn new(pixels: RgbImage) -> Self {
        Self { pixels }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }
}
