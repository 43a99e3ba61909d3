use std::fmt;

use anyhow::{bail, Context};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

const DEFAULT_MIME: &str = "image/jpeg";

/// A room image in whichever representation the caller happens to hold.
///
/// Providers only ever see bytes; URL and data URI references are resolved
/// by a single fetch step before dispatch. When serialized, every variant
/// becomes a displayable string (raw bytes are wrapped in a data URI).
#[derive(Clone, PartialEq, Eq)]
pub enum ImageReference {
    Bytes(Vec<u8>),
    Url(String),
    DataUri(String),
}

impl ImageReference {
    /// Classifies a textual reference. Returns `None` for anything that is
    /// neither an `http(s)` URL nor an inline `data:image` URI.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.starts_with("data:image") {
            return Some(Self::DataUri(trimmed.to_string()));
        }
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            return Some(Self::Url(trimmed.to_string()));
        }
        None
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(bytes.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bytes(_) => "bytes",
            Self::Url(_) => "url",
            Self::DataUri(_) => "data_uri",
        }
    }

    /// String form usable by a browser `<img src>`.
    pub fn to_display_string(&self) -> String {
        match self {
            Self::Bytes(bytes) => data_uri_from_bytes(bytes),
            Self::Url(url) => url.clone(),
            Self::DataUri(uri) => uri.clone(),
        }
    }
}

impl fmt::Debug for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            Self::Url(url) => f.debug_tuple("Url").field(url).finish(),
            Self::DataUri(uri) => write!(f, "DataUri({} chars)", uri.len()),
        }
    }
}

impl Serialize for ImageReference {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_display_string())
    }
}

impl<'de> Deserialize<'de> for ImageReference {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).ok_or_else(|| {
            serde::de::Error::custom("image reference must be an http(s) URL or a data:image URI")
        })
    }
}

/// Best-effort MIME sniffing from magic bytes; unknown payloads are assumed JPEG.
pub fn mime_for_bytes(bytes: &[u8]) -> &'static str {
    image::guess_format(bytes)
        .map(|format| format.to_mime_type())
        .unwrap_or(DEFAULT_MIME)
}

pub fn data_uri_from_bytes(bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime_for_bytes(bytes), BASE64.encode(bytes))
}

/// Decodes the payload of a `data:<mime>;base64,<payload>` URI.
pub fn decode_data_uri(uri: &str) -> anyhow::Result<Vec<u8>> {
    let Some((header, payload)) = uri.trim().split_once(',') else {
        bail!("data URI has no payload separator");
    };
    if !header.starts_with("data:") {
        bail!("not a data URI");
    }
    let payload = payload.trim();
    if payload.is_empty() {
        bail!("data URI payload is empty");
    }
    BASE64
        .decode(payload.as_bytes())
        .context("data URI base64 decode failed")
}
