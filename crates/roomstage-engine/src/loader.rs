use anyhow::{bail, Context};
use reqwest::blocking::Client as HttpClient;
use roomstage_contracts::images::{decode_data_uri, ImageReference};
use sha2::{Digest, Sha256};

/// Resolves image references to bytes before any provider sees them.
#[derive(Debug, Clone)]
pub struct ImageLoader {
    http: HttpClient,
}

impl ImageLoader {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    pub fn load(&self, image: &ImageReference) -> anyhow::Result<Vec<u8>> {
        let bytes = match image {
            ImageReference::Bytes(bytes) => bytes.clone(),
            ImageReference::DataUri(uri) => decode_data_uri(uri)?,
            ImageReference::Url(url) => self.download(url)?,
        };
        if bytes.is_empty() {
            bail!("image is empty");
        }
        Ok(bytes)
    }

    fn download(&self, url: &str) -> anyhow::Result<Vec<u8>> {
        let response = self
            .http
            .get(url)
            .send()
            .with_context(|| format!("image download failed ({url})"))?;
        let status = response.status();
        if !status.is_success() {
            bail!("image download failed ({url}): HTTP {}", status.as_u16());
        }
        let bytes = response
            .bytes()
            .with_context(|| format!("image download body read failed ({url})"))?;
        Ok(bytes.to_vec())
    }
}

/// Short content fingerprint for logs: the first 8 bytes of the SHA-256
/// digest, hex encoded.
pub fn fingerprint(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(&digest[..8])
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use roomstage_contracts::images::data_uri_from_bytes;

    use super::*;
    use crate::providers::http_client;

    fn loader() -> anyhow::Result<ImageLoader> {
        Ok(ImageLoader::new(http_client(Duration::from_secs(1))?))
    }

    #[test]
    fn bytes_and_data_uris_load_without_network() -> anyhow::Result<()> {
        let loader = loader()?;
        let raw = vec![0xFF, 0xD8, 0xFF, 0xE0, 1, 2, 3];
        assert_eq!(loader.load(&ImageReference::from_bytes(raw.clone()))?, raw);
        let uri = ImageReference::DataUri(data_uri_from_bytes(&raw));
        assert_eq!(loader.load(&uri)?, raw);
        Ok(())
    }

    #[test]
    fn broken_references_fail_to_load() -> anyhow::Result<()> {
        let loader = loader()?;
        assert!(loader
            .load(&ImageReference::DataUri("data:image/png;base64,%%%".to_string()))
            .is_err());
        assert!(loader
            .load(&ImageReference::DataUri("data:image/png;base64,".to_string()))
            .is_err());
        assert!(loader.load(&ImageReference::from_bytes(Vec::new())).is_err());
        Ok(())
    }

    #[test]
    fn fingerprint_is_stable_and_short() {
        let first = fingerprint(b"room photo");
        assert_eq!(first.len(), 16);
        assert_eq!(first, fingerprint(b"room photo"));
        assert_ne!(first, fingerprint(b"another photo"));
        assert_eq!(fingerprint(b""), "e3b0c44298fc1c14");
    }
}
