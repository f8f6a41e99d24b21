use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

/// Only the leading bytes are needed for dimension sniffing.
const RANGE_HEADER: &str = "bytes=0-32767";

/// Probe result for one image URL referenced by page metadata.
///
/// An unreachable image is a finding, not a failure: every field besides
/// `url` and `reachable` stays `None` when the probe fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub url: String,
    pub reachable: bool,
    pub content_type: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub size_bytes: Option<u64>,
}

impl ImageInfo {
    pub fn unreachable(url: String) -> Self {
        Self {
            url,
            reachable: false,
            content_type: None,
            width: None,
            height: None,
            size_bytes: None,
        }
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match (self.width, self.height) {
            (Some(w), Some(h)) => Some((w, h)),
            _ => None,
        }
    }
}

/// Resolves a possibly-relative image reference against the page base,
/// dropping any fragment.
pub fn resolve_image_url(base: &Url, raw: &str) -> Option<Url> {
    let mut resolved = base.join(raw.trim()).ok()?;
    resolved.set_fragment(None);
    Some(resolved)
}

/// Probes one image URL: HEAD first, ranged GET when HEAD is unsupported
/// or when dimensions are wanted. Never returns an error - unreachability
/// is recorded in the result.
pub async fn fetch_image_info(client: &Client, base_url: &Url, raw_url: &str) -> ImageInfo {
    let Some(url) = resolve_image_url(base_url, raw_url) else {
        debug!("Unresolvable image reference: {}", raw_url);
        return ImageInfo::unreachable(raw_url.to_string());
    };

    match client.head(url.clone()).send().await {
        Ok(response) if response.status().is_success() => {
            let content_type = header_string(&response, "content-type");
            let size_bytes = response
                .headers()
                .get("content-length")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());

            let mut info = ImageInfo {
                url: url.to_string(),
                reachable: true,
                content_type,
                width: None,
                height: None,
                size_bytes,
            };

            // HEAD carries no body, so dimensions need a ranged GET.
            let looks_like_image = info
                .content_type
                .as_deref()
                .map(|ct| ct.starts_with("image/"))
                .unwrap_or(true);
            if looks_like_image
                && let Some((width, height)) = ranged_dimensions(client, &url).await
            {
                info.width = Some(width);
                info.height = Some(height);
            }
            info
        }
        Ok(response)
            if response.status().as_u16() == 405 || response.status().as_u16() == 501 =>
        {
            debug!("HEAD unsupported for {}, using ranged GET", url);
            ranged_probe(client, &url).await
        }
        Ok(response) => {
            debug!("Image {} answered {}", url, response.status());
            ImageInfo::unreachable(url.to_string())
        }
        Err(e) => {
            debug!("HEAD for {} failed ({}), using ranged GET", url, e);
            ranged_probe(client, &url).await
        }
    }
}

fn header_string(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
}

async fn ranged_dimensions(client: &Client, url: &Url) -> Option<(u32, u32)> {
    let response = client
        .get(url.clone())
        .header("range", RANGE_HEADER)
        .send()
        .await
        .ok()?;
    if !response.status().is_success() {
        return None;
    }
    let bytes = response.bytes().await.ok()?;
    sniff_dimensions(&bytes)
}

/// Full probe via ranged GET, used when HEAD cannot answer.
async fn ranged_probe(client: &Client, url: &Url) -> ImageInfo {
    let response = match client
        .get(url.clone())
        .header("range", RANGE_HEADER)
        .send()
        .await
    {
        Ok(response) if response.status().is_success() => response,
        Ok(response) => {
            debug!("Ranged GET for {} answered {}", url, response.status());
            return ImageInfo::unreachable(url.to_string());
        }
        Err(e) => {
            debug!("Ranged GET for {} failed: {}", url, e);
            return ImageInfo::unreachable(url.to_string());
        }
    };

    let content_type = header_string(&response, "content-type");

    // Prefer the total from Content-Range; a server ignoring the range
    // answers 200 with the full length instead.
    let size_bytes = response
        .headers()
        .get("content-range")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.rsplit('/').next())
        .and_then(|total| total.parse::<u64>().ok())
        .or_else(|| {
            if response.status().as_u16() == 200 {
                response.content_length()
            } else {
                None
            }
        });

    let dimensions = response
        .bytes()
        .await
        .ok()
        .and_then(|bytes| sniff_dimensions(&bytes));

    ImageInfo {
        url: url.to_string(),
        reachable: true,
        content_type,
        width: dimensions.map(|(w, _)| w),
        height: dimensions.map(|(_, h)| h),
        size_bytes,
    }
}

/// Reads dimensions from the fixed header fields of common web image
/// formats. No decoding; unknown formats yield `None`.
fn sniff_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    png_dimensions(bytes)
        .or_else(|| gif_dimensions(bytes))
        .or_else(|| jpeg_dimensions(bytes))
        .or_else(|| webp_dimensions(bytes))
}

fn png_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    const SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    if bytes.len() < 24 || bytes[..8] != SIGNATURE || &bytes[12..16] != b"IHDR" {
        return None;
    }
    let width = u32::from_be_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);
    let height = u32::from_be_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]);
    Some((width, height))
}

fn gif_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    if bytes.len() < 10 || (!bytes.starts_with(b"GIF87a") && !bytes.starts_with(b"GIF89a")) {
        return None;
    }
    let width = u16::from_le_bytes([bytes[6], bytes[7]]) as u32;
    let height = u16::from_le_bytes([bytes[8], bytes[9]]) as u32;
    Some((width, height))
}

fn jpeg_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    if bytes.len() < 4 || bytes[0] != 0xFF || bytes[1] != 0xD8 {
        return None;
    }
    let mut i = 2;
    while i + 9 <= bytes.len() {
        if bytes[i] != 0xFF {
            i += 1;
            continue;
        }
        let marker = bytes[i + 1];
        if marker == 0xFF {
            i += 1;
            continue;
        }
        // Start-of-frame markers carry the dimensions; C4/C8/CC do not.
        if (0xC0..=0xCF).contains(&marker) && ![0xC4, 0xC8, 0xCC].contains(&marker) {
            let height = u16::from_be_bytes([bytes[i + 5], bytes[i + 6]]) as u32;
            let width = u16::from_be_bytes([bytes[i + 7], bytes[i + 8]]) as u32;
            return Some((width, height));
        }
        let length = u16::from_be_bytes([bytes[i + 2], bytes[i + 3]]) as usize;
        i += 2 + length;
    }
    None
}

fn webp_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    if bytes.len() < 30
        || !bytes.starts_with(b"RIFF")
        || &bytes[8..12] != b"WEBP"
        || &bytes[12..16] != b"VP8X"
    {
        return None;
    }
    let width = 1 + u32::from_le_bytes([bytes[24], bytes[25], bytes[26], 0]);
    let height = 1 + u32::from_le_bytes([bytes[27], bytes[28], bytes[29], 0]);
    Some((width, height))
}

type Slot = Arc<Mutex<Option<ImageInfo>>>;

/// Per-run image probe cache with at-most-once-per-URL semantics.
///
/// The first requester for a URL performs the fetch while holding that
/// entry's lock; concurrent requesters for the same URL await the same
/// slot and reuse the stored result instead of issuing a duplicate
/// request.
#[derive(Default)]
pub struct ImageCache {
    entries: Mutex<HashMap<String, Slot>>,
}

impl ImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_fetch(&self, client: &Client, base_url: &Url, raw_url: &str) -> ImageInfo {
        let key = resolve_image_url(base_url, raw_url)
            .map(|u| u.to_string())
            .unwrap_or_else(|| raw_url.to_string());

        let slot = {
            let mut entries = self.entries.lock().await;
            entries.entry(key).or_default().clone()
        };

        let mut guard = slot.lock().await;
        if let Some(info) = guard.as_ref() {
            return info.clone();
        }

        let info = fetch_image_info(client, base_url, raw_url).await;
        *guard = Some(info.clone());
        info
    }

    pub async fn probed_count(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::build_http_client;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        bytes.extend_from_slice(&13u32.to_be_bytes());
        bytes.extend_from_slice(b"IHDR");
        bytes.extend_from_slice(&width.to_be_bytes());
        bytes.extend_from_slice(&height.to_be_bytes());
        bytes.extend_from_slice(&[8, 6, 0, 0, 0]);
        bytes
    }

    #[test]
    fn sniffs_png_header() {
        assert_eq!(sniff_dimensions(&png_bytes(1200, 630)), Some((1200, 630)));
    }

    #[test]
    fn sniffs_gif_header() {
        let mut bytes = b"GIF89a".to_vec();
        bytes.extend_from_slice(&400u16.to_le_bytes());
        bytes.extend_from_slice(&300u16.to_le_bytes());
        assert_eq!(sniff_dimensions(&bytes), Some((400, 300)));
    }

    #[test]
    fn sniffs_jpeg_sof_marker() {
        let mut bytes = vec![0xFF, 0xD8];
        // APP0 segment, 16 bytes including the length field.
        bytes.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x10]);
        bytes.extend_from_slice(&[0u8; 14]);
        // SOF0: length, precision, height, width.
        bytes.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x11, 0x08]);
        bytes.extend_from_slice(&630u16.to_be_bytes());
        bytes.extend_from_slice(&1200u16.to_be_bytes());
        bytes.extend_from_slice(&[0u8; 10]);
        assert_eq!(sniff_dimensions(&bytes), Some((1200, 630)));
    }

    #[test]
    fn unknown_bytes_yield_no_dimensions() {
        assert_eq!(sniff_dimensions(b"not an image at all"), None);
    }

    #[test]
    fn resolves_relative_references() {
        let base = Url::parse("http://localhost:3000/blog/post").unwrap();
        let resolved = resolve_image_url(&base, "/og/card.png#frag").unwrap();
        assert_eq!(resolved.as_str(), "http://localhost:3000/og/card.png");

        let absolute = resolve_image_url(&base, "https://cdn.example.com/x.png").unwrap();
        assert_eq!(absolute.as_str(), "https://cdn.example.com/x.png");
    }

    #[tokio::test]
    async fn head_probe_collects_metadata() {
        let mock_server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/card.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .insert_header("content-length", "4096"),
            )
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/card.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(png_bytes(1200, 630)),
            )
            .mount(&mock_server)
            .await;

        let client = build_http_client().unwrap();
        let base = Url::parse(&mock_server.uri()).unwrap();
        let info = fetch_image_info(&client, &base, "/card.png").await;

        assert!(info.reachable);
        assert_eq!(info.content_type.as_deref(), Some("image/png"));
        assert_eq!(info.size_bytes, Some(4096));
        assert_eq!(info.dimensions(), Some((1200, 630)));
    }

    #[tokio::test]
    async fn missing_image_is_unreachable_not_an_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/gone.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let client = build_http_client().unwrap();
        let base = Url::parse(&mock_server.uri()).unwrap();
        let info = fetch_image_info(&client, &base, "/gone.png").await;

        assert!(!info.reachable);
        assert!(info.content_type.is_none());
        assert!(info.dimensions().is_none());
    }

    #[tokio::test]
    async fn falls_back_to_ranged_get_when_head_unsupported() {
        let mock_server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/card.png"))
            .respond_with(ResponseTemplate::new(405))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/card.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(png_bytes(800, 800)),
            )
            .mount(&mock_server)
            .await;

        let client = build_http_client().unwrap();
        let base = Url::parse(&mock_server.uri()).unwrap();
        let info = fetch_image_info(&client, &base, "/card.png").await;

        assert!(info.reachable);
        assert_eq!(info.dimensions(), Some((800, 800)));
    }

    #[tokio::test]
    async fn cache_fetches_each_url_once() {
        let mock_server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/shared.png"))
            .respond_with(
                ResponseTemplate::new(200).insert_header("content-type", "image/png"),
            )
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/shared.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(png_bytes(100, 100)),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = build_http_client().unwrap();
        let base = Url::parse(&mock_server.uri()).unwrap();
        let cache = Arc::new(ImageCache::new());

        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            let client = client.clone();
            let base = base.clone();
            handles.push(tokio::spawn(async move {
                cache.get_or_fetch(&client, &base, "/shared.png").await
            }));
        }

        for handle in handles {
            let info = handle.await.unwrap();
            assert!(info.reachable);
        }
        assert_eq!(cache.probed_count().await, 1);
    }
}
