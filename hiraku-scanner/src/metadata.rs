use crate::error::{AnalyzeError, Result};
use reqwest::Client;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Retries on network-level failure only. HTTP error statuses are final.
const MAX_RETRIES: u32 = 2;
const BACKOFF_BASE: Duration = Duration::from_millis(250);

/// Open Graph and standard metadata extracted from one page.
///
/// Every field is optional: a missing tag leaves `None`, it never fails
/// the parse. `kind` holds the `og:type` value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OgMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub site_name: Option<String>,
    pub kind: Option<String>,
}

impl OgMetadata {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.image_url.is_none()
            && self.site_name.is_none()
            && self.kind.is_none()
    }
}

/// HTTP client used for page and image requests during a run.
pub fn build_http_client() -> Result<Client> {
    Client::builder()
        .user_agent("Hiraku/0.2 (https://github.com/hiraku-dev/hiraku)")
        .timeout(FETCH_TIMEOUT)
        .connect_timeout(FETCH_TIMEOUT / 2)
        .pool_max_idle_per_host(50)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(AnalyzeError::from)
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Extracts Open Graph metadata from raw markup. Pure: identical input
/// yields identical output.
///
/// `og:*` properties win; `<title>` and `<meta name="description">` fill
/// the gaps. The first `og:image` is taken when several are present.
pub fn parse_og_metadata(html: &str) -> OgMetadata {
    let document = Html::parse_document(html);

    let property_selector = Selector::parse("meta[property][content]").unwrap();
    let mut metadata = OgMetadata::default();

    for element in document.select(&property_selector) {
        let (Some(property), Some(content)) = (
            element.value().attr("property"),
            element.value().attr("content"),
        ) else {
            continue;
        };

        match property {
            "og:title" if metadata.title.is_none() => metadata.title = non_empty(content),
            "og:description" if metadata.description.is_none() => {
                metadata.description = non_empty(content)
            }
            "og:image" | "og:image:url" if metadata.image_url.is_none() => {
                metadata.image_url = non_empty(content)
            }
            "og:site_name" if metadata.site_name.is_none() => {
                metadata.site_name = non_empty(content)
            }
            "og:type" if metadata.kind.is_none() => metadata.kind = non_empty(content),
            _ => {}
        }
    }

    if metadata.title.is_none() {
        let title_selector = Selector::parse("title").unwrap();
        if let Some(element) = document.select(&title_selector).next() {
            metadata.title = non_empty(&element.text().collect::<String>());
        }
    }

    if metadata.description.is_none() {
        let description_selector = Selector::parse("meta[name='description']").unwrap();
        if let Some(content) = document
            .select(&description_selector)
            .next()
            .and_then(|e| e.value().attr("content"))
        {
            metadata.description = non_empty(content);
        }
    }

    metadata
}

async fn get_page(client: &Client, url: &Url) -> std::result::Result<(u16, String), reqwest::Error> {
    let response = client.get(url.clone()).send().await?;
    let status = response.status().as_u16();
    let body = response.text().await?;
    Ok((status, body))
}

/// Fetches a route's rendered HTML and extracts its metadata.
///
/// Network-level failures are retried up to two times with exponential
/// backoff; HTTP error statuses are not retried and surface as
/// `AnalyzeError::FetchFailed`.
pub async fn fetch_and_parse_og_metadata(client: &Client, url: &Url) -> Result<OgMetadata> {
    let mut attempt: u32 = 0;

    loop {
        match get_page(client, url).await {
            Ok((status, body)) => {
                if !(200..300).contains(&status) {
                    return Err(AnalyzeError::FetchFailed {
                        url: url.to_string(),
                        status,
                    });
                }
                debug!("Fetched {} ({} bytes)", url, body.len());
                return Ok(parse_og_metadata(&body));
            }
            Err(e) if attempt < MAX_RETRIES => {
                let delay = BACKOFF_BASE * 2u32.pow(attempt);
                debug!("Fetch of {} failed ({}), retrying in {:?}", url, e, delay);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}
