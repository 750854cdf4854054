use std::thread;
use std::time::Duration;

use log::debug;
use serde::Deserialize;

use crate::config::RemoteConfig;
use crate::error::WaxPulseError;
use crate::releases::Release;

const API_BASE: &str = "https://api.discogs.com";
const USER_AGENT: &str = "waxpulse/0.3";
const REQUEST_TIMEOUT_SECS: u64 = 30;
const PER_PAGE: u32 = 100;

// Discogs allows ~1 request per second while paginating
const PAGE_PAUSE: Duration = Duration::from_millis(1000);

// ---- Wire types ------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RemoteArtist {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct RemoteFormat {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct RemoteBasicInformation {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub year: i64,
    #[serde(default)]
    pub thumb: String,
    #[serde(default)]
    pub formats: Vec<RemoteFormat>,
    #[serde(default)]
    pub artists: Vec<RemoteArtist>,
}

#[derive(Debug, Deserialize)]
pub struct RemoteFolder {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub count: i64,
}

#[derive(Debug, Deserialize)]
struct FoldersResponse {
    folders: Vec<RemoteFolder>,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    page: u32,
    pages: u32,
}

#[derive(Debug, Deserialize)]
pub struct RemoteCollectionItem {
    pub instance_id: i64,
    #[serde(default)]
    pub folder_id: i64,
    pub basic_information: RemoteBasicInformation,
    #[serde(default)]
    pub date_added: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CollectionResponse {
    pagination: Pagination,
    releases: Vec<RemoteCollectionItem>,
}

#[derive(Debug, Deserialize)]
pub struct RemoteWantItem {
    pub basic_information: RemoteBasicInformation,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub date_added: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WantlistResponse {
    pagination: Pagination,
    wants: Vec<RemoteWantItem>,
}

#[derive(Debug, Deserialize)]
struct RemotePrice {
    value: f64,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct MarketplaceStatsResponse {
    lowest_price: Option<RemotePrice>,
    #[serde(default)]
    num_for_sale: i64,
    #[serde(default)]
    blocked_from_sale: bool,
}

#[derive(Debug, Deserialize)]
struct Community {
    #[serde(default)]
    want: i64,
}

#[derive(Debug, Deserialize)]
struct ReleaseDetailResponse {
    community: Option<Community>,
}

/// Current marketplace conditions for one release. `None` from
/// [`RemoteClient::marketplace_stats`] means "no active listings" - a valid
/// outcome, not a failure.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketSnapshot {
    pub price: f64,
    pub currency: String,
    pub listing_count: i64,
}

impl RemoteBasicInformation {
    pub fn to_release(&self) -> Release {
        let artist = self
            .artists
            .first()
            .map(|a| a.name.clone())
            .unwrap_or_else(|| "Unknown Artist".to_string());
        let format = self.formats.first().map(|f| f.name.clone());
        let year = (self.year > 0).then_some(self.year);
        let thumb = (!self.thumb.is_empty()).then(|| self.thumb.clone());

        Release::new(self.id, self.title.clone(), artist, year, format, thumb)
    }
}

// ---- Client ----------------------------------------------------------------

/// Blocking Discogs API client. One instance is shared across the worker
/// pool; reqwest's client is internally reference-counted and thread-safe.
pub struct RemoteClient {
    client: reqwest::blocking::Client,
    base_url: String,
    token: String,
    username: String,
    page_pause: Duration,
}

impl RemoteClient {
    pub fn new(config: &RemoteConfig) -> Result<Self, WaxPulseError> {
        Self::with_base_url(config, API_BASE)
    }

    /// Points the client at an alternate base URL. Tests use this with a
    /// local mock server; page pacing is kept, so mocks should stay
    /// single-page unless the test budgets for the delay.
    pub fn with_base_url(config: &RemoteConfig, base_url: &str) -> Result<Self, WaxPulseError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            username: config.username.clone(),
            page_pause: PAGE_PAUSE,
        })
    }

    fn get<T>(&self, path: &str) -> Result<T, WaxPulseError>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Discogs token={}", self.token))
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(WaxPulseError::Remote {
                status: status.to_string(),
                body: response.text().unwrap_or_default(),
            });
        }

        Ok(response.json::<T>()?)
    }

    pub fn folders(&self) -> Result<Vec<RemoteFolder>, WaxPulseError> {
        let response: FoldersResponse =
            self.get(&format!("/users/{}/collection/folders", self.username))?;
        Ok(response.folders)
    }

    /// All releases in one folder, following pagination with a fixed pause
    /// between page requests.
    pub fn folder_releases(
        &self,
        folder_id: i64,
    ) -> Result<Vec<RemoteCollectionItem>, WaxPulseError> {
        let mut all_items = Vec::new();
        let mut page = 1;

        loop {
            let response: CollectionResponse = self.get(&format!(
                "/users/{}/collection/folders/{}/releases?page={}&per_page={}",
                self.username, folder_id, page, PER_PAGE
            ))?;
            all_items.extend(response.releases);

            if response.pagination.page >= response.pagination.pages {
                break;
            }
            page += 1;
            thread::sleep(self.page_pause);
        }

        Ok(all_items)
    }

    pub fn wantlist(&self) -> Result<Vec<RemoteWantItem>, WaxPulseError> {
        let mut all_items = Vec::new();
        let mut page = 1;

        loop {
            let response: WantlistResponse = self.get(&format!(
                "/users/{}/wants?page={}&per_page={}",
                self.username, page, PER_PAGE
            ))?;
            all_items.extend(response.wants);

            if response.pagination.page >= response.pagination.pages {
                break;
            }
            page += 1;
            thread::sleep(self.page_pause);
        }

        Ok(all_items)
    }

    /// Lowest listed price and listing count for one release. `Ok(None)`
    /// when the release has no active listings or is blocked from sale.
    pub fn marketplace_stats(
        &self,
        release_id: i64,
    ) -> Result<Option<MarketSnapshot>, WaxPulseError> {
        let stats: MarketplaceStatsResponse =
            self.get(&format!("/marketplace/stats/{}", release_id))?;

        if stats.blocked_from_sale || stats.num_for_sale == 0 {
            return Ok(None);
        }

        Ok(stats.lowest_price.map(|price| MarketSnapshot {
            price: price.value,
            currency: price.currency,
            listing_count: stats.num_for_sale,
        }))
    }

    /// Community want count from the release endpoint.
    pub fn want_count(&self, release_id: i64) -> Result<i64, WaxPulseError> {
        let detail: ReleaseDetailResponse = self.get(&format!("/releases/{}", release_id))?;
        Ok(detail.community.map(|c| c.want).unwrap_or(0))
    }
}
