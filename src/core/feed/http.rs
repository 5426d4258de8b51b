//! NuGet v3 HTTP feeds.
//!
//! Only the flat-container ("PackageBaseAddress") resource is used: it
//! lists a package's versions and serves the archives. A feed URL ending in
//! `index.json` is treated as a service index and the base address is looked
//! up from it once; any other URL is taken to be the base address itself.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;

use super::{Feed, FeedService, FetchError, NugetQuery, RemoteNuget};

const BASE_ADDRESS_TYPE: &str = "PackageBaseAddress/3.0.0";

pub(crate) fn default_client() -> Client {
    Client::builder()
        .user_agent(concat!("ripple/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_default()
}

#[derive(Debug, Deserialize)]
struct ServiceIndex {
    #[serde(default)]
    resources: Vec<ServiceResource>,
}

#[derive(Debug, Deserialize)]
struct ServiceResource {
    #[serde(rename = "@id")]
    id: String,

    /// Either a string or a list of strings, depending on the server.
    #[serde(rename = "@type")]
    kind: serde_json::Value,
}

impl ServiceResource {
    fn is(&self, kind: &str) -> bool {
        match self.kind {
            serde_json::Value::String(ref s) => s == kind,
            serde_json::Value::Array(ref items) => items.iter().any(|i| i.as_str() == Some(kind)),
            _ => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct VersionIndex {
    versions: Vec<String>,
}

#[derive(Debug)]
pub struct HttpFeed {
    client: Client,
    feed: Feed,
    base_address: OnceCell<String>,
}

impl HttpFeed {
    pub fn new(feed: Feed) -> Self {
        Self::with_client(feed, default_client())
    }

    pub fn with_client(feed: Feed, client: Client) -> Self {
        HttpFeed {
            client,
            feed,
            base_address: OnceCell::new(),
        }
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.to_owned(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_owned(),
                status: response.status().as_u16(),
            });
        }

        Ok(response)
    }

    async fn resolve_base_address(&self) -> Result<String, FetchError> {
        let url = self.feed.url.trim_end_matches('/');

        if !url.ends_with("index.json") {
            return Ok(url.to_owned());
        }

        let index: ServiceIndex = self
            .get(url)
            .await?
            .json()
            .await
            .map_err(|e| FetchError::InvalidResponse {
                url: url.to_owned(),
                message: e.to_string(),
            })?;

        index
            .resources
            .into_iter()
            .find(|r| r.is(BASE_ADDRESS_TYPE))
            .map(|r| r.id.trim_end_matches('/').to_owned())
            .ok_or_else(|| FetchError::InvalidResponse {
                url: url.to_owned(),
                message: format!("no {} resource in service index", BASE_ADDRESS_TYPE),
            })
    }

    async fn base_address(&self) -> Result<&str, FetchError> {
        self.base_address
            .get_or_try_init(|| self.resolve_base_address())
            .await
            .map(String::as_str)
    }

    /// Every version of `name` the feed publishes.
    pub async fn versions(&self, name: &str) -> Result<Vec<String>, FetchError> {
        let base = self.base_address().await?;
        let url = format!("{}/{}/index.json", base, name.to_lowercase());
        debug!("listing versions of {} from {}", name, url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(FetchError::NotFound {
                name: name.to_owned(),
                feed: self.feed.url.clone(),
            }),
            status if !status.is_success() => Err(FetchError::Status {
                url,
                status: status.as_u16(),
            }),
            _ => {
                let index: VersionIndex =
                    response
                        .json()
                        .await
                        .map_err(|e| FetchError::InvalidResponse {
                            url: url.clone(),
                            message: e.to_string(),
                        })?;
                Ok(index.versions)
            }
        }
    }
}

#[async_trait]
impl FeedService for HttpFeed {
    async fn nuget_for(&self, query: &NugetQuery) -> Result<RemoteNuget, FetchError> {
        let versions = self.versions(query.name()).await?;

        let Some(version) = query.choose(&versions, self.feed.stability) else {
            return Err(FetchError::NoMatchingVersion {
                name: query.name().to_owned(),
                feed: self.feed.url.clone(),
                range: query.range.to_string(),
            });
        };

        let base = self.base_address().await?;
        let id = query.name().to_lowercase();
        let ver = version.to_lowercase();

        Ok(RemoteNuget {
            name: query.name().to_owned(),
            location: format!("{}/{}/{}/{}.{}.nupkg", base, id, ver, id, ver),
            version,
            feed: self.feed.url.clone(),
        })
    }

    async fn download(&self, nuget: &RemoteNuget) -> Result<Vec<u8>, FetchError> {
        let response = self.get(&nuget.location).await?;

        let bytes = response
            .bytes()
            .await
            .map_err(|source| FetchError::Request {
                url: nuget.location.clone(),
                source,
            })?;

        Ok(bytes.to_vec())
    }
}
