//! Remote package sources.
//!
//! A solution lists the feeds it restores from. Each feed is either a NuGet
//! v3 HTTP endpoint ([`http::HttpFeed`]) or a local directory of package
//! archives ([`folder::FolderFeed`]). [`FeedChain`] puts the two behind one
//! [`FeedService`] and walks a solution's feeds in order.

pub mod folder;
pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError},
};
use thiserror::Error as ThisError;
use tracing::debug;

use crate::core::{
    dependency::Dependency,
    version::{parse_version, UpdateMode, VersionRange},
};

use self::{folder::FolderFeed, http::HttpFeed};

/// Which versions a feed may supply.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedStability {
    /// Released versions only.
    #[default]
    Released,

    /// Prereleases too.
    Anything,
}

/// A package source.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Feed {
    /// An `http(s)://` URL, or a directory path (optionally `file://`).
    pub url: String,

    /// `fixed` feeds serve every dependency; `float` feeds (nightly or CI
    /// builds) only serve dependencies that float.
    #[serde(default)]
    pub mode: UpdateMode,

    #[serde(default)]
    pub stability: FeedStability,
}

impl Feed {
    pub const NUGET_V3: &'static str = "https://api.nuget.org/v3/index.json";

    pub fn new(url: impl Into<String>) -> Self {
        Feed {
            url: url.into(),
            mode: UpdateMode::default(),
            stability: FeedStability::default(),
        }
    }

    pub fn with_mode(mut self, mode: UpdateMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_stability(mut self, stability: FeedStability) -> Self {
        self.stability = stability;
        self
    }

    /// Whether this feed should be consulted for `dependency`.
    pub fn serves(&self, dependency: &Dependency) -> bool {
        self.mode == UpdateMode::Fixed || dependency.is_float()
    }

    pub fn is_http(&self) -> bool {
        is_http_location(&self.url)
    }

    /// The directory behind a folder feed.
    pub fn folder(&self) -> PathBuf {
        PathBuf::from(self.url.strip_prefix("file://").unwrap_or(&self.url))
    }
}

fn is_http_location(location: &str) -> bool {
    let lower = location.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// A request to resolve one dependency against the feeds.
#[derive(Clone, Debug)]
pub struct NugetQuery {
    pub dependency: Dependency,

    /// Versions acceptable for this dependency.
    pub range: VersionRange,

    /// Take the highest satisfying version rather than the lowest.
    pub highest: bool,

    /// Feeds to consult, in order.
    pub feeds: Vec<Feed>,
}

impl NugetQuery {
    pub fn new(dependency: Dependency, range: VersionRange, feeds: Vec<Feed>) -> Self {
        NugetQuery {
            highest: dependency.is_float(),
            dependency,
            range,
            feeds,
        }
    }

    pub fn name(&self) -> &str {
        &self.dependency.name
    }

    /// Pick the best of `candidates` (raw version strings as the feed
    /// publishes them) for this query.
    pub fn choose(&self, candidates: &[String], stability: FeedStability) -> Option<String> {
        let parsed: Vec<_> = candidates
            .iter()
            .filter_map(|raw| parse_version(raw).ok().map(|v| (v, raw)))
            .collect();

        let allow_prerelease = stability == FeedStability::Anything
            || self.range.min.as_ref().is_some_and(|v| !v.pre.is_empty());

        let best = self
            .range
            .best(parsed.iter().map(|(v, _)| v), self.highest, allow_prerelease)?;

        parsed
            .iter()
            .find(|(v, _)| v == best)
            .map(|(_, raw)| (*raw).clone())
    }
}

/// A package resolved on a feed, not yet downloaded.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteNuget {
    pub name: String,
    pub version: String,

    /// The feed URL it was found on.
    pub feed: String,

    /// Where to download it from: a URL or a file path.
    pub location: String,
}

/// Failure to resolve or download a package. Reported per dependency; one
/// failed package never aborts its siblings.
#[derive(Debug, ThisError)]
#[non_exhaustive]
pub enum FetchError {
    #[error("no feeds are configured to restore `{name}` from")]
    NoFeeds { name: String },

    #[error("package `{name}` was not found on {feed}")]
    NotFound { name: String, feed: String },

    #[error("no version of `{name}` on {feed} satisfies {range}")]
    NoMatchingVersion {
        name: String,
        feed: String,
        range: String,
    },

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("invalid response from {url}: {message}")]
    InvalidResponse { url: String, message: String },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("fetching `{name}` timed out after {seconds}s")]
    Timeout { name: String, seconds: u64 },

    #[error("fetching `{name}` was cancelled")]
    Cancelled { name: String },
}

impl FetchError {
    /// Whether trying again later might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Request { source, .. } => source.is_timeout() || source.is_connect(),
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::Timeout { .. } => true,
            _ => false,
        }
    }
}

#[async_trait]
pub trait FeedService: Send + Sync {
    /// Resolve a dependency to a concrete package.
    async fn nuget_for(&self, query: &NugetQuery) -> Result<RemoteNuget, FetchError>;

    /// Download the package archive.
    async fn download(&self, nuget: &RemoteNuget) -> Result<Vec<u8>, FetchError>;
}

/// Consults each of a query's feeds in order; the first success wins and
/// the last failure is reported.
pub struct FeedChain {
    client: reqwest::Client,
    backends: Mutex<HashMap<String, Arc<dyn FeedService>>>,
}

impl std::fmt::Debug for FeedChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedChain").finish_non_exhaustive()
    }
}

impl Default for FeedChain {
    fn default() -> Self {
        FeedChain::new(http::default_client())
    }
}

impl FeedChain {
    pub fn new(client: reqwest::Client) -> Self {
        FeedChain {
            client,
            backends: Mutex::new(HashMap::new()),
        }
    }

    fn backend(&self, feed: &Feed) -> Arc<dyn FeedService> {
        let mut backends = self.backends.lock().unwrap_or_else(PoisonError::into_inner);

        backends
            .entry(feed.url.clone())
            .or_insert_with(|| -> Arc<dyn FeedService> {
                if feed.is_http() {
                    Arc::new(HttpFeed::with_client(feed.clone(), self.client.clone()))
                } else {
                    Arc::new(FolderFeed::new(feed.clone()))
                }
            })
            .clone()
    }
}

#[async_trait]
impl FeedService for FeedChain {
    async fn nuget_for(&self, query: &NugetQuery) -> Result<RemoteNuget, FetchError> {
        let mut last = FetchError::NoFeeds {
            name: query.name().to_owned(),
        };

        for feed in query.feeds.iter().filter(|f| f.serves(&query.dependency)) {
            match self.backend(feed).nuget_for(query).await {
                Ok(nuget) => return Ok(nuget),
                Err(e) => {
                    debug!("{} not available from {}: {}", query.name(), feed.url, e);
                    last = e;
                }
            }
        }

        Err(last)
    }

    async fn download(&self, nuget: &RemoteNuget) -> Result<Vec<u8>, FetchError> {
        let feed = Feed::new(nuget.feed.clone());
        self.backend(&feed).download(nuget).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::version::{parse_version, VersionConstraint};

    fn query(dep: Dependency) -> NugetQuery {
        let range = match dep.semver() {
            Some(v) => VersionConstraint::DEFAULT_FIXED.spec_for(&v),
            None => VersionRange::any(),
        };
        NugetQuery::new(dep, range, Vec::new())
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn fixed_takes_lowest_in_range() {
        let q = query(Dependency::fixed("Alpha", "1.2.0"));
        let chosen = q.choose(&strings(&["1.1.0", "1.2.0", "1.9.0", "2.0.0"]), FeedStability::Released);
        assert_eq!(chosen.as_deref(), Some("1.2.0"));
    }

    #[test]
    fn float_takes_highest_in_range() {
        let q = query(Dependency::float("Alpha", "1.2.0"));
        let chosen = q.choose(&strings(&["1.2.0", "1.9.0.3", "2.0.0"]), FeedStability::Released);
        assert_eq!(chosen.as_deref(), Some("1.9.0.3"));
    }

    #[test]
    fn prereleases_need_a_permissive_feed() {
        let q = query(Dependency::float("Alpha", "1.0.0"));
        let candidates = strings(&["1.0.0", "1.1.0-beta"]);

        assert_eq!(q.choose(&candidates, FeedStability::Released).as_deref(), Some("1.0.0"));
        assert_eq!(
            q.choose(&candidates, FeedStability::Anything).as_deref(),
            Some("1.1.0-beta")
        );
    }

    #[test]
    fn unparsable_candidates_are_ignored() {
        let q = query(Dependency::unversioned("Alpha"));
        let chosen = q.choose(&strings(&["banana", "0.3"]), FeedStability::Released);
        assert_eq!(chosen.as_deref(), Some("0.3"));
        assert!(parse_version("banana").is_err());
    }

    #[test]
    fn feed_kinds() {
        assert!(Feed::new("https://api.nuget.org/v3/index.json").is_http());
        assert!(!Feed::new("file:///srv/nugets").is_http());
        assert_eq!(Feed::new("file:///srv/nugets").folder(), PathBuf::from("/srv/nugets"));
    }

    #[test]
    fn transient_errors() {
        assert!(FetchError::Status {
            url: "u".into(),
            status: 503
        }
        .is_transient());
        assert!(!FetchError::Status {
            url: "u".into(),
            status: 404
        }
        .is_transient());
        assert!(FetchError::Timeout {
            name: "Alpha".into(),
            seconds: 1
        }
        .is_transient());
        assert!(!FetchError::NoFeeds { name: "Alpha".into() }.is_transient());
    }

    #[tokio::test]
    async fn chain_reports_missing_feeds() {
        let chain = FeedChain::default();
        let err = chain
            .nuget_for(&query(Dependency::fixed("Alpha", "1.0.0")))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::NoFeeds { .. }));
    }

    #[tokio::test]
    async fn chain_falls_through_to_later_feeds() {
        let empty = tempfile::tempdir().unwrap();
        let stocked = tempfile::tempdir().unwrap();
        std::fs::write(stocked.path().join("Alpha.1.0.0.nupkg"), b"zip").unwrap();

        let mut q = query(Dependency::fixed("Alpha", "1.0.0"));
        q.feeds = vec![
            Feed::new(empty.path().to_string_lossy()),
            Feed::new(stocked.path().to_string_lossy()),
        ];

        let chain = FeedChain::default();
        let nuget = chain.nuget_for(&q).await.unwrap();
        assert_eq!(nuget.version, "1.0.0");
        assert_eq!(nuget.feed, stocked.path().to_string_lossy());

        let bytes = chain.download(&nuget).await.unwrap();
        assert_eq!(bytes, b"zip");
    }

    #[test]
    fn float_feeds_only_serve_floating_dependencies() {
        let nightly = Feed::new("https://ci.example.com/nuget").with_mode(UpdateMode::Float);
        let stable = Feed::new(Feed::NUGET_V3);

        assert!(nightly.serves(&Dependency::float("Alpha", "1.0.0")));
        assert!(!nightly.serves(&Dependency::fixed("Alpha", "1.0.0")));
        assert!(stable.serves(&Dependency::float("Alpha", "1.0.0")));
        assert!(stable.serves(&Dependency::fixed("Alpha", "1.0.0")));
    }

    #[tokio::test]
    async fn chain_skips_feeds_that_do_not_serve_the_mode() {
        let nightly = tempfile::tempdir().unwrap();
        std::fs::write(nightly.path().join("Alpha.1.5.0-ci.nupkg"), b"ci").unwrap();
        let stable = tempfile::tempdir().unwrap();
        std::fs::write(stable.path().join("Alpha.1.0.0.nupkg"), b"stable").unwrap();

        let feeds = vec![
            Feed::new(nightly.path().to_string_lossy())
                .with_mode(UpdateMode::Float)
                .with_stability(FeedStability::Anything),
            Feed::new(stable.path().to_string_lossy()),
        ];
        let chain = FeedChain::default();

        let float = Dependency::float("Alpha", "1.0.0");
        let range = VersionConstraint::DEFAULT_FLOAT.spec_for(&float.semver().unwrap());
        let found = chain
            .nuget_for(&NugetQuery::new(float, range, feeds.clone()))
            .await
            .unwrap();
        assert_eq!(found.version, "1.5.0-ci");

        let fixed = Dependency::fixed("Alpha", "1.0.0");
        let range = VersionConstraint::DEFAULT_FIXED.spec_for(&fixed.semver().unwrap());
        let found = chain
            .nuget_for(&NugetQuery::new(fixed, range, feeds))
            .await
            .unwrap();
        assert_eq!(found.version, "1.0.0");
    }
}
