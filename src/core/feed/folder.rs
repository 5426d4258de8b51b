//! A directory of package archives used as a feed.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::{Feed, FeedService, FetchError, NugetQuery, RemoteNuget};
use crate::core::storage::{parse_package_path, LocalNuget};

#[derive(Clone, Debug)]
pub struct FolderFeed {
    feed: Feed,
    root: PathBuf,
}

impl FolderFeed {
    pub fn new(feed: Feed) -> Self {
        FolderFeed {
            root: feed.folder(),
            feed,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Every archive of `name` anywhere below `root`.
fn packages_named(root: &Path, name: &str) -> Vec<LocalNuget> {
    let pattern = format!("{}/**/*.nupkg", glob::Pattern::escape(&root.to_string_lossy()));

    let Ok(paths) = glob::glob(&pattern) else {
        return Vec::new();
    };

    let mut found: Vec<LocalNuget> = paths
        .filter_map(|p| p.ok())
        .filter_map(|p| parse_package_path(&p))
        .filter(|n| n.name.eq_ignore_ascii_case(name))
        .collect();

    found.sort_by(|a, b| a.path.cmp(&b.path));
    found
}

#[async_trait]
impl FeedService for FolderFeed {
    async fn nuget_for(&self, query: &NugetQuery) -> Result<RemoteNuget, FetchError> {
        if !self.root.is_dir() {
            return Err(FetchError::Io {
                path: self.root.clone(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }

        // Walking a large feed directory blocks.
        let root = self.root.clone();
        let name = query.name().to_owned();
        let packages = tokio::task::spawn_blocking(move || packages_named(&root, &name))
            .await
            .map_err(|e| FetchError::Io {
                path: self.root.clone(),
                source: std::io::Error::other(e),
            })?;

        if packages.is_empty() {
            return Err(FetchError::NotFound {
                name: query.name().to_owned(),
                feed: self.feed.url.clone(),
            });
        }

        let versions: Vec<String> = packages.iter().map(|n| n.version.clone()).collect();

        let Some(version) = query.choose(&versions, self.feed.stability) else {
            return Err(FetchError::NoMatchingVersion {
                name: query.name().to_owned(),
                feed: self.feed.url.clone(),
                range: query.range.to_string(),
            });
        };

        let Some(package) = packages.into_iter().find(|n| n.version == version) else {
            return Err(FetchError::NotFound {
                name: query.name().to_owned(),
                feed: self.feed.url.clone(),
            });
        };

        Ok(RemoteNuget {
            name: package.name,
            version,
            feed: self.feed.url.clone(),
            location: package.path.to_string_lossy().into_owned(),
        })
    }

    async fn download(&self, nuget: &RemoteNuget) -> Result<Vec<u8>, FetchError> {
        let path = PathBuf::from(&nuget.location);

        tokio::fs::read(&path)
            .await
            .map_err(|source| FetchError::Io { path, source })
    }
}
