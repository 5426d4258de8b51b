//! The per-user package cache.
//!
//! Every package restored from a feed is stored here first and copied into
//! the solution from the cache, so that several solutions on one machine
//! share downloads.

use std::{
    fmt, fs,
    io::Write,
    path::{Path, PathBuf},
};

use crate::atry;
use crate::core::{
    errors::Result,
    storage::{package_file_name, package_files, parse_package_path, LocalNuget},
    version::VersionRange,
};

/// A local mirror of feed packages, keyed by name and version.
pub trait NugetCache: fmt::Debug + Send + Sync {
    fn directory(&self) -> &Path;

    /// The best cached version of `name` inside `range`.
    fn find(&self, name: &str, range: &VersionRange, highest: bool) -> Option<LocalNuget>;

    /// The highest cached version of `name`.
    fn latest(&self, name: &str) -> Option<LocalNuget> {
        self.find(name, &VersionRange::any(), true)
    }

    /// Store a package archive, replacing any previous copy of the same
    /// version.
    fn store(&self, name: &str, version: &str, bytes: &[u8]) -> Result<LocalNuget>;

    /// Empty the cache.
    fn flush(&self) -> Result<()>;
}

/// Packages stored as `<dir>/<name>/<Name>.<version>.nupkg`, with the
/// folder name lowercased.
#[derive(Clone, Debug)]
pub struct FileSystemCache {
    dir: PathBuf,
}

impl FileSystemCache {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        FileSystemCache {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn package_folder(&self, name: &str) -> PathBuf {
        self.dir.join(name.to_lowercase())
    }

    /// Every cached version of `name`.
    pub fn versions_of(&self, name: &str) -> Vec<LocalNuget> {
        package_files(&self.package_folder(name))
            .unwrap_or_default()
            .iter()
            .filter_map(|p| parse_package_path(p))
            .filter(|n| n.name.eq_ignore_ascii_case(name))
            .collect()
    }
}

impl NugetCache for FileSystemCache {
    fn directory(&self) -> &Path {
        &self.dir
    }

    fn find(&self, name: &str, range: &VersionRange, highest: bool) -> Option<LocalNuget> {
        let cached = self.versions_of(name);

        let parsed: Vec<_> = cached
            .iter()
            .filter_map(|n| n.semver().map(|v| (v, n)))
            .collect();

        let allow_prerelease = range.min.as_ref().is_some_and(|v| !v.pre.is_empty());
        let best = range.best(parsed.iter().map(|(v, _)| v), highest, allow_prerelease)?;

        parsed
            .iter()
            .find(|(v, _)| v == best)
            .map(|(_, n)| (*n).clone())
    }

    fn store(&self, name: &str, version: &str, bytes: &[u8]) -> Result<LocalNuget> {
        let folder = self.package_folder(name);
        atry!(
            fs::create_dir_all(&folder);
            ["failed to create cache folder `{}`", folder.display()]
        );

        let path = folder.join(package_file_name(name, version));
        let af = atomicwrites::AtomicFile::new(&path, atomicwrites::OverwriteBehavior::AllowOverwrite);

        let r = af.write(|f| f.write_all(bytes));

        match r {
            Err(atomicwrites::Error::Internal(e)) => Err(e.into()),
            Err(atomicwrites::Error::User(e)) => Err(e.into()),
            Ok(()) => Ok(LocalNuget::new(name, version, path)),
        }
    }

    fn flush(&self) -> Result<()> {
        if self.dir.exists() {
            atry!(
                fs::remove_dir_all(&self.dir);
                ["failed to flush the package cache at `{}`", self.dir.display()]
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::version::{parse_version, VersionConstraint};

    #[test]
    fn store_then_find() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = FileSystemCache::new(tmp.path());

        let stored = cache.store("FubuCore", "1.2.0", b"one-two").unwrap();
        assert_eq!(stored.path, tmp.path().join("fubucore").join("FubuCore.1.2.0.nupkg"));
        cache.store("FubuCore", "1.4.0", b"one-four").unwrap();
        cache.store("FubuCore", "2.0.0", b"two").unwrap();

        let range = VersionConstraint::DEFAULT_FIXED.spec_for(&parse_version("1.2.0").unwrap());

        assert_eq!(cache.find("fubucore", &range, false).unwrap().version, "1.2.0");
        assert_eq!(cache.find("FUBUCORE", &range, true).unwrap().version, "1.4.0");
        assert_eq!(cache.latest("FubuCore").unwrap().version, "2.0.0");
        assert!(cache.find("Bottles", &range, true).is_none());
    }

    #[test]
    fn store_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = FileSystemCache::new(tmp.path());

        cache.store("Alpha", "1.0.0", b"old").unwrap();
        let stored = cache.store("Alpha", "1.0.0", b"new").unwrap();
        assert_eq!(fs::read(stored.path).unwrap(), b"new");
    }

    #[test]
    fn flush_empties() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = FileSystemCache::new(tmp.path().join("cache"));

        cache.store("Alpha", "1.0.0", b"x").unwrap();
        cache.flush().unwrap();
        assert!(cache.latest("Alpha").is_none());
        cache.flush().unwrap();
    }
}
