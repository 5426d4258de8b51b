//! Local package storage.
//!
//! A solution keeps the packages it depends on in a local folder and records
//! each project's dependencies in a small definition file. How both of those
//! are laid out on disk depends on the solution's [`StorageMode`]; each mode
//! has a [`NugetStorage`] implementation and [`storage_for`] maps one to the
//! other.

pub mod classic;
pub mod locks;
pub mod ripple;

use serde::{Deserialize, Serialize};
use std::{
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error as ThisError;
use tracing::{debug, warn};

use crate::atry;
use crate::core::{
    config::ConfigurationFile,
    dependency::{Dependency, DependencyCollection},
    errors::Result,
    project::Project,
    solution::Solution,
    version::{parse_version, Version},
};

pub use self::locks::{LockPolicy, ResourceLockedError};

/// The file extension of package archives.
pub const PACKAGE_EXTENSION: &str = "nupkg";

/// Where installs are assembled, inside the package folder. The leading dot
/// keeps it from being mistaken for a package by either layout.
pub const STAGING_DIR: &str = ".staging";

/// The on-disk layouts a solution can use.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// `packages/<Name>/<Name>.<version>.nupkg`, with project dependencies in
    /// `ripple.dependencies.config`.
    #[default]
    Ripple,

    /// `packages/<Name>.<version>/<Name>.<version>.nupkg`, with project
    /// dependencies in NuGet's `packages.config`.
    #[serde(alias = "nuget")]
    Classic,
}

impl StorageMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ripple => "ripple",
            Self::Classic => "classic",
        }
    }
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, ThisError)]
#[error("unrecognized storage mode `{0}` (expected `ripple` or `classic`)")]
pub struct StorageModeParseError(pub String);

impl FromStr for StorageMode {
    type Err = StorageModeParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ripple" => Ok(Self::Ripple),
            "classic" | "nuget" => Ok(Self::Classic),
            _ => Err(StorageModeParseError(s.to_owned())),
        }
    }
}

/// What [`NugetStorage::clean`] deletes.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum CleanMode {
    /// Project build outputs (`bin`, `obj`).
    Projects,

    /// The solution's local package folder.
    Packages,

    /// Both of the above.
    #[default]
    All,
}

impl CleanMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Projects => "projects",
            Self::Packages => "packages",
            Self::All => "all",
        }
    }

    fn cleans_projects(&self) -> bool {
        matches!(self, Self::Projects | Self::All)
    }

    fn cleans_packages(&self) -> bool {
        matches!(self, Self::Packages | Self::All)
    }
}

/// A package physically present on disk.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LocalNuget {
    pub name: String,
    pub version: String,
    /// Path to the package archive.
    pub path: PathBuf,
}

impl LocalNuget {
    pub fn new(name: impl Into<String>, version: impl Into<String>, path: impl AsRef<Path>) -> Self {
        LocalNuget {
            name: name.into(),
            version: version.into(),
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn semver(&self) -> Option<Version> {
        parse_version(&self.version).ok()
    }

    /// The conventional archive file name, `<Name>.<version>.nupkg`.
    pub fn file_name(&self) -> String {
        package_file_name(&self.name, &self.version)
    }
}

/// A snapshot of the packages present for one solution.
#[derive(Clone, Debug, Default)]
pub struct LocalDependencies {
    nugets: Vec<LocalNuget>,
    policy: LockPolicy,
}

impl LocalDependencies {
    pub fn new(nugets: Vec<LocalNuget>, policy: LockPolicy) -> Self {
        LocalDependencies { nugets, policy }
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// The installed copy of `name`. When several versions sit side by side
    /// the highest one is the one in use.
    pub fn get(&self, name: &str) -> Option<&LocalNuget> {
        self.nugets
            .iter()
            .filter(|n| n.name.eq_ignore_ascii_case(name))
            .max_by(|a, b| a.semver().cmp(&b.semver()))
    }

    pub fn all(&self) -> &[LocalNuget] {
        &self.nugets[..]
    }

    pub fn is_empty(&self) -> bool {
        self.nugets.is_empty()
    }

    /// Package files currently held open by another process.
    pub fn locked_files(&self) -> Vec<PathBuf> {
        self.nugets
            .iter()
            .filter(|n| locks::is_locked(&n.path, &self.policy))
            .map(|n| n.path.clone())
            .collect()
    }

    pub fn has_locked_files(&self) -> bool {
        self.nugets
            .iter()
            .any(|n| locks::is_locked(&n.path, &self.policy))
    }
}

/// An installation worked out by [`NugetStorage::prepare_install`].
///
/// The new archive is copied into a staging folder first. Folders holding
/// other versions are only moved aside once the copy succeeded, and are
/// moved back if the final rename fails, so a failed install leaves the
/// previous copy in place.
#[derive(Clone, Debug)]
pub struct PackageInstall {
    solution: String,
    policy: LockPolicy,
    source: PathBuf,
    target: PathBuf,
    staging: PathBuf,
    replaced: Vec<PathBuf>,
    installed: LocalNuget,
}

impl PackageInstall {
    /// Folders removed by a successful install.
    pub fn replaced(&self) -> &[PathBuf] {
        &self.replaced[..]
    }

    /// Carry out the installation. Blocks on filesystem work and on lock
    /// retries.
    pub fn run(self) -> Result<LocalNuget> {
        let policy = self.policy;
        let staged = self.staging.join(self.installed.file_name());

        if self.staging.exists() {
            locks::retry_io(&policy, || fs::remove_dir_all(&self.staging))
                .map_err(|e| locks::escalate(e, &self.solution, &self.staging))?;
        }

        atry!(
            fs::create_dir_all(&self.staging);
            ["failed to create staging folder `{}`", self.staging.display()]
        );

        if let Err(e) = locks::retry_io(&policy, || fs::copy(&self.source, &staged)) {
            self.discard();
            return Err(locks::escalate(e, &self.solution, &self.source));
        }

        if let Some(parent) = self.target.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                self.discard();
                return Err(locks::escalate(e, &self.solution, parent));
            }
        }

        let mut moved = Vec::new();

        for (index, dir) in self.replaced.iter().enumerate() {
            let aside = PathBuf::from(format!("{}.replaced-{}", self.staging.display(), index));

            // Left behind by an interrupted install.
            if aside.exists() {
                fs::remove_dir_all(&aside).ok();
            }

            if let Err(e) = locks::retry_io(&policy, || fs::rename(dir, &aside)) {
                self.restore(&moved);
                self.discard();
                return Err(locks::escalate(e, &self.solution, dir));
            }

            moved.push((dir.clone(), aside));
        }

        if let Err(e) = locks::retry_io(&policy, || fs::rename(&self.staging, &self.target)) {
            self.restore(&moved);
            self.discard();
            return Err(locks::escalate(e, &self.solution, &self.target));
        }

        for (_, aside) in &moved {
            if let Err(e) = fs::remove_dir_all(aside) {
                warn!("failed to remove replaced package folder `{}`: {}", aside.display(), e);
            }
        }

        self.tidy();
        Ok(self.installed)
    }

    /// Put moved-aside folders back where they were.
    fn restore(&self, moved: &[(PathBuf, PathBuf)]) {
        for (original, aside) in moved.iter().rev() {
            if let Err(e) = fs::rename(aside, original) {
                warn!(
                    "failed to move `{}` back to `{}`: {}",
                    aside.display(),
                    original.display(),
                    e
                );
            }
        }
    }

    fn discard(&self) {
        if self.staging.exists() {
            if let Err(e) = fs::remove_dir_all(&self.staging) {
                debug!("failed to remove staging folder `{}`: {}", self.staging.display(), e);
            }
        }

        self.tidy();
    }

    /// Drop the staging root once nothing else is using it.
    fn tidy(&self) {
        if let Some(root) = self.staging.parent() {
            fs::remove_dir(root).ok();
        }
    }
}

/// `<Name>.<version>.nupkg`
pub fn package_file_name(name: &str, version: &str) -> String {
    format!("{}.{}.{}", name, version, PACKAGE_EXTENSION)
}

/// Split a `<Name>.<version>` stem into its two halves.
///
/// Package names may themselves contain dots (`FubuMVC.Core.1.2.0`), so we
/// split at the first dot that is followed by something parseable as a
/// version.
pub fn split_package_stem(stem: &str) -> Option<(&str, &str)> {
    stem.char_indices()
        .filter(|(_, c)| *c == '.')
        .map(|(i, _)| (&stem[..i], &stem[i + 1..]))
        .find(|(name, version)| {
            !name.is_empty()
                && version.starts_with(|c: char| c.is_ascii_digit())
                && parse_version(version).is_ok()
        })
}

/// Parse `<Name>.<version>.nupkg` into a [`LocalNuget`].
pub fn parse_package_path(path: &Path) -> Option<LocalNuget> {
    if path.extension().and_then(|e| e.to_str()) != Some(PACKAGE_EXTENSION) {
        return None;
    }

    let stem = path.file_stem()?.to_str()?;
    let (name, version) = split_package_stem(stem)?;
    Some(LocalNuget::new(name, version, path))
}

/// Package archives directly inside `dir`, sorted by path.
pub(crate) fn package_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    if !dir.is_dir() {
        return Ok(files);
    }

    for entry in atry!(
        fs::read_dir(dir);
        ["failed to list directory `{}`", dir.display()]
    ) {
        let path = entry?.path();

        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(PACKAGE_EXTENSION) {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

/// Subdirectories of `dir`, sorted by path.
pub(crate) fn subdirectories(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();

    if !dir.is_dir() {
        return Ok(dirs);
    }

    for entry in atry!(
        fs::read_dir(dir);
        ["failed to list directory `{}`", dir.display()]
    ) {
        let path = entry?.path();

        if path.is_dir() {
            dirs.push(path);
        }
    }

    dirs.sort();
    Ok(dirs)
}

/// The operations the engine needs from a storage layout.
pub trait NugetStorage: fmt::Debug + Send + Sync {
    fn mode(&self) -> StorageMode;

    /// Snapshot the packages physically present for `solution`.
    fn dependencies(&self, solution: &Solution) -> Result<LocalDependencies>;

    /// Where a package with this name and version is installed.
    fn package_dir(&self, solution: &Solution, name: &str, version: &str) -> PathBuf;

    /// The definition file listing a project's dependencies.
    fn project_file(&self, solution: &Solution, project: &Project) -> PathBuf;

    fn read_project_dependencies(
        &self,
        solution: &Solution,
        project: &Project,
    ) -> Result<DependencyCollection>;

    fn write_project(&self, solution: &Solution, project: &Project) -> Result<()>;

    /// Declared dependencies that have no local copy.
    fn missing_files(&self, solution: &Solution) -> Result<Vec<Dependency>> {
        let local = self.dependencies(solution)?;

        Ok(solution
            .dependencies()
            .iter()
            .filter(|d| !local.has(&d.name))
            .cloned()
            .collect())
    }

    fn has_locked_files(&self, solution: &Solution) -> Result<bool> {
        Ok(self.dependencies(solution)?.has_locked_files())
    }

    fn write_solution(&self, solution: &Solution) -> Result<()> {
        ConfigurationFile::from_solution(solution).save(solution.definition_file())
    }

    /// Write the solution definition and every project definition.
    fn write(&self, solution: &Solution) -> Result<()> {
        self.write_solution(solution)?;

        for project in solution.projects() {
            self.write_project(solution, project)?;
        }

        Ok(())
    }

    /// Work out how `package` would be installed into the solution without
    /// touching the filesystem beyond a directory scan.
    fn prepare_install(&self, solution: &Solution, package: &LocalNuget) -> Result<PackageInstall> {
        let local = self.dependencies(solution)?;
        let target = self.package_dir(solution, &package.name, &package.version);

        let mut replaced: Vec<PathBuf> = local
            .all()
            .iter()
            .filter(|n| n.name.eq_ignore_ascii_case(&package.name))
            .filter_map(|n| n.path.parent().map(Path::to_path_buf))
            .collect();

        if target.exists() {
            replaced.push(target.clone());
        }

        replaced.sort();
        replaced.dedup();

        let staging = solution
            .packages_dir()
            .join(STAGING_DIR)
            .join(format!("{}.{}", package.name, package.version));

        Ok(PackageInstall {
            solution: solution.name().to_owned(),
            policy: solution.lock_policy(),
            source: package.path.clone(),
            installed: LocalNuget::new(&package.name, &package.version, target.join(package.file_name())),
            target,
            staging,
            replaced,
        })
    }

    /// Copy a package archive into the solution, replacing any other version
    /// of the same package.
    fn install(&self, solution: &Solution, package: &LocalNuget) -> Result<LocalNuget> {
        self.prepare_install(solution, package)?.run()
    }

    /// Discard this layout's format-specific metadata (the project
    /// definition files). Package archives are left alone.
    fn reset(&self, solution: &Solution) -> Result<()> {
        for project in solution.projects() {
            let path = self.project_file(solution, project);

            if path.exists() {
                atry!(
                    fs::remove_file(&path);
                    ["failed to remove `{}`", path.display()]
                );
            }
        }

        Ok(())
    }

    fn clean(&self, solution: &Solution, mode: CleanMode) -> Result<()> {
        let policy = solution.lock_policy();
        let mut doomed = Vec::new();

        if mode.cleans_projects() {
            for project in solution.projects() {
                let dir = solution.project_dir(project);
                doomed.push(dir.join("bin"));
                doomed.push(dir.join("obj"));
            }
        }

        if mode.cleans_packages() {
            doomed.push(solution.packages_dir());
        }

        for dir in doomed.iter().filter(|d| d.exists()) {
            locks::retry_io(&policy, || fs::remove_dir_all(dir))
                .map_err(|e| locks::escalate(e, solution.name(), dir))?;
        }

        Ok(())
    }
}

/// Create the storage implementation registered for `mode`.
pub fn storage_for(mode: StorageMode) -> Box<dyn NugetStorage> {
    match mode {
        StorageMode::Ripple => Box::new(ripple::RippleStorage),
        StorageMode::Classic => Box::new(classic::ClassicStorage),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stems_split_at_version() {
        assert_eq!(split_package_stem("FubuCore.1.2.0"), Some(("FubuCore", "1.2.0")));
        assert_eq!(
            split_package_stem("FubuMVC.Core.1.2.0.455"),
            Some(("FubuMVC.Core", "1.2.0.455"))
        );
        assert_eq!(
            split_package_stem("Bottles.2.0.0-alpha"),
            Some(("Bottles", "2.0.0-alpha"))
        );
        assert_eq!(split_package_stem("NoVersion"), None);
        assert_eq!(split_package_stem("Trailing."), None);
    }

    #[test]
    fn package_paths_parse() {
        let nuget = parse_package_path(Path::new("/tmp/packages/Foo.Bar.3.1.nupkg")).unwrap();
        assert_eq!(nuget.name, "Foo.Bar");
        assert_eq!(nuget.version, "3.1");
        assert_eq!(nuget.semver(), Some(Version::new(3, 1, 0)));
        assert_eq!(nuget.file_name(), "Foo.Bar.3.1.nupkg");

        assert!(parse_package_path(Path::new("Foo.1.0.zip")).is_none());
    }

    #[test]
    fn local_dependencies_lookup() {
        let local = LocalDependencies::new(
            vec![LocalNuget::new("Alpha", "1.0.0", "/nonexistent/Alpha.1.0.0.nupkg")],
            LockPolicy::default(),
        );

        assert!(local.has("alpha"));
        assert!(!local.has("Beta"));
        assert_eq!(local.get("ALPHA").unwrap().version, "1.0.0");
        assert!(!local.has_locked_files());
    }

    #[test]
    fn highest_side_by_side_version_wins() {
        let local = LocalDependencies::new(
            vec![
                LocalNuget::new("Foo", "1.0.0", "/nonexistent/Foo.1.0.0/Foo.1.0.0.nupkg"),
                LocalNuget::new("Foo", "10.0.0", "/nonexistent/Foo.10.0.0/Foo.10.0.0.nupkg"),
                LocalNuget::new("Foo", "2.0.0", "/nonexistent/Foo.2.0.0/Foo.2.0.0.nupkg"),
            ],
            LockPolicy::default(),
        );

        assert_eq!(local.get("foo").unwrap().version, "10.0.0");
    }

    fn seed(solution: &Solution, folder: &str, file: &str, contents: &[u8]) -> PathBuf {
        let dir = solution.packages_dir().join(folder);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(file);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn failed_install_keeps_previous_copy() {
        let tmp = tempfile::tempdir().unwrap();
        let solution = Solution::at(tmp.path().join("fubu"));
        let old = seed(&solution, "Foo", "Foo.1.0.0.nupkg", b"old");

        let missing = LocalNuget::new("Foo", "2.0.0", tmp.path().join("nowhere/Foo.2.0.0.nupkg"));
        assert!(ripple::RippleStorage.install(&solution, &missing).is_err());

        assert_eq!(fs::read(&old).unwrap(), b"old");
        let local = ripple::RippleStorage.dependencies(&solution).unwrap();
        assert_eq!(local.get("Foo").unwrap().version, "1.0.0");
        assert!(!solution.packages_dir().join(STAGING_DIR).exists());
    }

    #[test]
    fn install_replaces_previous_version() {
        let tmp = tempfile::tempdir().unwrap();
        let solution = Solution::at(tmp.path().join("fubu"));
        seed(&solution, "Foo", "Foo.1.0.0.nupkg", b"old");

        let source = tmp.path().join("Foo.2.0.0.nupkg");
        fs::write(&source, b"new").unwrap();

        let installed = ripple::RippleStorage
            .install(&solution, &LocalNuget::new("Foo", "2.0.0", &source))
            .unwrap();

        assert_eq!(installed.path, solution.packages_dir().join("Foo/Foo.2.0.0.nupkg"));
        assert_eq!(fs::read(&installed.path).unwrap(), b"new");
        assert!(!solution.packages_dir().join("Foo/Foo.1.0.0.nupkg").exists());
        assert!(!solution.packages_dir().join(STAGING_DIR).exists());
    }

    #[test]
    fn classic_install_swaps_version_folders() {
        let tmp = tempfile::tempdir().unwrap();
        let solution = Solution::at(tmp.path().join("fubu"));
        seed(&solution, "Foo.1.0.0", "Foo.1.0.0.nupkg", b"old");

        let source = tmp.path().join("Foo.2.0.0.nupkg");
        fs::write(&source, b"new").unwrap();

        let job = classic::ClassicStorage
            .prepare_install(&solution, &LocalNuget::new("Foo", "2.0.0", &source))
            .unwrap();
        assert_eq!(job.replaced(), &[solution.packages_dir().join("Foo.1.0.0")]);

        job.run().unwrap();

        assert!(!solution.packages_dir().join("Foo.1.0.0").exists());
        let local = classic::ClassicStorage.dependencies(&solution).unwrap();
        assert_eq!(local.all().len(), 1);
        assert_eq!(local.get("Foo").unwrap().version, "2.0.0");
    }

    #[test]
    fn modes_parse() {
        assert_eq!("Ripple".parse::<StorageMode>().unwrap(), StorageMode::Ripple);
        assert_eq!("classic".parse::<StorageMode>().unwrap(), StorageMode::Classic);
        assert_eq!("nuget".parse::<StorageMode>().unwrap(), StorageMode::Classic);
        assert!("paket".parse::<StorageMode>().is_err());
    }
}
