//! The solution aggregate.
//!
//! A [`Solution`] owns its projects, the dependencies declared at solution
//! level, the feeds it restores from and a set of pluggable collaborators
//! (storage layout, package cache, feed service, publisher, restore planner
//! and event observer). Everything the engine does is reached from here.
//!
//! Several views are expensive to compute and are cached until something
//! invalidates them: the combined dependency collection (rebuilt whenever
//! projects or solution-level dependencies change), the list of missing
//! packages and the publisher's specifications (both recomputed only after
//! [`Solution::reset`]).

use once_cell::unsync::OnceCell;
use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error as ThisError;
use tokio_util::sync::CancellationToken;

use crate::core::{
    cache::{FileSystemCache, NugetCache},
    config::{settings::RippleSettings, syntax::NuspecMapping, ConfigurationFile, SOLUTION_FILE},
    dependency::{Dependency, DependencyCollection, DependencyConflict, DependencyGroup},
    errors::{Error, Result},
    events::{Event, Observer, TracingObserver},
    feed::{Feed, FeedChain, FeedService, FetchError, NugetQuery, RemoteNuget},
    project::Project,
    publish::{NugetSpec, NuspecPublisher, PublishingService},
    restore::{DefaultPlanBuilder, PlanBuilder, RestoreDriver, RestorePlan, RestoreReport, RestoreSettings},
    storage::{
        locks::{ProcessProbe, SystemProcessProbe},
        storage_for, CleanMode, LocalDependencies, LocalNuget, LockPolicy, NugetStorage,
        ResourceLockedError, StorageMode,
    },
    validation::{self, ValidationFailure, ValidationResult},
    version::{UpdateMode, VersionConstraint, VersionRange},
};
use crate::atry;

/// An error returned when an operation names a dependency the solution does
/// not declare anywhere.
#[derive(Debug, ThisError)]
#[error("solution `{solution}` has no dependency named `{name}`")]
pub struct UnknownDependencyError {
    pub solution: String,
    pub name: String,
}

pub struct Solution {
    name: String,
    directory: PathBuf,
    mode: StorageMode,
    packages_folder: String,
    nuspec_folder: String,
    default_float: VersionConstraint,
    default_fixed: VersionConstraint,

    projects: Vec<Project>,
    nugets: Vec<Dependency>,
    feeds: Vec<Feed>,
    groups: Vec<DependencyGroup>,
    nuspecs: Vec<NuspecMapping>,

    settings: RippleSettings,
    restore_settings: RestoreSettings,

    storage: Box<dyn NugetStorage>,
    cache: Arc<dyn NugetCache>,
    feed_service: Arc<dyn FeedService>,
    publisher: Box<dyn PublishingService>,
    plan_builder: Box<dyn PlanBuilder>,
    observer: Arc<dyn Observer>,
    process_probe: Box<dyn ProcessProbe>,

    dependencies: OnceCell<DependencyCollection>,
    missing: OnceCell<Vec<Dependency>>,
    specifications: OnceCell<Vec<NugetSpec>>,
    nuget_dependencies: Vec<NugetSpec>,
}

impl fmt::Debug for Solution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Solution")
            .field("name", &self.name)
            .field("directory", &self.directory)
            .field("mode", &self.mode)
            .field("projects", &self.projects)
            .field("nugets", &self.nugets)
            .field("feeds", &self.feeds)
            .finish_non_exhaustive()
    }
}

impl Default for Solution {
    fn default() -> Self {
        Solution::new()
    }
}

impl Solution {
    /// A fresh, unnamed solution rooted in the current directory.
    pub fn new() -> Self {
        let settings = RippleSettings::default();

        Solution {
            name: String::new(),
            directory: PathBuf::from("."),
            mode: StorageMode::default(),
            packages_folder: "packages".to_owned(),
            nuspec_folder: "packaging/nuget".to_owned(),
            default_float: VersionConstraint::DEFAULT_FLOAT,
            default_fixed: VersionConstraint::DEFAULT_FIXED,
            projects: Vec::new(),
            nugets: Vec::new(),
            feeds: Vec::new(),
            groups: Vec::new(),
            nuspecs: Vec::new(),
            restore_settings: RestoreSettings::default(),
            storage: storage_for(StorageMode::default()),
            cache: Arc::new(FileSystemCache::new(settings.cache_dir())),
            feed_service: Arc::new(FeedChain::default()),
            publisher: Box::new(NuspecPublisher),
            plan_builder: Box::new(DefaultPlanBuilder),
            observer: Arc::new(TracingObserver),
            process_probe: Box::new(SystemProcessProbe),
            settings,
            dependencies: OnceCell::new(),
            missing: OnceCell::new(),
            specifications: OnceCell::new(),
            nuget_dependencies: Vec::new(),
        }
    }

    /// A fresh solution rooted at `directory` and named after it.
    pub fn at(directory: impl AsRef<Path>) -> Self {
        let directory = directory.as_ref().to_path_buf();
        let mut solution = Solution::new();

        solution.name = directory
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_owned();
        solution.directory = directory;
        solution
    }

    /// A stand-in solution with nothing in it.
    pub fn empty() -> Self {
        Solution::named("empty")
    }

    /// A stand-in for a solution known only by name, e.g. the publisher of a
    /// package that is not checked out locally.
    pub fn named(name: impl Into<String>) -> Self {
        let mut solution = Solution::new();
        solution.name = name.into();
        solution
    }

    /// Load the solution rooted at `directory` from its `ripple.toml` and
    /// its projects' dependency files.
    pub fn load(directory: impl AsRef<Path>, settings: &RippleSettings) -> Result<Self> {
        let mut solution = Solution::at(directory);
        solution.apply_settings(settings);

        let cfg = atry!(
            ConfigurationFile::get(solution.definition_file());
            ["failed to load solution in `{}`", solution.directory.display()]
        );

        if !cfg.solution.name.is_empty() {
            solution.name = cfg.solution.name;
        }

        solution.mode = cfg.solution.mode;
        solution.storage = storage_for(cfg.solution.mode);
        solution.packages_folder = cfg.solution.packages;
        solution.nuspec_folder = cfg.solution.nuspecs;
        solution.default_float = cfg.solution.float_constraint;
        solution.default_fixed = cfg.solution.fixed_constraint;

        for feed in cfg.feeds {
            solution.add_feed(feed);
        }

        solution.set_nugets(cfg.nugets);
        solution.groups = cfg.groups;
        solution.nuspecs = cfg.nuspecs;

        for p in cfg.projects {
            let directory = p.directory.unwrap_or_else(|| p.name.clone());
            let mut project = Project::new(p.name).with_directory(directory);
            project.dependencies = solution.storage.read_project_dependencies(&solution, &project)?;
            solution.add_project(project);
        }

        Ok(solution)
    }

    /// Write the solution definition and every project's dependency file.
    pub fn save(&self) -> Result<()> {
        self.storage.write(self)
    }

    /// Adopt user settings: cache location, lock polling and restore limits.
    pub fn apply_settings(&mut self, settings: &RippleSettings) {
        self.cache = Arc::new(FileSystemCache::new(settings.cache_dir()));
        self.settings = settings.clone();
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn mode(&self) -> StorageMode {
        self.mode
    }

    pub fn packages_folder(&self) -> &str {
        &self.packages_folder
    }

    pub fn nuspec_folder(&self) -> &str {
        &self.nuspec_folder
    }

    pub fn definition_file(&self) -> PathBuf {
        self.directory.join(SOLUTION_FILE)
    }

    pub fn packages_dir(&self) -> PathBuf {
        self.directory.join(&self.packages_folder)
    }

    pub fn nuspec_dir(&self) -> PathBuf {
        self.directory.join(&self.nuspec_folder)
    }

    pub fn project_dir(&self, project: &Project) -> PathBuf {
        self.directory.join(&project.directory)
    }

    pub fn settings(&self) -> &RippleSettings {
        &self.settings
    }

    pub fn lock_policy(&self) -> LockPolicy {
        self.settings.lock_policy()
    }

    // Collaborators

    pub fn storage(&self) -> &dyn NugetStorage {
        self.storage.as_ref()
    }

    pub fn cache(&self) -> &dyn NugetCache {
        self.cache.as_ref()
    }

    pub fn feed_service(&self) -> &dyn FeedService {
        self.feed_service.as_ref()
    }

    pub fn publisher(&self) -> &dyn PublishingService {
        self.publisher.as_ref()
    }

    pub fn observer(&self) -> &dyn Observer {
        self.observer.as_ref()
    }

    pub fn use_storage(&mut self, storage: Box<dyn NugetStorage>) {
        self.storage = storage;
        self.reset();
    }

    pub fn use_cache(&mut self, cache: Arc<dyn NugetCache>) {
        self.cache = cache;
    }

    pub fn use_feed_service(&mut self, feed_service: Arc<dyn FeedService>) {
        self.feed_service = feed_service;
    }

    pub fn use_publisher(&mut self, publisher: Box<dyn PublishingService>) {
        self.publisher = publisher;
        self.specifications.take();
    }

    pub fn use_plan_builder(&mut self, plan_builder: Box<dyn PlanBuilder>) {
        self.plan_builder = plan_builder;
    }

    pub fn use_observer(&mut self, observer: Arc<dyn Observer>) {
        self.observer = observer;
    }

    pub fn use_process_probe(&mut self, probe: Box<dyn ProcessProbe>) {
        self.process_probe = probe;
    }

    // Projects

    pub fn projects(&self) -> &[Project] {
        &self.projects[..]
    }

    /// Add a project. Names are unique: if a project with the same name is
    /// already present, nothing changes and `false` is returned.
    pub fn add_project(&mut self, mut project: Project) -> bool {
        if self.find_project(&project.name).is_some() {
            return false;
        }

        project.solution = Some(self.name.clone());
        self.projects.push(project);
        self.dependencies.take();
        true
    }

    pub fn find_project(&self, name: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.name.eq_ignore_ascii_case(name))
    }

    // Solution-level dependencies

    /// The solution-level dependencies, sorted by name.
    pub fn nugets(&self) -> &[Dependency] {
        &self.nugets[..]
    }

    pub fn set_nugets(&mut self, nugets: Vec<Dependency>) {
        let mut collection: DependencyCollection = nugets.into_iter().collect();
        collection.sort_by_name();
        self.nugets = collection.iter().cloned().collect();
        self.dependencies.take();
    }

    /// Add a solution-level dependency. Adding a name that is already
    /// declared leaves the existing entry in place and returns `false`.
    pub fn add_dependency(&mut self, dependency: Dependency) -> bool {
        if self.find_dependency(&dependency.name).is_some() {
            return false;
        }

        let mut nugets = std::mem::take(&mut self.nugets);
        nugets.push(dependency);
        self.set_nugets(nugets);
        true
    }

    /// Remove a solution-level dependency. Removing an unknown name is a
    /// no-op.
    pub fn remove_dependency(&mut self, name: &str) -> Option<Dependency> {
        let index = self.nugets.iter().position(|d| d.matches(name))?;
        let removed = self.nugets.remove(index);
        self.dependencies.take();
        Some(removed)
    }

    /// Replace a solution-level dependency with a new declaration.
    pub fn update_dependency(&mut self, dependency: Dependency) {
        self.remove_dependency(&dependency.name);
        self.add_dependency(dependency);
    }

    pub fn find_dependency(&self, name: &str) -> Option<&Dependency> {
        self.nugets.iter().find(|d| d.matches(name))
    }

    // Feeds, groups and nuspecs

    pub fn feeds(&self) -> &[Feed] {
        &self.feeds[..]
    }

    /// Add a feed unless one with the same URL is already configured.
    pub fn add_feed(&mut self, feed: Feed) -> bool {
        let url = feed.url.trim_end_matches('/');

        if self
            .feeds
            .iter()
            .any(|f| f.url.trim_end_matches('/').eq_ignore_ascii_case(url))
        {
            return false;
        }

        self.feeds.push(feed);
        true
    }

    pub fn groups(&self) -> &[DependencyGroup] {
        &self.groups[..]
    }

    pub fn add_group(&mut self, group: DependencyGroup) {
        self.groups.push(group);
    }

    /// The group that `name` is updated with, if any.
    pub fn group_for(&self, name: &str) -> Option<&DependencyGroup> {
        self.groups.iter().find(|g| g.has(name))
    }

    pub fn nuspecs(&self) -> &[NuspecMapping] {
        &self.nuspecs[..]
    }

    pub fn add_nuspec(&mut self, mapping: NuspecMapping) {
        self.nuspecs.push(mapping);
        self.specifications.take();
    }

    // The combined graph

    /// Every dependency of the solution and its projects, one per name,
    /// sorted by name.
    pub fn dependencies(&self) -> &DependencyCollection {
        self.dependencies.get_or_init(|| {
            DependencyCollection::combine(&self.nugets, self.projects.iter().map(|p| &p.dependencies))
        })
    }

    /// Names declared at more than one level with different versions.
    pub fn dependency_conflicts(&self) -> Vec<DependencyConflict> {
        DependencyCollection::conflicts(&self.nugets, self.projects.iter().map(|p| &p.dependencies))
    }

    pub fn all_nugets_dependency_names(&self) -> Vec<String> {
        self.dependencies().names()
    }

    // Constraints

    pub fn default_float_constraint(&self) -> VersionConstraint {
        self.default_float
    }

    pub fn default_fixed_constraint(&self) -> VersionConstraint {
        self.default_fixed
    }

    pub fn set_default_float_constraint(&mut self, constraint: VersionConstraint) {
        self.default_float = constraint;
    }

    pub fn set_default_fixed_constraint(&mut self, constraint: VersionConstraint) {
        self.default_fixed = constraint;
    }

    /// The dependency's own constraint, else the default for its mode.
    pub fn constraint_for(&self, dependency: &Dependency) -> VersionConstraint {
        match dependency.version_constraint {
            Some(constraint) => constraint,
            None => match dependency.mode {
                UpdateMode::Float => self.default_float,
                UpdateMode::Fixed => self.default_fixed,
            },
        }
    }

    /// The versions acceptable for a dependency. Unversioned dependencies
    /// (or ones whose version does not parse) accept anything.
    pub fn range_for(&self, dependency: &Dependency) -> VersionRange {
        match dependency.semver() {
            Some(version) => self.constraint_for(dependency).spec_for(&version),
            None => VersionRange::any(),
        }
    }

    // Local state

    pub fn local_dependencies(&self) -> Result<LocalDependencies> {
        self.storage.dependencies(self)
    }

    /// Declared dependencies with no local copy. Computed once; call
    /// [`Self::reset`] to pick up filesystem changes.
    pub fn missing_nugets(&self) -> Result<&[Dependency]> {
        let missing = self.missing.get_or_try_init(|| {
            let missing = self.storage.missing_files(self)?;

            for dep in &missing {
                self.observer.notify(&Event::Missing {
                    solution: self.name.clone(),
                    name: dep.name.clone(),
                });
            }

            Ok::<_, crate::core::errors::Error>(missing)
        })?;

        Ok(&missing[..])
    }

    pub fn has_local_copy(&self, name: &str) -> Result<bool> {
        Ok(self.local_dependencies()?.has(name))
    }

    pub fn local_nuget(&self, name: &str) -> Result<Option<LocalNuget>> {
        Ok(self.local_dependencies()?.get(name).cloned())
    }

    pub fn has_locked_files(&self) -> Result<bool> {
        self.storage.has_locked_files(self)
    }

    /// Fail with [`ResourceLockedError`] if any local package file is held
    /// open by another process.
    pub fn assert_no_locked_files(&self) -> Result<()> {
        if !self.has_locked_files()? {
            return Ok(());
        }

        Err(self.locked_files_error())
    }

    /// Report locked package files and name the IDE most likely holding
    /// them.
    pub fn locked_files_error(&self) -> Error {
        let process = self.process_probe.find_ide();

        self.observer.notify(&Event::LockedFiles {
            solution: self.name.clone(),
            process: process.clone(),
        });

        ResourceLockedError {
            solution: self.name.clone(),
            process,
        }
        .into()
    }

    // Validation

    pub fn validate(&self) -> Result<ValidationResult> {
        let result = validation::validate(self.dependencies(), &self.local_dependencies()?);

        for problem in &result.problems {
            self.observer.notify(&Event::Problem {
                name: problem.name.clone(),
                message: problem.message.clone(),
            });
        }

        Ok(result)
    }

    /// Fail with [`ValidationFailure`] unless the solution is valid.
    pub fn assert_is_valid(&self) -> Result<()> {
        let result = self.validate()?;

        if result.is_valid() {
            return Ok(());
        }

        self.observer.notify(&Event::ValidationReport {
            solution: self.name.clone(),
            report: result.report(),
        });

        Err(ValidationFailure {
            solution: self.name.clone(),
            result,
        }
        .into())
    }

    // Restore

    /// Resolve one dependency against the solution's feeds.
    pub async fn restore(&self, dependency: &Dependency) -> std::result::Result<RemoteNuget, FetchError> {
        let query = NugetQuery::new(dependency.clone(), self.range_for(dependency), self.feeds.clone());
        self.feed_service.nuget_for(&query).await
    }

    pub fn restore_settings(&self) -> &RestoreSettings {
        &self.restore_settings
    }

    /// Restore every dependency on the next pass, present or not.
    pub fn force_restore(&mut self) {
        self.restore_settings.force_all();
    }

    /// Restore `name` on the next pass, present or not.
    pub fn force_restore_nuget(&mut self, name: &str) -> Result<()> {
        if !self.dependencies().has(name) {
            return Err(UnknownDependencyError {
                solution: self.name.clone(),
                name: name.to_owned(),
            }
            .into());
        }

        self.restore_settings.force(name);
        Ok(())
    }

    pub fn plan_restore(&self) -> Result<RestorePlan> {
        self.plan_builder.build(self)
    }

    /// Restore everything that is missing, outdated or forced.
    pub async fn restore_all(&mut self) -> Result<RestoreReport> {
        self.restore_all_with(CancellationToken::new()).await
    }

    pub async fn restore_all_with(&mut self, cancel: CancellationToken) -> Result<RestoreReport> {
        let plan = self.plan_restore()?;

        let report = RestoreDriver::new(self)
            .with_cancellation(cancel)
            .run(&plan)
            .await?;

        self.restore_settings = RestoreSettings::default();
        self.reset();
        Ok(report)
    }

    // Storage

    /// Switch to another storage layout. The current layout's metadata is
    /// discarded; call [`Self::save`] to write the new one.
    pub fn convert_to(&mut self, mode: StorageMode) -> Result<()> {
        self.storage.reset(self)?;
        self.storage = storage_for(mode);
        self.mode = mode;
        self.reset();

        self.observer.notify(&Event::Converted {
            solution: self.name.clone(),
            mode: mode.to_string(),
        });

        Ok(())
    }

    pub fn clean(&mut self, mode: CleanMode) -> Result<()> {
        self.assert_no_locked_files()?;
        self.storage.clean(self, mode)?;
        self.reset();

        self.observer.notify(&Event::Cleaned {
            solution: self.name.clone(),
            mode: mode.as_str().to_owned(),
        });

        Ok(())
    }

    // Publishing

    /// The packages this solution publishes.
    pub fn specifications(&self) -> Result<&[NugetSpec]> {
        let specs = self
            .specifications
            .get_or_try_init(|| self.publisher.specifications_for(self))?;
        Ok(&specs[..])
    }

    /// Resolve each dependency to the package specification that produces
    /// it, using `finder`. Dependencies the finder does not know are
    /// skipped.
    pub fn determine_nuget_dependencies<F>(&mut self, finder: F)
    where
        F: Fn(&Dependency) -> Option<NugetSpec>,
    {
        self.nuget_dependencies = self.dependencies().iter().filter_map(finder).collect();
    }

    /// The resolved specifications from the last call to
    /// [`Self::determine_nuget_dependencies`].
    pub fn nuget_dependencies(&self) -> &[NugetSpec] {
        &self.nuget_dependencies[..]
    }

    /// The solutions that publish packages this one consumes, sorted by
    /// name. A solution never depends on itself.
    pub fn solution_dependencies(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();

        for spec in &self.nuget_dependencies {
            if spec.publisher.eq_ignore_ascii_case(&self.name)
                || names.iter().any(|n| n.eq_ignore_ascii_case(&spec.publisher))
            {
                continue;
            }

            names.push(spec.publisher.clone());
        }

        names.sort_by_key(|n| n.to_lowercase());
        names
    }

    /// Forget every lazily computed view.
    pub fn reset(&mut self) {
        self.dependencies.take();
        self.missing.take();
        self.specifications.take();
        self.nuget_dependencies.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        events::{testing::RecordingObserver, NullObserver},
        storage::{classic, package_file_name, ripple},
        validation::{Problem, NOT_FOUND},
    };
    use std::fs;

    fn install(solution: &Solution, name: &str, version: &str) {
        let dir = solution.storage().package_dir(solution, name, version);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(package_file_name(name, version)), b"nupkg").unwrap();
    }

    fn two_projects(dir: &Path) -> Solution {
        let mut solution = Solution::at(dir);
        solution.use_observer(Arc::new(NullObserver));

        let mut p1 = Project::new("P1");
        p1.add_dependency(Dependency::float("Alpha", "1.0"));
        let mut p2 = Project::new("P2");
        p2.add_dependency(Dependency::fixed("Beta", "2.0"));

        solution.add_project(p1);
        solution.add_project(p2);
        solution
    }

    #[test]
    fn scenario_missing_and_invalid() {
        let tmp = tempfile::tempdir().unwrap();
        let solution = two_projects(tmp.path());

        let missing: Vec<_> = solution
            .missing_nugets()
            .unwrap()
            .iter()
            .map(|d| d.name.clone())
            .collect();
        assert_eq!(missing, vec!["Alpha", "Beta"]);

        let result = solution.validate().unwrap();
        assert_eq!(
            result.problems,
            vec![Problem::new("Alpha", NOT_FOUND), Problem::new("Beta", NOT_FOUND)]
        );

        let err = solution.assert_is_valid().unwrap_err();
        assert!(err.downcast_ref::<ValidationFailure>().is_some());
    }

    #[test]
    fn combined_dependencies_track_mutation() {
        let tmp = tempfile::tempdir().unwrap();
        let mut solution = two_projects(tmp.path());
        assert_eq!(solution.all_nugets_dependency_names(), vec!["Alpha", "Beta"]);

        solution.add_dependency(Dependency::fixed("Gamma", "1.0.0"));
        assert_eq!(solution.all_nugets_dependency_names(), vec!["Alpha", "Beta", "Gamma"]);

        let mut p3 = Project::new("P3");
        p3.add_dependency(Dependency::fixed("Delta", "0.1.0"));
        solution.add_project(p3);
        assert!(solution.dependencies().has("Delta"));

        solution.remove_dependency("gamma");
        assert!(!solution.dependencies().has("Gamma"));
        assert!(solution.find_dependency("Gamma").is_none());
        assert!(solution.remove_dependency("Gamma").is_none());
    }

    #[test]
    fn project_declarations_win_in_the_combined_view() {
        let tmp = tempfile::tempdir().unwrap();
        let mut solution = two_projects(tmp.path());
        solution.add_dependency(Dependency::fixed("Alpha", "0.5.0"));

        assert_eq!(solution.dependencies().find("Alpha").unwrap().version.as_deref(), Some("1.0"));
        assert_eq!(solution.find_dependency("Alpha").unwrap().version.as_deref(), Some("0.5.0"));

        let conflicts = solution.dependency_conflicts();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].name, "Alpha");
    }

    #[test]
    fn add_dependency_is_idempotent() {
        let mut solution = Solution::empty();
        assert!(solution.add_dependency(Dependency::fixed("Zeta", "1.0.0")));
        assert!(solution.add_dependency(Dependency::fixed("Alpha", "1.0.0")));
        assert!(!solution.add_dependency(Dependency::float("ALPHA", "9.9.9")));

        assert_eq!(solution.nugets().len(), 2);
        assert_eq!(solution.nugets()[0].name, "Alpha");
        assert_eq!(solution.find_dependency("alpha").unwrap().version.as_deref(), Some("1.0.0"));

        solution.update_dependency(Dependency::float("Alpha", "2.0.0"));
        assert_eq!(solution.find_dependency("Alpha").unwrap().mode, UpdateMode::Float);
        assert_eq!(solution.nugets().len(), 2);
    }

    #[test]
    fn projects_are_unique_and_know_their_solution() {
        let mut solution = Solution::named("fubu");
        assert!(solution.add_project(Project::new("App")));
        assert!(!solution.add_project(Project::new("app")));
        assert_eq!(solution.projects().len(), 1);
        assert_eq!(solution.find_project("APP").unwrap().solution(), Some("fubu"));
    }

    #[test]
    fn constraint_resolution() {
        let mut solution = Solution::empty();
        let float = Dependency::float("Alpha", "1.0.0");
        let fixed = Dependency::fixed("Beta", "1.0.0");
        let pinned = Dependency::fixed("Gamma", "1.0.0").with_constraint(VersionConstraint::DEFAULT_FLOAT);

        assert_eq!(solution.constraint_for(&float), VersionConstraint::DEFAULT_FLOAT);
        assert_eq!(solution.constraint_for(&fixed), VersionConstraint::DEFAULT_FIXED);
        assert_eq!(solution.constraint_for(&pinned), VersionConstraint::DEFAULT_FLOAT);

        let minor: VersionConstraint = "Current,NextMinor".parse().unwrap();
        solution.set_default_fixed_constraint(minor);
        solution.set_default_float_constraint(minor);

        assert_eq!(solution.constraint_for(&float), minor);
        assert_eq!(solution.constraint_for(&fixed), minor);
        assert_eq!(solution.constraint_for(&pinned), VersionConstraint::DEFAULT_FLOAT);
        assert_eq!(solution.range_for(&fixed).to_string(), "[1.0.0, 1.1.0)");
        assert_eq!(solution.range_for(&Dependency::unversioned("Any")), VersionRange::any());
    }

    #[test]
    fn feeds_are_deduplicated() {
        let mut solution = Solution::empty();
        assert!(solution.add_feed(Feed::new("https://api.nuget.org/v3/index.json")));
        assert!(!solution.add_feed(Feed::new("https://API.nuget.org/v3/index.json/")));
        assert!(solution.add_feed(Feed::new("/srv/nugets")));
        assert_eq!(solution.feeds().len(), 2);
    }

    #[test]
    fn groups_and_unknown_forced_names() {
        let mut solution = Solution::named("fubu");
        solution.add_dependency(Dependency::fixed("FubuCore", "1.0.0"));
        solution.add_group(DependencyGroup::new(["FubuCore", "FubuLocalization"]));

        assert!(solution.group_for("fubulocalization").is_some());
        assert!(solution.group_for("Bottles").is_none());

        solution.force_restore_nuget("fubucore").unwrap();
        assert!(solution.restore_settings().is_forced("FubuCore"));

        let err = solution.force_restore_nuget("Bottles").unwrap_err();
        let unknown = err.downcast_ref::<UnknownDependencyError>().unwrap();
        assert_eq!(unknown.name, "Bottles");
    }

    #[test]
    fn missing_list_is_cached_until_reset() {
        let tmp = tempfile::tempdir().unwrap();
        let mut solution = two_projects(tmp.path());
        let observer = Arc::new(RecordingObserver::default());
        solution.use_observer(observer.clone());

        assert_eq!(solution.missing_nugets().unwrap().len(), 2);
        install(&solution, "Alpha", "1.0.0");
        assert_eq!(solution.missing_nugets().unwrap().len(), 2);
        assert!(solution.has_local_copy("Alpha").unwrap());

        solution.reset();
        assert_eq!(solution.missing_nugets().unwrap().len(), 1);

        let missing_events = observer
            .take()
            .into_iter()
            .filter(|e| matches!(e, Event::Missing { .. }))
            .count();
        assert_eq!(missing_events, 3);
    }

    #[test]
    fn outdated_local_copies_are_invalid() {
        let tmp = tempfile::tempdir().unwrap();
        let solution = two_projects(tmp.path());
        install(&solution, "Alpha", "1.0.0");
        install(&solution, "Beta", "1.5.0");

        let result = solution.validate().unwrap();
        assert_eq!(result.problems.len(), 1);
        assert_eq!(result.problems[0].name, "Beta");

        install(&solution, "Beta", "2.0.0");
        fs::remove_file(
            solution
                .packages_dir()
                .join("Beta")
                .join(package_file_name("Beta", "1.5.0")),
        )
        .unwrap();
        assert!(solution.validate().unwrap().is_valid());
        assert!(solution.assert_is_valid().is_ok());
    }

    #[test]
    fn save_and_load_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("fubu");

        let mut solution = Solution::at(&dir);
        solution.add_feed(Feed::new("https://api.nuget.org/v3/index.json"));
        solution.add_dependency(Dependency::fixed("Bottles", "2.0.0"));
        solution.set_default_float_constraint("Current,NextMajor".parse().unwrap());

        let mut app = Project::new("App").with_directory("src/App");
        app.add_dependency(Dependency::float("FubuCore", "1.2.0"));
        solution.add_project(app);
        solution.save().unwrap();

        assert!(dir.join(SOLUTION_FILE).exists());
        assert!(dir.join("src/App").join(ripple::PROJECT_FILE).exists());

        let loaded = Solution::load(&dir, &RippleSettings::default()).unwrap();
        assert_eq!(loaded.name(), "fubu");
        assert_eq!(loaded.feeds(), solution.feeds());
        assert_eq!(loaded.nugets(), solution.nugets());
        assert_eq!(loaded.default_float_constraint(), VersionConstraint::DEFAULT_FIXED);
        assert_eq!(loaded.projects()[0].directory, PathBuf::from("src/App"));
        assert_eq!(loaded.all_nugets_dependency_names(), vec!["Bottles", "FubuCore"]);
    }

    #[test]
    fn convert_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let mut solution = two_projects(tmp.path());
        solution.save().unwrap();
        install(&solution, "Alpha", "1.0.0");

        let direct: Vec<String> = solution
            .local_dependencies()
            .unwrap()
            .all()
            .iter()
            .map(|n| n.name.clone())
            .collect();

        solution.convert_to(StorageMode::Classic).unwrap();
        assert_eq!(solution.mode(), StorageMode::Classic);
        assert!(!tmp.path().join("P1").join(ripple::PROJECT_FILE).exists());
        solution.save().unwrap();
        assert!(tmp.path().join("P1").join(classic::PROJECT_FILE).exists());

        solution.convert_to(StorageMode::Ripple).unwrap();
        assert!(!tmp.path().join("P1").join(classic::PROJECT_FILE).exists());

        let round_trip: Vec<String> = solution
            .local_dependencies()
            .unwrap()
            .all()
            .iter()
            .map(|n| n.name.clone())
            .collect();
        assert_eq!(round_trip, direct);
        assert_eq!(solution.storage().mode(), StorageMode::Ripple);
    }

    #[test]
    fn clean_removes_packages() {
        let tmp = tempfile::tempdir().unwrap();
        let mut solution = two_projects(tmp.path());
        install(&solution, "Alpha", "1.0.0");
        fs::create_dir_all(tmp.path().join("P1").join("bin")).unwrap();

        solution.clean(CleanMode::Projects).unwrap();
        assert!(!tmp.path().join("P1").join("bin").exists());
        assert!(solution.has_local_copy("Alpha").unwrap());

        solution.clean(CleanMode::All).unwrap();
        assert!(!solution.packages_dir().exists());
    }

    #[test]
    fn restore_resolves_against_feeds() {
        let tmp = tempfile::tempdir().unwrap();
        let feed_dir = tmp.path().join("feed");
        fs::create_dir_all(&feed_dir).unwrap();

        for version in ["1.0.0", "1.5.0", "2.0.0"] {
            fs::write(feed_dir.join(package_file_name("Alpha", version)), version).unwrap();
        }

        let mut solution = Solution::at(tmp.path().join("fubu"));
        solution.add_feed(Feed::new(feed_dir.to_string_lossy()));

        let fixed = tokio_test::block_on(solution.restore(&Dependency::fixed("Alpha", "1.0.0"))).unwrap();
        assert_eq!(fixed.version, "1.0.0");

        let float = tokio_test::block_on(solution.restore(&Dependency::float("Alpha", "1.2.0"))).unwrap();
        assert_eq!(float.version, "2.0.0");

        let err = tokio_test::block_on(solution.restore(&Dependency::fixed("Beta", "1.0.0"))).unwrap_err();
        assert!(matches!(err, FetchError::NotFound { .. }), "unexpected error: {:?}", err);
    }

    #[test]
    fn scenario_solution_dependencies() {
        let x = Solution::named("X");
        let spec = NugetSpec::new("X-lib", x.name());

        let mut y = Solution::named("Y");
        y.add_dependency(Dependency::fixed("X-lib", "1.0.0"));
        y.add_dependency(Dependency::fixed("Newtonsoft.Json", "9.0.1"));

        y.determine_nuget_dependencies(|dep| dep.matches(&spec.name).then(|| spec.clone()));

        assert_eq!(y.nuget_dependencies().len(), 1);
        assert_eq!(y.solution_dependencies(), vec!["X"]);

        y.reset();
        assert!(y.solution_dependencies().is_empty());
    }

    #[test]
    fn solutions_never_depend_on_themselves() {
        let mut x = Solution::named("X");
        x.add_dependency(Dependency::fixed("X-lib", "1.0.0"));
        x.add_dependency(Dependency::fixed("Y-lib", "1.0.0"));
        x.add_dependency(Dependency::fixed("Y-extras", "1.0.0"));

        x.determine_nuget_dependencies(|dep| {
            let publisher = if dep.name.starts_with("X") { "X" } else { "y" };
            Some(NugetSpec::new(dep.name.clone(), publisher))
        });

        assert_eq!(x.solution_dependencies(), vec!["y"]);
    }
}
