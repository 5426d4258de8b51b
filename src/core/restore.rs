//! Restoring packages from the cache and the feeds.
//!
//! A restore pass has two halves. A [`PlanBuilder`] decides which of the
//! solution's dependencies need work, and the [`RestoreDriver`] carries the
//! resulting [`RestorePlan`] out: each step is satisfied from the package
//! cache when possible and fetched from the solution's feeds otherwise.
//! Steps run concurrently, but two steps for the same package name never
//! touch its folder at the same time.

use futures::stream::{self, StreamExt};
use std::{
    collections::{HashMap, HashSet},
    fmt,
    future::Future,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::{
    dependency::Dependency,
    errors::{Error, Result},
    events::Event,
    feed::{FetchError, NugetQuery, RemoteNuget},
    solution::Solution,
    storage::{LocalNuget, ResourceLockedError},
    version::VersionRange,
};

/// Delay before the first retry of a transient fetch failure; doubles on
/// each further attempt.
pub const FETCH_BACKOFF: Duration = Duration::from_millis(100);

/// Which dependencies should skip the "already present" short-circuit on
/// the next pass.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RestoreSettings {
    force_all: bool,

    /// Lowercased names.
    forced: HashSet<String>,
}

impl RestoreSettings {
    pub fn force_all(&mut self) {
        self.force_all = true;
    }

    pub fn force(&mut self, name: &str) {
        self.forced.insert(name.to_lowercase());
    }

    pub fn is_forced(&self, name: &str) -> bool {
        self.force_all || self.forced.contains(&name.to_lowercase())
    }

    pub fn forces_all(&self) -> bool {
        self.force_all
    }
}

/// Why a dependency is part of a plan.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RestoreReason {
    /// No local copy.
    Missing,

    /// The local copy is older than the declared version.
    Outdated,

    /// Requested explicitly.
    Forced,
}

impl RestoreReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Outdated => "outdated",
            Self::Forced => "forced",
        }
    }
}

#[derive(Clone, Debug)]
pub struct RestoreStep {
    pub dependency: Dependency,
    pub range: VersionRange,
    pub reason: RestoreReason,
}

impl RestoreStep {
    pub fn name(&self) -> &str {
        &self.dependency.name
    }
}

/// The dependencies a pass will restore, sorted by name.
#[derive(Clone, Debug, Default)]
pub struct RestorePlan {
    pub steps: Vec<RestoreStep>,
}

impl RestorePlan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }
}

/// Decides what a restore pass has to do.
pub trait PlanBuilder: fmt::Debug + Send + Sync {
    fn build(&self, solution: &Solution) -> Result<RestorePlan>;
}

/// Plans every dependency that is missing, outdated or forced.
#[derive(Clone, Debug, Default)]
pub struct DefaultPlanBuilder;

impl PlanBuilder for DefaultPlanBuilder {
    fn build(&self, solution: &Solution) -> Result<RestorePlan> {
        let local = solution.local_dependencies()?;
        let settings = solution.restore_settings();
        let mut steps = Vec::new();

        for dep in solution.dependencies() {
            let reason = if settings.is_forced(&dep.name) {
                RestoreReason::Forced
            } else {
                match local.get(&dep.name) {
                    None => RestoreReason::Missing,
                    Some(nuget) => match (dep.semver(), nuget.semver()) {
                        (Some(declared), Some(present)) if declared > present => {
                            RestoreReason::Outdated
                        }
                        _ => continue,
                    },
                }
            };

            steps.push(RestoreStep {
                dependency: dep.clone(),
                range: solution.range_for(dep),
                reason,
            });
        }

        Ok(RestorePlan { steps })
    }
}

/// A package installed by a restore pass.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RestoredNuget {
    pub name: String,
    pub version: String,

    /// `cache`, or the feed it was downloaded from.
    pub source: String,
}

#[derive(Debug)]
pub struct RestoreFailure {
    pub name: String,
    pub error: Error,
}

impl RestoreFailure {
    pub fn is_transient(&self) -> bool {
        self.error
            .downcast_ref::<FetchError>()
            .is_some_and(FetchError::is_transient)
    }
}

/// The outcome of a restore pass, sorted by package name.
#[derive(Debug, Default)]
pub struct RestoreReport {
    pub restored: Vec<RestoredNuget>,
    pub failures: Vec<RestoreFailure>,
}

impl RestoreReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    fn sort(&mut self) {
        self.restored
            .sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        self.failures
            .sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    }
}

/// Per-package-name mutual exclusion for writes into a solution's package
/// folder.
#[derive(Debug, Default)]
pub struct NameLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl NameLocks {
    pub fn lock_for(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);

        locks
            .entry(name.to_lowercase())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

/// Carries out a [`RestorePlan`] against one solution.
pub struct RestoreDriver<'a> {
    solution: &'a Solution,
    cancel: CancellationToken,
    locks: Arc<NameLocks>,
}

impl<'a> RestoreDriver<'a> {
    pub fn new(solution: &'a Solution) -> Self {
        RestoreDriver {
            solution,
            cancel: CancellationToken::new(),
            locks: Arc::new(NameLocks::default()),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Share name locks with other drivers writing to the same folders.
    pub fn with_locks(mut self, locks: Arc<NameLocks>) -> Self {
        self.locks = locks;
        self
    }

    /// Run every step of `plan`. Failures are collected per package and do
    /// not stop the other steps, except that locked files abort the pass.
    pub async fn run(&self, plan: &RestorePlan) -> Result<RestoreReport> {
        let local = self.solution.local_dependencies()?;

        if tokio::task::spawn_blocking(move || local.has_locked_files()).await? {
            return Err(self.solution.locked_files_error());
        }

        let concurrency = self.solution.settings().concurrency.max(1);

        let outcomes: Vec<_> = stream::iter(plan.steps.iter())
            .map(|step| async move { (step.name().to_owned(), self.run_step(step).await) })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut report = RestoreReport::default();

        for (name, outcome) in outcomes {
            match outcome {
                Ok(restored) => report.restored.push(restored),
                Err(error) => {
                    self.solution.observer().notify(&Event::RestoreFailed {
                        name: name.clone(),
                        reason: error.to_string(),
                    });
                    report.failures.push(RestoreFailure { name, error });
                }
            }
        }

        if let Some(index) = report
            .failures
            .iter()
            .position(|f| f.error.is::<ResourceLockedError>())
        {
            return Err(report.failures.swap_remove(index).error);
        }

        report.sort();
        Ok(report)
    }

    async fn run_step(&self, step: &RestoreStep) -> Result<RestoredNuget> {
        let lock = self.locks.lock_for(step.name());
        let _guard = lock.lock().await;

        let solution = self.solution;
        let highest = step.dependency.is_float();

        solution.observer().notify(&Event::RestoreStarted {
            name: step.name().to_owned(),
            range: step.range.to_string(),
        });

        if step.reason != RestoreReason::Forced {
            if let Some(cached) = solution.cache().find(step.name(), &step.range, highest) {
                let installed = self.install(&cached).await?;

                solution.observer().notify(&Event::CacheHit {
                    name: installed.name.clone(),
                    version: installed.version.clone(),
                });

                return Ok(RestoredNuget {
                    name: installed.name,
                    version: installed.version,
                    source: "cache".to_owned(),
                });
            }
        }

        let query = NugetQuery::new(step.dependency.clone(), step.range.clone(), solution.feeds().to_vec());
        let remote = self.fetch(&query).await?;
        let bytes = self
            .guarded(step.name(), solution.feed_service().download(&remote))
            .await?;

        let cached = solution.cache().store(&remote.name, &remote.version, &bytes)?;
        let installed = self.install(&cached).await?;

        solution.observer().notify(&Event::Restored {
            name: installed.name.clone(),
            version: installed.version.clone(),
            source: remote.feed.clone(),
        });

        Ok(RestoredNuget {
            name: installed.name,
            version: installed.version,
            source: remote.feed,
        })
    }

    /// Resolve against the feeds, retrying transient failures.
    async fn fetch(&self, query: &NugetQuery) -> std::result::Result<RemoteNuget, FetchError> {
        let retries = self.solution.settings().fetch_retries;
        let mut attempt = 0;

        loop {
            let result = self
                .guarded(query.name(), self.solution.feed_service().nuget_for(query))
                .await;

            match result {
                Err(e) if e.is_transient() && attempt < retries => {
                    let delay = FETCH_BACKOFF * 2u32.pow(attempt);
                    attempt += 1;
                    debug!("retrying {} in {:?}: {}", query.name(), delay, e);

                    tokio::select! {
                        _ = self.cancel.cancelled() => {
                            return Err(FetchError::Cancelled {
                                name: query.name().to_owned(),
                            });
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                other => return other,
            }
        }
    }

    /// Bound a feed operation by the fetch timeout and the cancellation
    /// token.
    async fn guarded<T, F>(&self, name: &str, fut: F) -> std::result::Result<T, FetchError>
    where
        F: Future<Output = std::result::Result<T, FetchError>>,
    {
        let timeout = self.solution.settings().timeout();

        tokio::select! {
            _ = self.cancel.cancelled() => Err(FetchError::Cancelled { name: name.to_owned() }),
            r = tokio::time::timeout(timeout, fut) => match r {
                Ok(r) => r,
                Err(_) => Err(FetchError::Timeout {
                    name: name.to_owned(),
                    seconds: timeout.as_secs(),
                }),
            },
        }
    }

    /// Install off the async executor; lock retries sleep.
    async fn install(&self, package: &LocalNuget) -> Result<LocalNuget> {
        let job = self.solution.storage().prepare_install(self.solution, package)?;
        tokio::task::spawn_blocking(move || job.run()).await?
    }
}
