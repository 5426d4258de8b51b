//! Package dependencies and the collections that hold them.

use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, collections::HashMap, fmt};

use crate::core::version::{parse_version, UpdateMode, Version, VersionConstraint};

/// A named package requirement.
///
/// Identity is the name, compared case-insensitively. Dependencies are
/// treated as values: changing one means removing it and adding a new one.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Dependency {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, rename = "constraint", skip_serializing_if = "Option::is_none")]
    pub version_constraint: Option<VersionConstraint>,

    #[serde(default)]
    pub mode: UpdateMode,
}

impl Dependency {
    pub fn new(name: impl Into<String>, version: Option<&str>, mode: UpdateMode) -> Self {
        Dependency {
            name: name.into(),
            version: version.map(str::to_owned),
            version_constraint: None,
            mode,
        }
    }

    pub fn float(name: impl Into<String>, version: &str) -> Self {
        Self::new(name, Some(version), UpdateMode::Float)
    }

    pub fn fixed(name: impl Into<String>, version: &str) -> Self {
        Self::new(name, Some(version), UpdateMode::Fixed)
    }

    /// A dependency with no version information; it accepts whatever is
    /// available.
    pub fn unversioned(name: impl Into<String>) -> Self {
        Self::new(name, None, UpdateMode::Float)
    }

    pub fn with_constraint(mut self, constraint: VersionConstraint) -> Self {
        self.version_constraint = Some(constraint);
        self
    }

    /// Whether this dependency is named `name`, ignoring case.
    pub fn matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// The declared version parsed as a semantic version.
    ///
    /// `None` if no version was declared or if it does not parse.
    pub fn semver(&self) -> Option<Version> {
        self.version.as_deref().and_then(|v| parse_version(v).ok())
    }

    pub fn is_float(&self) -> bool {
        self.mode == UpdateMode::Float
    }

    /// Render in the `Name[,version[,mode]]` line format used by project
    /// dependency files.
    pub fn to_line(&self) -> String {
        match self.version {
            Some(ref version) => format!("{},{},{}", self.name, version, self.mode),
            None => self.name.clone(),
        }
    }

    /// Parse the `Name[,version[,mode]]` line format. Blank lines and lines
    /// starting with `#` yield `None`.
    pub fn from_line(line: &str) -> Option<Self> {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        let mut fields = line.split(',').map(str::trim);
        let name = fields.next()?.to_owned();
        let version = fields.next().filter(|v| !v.is_empty()).map(str::to_owned);
        let mode = fields
            .next()
            .and_then(|m| m.parse().ok())
            .unwrap_or(if version.is_some() {
                UpdateMode::Fixed
            } else {
                UpdateMode::Float
            });

        Some(Dependency {
            name,
            version,
            version_constraint: None,
            mode,
        })
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version {
            Some(ref version) => write!(f, "{} ({}, {})", self.name, version, self.mode),
            None => write!(f, "{} ({})", self.name, self.mode),
        }
    }
}

fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// A name declared at more than one level with different versions.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DependencyConflict {
    pub name: String,
    pub versions: Vec<Option<String>>,
}

impl fmt::Display for DependencyConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let versions: Vec<&str> = self
            .versions
            .iter()
            .map(|v| v.as_deref().unwrap_or("any"))
            .collect();

        write!(f, "{} is declared with conflicting versions: {}", self.name, versions.join(", "))
    }
}

/// An ordered, name-unique list of dependencies.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DependencyCollection {
    dependencies: Vec<Dependency>,
}

impl DependencyCollection {
    pub fn new() -> Self {
        DependencyCollection::default()
    }

    /// Add a dependency. If one with the same name already exists, the
    /// collection is left unchanged and `false` is returned.
    pub fn add(&mut self, dependency: Dependency) -> bool {
        if self.has(&dependency.name) {
            return false;
        }

        self.dependencies.push(dependency);
        true
    }

    /// Remove the dependency named `name`, returning it if it was present.
    pub fn remove(&mut self, name: &str) -> Option<Dependency> {
        let index = self.dependencies.iter().position(|d| d.matches(name))?;
        Some(self.dependencies.remove(index))
    }

    /// Replace any dependency with the same name.
    pub fn update(&mut self, dependency: Dependency) {
        self.remove(&dependency.name);
        self.dependencies.push(dependency);
    }

    pub fn find(&self, name: &str) -> Option<&Dependency> {
        self.dependencies.iter().find(|d| d.matches(name))
    }

    pub fn has(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Dependency> {
        self.dependencies.iter()
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.dependencies.iter().map(|d| d.name.clone()).collect()
    }

    pub fn sort_by_name(&mut self) {
        self.dependencies
            .sort_by(|a, b| compare_names(&a.name, &b.name));
    }

    /// Combine solution-level declarations with every project's collection.
    ///
    /// The result has one entry per distinct name, sorted by name. Project
    /// declarations take precedence over solution-level ones; between
    /// projects, the first project in iteration order wins.
    pub fn combine<'a, P>(solution_level: &[Dependency], projects: P) -> DependencyCollection
    where
        P: IntoIterator<Item = &'a DependencyCollection>,
    {
        let mut combined = DependencyCollection::new();

        for collection in projects {
            for dep in collection.iter() {
                combined.add(dep.clone());
            }
        }

        for dep in solution_level {
            combined.add(dep.clone());
        }

        combined.sort_by_name();
        combined
    }

    /// Names declared more than once with different version strings.
    pub fn conflicts<'a, P>(solution_level: &[Dependency], projects: P) -> Vec<DependencyConflict>
    where
        P: IntoIterator<Item = &'a DependencyCollection>,
    {
        let mut seen: HashMap<String, (String, Vec<Option<String>>)> = HashMap::new();

        let all = projects
            .into_iter()
            .flat_map(|c| c.iter())
            .chain(solution_level.iter());

        for dep in all {
            let entry = seen
                .entry(dep.name.to_lowercase())
                .or_insert_with(|| (dep.name.clone(), Vec::new()));

            if !entry.1.contains(&dep.version) {
                entry.1.push(dep.version.clone());
            }
        }

        let mut conflicts: Vec<DependencyConflict> = seen
            .into_values()
            .filter(|(_, versions)| versions.iter().filter(|v| v.is_some()).count() > 1)
            .map(|(name, versions)| DependencyConflict { name, versions })
            .collect();

        conflicts.sort_by(|a, b| compare_names(&a.name, &b.name));
        conflicts
    }
}

impl FromIterator<Dependency> for DependencyCollection {
    fn from_iter<T: IntoIterator<Item = Dependency>>(iter: T) -> Self {
        let mut collection = DependencyCollection::new();

        for dep in iter {
            collection.add(dep);
        }

        collection
    }
}

impl<'a> IntoIterator for &'a DependencyCollection {
    type Item = &'a Dependency;
    type IntoIter = std::slice::Iter<'a, Dependency>;

    fn into_iter(self) -> Self::IntoIter {
        self.dependencies.iter()
    }
}

/// A set of packages that must always be updated together.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct DependencyGroup {
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl DependencyGroup {
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        DependencyGroup {
            dependencies: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.dependencies.iter().any(|n| n.eq_ignore_ascii_case(name))
    }
}
