//! Checking declared dependencies against what is installed.

use std::fmt;
use thiserror::Error as ThisError;
use tracing::debug;

use crate::core::{
    dependency::DependencyCollection,
    storage::LocalDependencies,
    version::parse_version,
};

pub const NOT_FOUND: &str = "Not found";

/// One thing wrong with one dependency.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Problem {
    pub name: String,
    pub message: String,
}

impl Problem {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Problem {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

/// The problems found by a validation pass. Valid iff empty.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ValidationResult {
    pub problems: Vec<Problem>,
}

impl ValidationResult {
    pub fn add_problem(&mut self, name: impl Into<String>, message: impl Into<String>) {
        self.problems.push(Problem::new(name, message));
    }

    pub fn is_valid(&self) -> bool {
        self.problems.is_empty()
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }

    /// One problem per line.
    pub fn report(&self) -> String {
        self.problems
            .iter()
            .map(|p| format!("  {}", p))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A solution failed validation.
#[derive(Debug, ThisError)]
#[error("solution `{solution}` has {} dependency problem(s):\n{}", .result.len(), .result.report())]
pub struct ValidationFailure {
    pub solution: String,
    pub result: ValidationResult,
}

/// Check every dependency against the local packages: it must be present,
/// and the local copy must be at least the declared version.
pub fn validate(dependencies: &DependencyCollection, local: &LocalDependencies) -> ValidationResult {
    let mut result = ValidationResult::default();

    for dep in dependencies {
        let Some(nuget) = local.get(&dep.name) else {
            result.add_problem(&dep.name, NOT_FOUND);
            continue;
        };

        let Some(ref declared) = dep.version else {
            continue;
        };

        let (Ok(required), Ok(actual)) = (parse_version(declared), parse_version(&nuget.version))
        else {
            debug!(
                "skipping version check of {}: cannot compare `{}` with `{}`",
                dep.name, declared, nuget.version
            );
            continue;
        };

        if required > actual {
            result.add_problem(
                &dep.name,
                format!("requires version {} but {} is installed", declared, nuget.version),
            );
        }
    }

    result
}
