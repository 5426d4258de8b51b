//! Projects: the buildable units inside a solution.

use std::path::{Path, PathBuf};

use crate::core::dependency::{Dependency, DependencyCollection};

/// A buildable unit with its own package dependencies.
#[derive(Clone, Debug, Default)]
pub struct Project {
    /// The project name, unique within its solution.
    pub name: String,

    /// The project directory, relative to the solution root.
    pub directory: PathBuf,

    /// The dependencies declared by this project.
    pub dependencies: DependencyCollection,

    /// Name of the owning solution. This is a lookup key only; it is set by
    /// `Solution::add_project`.
    pub(crate) solution: Option<String>,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();

        Project {
            directory: PathBuf::from(&name),
            name,
            ..Project::default()
        }
    }

    pub fn with_directory(mut self, directory: impl AsRef<Path>) -> Self {
        self.directory = directory.as_ref().to_path_buf();
        self
    }

    /// Add a dependency, returning `false` if one with the same name exists.
    pub fn add_dependency(&mut self, dependency: Dependency) -> bool {
        self.dependencies.add(dependency)
    }

    pub fn remove_dependency(&mut self, name: &str) -> Option<Dependency> {
        self.dependencies.remove(name)
    }

    pub fn find_dependency(&self, name: &str) -> Option<&Dependency> {
        self.dependencies.find(name)
    }

    /// The name of the solution this project belongs to, if it has been
    /// attached to one.
    pub fn solution(&self) -> Option<&str> {
        self.solution.as_deref()
    }
}
