//! The native Ripple layout.
//!
//! Packages live in one folder per package name, without the version in the
//! folder name, so that project references do not churn when a package is
//! updated. Project dependencies are listed one per line in
//! `ripple.dependencies.config`.

use std::{
    fs,
    io::Write,
    path::PathBuf,
};

use super::{package_files, parse_package_path, subdirectories, LocalDependencies, NugetStorage, StorageMode};
use crate::atry;
use crate::core::{
    dependency::{Dependency, DependencyCollection},
    errors::Result,
    project::Project,
    solution::Solution,
};
use crate::utils::file_io::read_config_file;

pub const PROJECT_FILE: &str = "ripple.dependencies.config";

#[derive(Clone, Copy, Debug, Default)]
pub struct RippleStorage;

impl NugetStorage for RippleStorage {
    fn mode(&self) -> StorageMode {
        StorageMode::Ripple
    }

    fn dependencies(&self, solution: &Solution) -> Result<LocalDependencies> {
        let mut nugets = Vec::new();

        for dir in subdirectories(&solution.packages_dir())? {
            let Some(folder) = dir.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            let found = package_files(&dir)?
                .iter()
                .filter_map(|p| parse_package_path(p))
                .filter(|n| n.name.eq_ignore_ascii_case(folder))
                .max_by(|a, b| a.semver().cmp(&b.semver()));

            if let Some(nuget) = found {
                nugets.push(nuget);
            }
        }

        Ok(LocalDependencies::new(nugets, solution.lock_policy()))
    }

    fn package_dir(&self, solution: &Solution, name: &str, _version: &str) -> PathBuf {
        solution.packages_dir().join(name)
    }

    fn project_file(&self, solution: &Solution, project: &Project) -> PathBuf {
        solution.project_dir(project).join(PROJECT_FILE)
    }

    fn read_project_dependencies(
        &self,
        solution: &Solution,
        project: &Project,
    ) -> Result<DependencyCollection> {
        let path = self.project_file(solution, project);

        if !path.exists() {
            return Ok(DependencyCollection::new());
        }

        let text = atry!(
            read_config_file(&path);
            ["failed to read dependencies of project `{}`", project.name]
        );

        Ok(text.lines().filter_map(Dependency::from_line).collect())
    }

    fn write_project(&self, solution: &Solution, project: &Project) -> Result<()> {
        let path = self.project_file(solution, project);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let af = atomicwrites::AtomicFile::new(&path, atomicwrites::OverwriteBehavior::AllowOverwrite);

        let r = af.write(|f| {
            for dep in project.dependencies.iter() {
                writeln!(f, "{}", dep.to_line())?;
            }
            Ok(())
        });

        match r {
            Err(atomicwrites::Error::Internal(e)) => Err(e.into()),
            Err(atomicwrites::Error::User(e)) => Err(e),
            Ok(()) => Ok(()),
        }
    }
}
