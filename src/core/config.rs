//! Solution definition files.
//!
//! Each solution is described by a `ripple.toml` at its root. The file is
//! layered over the embedded defaults with the `config` crate, so a minimal
//! definition only needs to name its projects and the packages it uses.

use std::path::Path;

use crate::atry;
use crate::core::errors::{Error, Result};
use crate::core::solution::Solution;

pub mod settings;

/// The name of a solution definition file.
pub const SOLUTION_FILE: &str = "ripple.toml";

pub mod syntax {
    use serde::{Deserialize, Serialize};

    use crate::core::{
        dependency::{Dependency, DependencyGroup},
        feed::Feed,
        storage::StorageMode,
        version::VersionConstraint,
    };

    #[derive(Clone, Debug, Deserialize, Serialize)]
    pub struct RippleConfiguration {
        pub solution: SolutionConfiguration,

        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        pub feeds: Vec<Feed>,

        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        pub nugets: Vec<Dependency>,

        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        pub projects: Vec<ProjectConfiguration>,

        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        pub groups: Vec<DependencyGroup>,

        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        pub nuspecs: Vec<NuspecMapping>,
    }

    #[derive(Clone, Debug, Deserialize, Serialize)]
    pub struct SolutionConfiguration {
        /// Empty means "use the directory name".
        #[serde(default)]
        pub name: String,

        #[serde(default)]
        pub mode: StorageMode,

        /// The local package folder, relative to the solution root.
        pub packages: String,

        /// Where `.nuspec` files live, relative to the solution root.
        pub nuspecs: String,

        pub float_constraint: VersionConstraint,

        pub fixed_constraint: VersionConstraint,
    }

    #[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
    pub struct ProjectConfiguration {
        pub name: String,

        /// Relative to the solution root; defaults to the project name.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub directory: Option<String>,
    }

    /// Associates a `.nuspec` file with the project that builds it.
    #[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
    pub struct NuspecMapping {
        pub file: String,
        pub project: String,
    }
}

#[derive(Clone, Debug)]
pub struct ConfigurationFile {
    pub solution: syntax::SolutionConfiguration,
    pub feeds: Vec<crate::core::feed::Feed>,
    pub nugets: Vec<crate::core::dependency::Dependency>,
    pub projects: Vec<syntax::ProjectConfiguration>,
    pub groups: Vec<crate::core::dependency::DependencyGroup>,
    pub nuspecs: Vec<syntax::NuspecMapping>,
}

impl From<syntax::RippleConfiguration> for ConfigurationFile {
    fn from(cfg: syntax::RippleConfiguration) -> Self {
        ConfigurationFile {
            solution: cfg.solution,
            feeds: cfg.feeds,
            nugets: cfg.nugets,
            projects: cfg.projects,
            groups: cfg.groups,
            nuspecs: cfg.nuspecs,
        }
    }
}

impl ConfigurationFile {
    /// Load a definition file layered over the embedded defaults. A missing
    /// file yields the defaults.
    pub fn get<P: AsRef<Path>>(path: P) -> Result<Self> {
        let embedded_config_str = super::embed::EmbeddedConfig::get_config_string()?;

        let mut builder = config::Config::builder().add_source(config::File::from_str(
            &embedded_config_str,
            config::FileFormat::Toml,
        ));

        if path.as_ref().exists() {
            builder = builder.add_source(
                config::File::from(path.as_ref()).format(config::FileFormat::Toml),
            );
        }

        let cfg: syntax::RippleConfiguration = builder
            .build()
            .map_err(|e| {
                Error::new(e).context(format!("failed to read `{}`", path.as_ref().display()))
            })?
            .try_deserialize()
            .map_err(|e| {
                Error::new(e).context(format!(
                    "failed to deserialize `{}`",
                    path.as_ref().display()
                ))
            })?;

        Ok(cfg.into())
    }

    /// Capture the persistent state of a solution.
    pub fn from_solution(solution: &Solution) -> Self {
        let projects = solution
            .projects()
            .iter()
            .map(|p| {
                let directory = p.directory.to_string_lossy().replace('\\', "/");

                syntax::ProjectConfiguration {
                    name: p.name.clone(),
                    directory: (directory != p.name).then_some(directory),
                }
            })
            .collect();

        ConfigurationFile {
            solution: syntax::SolutionConfiguration {
                name: solution.name().to_owned(),
                mode: solution.mode(),
                packages: solution.packages_folder().to_owned(),
                nuspecs: solution.nuspec_folder().to_owned(),
                float_constraint: solution.default_float_constraint(),
                fixed_constraint: solution.default_fixed_constraint(),
            },
            feeds: solution.feeds().to_vec(),
            nugets: solution.nugets().to_vec(),
            projects,
            groups: solution.groups().to_vec(),
            nuspecs: solution.nuspecs().to_vec(),
        }
    }

    pub fn into_toml(self) -> Result<String> {
        let cfg = syntax::RippleConfiguration {
            solution: self.solution,
            feeds: self.feeds,
            nugets: self.nugets,
            projects: self.projects,
            groups: self.groups,
            nuspecs: self.nuspecs,
        };

        Ok(atry!(
            toml::to_string_pretty(&cfg);
            ["could not serialize configuration into TOML format"]
        ))
    }

    /// Write the definition atomically.
    pub fn save<P: AsRef<Path>>(self, path: P) -> Result<()> {
        let path = path.as_ref();
        let text = self.into_toml()?;

        if let Some(parent) = path.parent() {
            atry!(
                std::fs::create_dir_all(parent);
                ["failed to create directory `{}`", parent.display()]
            );
        }

        let af = atomicwrites::AtomicFile::new(path, atomicwrites::OverwriteBehavior::AllowOverwrite);

        let r = af.write(|f| std::io::Write::write_all(f, text.as_bytes()));

        match r {
            Err(atomicwrites::Error::Internal(e)) => Err(e.into()),
            Err(atomicwrites::Error::User(e)) => Err(e.into()),
            Ok(()) => Ok(()),
        }
    }
}
