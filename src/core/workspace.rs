//! Finding the solutions a command should operate on.
//!
//! A workspace is a directory that either is a solution (it holds a
//! `ripple.toml`) or contains several solutions side by side, one per
//! immediate subdirectory. Commands resolve the `--solution` and `--all`
//! flags against it before touching any solution.

use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error as ThisError;
use tracing::debug;

use crate::atry;
use crate::core::{
    config::{settings::RippleSettings, SOLUTION_FILE},
    errors::Result,
    solution::Solution,
};

/// An error returned when a solution was requested by name and no solution
/// in the workspace has it.
#[derive(Debug, ThisError)]
#[error("no such solution with the name `{0}`")]
pub struct NoSuchSolutionError(pub String);

/// An error returned when no solution could be picked without more input
/// from the user.
#[derive(Debug, ThisError)]
pub enum SelectionError {
    #[error("no `{}` found in `{}` or its subdirectories", SOLUTION_FILE, .0.display())]
    NoSolutions(PathBuf),

    #[error("several solutions found ({}); pick one with --solution or use --all", .0.join(", "))]
    Ambiguous(Vec<String>),
}

#[derive(Clone, Debug)]
pub struct Workspace {
    root: PathBuf,

    /// Solution directories, sorted by name.
    solutions: Vec<PathBuf>,
}

impl Workspace {
    /// Find the solutions under `root`: the root itself if it holds a
    /// definition file, else every immediate subdirectory that does.
    pub fn discover(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        if root.join(SOLUTION_FILE).is_file() {
            return Ok(Workspace {
                solutions: vec![root.clone()],
                root,
            });
        }

        let mut solutions = Vec::new();

        if root.is_dir() {
            let entries = atry!(
                fs::read_dir(&root);
                ["failed to list solutions in `{}`", root.display()]
            );

            for entry in entries {
                let path = entry?.path();

                if path.join(SOLUTION_FILE).is_file() {
                    debug!("found solution in {}", path.display());
                    solutions.push(path);
                }
            }
        }

        solutions.sort();
        Ok(Workspace { root, solutions })
    }

    /// Discover from `start`, moving up through its ancestors until some
    /// solution is found. Falls back to an empty workspace at `start`.
    ///
    /// Found inside a solution whose parent holds sibling solutions, the
    /// workspace is the parent, so that `--all` and `--solution` see the
    /// siblings too.
    pub fn locate(start: impl AsRef<Path>) -> Result<Self> {
        let start = start.as_ref();

        for dir in start.ancestors() {
            let ws = Workspace::discover(dir)?;

            if ws.solutions.is_empty() {
                continue;
            }

            if ws.solutions.len() == 1 && ws.solutions[0].as_path() == dir {
                if let Some(wider) = dir.parent().and_then(|p| Workspace::discover(p).ok()) {
                    if wider.solutions.len() > 1 {
                        return Ok(wider);
                    }
                }
            }

            return Ok(ws);
        }

        Workspace::discover(start)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn solution_dirs(&self) -> &[PathBuf] {
        &self.solutions[..]
    }

    pub fn names(&self) -> Vec<String> {
        self.solutions.iter().map(|p| dir_name(p)).collect()
    }

    /// Resolve the selection flags to solution directories.
    ///
    /// `names` picks solutions by directory name; `all` picks every
    /// solution. With neither, the solution containing `cwd` is used, or the
    /// only solution if there is just one.
    pub fn select(&self, names: &[String], all: bool, cwd: &Path) -> Result<Vec<PathBuf>> {
        if self.solutions.is_empty() {
            return Err(SelectionError::NoSolutions(self.root.clone()).into());
        }

        if all {
            return Ok(self.solutions.clone());
        }

        if !names.is_empty() {
            let mut selected = Vec::new();

            for name in names {
                let found = self
                    .solutions
                    .iter()
                    .find(|p| dir_name(p).eq_ignore_ascii_case(name))
                    .ok_or_else(|| NoSuchSolutionError(name.clone()))?;

                if !selected.contains(found) {
                    selected.push(found.clone());
                }
            }

            return Ok(selected);
        }

        if let Some(containing) = self.solutions.iter().find(|p| cwd.starts_with(p)) {
            return Ok(vec![containing.clone()]);
        }

        if self.solutions.len() == 1 {
            return Ok(self.solutions.clone());
        }

        Err(SelectionError::Ambiguous(self.names()).into())
    }

    /// Load the selected solutions.
    pub fn load(&self, dirs: &[PathBuf], settings: &RippleSettings) -> Result<Vec<Solution>> {
        dirs.iter().map(|dir| Solution::load(dir, settings)).collect()
    }
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_owned()
}
