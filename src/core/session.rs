// Copyright 2020 Peter Williams <peter@newton.cx> and collaborators
// Licensed under the MIT License.

//! State for the Ripple CLI application.

use anyhow::Context;
use std::path::PathBuf;
use tracing::info;

use crate::atry;
use crate::core::{
    config::settings::RippleSettings, errors::Result, solution::Solution, workspace::Workspace,
};

/// Setting up a Ripple application session.
#[derive(Debug)]
pub struct AppBuilder {
    pub settings: RippleSettings,

    cwd: PathBuf,
    root: Option<PathBuf>,
    names: Vec<String>,
    all: bool,
}

impl AppBuilder {
    /// Start initializing an application session.
    ///
    /// This first phase may fail if the user settings cannot be read or the
    /// current directory is inaccessible.
    pub fn new() -> Result<AppBuilder> {
        let cwd = std::env::current_dir().context("cannot determine the current directory")?;
        let settings = RippleSettings::load()?;

        Ok(AppBuilder {
            settings,
            cwd,
            root: None,
            names: Vec::new(),
            all: false,
        })
    }

    /// Look for solutions under `root` instead of around the current
    /// directory.
    pub fn with_root(mut self, root: Option<PathBuf>) -> Self {
        self.root = root;
        self
    }

    pub fn with_selection(mut self, names: &[String], all: bool) -> Self {
        self.names = names.to_vec();
        self.all = all;
        self
    }

    pub fn with_cache(mut self, cache: Option<PathBuf>) -> Self {
        if cache.is_some() {
            self.settings.cache = cache;
        }
        self
    }

    /// Find, select and load the target solutions.
    pub fn initialize(self) -> Result<AppSession> {
        let workspace = match self.root {
            Some(ref root) => Workspace::discover(root)?,
            None => Workspace::locate(&self.cwd)?,
        };

        let dirs = workspace.select(&self.names, self.all, &self.cwd)?;

        let solutions = atry!(
            workspace.load(&dirs, &self.settings);
            ["could not load the selected solutions"]
        );

        info!(
            "loaded {} solution(s) from {}",
            solutions.len(),
            workspace.root().display()
        );

        Ok(AppSession {
            settings: self.settings,
            workspace,
            solutions,
        })
    }
}

/// The loaded solutions a command operates on.
#[derive(Debug)]
pub struct AppSession {
    pub settings: RippleSettings,
    workspace: Workspace,
    solutions: Vec<Solution>,
}

impl AppSession {
    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn solutions(&self) -> &[Solution] {
        &self.solutions[..]
    }

    pub fn solutions_mut(&mut self) -> &mut [Solution] {
        &mut self.solutions[..]
    }
}
