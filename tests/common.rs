#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// A scratch directory holding one or more solutions, a folder feed and a
/// private package cache.
pub struct TestWorkspace {
    _dir: TempDir,
    pub path: PathBuf,
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

impl TestWorkspace {
    #[must_use]
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let path = dir.path().to_path_buf();

        Self { _dir: dir, path }
    }

    pub fn write_file(&self, relative_path: &str, content: &str) {
        let full_path = self.path.join(relative_path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent).expect("failed to create parent dirs");
        }
        std::fs::write(full_path, content).expect("failed to write file");
    }

    #[must_use]
    pub fn file_exists(&self, relative_path: &str) -> bool {
        self.path.join(relative_path).exists()
    }

    #[must_use]
    pub fn read_file(&self, relative_path: &str) -> String {
        std::fs::read_to_string(self.path.join(relative_path)).expect("failed to read file")
    }

    #[must_use]
    pub fn feed_dir(&self) -> PathBuf {
        self.path.join("feed")
    }

    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.path.join(".cache")
    }

    /// Drop a package archive into the folder feed.
    pub fn publish_to_feed(&self, name: &str, version: &str) {
        self.write_file(
            &format!("feed/{}.{}.nupkg", name, version),
            &format!("{}-{}", name, version),
        );
    }

    /// Write a solution definition restoring from the folder feed, with one
    /// project per entry of `projects` listing its dependency lines.
    pub fn write_solution(&self, name: &str, extra: &str, projects: &[(&str, &[&str])]) {
        let mut toml = format!(
            "[solution]\nname = \"{}\"\n\n[[feeds]]\nurl = \"{}\"\n",
            name,
            toml_path(&self.feed_dir())
        );

        for (project, deps) in projects {
            toml.push_str(&format!("\n[[projects]]\nname = \"{}\"\n", project));

            let mut lines = deps.join("\n");
            lines.push('\n');
            self.write_file(&format!("{}/{}/ripple.dependencies.config", name, project), &lines);
        }

        toml.push_str(extra);
        self.write_file(&format!("{}/ripple.toml", name), &toml);
    }

    #[must_use]
    pub fn run_ripple_command(&self, args: &[&str]) -> std::process::Output {
        self.run_ripple_command_in(".", args)
    }

    #[must_use]
    pub fn run_ripple_command_in(&self, relative_dir: &str, args: &[&str]) -> std::process::Output {
        let ripple_bin = env!("CARGO_BIN_EXE_ripple");

        Command::new(ripple_bin)
            .args(["--no-color", "--cache"])
            .arg(self.cache_dir())
            .args(args)
            .current_dir(self.path.join(relative_dir))
            .env("XDG_CONFIG_HOME", self.path.join(".config"))
            .env("RIPPLE_TIMEOUT_SECS", "10")
            .output()
            .expect("failed to run ripple command")
    }

    #[must_use]
    pub fn list_files_in_dir(&self, relative_dir: &str) -> Vec<String> {
        let dir_path = self.path.join(relative_dir);
        if !dir_path.exists() {
            return Vec::new();
        }
        let mut files: Vec<String> = std::fs::read_dir(dir_path)
            .map(|entries| {
                entries
                    .filter_map(std::result::Result::ok)
                    .filter_map(|e| e.file_name().into_string().ok())
                    .collect()
            })
            .unwrap_or_default();
        files.sort();
        files
    }
}

fn toml_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[must_use]
pub fn stdout(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[must_use]
pub fn stderr(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}
