//! Packages a solution publishes.
//!
//! A solution that produces packages keeps a `.nuspec` file for each of them
//! in its nuspec folder. Reading those tells us which packages the solution
//! owns, which is what lets [`crate::core::graph`] order solutions that
//! consume each other's packages.

use quick_xml::{events::Event, Reader};
use std::{
    fmt,
    fs::{self, File},
    io::{Read, Write},
    path::{Path, PathBuf},
};
use tracing::debug;
use zip::{write::FileOptions, CompressionMethod};

use crate::core::{
    errors::{Error, Result},
    solution::Solution,
    storage::package_file_name,
};
use crate::{a_ok_or, atry};

/// A package some solution publishes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NugetSpec {
    pub name: String,
    pub version: Option<String>,

    /// The `.nuspec` file.
    pub path: PathBuf,

    /// Name of the publishing solution.
    pub publisher: String,

    /// The project that builds it, if one is mapped.
    pub project: Option<String>,
}

impl NugetSpec {
    pub fn new(name: impl Into<String>, publisher: impl Into<String>) -> Self {
        NugetSpec {
            name: name.into(),
            version: None,
            path: PathBuf::new(),
            publisher: publisher.into(),
            project: None,
        }
    }
}

/// What to pack.
#[derive(Clone, Debug)]
pub struct PackageParams {
    pub spec: NugetSpec,
    pub version: String,
    pub output_dir: PathBuf,

    /// Files to include in the archive, with paths kept relative to this
    /// directory.
    pub content_dir: Option<PathBuf>,
}

pub trait PublishingService: fmt::Debug + Send + Sync {
    /// The packages `solution` publishes, sorted by name.
    fn specifications_for(&self, solution: &Solution) -> Result<Vec<NugetSpec>>;

    /// Build a package archive, returning its path.
    fn create_package(&self, params: &PackageParams) -> Result<PathBuf>;
}

/// Reads `*.nuspec` files from the solution's nuspec folder.
#[derive(Clone, Debug, Default)]
pub struct NuspecPublisher;

/// The `id` and `version` from a nuspec document's metadata.
pub fn read_nuspec_metadata(text: &str) -> Result<(String, Option<String>)> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut id = None;
    let mut version = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => path.push(e.local_name().as_ref().to_vec()),
            Ok(Event::End(_)) => {
                path.pop();
            }
            Ok(Event::Text(e)) => {
                let in_metadata = path.len() == 3 && path[1] == b"metadata";

                if in_metadata {
                    let value = std::str::from_utf8(&e)?.trim().to_owned();

                    match path[2].as_slice() {
                        b"id" => id = Some(value),
                        b"version" => version = Some(value),
                        _ => {}
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(Error::new(e).context("malformed nuspec XML")),
        }
    }

    let id = a_ok_or!(id; ["nuspec has no <metadata><id> element"]);
    Ok((id, version))
}

impl PublishingService for NuspecPublisher {
    fn specifications_for(&self, solution: &Solution) -> Result<Vec<NugetSpec>> {
        let dir = solution.nuspec_dir();
        let pattern = format!("{}/*.nuspec", glob::Pattern::escape(&dir.to_string_lossy()));
        let mut specs = Vec::new();

        for entry in atry!(glob::glob(&pattern); ["bad nuspec pattern `{}`", pattern]) {
            let path = entry?;
            let text = atry!(
                fs::read_to_string(&path);
                ["failed to read `{}`", path.display()]
            );
            let (name, version) = atry!(
                read_nuspec_metadata(&text);
                ["failed to parse `{}`", path.display()]
            );

            let file = path.file_name().and_then(|f| f.to_str()).unwrap_or_default();
            let project = solution
                .nuspecs()
                .iter()
                .find(|m| m.file.eq_ignore_ascii_case(file))
                .map(|m| m.project.clone());

            debug!("{} publishes {}", solution.name(), name);

            specs.push(NugetSpec {
                name,
                version,
                path: path.clone(),
                publisher: solution.name().to_owned(),
                project,
            });
        }

        specs.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Ok(specs)
    }

    fn create_package(&self, params: &PackageParams) -> Result<PathBuf> {
        atry!(
            fs::create_dir_all(&params.output_dir);
            ["failed to create `{}`", params.output_dir.display()]
        );

        let target = params
            .output_dir
            .join(package_file_name(&params.spec.name, &params.version));
        let file = atry!(
            File::create(&target);
            ["failed to create `{}`", target.display()]
        );

        let mut zip = zip::ZipWriter::new(file);
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

        let nuspec = atry!(
            fs::read(&params.spec.path);
            ["failed to read `{}`", params.spec.path.display()]
        );
        zip.start_file(format!("{}.nuspec", params.spec.name), options)?;
        zip.write_all(&nuspec)?;

        if let Some(ref content) = params.content_dir {
            let mut buffer = Vec::new();

            for path in content_files(content)? {
                let name = path.strip_prefix(content)?.to_string_lossy().replace('\\', "/");

                zip.start_file(name, options)?;
                File::open(&path)?.read_to_end(&mut buffer)?;
                zip.write_all(&buffer)?;
                buffer.clear();
            }
        }

        zip.finish()?;
        Ok(target)
    }
}

fn content_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let pattern = format!("{}/**/*", glob::Pattern::escape(&dir.to_string_lossy()));
    let mut files = Vec::new();

    for entry in glob::glob(&pattern)? {
        let path = entry?;

        if path.is_file() {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}
