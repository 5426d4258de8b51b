//! The classic NuGet layout.
//!
//! Every installed version gets its own `<Name>.<version>` folder and each
//! project lists its packages in a `packages.config` XML file:
//!
//! ```xml
//! <?xml version="1.0" encoding="utf-8"?>
//! <packages>
//!   <package id="FubuCore" version="1.2.0" />
//! </packages>
//! ```

use quick_xml::{
    events::{BytesDecl, BytesEnd, BytesStart, Event},
    Reader, Writer,
};
use std::{fs, path::PathBuf};

use super::{package_files, parse_package_path, split_package_stem, subdirectories, LocalDependencies, NugetStorage, StorageMode};
use crate::atry;
use crate::core::{
    dependency::{Dependency, DependencyCollection},
    errors::{Error, Result},
    project::Project,
    solution::Solution,
    version::UpdateMode,
};
use crate::utils::file_io::read_config_file;

pub const PROJECT_FILE: &str = "packages.config";

#[derive(Clone, Copy, Debug, Default)]
pub struct ClassicStorage;

/// Parse the contents of a `packages.config` file.
pub fn parse_packages_config(text: &str) -> Result<DependencyCollection> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut deps = DependencyCollection::new();

    loop {
        match reader.read_event() {
            Ok(Event::Empty(e)) | Ok(Event::Start(e)) if e.name().as_ref() == b"package" => {
                let mut id = None;
                let mut version = None;

                for attr in e.attributes() {
                    let attr = attr.map_err(|e| Error::new(e).context("malformed attribute"))?;
                    let value = std::str::from_utf8(&attr.value)?.to_owned();

                    match attr.key.as_ref() {
                        b"id" => id = Some(value),
                        b"version" => version = Some(value),
                        _ => {}
                    }
                }

                if let Some(id) = id {
                    deps.add(Dependency::new(id, version.as_deref(), UpdateMode::Fixed));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(Error::new(e).context(format!(
                    "malformed XML at position {}",
                    reader.buffer_position()
                )))
            }
        }
    }

    Ok(deps)
}

/// Render a `packages.config` file.
pub fn render_packages_config(deps: &DependencyCollection) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new("packages")))?;

    for dep in deps.iter() {
        let mut elem = BytesStart::new("package");
        elem.push_attribute(("id", dep.name.as_str()));

        if let Some(ref version) = dep.version {
            elem.push_attribute(("version", version.as_str()));
        }

        writer.write_event(Event::Empty(elem))?;
    }

    writer.write_event(Event::End(BytesEnd::new("packages")))?;

    let mut text = String::from_utf8(writer.into_inner())?;
    text.push('\n');
    Ok(text)
}

impl NugetStorage for ClassicStorage {
    fn mode(&self) -> StorageMode {
        StorageMode::Classic
    }

    fn dependencies(&self, solution: &Solution) -> Result<LocalDependencies> {
        let mut nugets = Vec::new();

        for dir in subdirectories(&solution.packages_dir())? {
            let Some(folder) = dir.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            let Some((name, version)) = split_package_stem(folder) else {
                continue;
            };

            let found = package_files(&dir)?
                .iter()
                .filter_map(|p| parse_package_path(p))
                .find(|n| n.name.eq_ignore_ascii_case(name) && n.version == version);

            if let Some(nuget) = found {
                nugets.push(nuget);
            }
        }

        Ok(LocalDependencies::new(nugets, solution.lock_policy()))
    }

    fn package_dir(&self, solution: &Solution, name: &str, version: &str) -> PathBuf {
        solution.packages_dir().join(format!("{}.{}", name, version))
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

        let text = read_config_file(&path)?;
        Ok(atry!(
            parse_packages_config(&text);
            ["failed to parse `{}`", path.display()]
        ))
    }

    fn write_project(&self, solution: &Solution, project: &Project) -> Result<()> {
        let path = self.project_file(solution, project);
        let text = render_packages_config(&project.dependencies)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let af = atomicwrites::AtomicFile::new(&path, atomicwrites::OverwriteBehavior::AllowOverwrite);

        match af.write(|f| std::io::Write::write_all(f, text.as_bytes())) {
            Err(atomicwrites::Error::Internal(e)) => Err(e.into()),
            Err(atomicwrites::Error::User(e)) => Err(e.into()),
            Ok(()) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_packages_config() {
        let deps = parse_packages_config(
            r#"<?xml version="1.0" encoding="utf-8"?>
<packages>
  <package id="FubuCore" version="1.2.0" targetFramework="net40" />
  <package id="Bottles" version="2.0.0"></package>
  <package version="9.9.9" />
</packages>"#,
        )
        .unwrap();

        assert_eq!(deps.names(), vec!["FubuCore", "Bottles"]);
        assert_eq!(deps.find("Bottles").unwrap().version.as_deref(), Some("2.0.0"));
        assert_eq!(deps.find("FubuCore").unwrap().mode, UpdateMode::Fixed);
    }

    #[test]
    fn malformed_config_is_an_error() {
        assert!(parse_packages_config(
            "<packages><package id=\"X\" version=\"1.0\"></wrong></packages>"
        )
        .is_err());
    }

    #[test]
    fn renders_packages_config() {
        let deps: DependencyCollection = vec![
            Dependency::fixed("FubuCore", "1.2.0"),
            Dependency::fixed("Bottles", "2.0.0"),
        ]
        .into_iter()
        .collect();

        let text = render_packages_config(&deps).unwrap();
        assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
        assert!(text.contains("<package id=\"FubuCore\" version=\"1.2.0\"/>"));

        assert_eq!(parse_packages_config(&text).unwrap(), deps);
    }

    #[test]
    fn scans_versioned_folders() {
        let tmp = tempfile::tempdir().unwrap();
        let solution = Solution::at(tmp.path());

        let dir = solution.packages_dir().join("FubuCore.1.2.0");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("FubuCore.1.2.0.nupkg"), b"nupkg").unwrap();
        fs::create_dir_all(solution.packages_dir().join("NotAPackage")).unwrap();

        let local = ClassicStorage.dependencies(&solution).unwrap();
        assert_eq!(local.all().len(), 1);
        assert_eq!(local.get("FubuCore").unwrap().version, "1.2.0");
        assert_eq!(
            ClassicStorage.package_dir(&solution, "FubuCore", "1.2.0"),
            dir
        );
    }

    #[test]
    fn side_by_side_versions_resolve_to_the_newest() {
        let tmp = tempfile::tempdir().unwrap();
        let mut solution = Solution::at(tmp.path().join("fubu"));
        solution.use_storage(Box::new(ClassicStorage));

        for version in ["1.0.0", "2.0.0"] {
            let dir = solution.packages_dir().join(format!("Foo.{}", version));
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join(format!("Foo.{}.nupkg", version)), b"nupkg").unwrap();
        }

        let mut app = Project::new("App");
        app.add_dependency(Dependency::fixed("Foo", "2.0.0"));
        solution.add_project(app);

        assert_eq!(solution.local_nuget("Foo").unwrap().unwrap().version, "2.0.0");
        assert!(solution.validate().unwrap().is_valid());
    }
}
