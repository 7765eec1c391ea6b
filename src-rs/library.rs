use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;

use serde::Serialize;

use crate::error::{FaciesError, FaciesResult};

pub const WELL_PREFIX: &str = "fakes";
pub const IMAGE_EXT: &str = ".png";

/// Gallery namespace a candidate image lives in.
///
/// Well and joint lookups share the `wellimage` directory; the joint mode only
/// differs in the trailing mud-group digit of the filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    Global,
    Well,
    Joint,
}

impl Namespace {
    pub fn dir_name(self) -> &'static str {
        match self {
            Namespace::Global => "global",
            Namespace::Well | Namespace::Joint => "wellimage",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::Global => "global",
            Namespace::Well => "well",
            Namespace::Joint => "joint",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRef {
    pub namespace: Namespace,
    pub filename: String,
}

/// Read-only view over the pre-rendered facies gallery.
#[derive(Debug, Clone)]
pub struct ImageLibrary {
    root: PathBuf,
}

impl ImageLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn namespace_dir(&self, namespace: Namespace) -> PathBuf {
        self.root.join(namespace.dir_name())
    }

    pub fn path_of(&self, image: &ImageRef) -> PathBuf {
        self.namespace_dir(image.namespace).join(&image.filename)
    }

    /// Sorted `.png` file names in a namespace. A missing directory reads as empty.
    pub fn list_png(&self, namespace: Namespace) -> FaciesResult<Vec<String>> {
        let dir = self.namespace_dir(namespace);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(dir = %dir.display(), "gallery namespace directory is missing");
                return Ok(Vec::new());
            }
            Err(err) => return Err(FaciesError::io("failed to list gallery", dir, err)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| FaciesError::io("failed to list gallery", &dir, err))?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if !name.ends_with(IMAGE_EXT) {
                continue;
            }
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(true) {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    /// `.png` files in a namespace whose names start with `prefix`.
    pub fn list_with_prefix(&self, namespace: Namespace, prefix: &str) -> FaciesResult<Vec<String>> {
        Ok(self
            .list_png(namespace)?
            .into_iter()
            .filter(|name| name.starts_with(prefix))
            .collect())
    }

    pub fn contains(&self, namespace: Namespace, filename: &str) -> bool {
        self.namespace_dir(namespace).join(filename).is_file()
    }

    pub fn read(&self, image: &ImageRef) -> FaciesResult<Vec<u8>> {
        let path = self.path_of(image);
        fs::read(&path).map_err(|err| FaciesError::io("failed to read gallery image", path, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::tempdir;

    fn touch(dir: &Path, name: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(name), name.as_bytes()).unwrap();
    }

    #[test]
    fn lists_only_png_files_sorted() {
        let root = tempdir().unwrap();
        let lib = ImageLibrary::new(root.path());
        let global = lib.namespace_dir(Namespace::Global);
        touch(&global, "b.png");
        touch(&global, "a.png");
        touch(&global, "notes.txt");
        fs::create_dir_all(global.join("nested.png")).unwrap();

        assert_eq!(lib.list_png(Namespace::Global).unwrap(), vec!["a.png", "b.png"]);
    }

    #[test]
    fn missing_namespace_reads_as_empty() {
        let root = tempdir().unwrap();
        let lib = ImageLibrary::new(root.path().join("nowhere"));
        assert!(lib.list_png(Namespace::Well).unwrap().is_empty());
    }

    #[test]
    fn well_and_joint_share_a_directory() {
        let root = tempdir().unwrap();
        let lib = ImageLibrary::new(root.path());
        touch(&lib.namespace_dir(Namespace::Well), "fakesA1.png");
        touch(&lib.namespace_dir(Namespace::Well), "other.png");

        assert!(lib.contains(Namespace::Joint, "fakesA1.png"));
        assert_eq!(
            lib.list_with_prefix(Namespace::Joint, WELL_PREFIX).unwrap(),
            vec!["fakesA1.png"]
        );
        let image = ImageRef {
            namespace: Namespace::Joint,
            filename: "fakesA1.png".to_string(),
        };
        assert_eq!(lib.read(&image).unwrap(), b"fakesA1.png");
    }
}
