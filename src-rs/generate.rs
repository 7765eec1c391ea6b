use std::fs;
use std::io::{self, Cursor};
use std::path::Path;

use image::ImageReader;
use rand::Rng;
use serde::Serialize;

use crate::conditions::{ConditionSet, GlobalConditions, InputMode, JointConditions, WellConditions};
use crate::error::{FaciesError, FaciesResult};
use crate::history::{HistoryEntry, HistoryStore};
use crate::library::{ImageLibrary, Namespace};
use crate::resolver::{MatchTier, Resolution, Resolver};

/// An uploaded well-point image: its file name and raw bytes.
#[derive(Debug, Clone)]
pub struct Upload {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn from_path(path: &Path) -> FaciesResult<Self> {
        let bytes = fs::read(path).map_err(|source| FaciesError::UnreadableUpload {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !has_png_extension(&name) {
            tracing::warn!(upload = %name, "upload is not a .png file; using it anyway");
        }
        Ok(Self { name, bytes })
    }

    pub fn summary(&self) -> UploadSummary {
        UploadSummary {
            name: self.name.clone(),
            size: self.bytes.len(),
            dimensions: image_dimensions(&self.bytes),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadSummary {
    pub name: String,
    pub size: usize,
    pub dimensions: Option<(u32, u32)>,
}

/// Raw slider and upload inputs for one generate request.
#[derive(Debug, Clone)]
pub struct GenerateInputs<'a> {
    pub mode: InputMode,
    pub mud: f64,
    pub sinuosity: f64,
    pub width: f64,
    pub upload: Option<&'a Upload>,
}

impl GenerateInputs<'_> {
    pub fn into_conditions(self) -> FaciesResult<ConditionSet> {
        match self.mode {
            InputMode::Global => Ok(ConditionSet::Global(GlobalConditions::new(
                self.mud,
                self.sinuosity,
                self.width,
            )?)),
            InputMode::Well => {
                let upload = self
                    .upload
                    .ok_or(FaciesError::MissingUpload { mode: "well" })?;
                Ok(ConditionSet::Well(WellConditions::from_upload_name(&upload.name)))
            }
            InputMode::Joint => {
                let upload = self
                    .upload
                    .ok_or(FaciesError::MissingUpload { mode: "joint" })?;
                Ok(ConditionSet::Joint(JointConditions::new(&upload.name, self.mud)?))
            }
        }
    }
}

#[derive(Debug)]
pub struct GenerationOutcome {
    pub conditions: ConditionSet,
    pub resolution: Option<Resolution>,
    pub image_bytes: Option<Vec<u8>>,
    pub history: Option<HistoryEntry>,
    /// Recovered problems: an empty gallery or a failed history write.
    pub issues: Vec<FaciesError>,
}

impl GenerationOutcome {
    pub fn warnings(&self) -> Vec<String> {
        self.issues.iter().map(FaciesError::describe).collect()
    }

    pub fn caption(&self) -> Option<String> {
        let found = self.resolution.as_ref()?;
        let name = &found.image.filename;
        Some(match found.tier {
            MatchTier::Uniform => "generated result".to_string(),
            MatchTier::Exact => "model generated result".to_string(),
            MatchTier::LetterPrefix => format!("generated result: {name}"),
            MatchTier::AnyFakes => format!("default generated image: {name}"),
        })
    }

    pub fn image_dimensions(&self) -> Option<(u32, u32)> {
        self.image_bytes.as_deref().and_then(image_dimensions)
    }
}

/// Resolve, read the chosen image, then copy it into history.
///
/// An empty gallery yields no image and no history entry. A failed history
/// write keeps the resolved image in the outcome.
pub fn run_generation<R: Rng>(
    library: &ImageLibrary,
    store: &mut HistoryStore,
    rng: R,
    conditions: ConditionSet,
) -> FaciesResult<GenerationOutcome> {
    let mut resolver = Resolver::new(library, rng);
    let resolution = resolver.resolve(&conditions)?;

    let mut outcome = GenerationOutcome {
        conditions,
        resolution: None,
        image_bytes: None,
        history: None,
        issues: Vec::new(),
    };

    let Some(found) = resolution else {
        let namespace = mode_namespace(outcome.conditions.mode());
        tracing::warn!(%namespace, "no image available");
        outcome.issues.push(FaciesError::EmptyLibrary {
            namespace: namespace.as_str(),
        });
        return Ok(outcome);
    };

    tracing::debug!(
        image = %found.image.filename,
        tier = ?found.tier,
        candidates = found.candidates,
        "resolved gallery image"
    );
    let bytes = library.read(&found.image)?;

    match store.record(&bytes, &found.image.filename) {
        Ok(entry) => outcome.history = Some(entry),
        Err(err) => {
            tracing::warn!(error = %err, "history write failed; result is still available");
            outcome.issues.push(err);
        }
    }

    outcome.image_bytes = Some(bytes);
    outcome.resolution = Some(found);
    Ok(outcome)
}

fn mode_namespace(mode: InputMode) -> Namespace {
    match mode {
        InputMode::Global => Namespace::Global,
        InputMode::Well => Namespace::Well,
        InputMode::Joint => Namespace::Joint,
    }
}

fn image_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|err: io::Error| tracing::debug!(error = %err, "could not sniff image format"))
        .ok()?;
    reader.into_dimensions().ok()
}

/// Uploads are expected to be PNG; other extensions are accepted with a warning.
fn has_png_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::{tempdir, TempDir};

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img: ImageBuffer<Rgba<u8>, Vec<u8>> = ImageBuffer::from_pixel(w, h, Rgba([10, 20, 30, 255]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn setup(global: &[&str], well: &[&str]) -> (TempDir, ImageLibrary, HistoryStore) {
        let root = tempdir().unwrap();
        let library = ImageLibrary::new(root.path().join("facies_gallery"));
        for (namespace, names) in [(Namespace::Global, global), (Namespace::Well, well)] {
            let dir = library.namespace_dir(namespace);
            fs::create_dir_all(&dir).unwrap();
            for name in names {
                fs::write(dir.join(name), png_bytes(4, 3)).unwrap();
            }
        }
        let store = HistoryStore::open(root.path().join("history_records")).unwrap();
        (root, library, store)
    }

    fn upload(name: &str) -> Upload {
        Upload {
            name: name.to_string(),
            bytes: png_bytes(2, 2),
        }
    }

    #[test]
    fn joint_generation_records_a_copy() {
        let (_root, library, mut store) = setup(&[], &["fakesA1.png", "fakesA2.png", "fakesB1.png"]);
        let up = upload("faciesA.png");
        let conditions = GenerateInputs {
            mode: InputMode::Joint,
            mud: 0.5,
            sinuosity: 0.5,
            width: 4.0,
            upload: Some(&up),
        }
        .into_conditions()
        .unwrap();

        let outcome =
            run_generation(&library, &mut store, StdRng::seed_from_u64(1), conditions).unwrap();
        let found = outcome.resolution.as_ref().unwrap();
        assert_eq!(found.image.filename, "fakesA2.png");
        assert_eq!(outcome.caption().as_deref(), Some("model generated result"));
        assert_eq!(outcome.image_dimensions(), Some((4, 3)));
        assert!(outcome.issues.is_empty());

        let entry = outcome.history.as_ref().unwrap();
        assert!(entry.id.ends_with("_fakesA2.png"));
        assert_eq!(store.read(&entry.id).unwrap(), outcome.image_bytes.clone().unwrap());
        // library copy stays in place
        assert!(library.contains(Namespace::Joint, "fakesA2.png"));
    }

    #[test]
    fn empty_gallery_writes_no_history() {
        let (_root, library, mut store) = setup(&[], &["fakesA1.png"]);
        let conditions = ConditionSet::Global(GlobalConditions::new(0.5, 0.5, 4.0).unwrap());
        let outcome =
            run_generation(&library, &mut store, StdRng::seed_from_u64(1), conditions).unwrap();

        assert!(outcome.resolution.is_none());
        assert!(outcome.history.is_none());
        assert!(matches!(
            outcome.issues.as_slice(),
            [FaciesError::EmptyLibrary { namespace: "global" }]
        ));
        assert!(store.list().is_empty());
    }

    #[test]
    fn failed_history_write_keeps_result() {
        let (root, library, mut store) = setup(&["g.png"], &[]);
        let history_dir = root.path().join("history_records");
        fs::remove_dir_all(&history_dir).unwrap();
        fs::write(&history_dir, b"not a directory").unwrap();

        let conditions = ConditionSet::Global(GlobalConditions::new(0.1, 0.1, 2.0).unwrap());
        let outcome =
            run_generation(&library, &mut store, StdRng::seed_from_u64(5), conditions).unwrap();

        assert!(outcome.image_bytes.is_some());
        assert!(outcome.history.is_none());
        assert!(matches!(
            outcome.issues.as_slice(),
            [FaciesError::StoreWrite { .. }]
        ));
        assert_eq!(outcome.warnings().len(), 1);
    }

    #[test]
    fn well_fallback_is_captioned_as_default() {
        let (_root, library, mut store) = setup(&[], &["fakesB1.png"]);
        let conditions = ConditionSet::Well(WellConditions::from_upload_name("faciesA.png"));
        let outcome =
            run_generation(&library, &mut store, StdRng::seed_from_u64(2), conditions).unwrap();
        assert_eq!(
            outcome.caption().as_deref(),
            Some("default generated image: fakesB1.png")
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn upload_modes_require_an_upload() {
        for mode in [InputMode::Well, InputMode::Joint] {
            let err = GenerateInputs {
                mode,
                mud: 0.5,
                sinuosity: 0.5,
                width: 4.0,
                upload: None,
            }
            .into_conditions()
            .unwrap_err();
            assert!(matches!(err, FaciesError::MissingUpload { .. }));
        }
    }

    #[test]
    fn upload_from_path_reads_name_and_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("faciesC.png");
        fs::write(&path, png_bytes(5, 7)).unwrap();
        let up = Upload::from_path(&path).unwrap();
        assert_eq!(up.name, "faciesC.png");
        assert_eq!(up.summary().dimensions, Some((5, 7)));

        assert!(matches!(
            Upload::from_path(&dir.path().join("missing.png")),
            Err(FaciesError::UnreadableUpload { .. })
        ));
    }

    #[test]
    fn non_png_upload_is_accepted_with_its_name() {
        assert!(has_png_extension("faciesA.png"));
        assert!(has_png_extension("faciesA.PNG"));
        assert!(!has_png_extension("faciesA.jpg"));
        assert!(!has_png_extension("png"));

        let dir = tempdir().unwrap();
        let path = dir.path().join("faciesB.jpg");
        fs::write(&path, b"not an image").unwrap();
        let up = Upload::from_path(&path).unwrap();
        assert_eq!(up.name, "faciesB.jpg");
        assert_eq!(up.summary().dimensions, None);
        let conditions = GenerateInputs {
            mode: InputMode::Well,
            mud: 0.5,
            sinuosity: 0.5,
            width: 4.0,
            upload: Some(&up),
        }
        .into_conditions()
        .unwrap();
        assert_eq!(conditions, ConditionSet::Well(WellConditions::from_upload_name("faciesB.jpg")));
    }
}
