use std::env;
use std::path::PathBuf;

pub const GALLERY_DIR_ENV: &str = "FACIES_GALLERY_DIR";
pub const HISTORY_DIR_ENV: &str = "FACIES_HISTORY_DIR";
pub const SEED_ENV: &str = "FACIES_SEED";

pub const DEFAULT_GALLERY_DIR: &str = "facies_gallery";
pub const DEFAULT_HISTORY_DIR: &str = "history_records";

/// Filesystem roots and RNG seed, resolved once and handed to each component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub gallery_root: PathBuf,
    pub history_dir: PathBuf,
    pub seed: Option<u64>,
}

impl AppConfig {
    /// Flag beats environment, environment beats the working-directory default.
    pub fn resolve(
        gallery_flag: Option<PathBuf>,
        history_flag: Option<PathBuf>,
        seed_flag: Option<u64>,
    ) -> Self {
        Self::resolve_with(gallery_flag, history_flag, seed_flag, |key| env::var(key).ok())
    }

    pub fn resolve_with(
        gallery_flag: Option<PathBuf>,
        history_flag: Option<PathBuf>,
        seed_flag: Option<u64>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let gallery_root = gallery_flag
            .or_else(|| non_blank(GALLERY_DIR_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_GALLERY_DIR));
        let history_dir = history_flag
            .or_else(|| non_blank(HISTORY_DIR_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_HISTORY_DIR));
        let seed = seed_flag.or_else(|| {
            let raw = non_blank(SEED_ENV)?;
            match raw.trim().parse::<u64>() {
                Ok(seed) => Some(seed),
                Err(_) => {
                    tracing::warn!(value = %raw, "ignoring unparsable {SEED_ENV}");
                    None
                }
            }
        });

        Self {
            gallery_root,
            history_dir,
            seed,
        }
    }
}
