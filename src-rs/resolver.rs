use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

use crate::conditions::{ConditionSet, MudGroup};
use crate::error::FaciesResult;
use crate::library::{ImageLibrary, ImageRef, Namespace, IMAGE_EXT, WELL_PREFIX};

/// Which fallback tier produced a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    /// Uniform draw over the whole global namespace.
    Uniform,
    /// Exact `fakes{letter}{group}.png` hit.
    Exact,
    /// Uniform draw over `fakes{letter}*`.
    LetterPrefix,
    /// Uniform draw over every `fakes*` image.
    AnyFakes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub image: ImageRef,
    pub tier: MatchTier,
    /// Size of the tier the image was drawn from.
    pub candidates: usize,
}

/// Maps condition sets onto gallery images.
///
/// Tiers are tried in order and each draw is uniform over the full tier set.
/// `Ok(None)` means every tier came up empty.
pub struct Resolver<'a, R> {
    library: &'a ImageLibrary,
    rng: R,
}

impl<'a, R: Rng> Resolver<'a, R> {
    pub fn new(library: &'a ImageLibrary, rng: R) -> Self {
        Self { library, rng }
    }

    pub fn resolve(&mut self, conditions: &ConditionSet) -> FaciesResult<Option<Resolution>> {
        match conditions {
            // slider values are not consulted in global mode
            ConditionSet::Global(_) => self.resolve_global(),
            ConditionSet::Well(well) => self.resolve_well_only(&well.facies_letter),
            ConditionSet::Joint(joint) => self.resolve_joint(&joint.facies_letter, joint.mud_group),
        }
    }

    pub fn resolve_global(&mut self) -> FaciesResult<Option<Resolution>> {
        let candidates = self.library.list_png(Namespace::Global)?;
        Ok(self.pick(Namespace::Global, &candidates, MatchTier::Uniform))
    }

    pub fn resolve_well_only(&mut self, facies_letter: &str) -> FaciesResult<Option<Resolution>> {
        let prefix = format!("{WELL_PREFIX}{facies_letter}");
        let letter_matches = self.library.list_with_prefix(Namespace::Well, &prefix)?;
        if let Some(found) = self.pick(Namespace::Well, &letter_matches, MatchTier::LetterPrefix) {
            return Ok(Some(found));
        }
        tracing::debug!(%prefix, "no letter match in well gallery; falling back to any fakes image");
        self.resolve_any_fakes(Namespace::Well)
    }

    pub fn resolve_joint(
        &mut self,
        facies_letter: &str,
        mud_group: MudGroup,
    ) -> FaciesResult<Option<Resolution>> {
        let exact = joint_filename(facies_letter, mud_group);
        if self.library.contains(Namespace::Joint, &exact) {
            return Ok(Some(Resolution {
                image: ImageRef {
                    namespace: Namespace::Joint,
                    filename: exact,
                },
                tier: MatchTier::Exact,
                candidates: 1,
            }));
        }
        tracing::debug!(%exact, "no exact joint match; falling back to any fakes image");
        self.resolve_any_fakes(Namespace::Joint)
    }

    fn resolve_any_fakes(&mut self, namespace: Namespace) -> FaciesResult<Option<Resolution>> {
        let any = self.library.list_with_prefix(namespace, WELL_PREFIX)?;
        Ok(self.pick(namespace, &any, MatchTier::AnyFakes))
    }

    fn pick(&mut self, namespace: Namespace, candidates: &[String], tier: MatchTier) -> Option<Resolution> {
        let filename = candidates.choose(&mut self.rng)?.clone();
        Some(Resolution {
            image: ImageRef { namespace, filename },
            tier,
            candidates: candidates.len(),
        })
    }
}

pub fn joint_filename(facies_letter: &str, mud_group: MudGroup) -> String {
    format!("{WELL_PREFIX}{facies_letter}{mud_group}{IMAGE_EXT}")
}
