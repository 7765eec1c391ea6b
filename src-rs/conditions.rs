use std::fmt;
use std::path::Path;

use clap::ValueEnum;
use serde::Serialize;

use crate::error::{FaciesError, FaciesResult};

/// Slider bounds as `(min, max, step)`.
pub const MUD_RANGE: (f64, f64, f64) = (0.1, 0.9, 0.1);
pub const SINUOSITY_RANGE: (f64, f64, f64) = (0.1, 0.9, 0.1);
pub const WIDTH_RANGE: (f64, f64, f64) = (2.0, 6.0, 0.5);

pub const DEFAULT_MUD: f64 = 0.5;
pub const DEFAULT_SINUOSITY: f64 = 0.5;
pub const DEFAULT_WIDTH: f64 = 4.0;

const STEP_TOLERANCE: f64 = 1e-9;
/// Snapped slider values are rounded to this many units per 1.0 so grid
/// points compare equal to their decimal literals.
const GRID_SCALE: f64 = 1e6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    /// Global features only (mud, sinuosity, width)
    Global,
    /// Well-point image only
    Well,
    /// Well-point image plus mud ratio
    Joint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "u8")]
pub enum MudGroup {
    Low,
    Medium,
    High,
}

impl MudGroup {
    /// Bins a mud ratio: `<= 0.3` is low, `<= 0.6` is medium, anything above is high.
    pub fn from_mud(mud: f64) -> Self {
        if mud <= 0.3 {
            MudGroup::Low
        } else if mud <= 0.6 {
            MudGroup::Medium
        } else {
            MudGroup::High
        }
    }

    pub fn digit(self) -> u8 {
        match self {
            MudGroup::Low => 1,
            MudGroup::Medium => 2,
            MudGroup::High => 3,
        }
    }
}

impl From<MudGroup> for u8 {
    fn from(group: MudGroup) -> u8 {
        group.digit()
    }
}

impl fmt::Display for MudGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.digit())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalConditions {
    pub mud: f64,
    pub sinuosity: f64,
    pub width: f64,
}

impl GlobalConditions {
    pub fn new(mud: f64, sinuosity: f64, width: f64) -> FaciesResult<Self> {
        Ok(Self {
            mud: check_slider("mud", mud, MUD_RANGE)?,
            sinuosity: check_slider("sinuosity", sinuosity, SINUOSITY_RANGE)?,
            width: check_slider("width", width, WIDTH_RANGE)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WellConditions {
    pub facies_letter: String,
}

impl WellConditions {
    pub fn from_upload_name(upload_name: &str) -> Self {
        Self {
            facies_letter: facies_letter_from_upload(upload_name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JointConditions {
    pub mud_group: MudGroup,
    pub facies_letter: String,
}

impl JointConditions {
    pub fn new(upload_name: &str, mud: f64) -> FaciesResult<Self> {
        let mud = check_slider("mud", mud, MUD_RANGE)?;
        Ok(Self {
            mud_group: MudGroup::from_mud(mud),
            facies_letter: facies_letter_from_upload(upload_name),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ConditionSet {
    Global(GlobalConditions),
    Well(WellConditions),
    Joint(JointConditions),
}

impl ConditionSet {
    pub fn mode(&self) -> InputMode {
        match self {
            ConditionSet::Global(_) => InputMode::Global,
            ConditionSet::Well(_) => InputMode::Well,
            ConditionSet::Joint(_) => InputMode::Joint,
        }
    }
}

/// Facies key carried by an uploaded well image name.
///
/// Takes the base name without its extension and drops every `facies`
/// substring. Names that do not follow `facies<Letter>.png` are used as-is;
/// a key that matches nothing just degrades through the resolver fallbacks.
pub fn facies_letter_from_upload(upload_name: &str) -> String {
    let base = Path::new(upload_name)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(upload_name);
    let stem = match base.rfind('.') {
        Some(idx) if idx > 0 => &base[..idx],
        _ => base,
    };
    stem.replace("facies", "")
}

fn check_slider(name: &'static str, value: f64, (min, max, step): (f64, f64, f64)) -> FaciesResult<f64> {
    let invalid = || FaciesError::InvalidCondition {
        name,
        value,
        min,
        max,
        step,
    };
    if !value.is_finite() || value < min - STEP_TOLERANCE || value > max + STEP_TOLERANCE {
        return Err(invalid());
    }
    let snapped = min + ((value - min) / step).round() * step;
    if (snapped - value).abs() > STEP_TOLERANCE {
        return Err(invalid());
    }
    Ok((snapped * GRID_SCALE).round() / GRID_SCALE)
}
