//! Tolerance schedules keyed by simulation step.
//!
//! Thresholds are configured against simulated time in seconds and turned
//! into step boundaries with the run's time-step duration. A step uses the
//! threshold paired with the largest boundary not exceeding it; steps below
//! the first boundary use the first threshold.

use crate::domain::{CheckError, FieldClass};
use crate::namelist;
use crate::numerics::MinimumMagnitude;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Boundary used by the bit-exact override; far beyond any test run.
pub const FORCE_EXACT_BOUNDARY: i64 = 10_000;

pub const DEFAULT_MINIMUM_MAGNITUDE: f64 = 1.0e-9;

#[derive(Debug, thiserror::Error)]
pub enum ToleranceError {
    #[error("failed to read tolerance file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("tolerance file '{}' is missing '{key}' (required: {required})", path.display())]
    MissingKey {
        path: PathBuf,
        key: &'static str,
        required: String,
    },
    #[error("tolerance file '{}' has invalid '{key}' value '{value}'", path.display())]
    InvalidValue {
        path: PathBuf,
        key: &'static str,
        value: String,
    },
    #[error("time-step duration must be positive, got {dt}")]
    InvalidStepDuration { dt: f64 },
    #[error("tolerance schedule needs at least one boundary and one threshold per class")]
    EmptySchedule,
    #[error("tolerance schedule boundaries must be non-decreasing, got {boundaries:?}")]
    UnorderedBoundaries { boundaries: Vec<i64> },
}

impl From<ToleranceError> for CheckError {
    fn from(error: ToleranceError) -> Self {
        let message = error.to_string();
        match error {
            ToleranceError::Read { .. } => CheckError::io_system("IO.TOLERANCE_FILE", message),
            ToleranceError::MissingKey { .. } | ToleranceError::InvalidValue { .. } => {
                CheckError::input_validation("INPUT.TOLERANCE_KEYS", message)
            }
            ToleranceError::InvalidStepDuration { .. }
            | ToleranceError::EmptySchedule
            | ToleranceError::UnorderedBoundaries { .. } => {
                CheckError::input_validation("INPUT.TOLERANCE_SCHEDULE", message)
            }
        }
    }
}

/// Which keys a tolerance file must provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToleranceKeys {
    /// `tol_times`, `tol_temp`, `tol_all`, `minval`.
    StepIndexed,
    /// `tol_times`, `tol_out`, `minval`.
    RecordSet,
}

impl ToleranceKeys {
    pub const fn required(self) -> &'static [&'static str] {
        match self {
            Self::StepIndexed => &["tol_times", "tol_temp", "tol_all", "minval"],
            Self::RecordSet => &["tol_times", "tol_out", "minval"],
        }
    }
}

/// Tolerances as configured: time boundaries in seconds plus threshold lists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToleranceDefinition {
    pub times: Vec<f64>,
    pub temperature: Vec<f64>,
    pub general: Vec<f64>,
    pub minimum_magnitude: f64,
}

impl ToleranceDefinition {
    pub fn step_defaults() -> Self {
        Self {
            times: vec![1200.0, 2400.0, 3600.0],
            temperature: vec![1.0e-9, 1.0e-5, 1.0e-3],
            general: vec![1.0e-7, 1.0e-4, 1.0e0],
            minimum_magnitude: DEFAULT_MINIMUM_MAGNITUDE,
        }
    }

    pub fn record_set_defaults() -> Self {
        let general = vec![1.0e-7, 1.0e-4, 1.0e0];
        Self {
            times: vec![1200.0, 2400.0, 4000.0],
            temperature: general.clone(),
            general,
            minimum_magnitude: DEFAULT_MINIMUM_MAGNITUDE,
        }
    }

    pub fn defaults_for(keys: ToleranceKeys) -> Self {
        match keys {
            ToleranceKeys::StepIndexed => Self::step_defaults(),
            ToleranceKeys::RecordSet => Self::record_set_defaults(),
        }
    }

    pub fn from_file(path: impl AsRef<Path>, keys: ToleranceKeys) -> Result<Self, ToleranceError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ToleranceError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_namelist_text(&text, path, keys)
    }

    /// Parses the namelist-style tolerance file body; `path` is only used in errors.
    pub fn from_namelist_text(
        text: &str,
        path: &Path,
        keys: ToleranceKeys,
    ) -> Result<Self, ToleranceError> {
        let list = |key: &'static str| -> Result<Vec<f64>, ToleranceError> {
            let raw = lookup_key(text, path, keys, key)?;
            parse_list(&raw).ok_or_else(|| ToleranceError::InvalidValue {
                path: path.to_path_buf(),
                key,
                value: raw,
            })
        };

        let times = list("tol_times")?;
        let (temperature, general) = match keys {
            ToleranceKeys::StepIndexed => (list("tol_temp")?, list("tol_all")?),
            ToleranceKeys::RecordSet => {
                let output = list("tol_out")?;
                (output.clone(), output)
            }
        };

        let raw_minval = lookup_key(text, path, keys, "minval")?;
        let minimum_magnitude = namelist::parse_fortran_real(&raw_minval).ok_or_else(|| {
            ToleranceError::InvalidValue {
                path: path.to_path_buf(),
                key: "minval",
                value: raw_minval.clone(),
            }
        })?;

        Ok(Self {
            times,
            temperature,
            general,
            minimum_magnitude,
        })
    }

    /// Converts time boundaries to step boundaries with `floor(time / dt)`.
    pub fn to_schedule(&self, dt: f64) -> Result<ToleranceSchedule, ToleranceError> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(ToleranceError::InvalidStepDuration { dt });
        }
        let boundaries = self
            .times
            .iter()
            .map(|time| (time / dt).floor() as i64)
            .collect();
        debug!(dt, ?boundaries, "converted tolerance times to step boundaries");
        ToleranceSchedule::new(
            boundaries,
            self.temperature.clone(),
            self.general.clone(),
            MinimumMagnitude::from_raw(self.minimum_magnitude),
        )
    }
}

/// Step-resolved thresholds for both field classes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToleranceSchedule {
    boundaries: Vec<i64>,
    temperature: Vec<f64>,
    general: Vec<f64>,
    minimum_magnitude: MinimumMagnitude,
}

impl ToleranceSchedule {
    pub fn new(
        boundaries: Vec<i64>,
        temperature: Vec<f64>,
        general: Vec<f64>,
        minimum_magnitude: MinimumMagnitude,
    ) -> Result<Self, ToleranceError> {
        if boundaries.is_empty() || temperature.is_empty() || general.is_empty() {
            return Err(ToleranceError::EmptySchedule);
        }
        if boundaries.windows(2).any(|pair| pair[0] > pair[1]) {
            return Err(ToleranceError::UnorderedBoundaries { boundaries });
        }
        if temperature.len() != boundaries.len() || general.len() != boundaries.len() {
            warn!(
                boundaries = boundaries.len(),
                temperature = temperature.len(),
                general = general.len(),
                "tolerance lists differ in length from the step boundaries"
            );
        }

        Ok(Self {
            boundaries,
            temperature,
            general,
            minimum_magnitude,
        })
    }

    /// Same thresholds for every field class.
    pub fn uniform(
        boundaries: Vec<i64>,
        thresholds: Vec<f64>,
        minimum_magnitude: MinimumMagnitude,
    ) -> Result<Self, ToleranceError> {
        Self::new(
            boundaries,
            thresholds.clone(),
            thresholds,
            minimum_magnitude,
        )
    }

    /// Bit-exact override: zero threshold everywhere, absolute differences.
    pub fn force_exact() -> Self {
        Self {
            boundaries: vec![FORCE_EXACT_BOUNDARY],
            temperature: vec![0.0],
            general: vec![0.0],
            minimum_magnitude: MinimumMagnitude::Absolute,
        }
    }

    pub fn boundaries(&self) -> &[i64] {
        &self.boundaries
    }

    pub fn thresholds(&self, class: FieldClass) -> &[f64] {
        match class {
            FieldClass::Temperature => &self.temperature,
            FieldClass::General => &self.general,
        }
    }

    pub const fn minimum_magnitude(&self) -> MinimumMagnitude {
        self.minimum_magnitude
    }

    /// Index of the boundary governing `step`.
    pub fn boundary_index(&self, step: i64) -> usize {
        self.boundaries
            .partition_point(|boundary| *boundary <= step)
            .saturating_sub(1)
    }

    pub fn threshold(&self, step: i64, class: FieldClass) -> f64 {
        let thresholds = self.thresholds(class);
        let index = self.boundary_index(step);
        if index >= thresholds.len() {
            warn!(
                step,
                boundary = self.boundaries[index],
                "step is beyond the configured tolerance thresholds; using the last one"
            );
        }
        thresholds[index.min(thresholds.len() - 1)]
    }

    pub fn active(&self, step: i64) -> ActiveThresholds {
        ActiveThresholds {
            step,
            temperature: self.threshold(step, FieldClass::Temperature),
            general: self.threshold(step, FieldClass::General),
        }
    }
}

/// Thresholds in force for one step or record set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ActiveThresholds {
    pub step: i64,
    pub temperature: f64,
    pub general: f64,
}

impl ActiveThresholds {
    pub const fn for_class(&self, class: FieldClass) -> f64 {
        match class {
            FieldClass::Temperature => self.temperature,
            FieldClass::General => self.general,
        }
    }
}

/// Tolerance file in the namelist directory, falling back to its parent.
pub fn locate_tolerance_file(namelist_dir: &Path, file_name: &str) -> Option<PathBuf> {
    if file_name.is_empty() {
        return None;
    }
    [
        namelist_dir.join(file_name),
        namelist_dir.join("..").join(file_name),
    ]
    .into_iter()
    .find(|candidate| candidate.is_file())
}

fn lookup_key(
    text: &str,
    path: &Path,
    keys: ToleranceKeys,
    key: &'static str,
) -> Result<String, ToleranceError> {
    namelist::get_param(text, key, 1).ok_or_else(|| ToleranceError::MissingKey {
        path: path.to_path_buf(),
        key,
        required: keys.required().join(","),
    })
}

fn parse_list(raw: &str) -> Option<Vec<f64>> {
    raw.split(',')
        .map(namelist::parse_fortran_real)
        .collect::<Option<Vec<_>>>()
}

#[cfg(test)]
mod tests {
    use super::{
        FORCE_EXACT_BOUNDARY, ToleranceDefinition, ToleranceError, ToleranceKeys,
        ToleranceSchedule, locate_tolerance_file,
    };
    use crate::domain::FieldClass;
    use crate::numerics::MinimumMagnitude;
    use proptest::prelude::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    #[test]
    fn time_boundaries_convert_to_steps() {
        let definition = ToleranceDefinition {
            times: vec![1200.0, 2400.0, 4000.0],
            temperature: vec![1.0e-9, 1.0e-5, 1.0e-3],
            general: vec![1.0e-7, 1.0e-4, 1.0],
            minimum_magnitude: 1.0e-9,
        };

        let schedule = definition.to_schedule(40.0).expect("schedule should build");
        assert_eq!(schedule.boundaries(), &[30, 60, 100]);
        assert_eq!(schedule.threshold(59, FieldClass::General), 1.0e-7);
        assert_eq!(schedule.threshold(60, FieldClass::General), 1.0e-4);
        assert_eq!(schedule.threshold(60, FieldClass::Temperature), 1.0e-5);
        assert_eq!(schedule.threshold(250, FieldClass::General), 1.0);
    }

    #[test]
    fn step_below_first_boundary_uses_first_threshold() {
        let schedule = ToleranceSchedule::uniform(
            vec![30, 60],
            vec![1.0e-6, 1.0e-3],
            MinimumMagnitude::Relative(1.0e-9),
        )
        .expect("schedule should build");
        assert_eq!(schedule.threshold(0, FieldClass::General), 1.0e-6);
    }

    #[test]
    fn threshold_at_exact_boundary_is_left_closed() {
        let schedule = ToleranceSchedule::uniform(
            vec![0, 50, 100],
            vec![1.0e-3, 1.0e-4, 1.0e-5],
            MinimumMagnitude::Relative(1.0e-9),
        )
        .expect("schedule should build");
        assert_eq!(schedule.threshold(49, FieldClass::General), 1.0e-3);
        assert_eq!(schedule.threshold(50, FieldClass::General), 1.0e-4);
        assert_eq!(schedule.threshold(100, FieldClass::Temperature), 1.0e-5);
    }

    #[test]
    fn short_threshold_list_clamps_to_last_entry() {
        let schedule = ToleranceSchedule::uniform(
            vec![0, 10, 20],
            vec![1.0e-3],
            MinimumMagnitude::Relative(1.0e-9),
        )
        .expect("schedule should build");
        assert_eq!(schedule.threshold(25, FieldClass::General), 1.0e-3);
    }

    #[test]
    fn force_exact_compares_absolute_values_with_zero_threshold() {
        let schedule = ToleranceSchedule::force_exact();
        assert_eq!(schedule.boundaries(), &[FORCE_EXACT_BOUNDARY]);
        assert_eq!(schedule.minimum_magnitude(), MinimumMagnitude::Absolute);
        assert_eq!(schedule.threshold(0, FieldClass::Temperature), 0.0);
        assert_eq!(schedule.threshold(20_000, FieldClass::General), 0.0);
    }

    #[test]
    fn rejects_empty_and_unordered_schedules() {
        assert!(matches!(
            ToleranceSchedule::uniform(Vec::new(), vec![1.0], MinimumMagnitude::Absolute),
            Err(ToleranceError::EmptySchedule)
        ));
        assert!(matches!(
            ToleranceSchedule::uniform(vec![10, 5], vec![1.0, 2.0], MinimumMagnitude::Absolute),
            Err(ToleranceError::UnorderedBoundaries { .. })
        ));
        assert!(matches!(
            ToleranceDefinition::step_defaults().to_schedule(0.0),
            Err(ToleranceError::InvalidStepDuration { .. })
        ));
    }

    #[test]
    fn parses_step_indexed_tolerance_file() {
        let text = "\
 tol_times = 1200, 2400, 3600
 tol_temp = 1.0e-9, 1.0e-5, 1.0e-3   ! temperature
 tol_all = 1.0e-7, 1.0e-4, 1.0e-0
 minval = 1.0e-12
";
        let definition =
            ToleranceDefinition::from_namelist_text(text, Path::new("TOLERANCE"), ToleranceKeys::StepIndexed)
                .expect("tolerance file should parse");
        assert_eq!(definition.times, vec![1200.0, 2400.0, 3600.0]);
        assert_eq!(definition.temperature, vec![1.0e-9, 1.0e-5, 1.0e-3]);
        assert_eq!(definition.general, vec![1.0e-7, 1.0e-4, 1.0]);
        assert_eq!(definition.minimum_magnitude, 1.0e-12);
    }

    #[test]
    fn record_set_file_uses_single_output_list() {
        let text = "tol_times = 1200,2400\ntol_out = 1.0e-6,1.0e-3\nminval = -1\n";
        let definition =
            ToleranceDefinition::from_namelist_text(text, Path::new("TOLERANCE"), ToleranceKeys::RecordSet)
                .expect("tolerance file should parse");
        assert_eq!(definition.general, vec![1.0e-6, 1.0e-3]);
        assert_eq!(definition.temperature, definition.general);

        let schedule = definition.to_schedule(20.0).expect("schedule should build");
        assert_eq!(schedule.minimum_magnitude(), MinimumMagnitude::Absolute);
        assert_eq!(schedule.boundaries(), &[60, 120]);
    }

    #[test]
    fn missing_minval_is_reported() {
        let text = "tol_times = 1200,2400\ntol_temp = 1.0e-9,1.0e-5\ntol_all = 1.0e-7,1.0e-4\n";
        let error =
            ToleranceDefinition::from_namelist_text(text, Path::new("TOLERANCE"), ToleranceKeys::StepIndexed)
                .expect_err("minval is required");
        assert!(matches!(error, ToleranceError::MissingKey { key: "minval", .. }));
        assert!(error.to_string().contains("tol_times,tol_temp,tol_all,minval"));
    }

    #[test]
    fn tolerance_file_is_found_next_to_or_above_namelists() {
        let temp = TempDir::new().expect("tempdir should be created");
        let namelist_dir = temp.path().join("type").join("test");
        fs::create_dir_all(&namelist_dir).expect("namelist dir should be created");

        assert_eq!(locate_tolerance_file(&namelist_dir, "TOLERANCE"), None);

        fs::write(temp.path().join("type").join("TOLERANCE"), "minval = 1.0e-9\n")
            .expect("tolerance file should be written");
        let found = locate_tolerance_file(&namelist_dir, "TOLERANCE")
            .expect("parent tolerance file should be found");
        assert!(found.ends_with("TOLERANCE"));
        assert!(!found.starts_with(&namelist_dir.join("TOLERANCE")));

        fs::write(namelist_dir.join("TOLERANCE"), "minval = 1.0e-9\n")
            .expect("tolerance file should be written");
        assert_eq!(
            locate_tolerance_file(&namelist_dir, "TOLERANCE"),
            Some(namelist_dir.join("TOLERANCE"))
        );
    }

    proptest! {
        #[test]
        fn threshold_selection_is_monotonic(
            mut boundaries in prop::collection::vec(0i64..5_000, 1..6),
            mut thresholds in prop::collection::vec(0.0f64..1.0, 1..6),
            first in 0i64..6_000,
            gap in 0i64..6_000,
        ) {
            boundaries.sort_unstable();
            thresholds.sort_by(f64::total_cmp);
            let schedule = ToleranceSchedule::uniform(
                boundaries,
                thresholds,
                MinimumMagnitude::Relative(1.0e-9),
            )
            .expect("sorted schedule should build");

            let earlier = schedule.threshold(first, FieldClass::General);
            let later = schedule.threshold(first + gap, FieldClass::General);
            prop_assert!(later >= earlier);
        }
    }
}
