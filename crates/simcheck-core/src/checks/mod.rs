//! Checks run by the test harness after a simulation finished.
//!
//! Every check resolves its inputs from a [`CheckContext`], never from the
//! process environment, and always produces a [`CheckReport`]: failures are
//! folded into the verdict instead of being returned.

pub mod status;

pub use status::{pretty_status_str, read_status_file, status_color, write_status_file};

use crate::comparator::{
    LogFormat, RecordSetFormat, StepFormat, VerdictEvaluation, evaluate_verdict,
};
use crate::domain::{CheckError, CheckResult, Verdict};
use crate::namelist;
use crate::tolerance::{
    ToleranceDefinition, ToleranceKeys, ToleranceSchedule, locate_tolerance_file,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{info, warn};

static CLEAN_UP_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"CLEAN\sUP").expect("clean-up pattern should compile"));

/// Where a finished run lives and how chatty the checks should be.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CheckContext {
    pub run_dir: PathBuf,
    pub reference_dir: PathBuf,
    /// Directory holding the test's namelists and, possibly, its tolerance file.
    pub namelist_dir: PathBuf,
    /// Standard output of the simulation, relative to `run_dir`.
    pub log_file: String,
    /// Tolerance file name, looked up in `namelist_dir` and its parent.
    pub tolerance_file: String,
    pub verbosity: i32,
    /// Replace tolerances by a bit-exact schedule.
    pub force_match: bool,
}

impl CheckContext {
    pub fn new(run_dir: impl Into<PathBuf>, reference_dir: impl Into<PathBuf>) -> Self {
        let run_dir = run_dir.into();
        Self {
            namelist_dir: run_dir.clone(),
            run_dir,
            reference_dir: reference_dir.into(),
            log_file: "exe.log".to_string(),
            tolerance_file: "TOLERANCE".to_string(),
            verbosity: 0,
            force_match: false,
        }
    }

    fn run_file(&self, name: &str) -> PathBuf {
        self.run_dir.join(name)
    }

    fn reference_file(&self, name: &str) -> PathBuf {
        self.reference_dir.join(name)
    }
}

/// Inputs of the step-indexed log checks.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StepCheckSettings {
    pub log_file: String,
    /// Namelist and switch that enable the log for the tolerance check.
    pub switch_namelist: String,
    pub switch: String,
    /// Namelist and switch that enable the log for the identical check.
    pub identical_namelist: String,
    pub identical_switch: String,
    pub step_namelist: String,
    pub step_parameter: String,
    pub format: StepFormat,
}

impl Default for StepCheckSettings {
    fn default() -> Self {
        Self {
            log_file: "YUPRTEST".to_string(),
            switch_namelist: "INPUT_DIA".to_string(),
            switch: "ltestsuite".to_string(),
            identical_namelist: "INPUT_ORG".to_string(),
            identical_switch: "lyuprdbg".to_string(),
            step_namelist: "INPUT_ORG".to_string(),
            step_parameter: "dt".to_string(),
            format: StepFormat::default(),
        }
    }
}

/// Inputs of the record-set output check.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RecordSetCheckSettings {
    pub log_file: String,
    pub switch_namelist: String,
    /// Parameter giving the number of output lists.
    pub list_count_parameter: String,
    /// Switch read at the occurrence given by the list count.
    pub switch: String,
    pub step_namelist: String,
    pub step_parameter: String,
    pub format: RecordSetFormat,
}

impl Default for RecordSetCheckSettings {
    fn default() -> Self {
        Self {
            log_file: "YUCHKDAT".to_string(),
            switch_namelist: "INPUT_IO".to_string(),
            list_count_parameter: "ngribout".to_string(),
            switch: "lcheck".to_string(),
            step_namelist: "INPUT_ORG".to_string(),
            step_parameter: "dt".to_string(),
            format: RecordSetFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Tolerance,
    OutputTolerance,
    Identical,
    RunSuccess,
}

impl CheckKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tolerance => "tolerance",
            Self::OutputTolerance => "output-tolerance",
            Self::Identical => "identical",
            Self::RunSuccess => "run-success",
        }
    }

    /// Verdict reported when the check cannot complete.
    pub const fn failure_verdict(self) -> Verdict {
        match self {
            Self::RunSuccess => Verdict::Crash,
            _ => Verdict::Fail,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckReport {
    pub check: CheckKind,
    pub verdict: Verdict,
    pub schedule: Option<ToleranceSchedule>,
    pub evaluation: Option<VerdictEvaluation>,
    /// Human-readable progress and comparator diagnostics.
    pub messages: Vec<String>,
    /// Diagnostic line of the error that decided the verdict, if any.
    pub error: Option<String>,
}

impl CheckReport {
    fn new(check: CheckKind) -> Self {
        Self {
            check,
            verdict: Verdict::Match,
            schedule: None,
            evaluation: None,
            messages: Vec::new(),
            error: None,
        }
    }

    fn fail_with(mut self, error: CheckError) -> Self {
        warn!(check = self.check.as_str(), error = %error, "check failed");
        self.verdict = self.check.failure_verdict();
        self.error = Some(error.diagnostic_line());
        self
    }

    fn finish(self, result: CheckResult<()>) -> Self {
        let report = match result {
            Ok(()) => self,
            Err(error) => self.fail_with(error),
        };
        info!(check = report.check.as_str(), verdict = %report.verdict, "check finished");
        report
    }
}

/// Bit-exact and tolerant comparison of the step-indexed log against the
/// reference: MATCH, OK or FAIL.
pub fn run_tolerance_check(context: &CheckContext, settings: &StepCheckSettings) -> CheckReport {
    let mut report = CheckReport::new(CheckKind::Tolerance);
    let result = tolerance_check(context, settings, &mut report);
    report.finish(result)
}

fn tolerance_check(
    context: &CheckContext,
    settings: &StepCheckSettings,
    report: &mut CheckReport,
) -> CheckResult<()> {
    let dt = namelist::require_f64(
        context.run_file(&settings.step_namelist),
        &settings.step_parameter,
    )?;
    require_switch(
        &context.run_file(&settings.switch_namelist),
        &settings.switch,
        1,
    )?;

    let schedule =
        resolve_schedule(context, ToleranceKeys::StepIndexed, dt, &mut report.messages)?;
    let evaluation = evaluate_verdict(
        &LogFormat::Step(settings.format.clone()),
        &schedule,
        &context.run_file(&settings.log_file),
        &context.reference_file(&settings.log_file),
        context.verbosity,
    )?;

    report.messages.extend(evaluation.tolerant.diagnostics.iter().cloned());
    report.verdict = evaluation.verdict;
    report.schedule = Some(schedule);
    report.evaluation = Some(evaluation);
    Ok(())
}

/// Tolerance check of the record-set output log.
pub fn run_output_tolerance_check(
    context: &CheckContext,
    settings: &RecordSetCheckSettings,
) -> CheckReport {
    let mut report = CheckReport::new(CheckKind::OutputTolerance);
    let result = output_tolerance_check(context, settings, &mut report);
    report.finish(result)
}

fn output_tolerance_check(
    context: &CheckContext,
    settings: &RecordSetCheckSettings,
    report: &mut CheckReport,
) -> CheckResult<()> {
    let dt = namelist::require_f64(
        context.run_file(&settings.step_namelist),
        &settings.step_parameter,
    )?;

    let switch_namelist = context.run_file(&settings.switch_namelist);
    let raw_count = namelist::require_param(&switch_namelist, &settings.list_count_parameter)?;
    let list_count = raw_count.trim().parse::<usize>().map_err(|_| {
        CheckError::input_validation(
            "INPUT.NAMELIST_PARAMETER",
            format!(
                "parameter '{}' in '{}' is not a list count: '{raw_count}'",
                settings.list_count_parameter,
                switch_namelist.display()
            ),
        )
    })?;
    require_switch(&switch_namelist, &settings.switch, list_count.max(1))?;

    let schedule = resolve_schedule(context, ToleranceKeys::RecordSet, dt, &mut report.messages)?;
    let evaluation = evaluate_verdict(
        &LogFormat::RecordSet(settings.format.clone()),
        &schedule,
        &context.run_file(&settings.log_file),
        &context.reference_file(&settings.log_file),
        context.verbosity,
    )?;

    report.messages.extend(evaluation.tolerant.diagnostics.iter().cloned());
    report.verdict = evaluation.verdict;
    report.schedule = Some(schedule);
    report.evaluation = Some(evaluation);
    Ok(())
}

/// Bit-exact comparison only: MATCH or FAIL.
pub fn run_identical_check(context: &CheckContext, settings: &StepCheckSettings) -> CheckReport {
    let mut report = CheckReport::new(CheckKind::Identical);
    let result = identical_check(context, settings, &mut report);
    report.finish(result)
}

fn identical_check(
    context: &CheckContext,
    settings: &StepCheckSettings,
    report: &mut CheckReport,
) -> CheckResult<()> {
    let org_namelist = context.run_file(&settings.step_namelist);
    namelist::require_f64(&org_namelist, &settings.step_parameter)?;
    require_switch(
        &context.run_file(&settings.identical_namelist),
        &settings.identical_switch,
        1,
    )?;

    let schedule = ToleranceSchedule::force_exact();
    let evaluation = evaluate_verdict(
        &LogFormat::Step(settings.format.clone()),
        &schedule,
        &context.run_file(&settings.log_file),
        &context.reference_file(&settings.log_file),
        context.verbosity,
    )?;

    report.messages.extend(evaluation.tolerant.diagnostics.iter().cloned());
    report.verdict = if evaluation.exact.passed() {
        Verdict::Match
    } else {
        Verdict::Fail
    };
    report.schedule = Some(schedule);
    report.evaluation = Some(evaluation);
    Ok(())
}

/// MATCH when the run log reports its clean-up phase, CRASH otherwise.
pub fn run_success_check(context: &CheckContext) -> CheckReport {
    let mut report = CheckReport::new(CheckKind::RunSuccess);
    let result = success_check(context, &mut report);
    report.finish(result)
}

fn success_check(context: &CheckContext, report: &mut CheckReport) -> CheckResult<()> {
    let log = context.run_file(&context.log_file);
    if context.verbosity > 2 {
        report
            .messages
            .push(format!("checking presence of CLEAN UP line in {}", log.display()));
    }
    let text = fs::read_to_string(&log).map_err(|error| {
        CheckError::io_system(
            "IO.RUN_LOG",
            format!("failed to open '{}': {error}", log.display()),
        )
    })?;

    report.verdict = if text.lines().any(|line| CLEAN_UP_PATTERN.is_match(line)) {
        Verdict::Match
    } else {
        Verdict::Crash
    };
    Ok(())
}

/// Tolerance schedule from the tolerance file, or from built-in defaults
/// when there is none.
pub fn resolve_schedule(
    context: &CheckContext,
    keys: ToleranceKeys,
    dt: f64,
    messages: &mut Vec<String>,
) -> CheckResult<ToleranceSchedule> {
    let definition = match locate_tolerance_file(&context.namelist_dir, &context.tolerance_file) {
        Some(path) => {
            if context.verbosity > 1 {
                messages.push(format!("Using tolerance values from file {}", path.display()));
            }
            ToleranceDefinition::from_file(&path, keys)?
        }
        None => {
            if context.verbosity > 1 {
                messages.push("Using default tolerance values".to_string());
            }
            ToleranceDefinition::defaults_for(keys)
        }
    };

    if context.force_match {
        messages.push("NOTE: setting thresholds to enforce bit-reproducibility".to_string());
        return Ok(ToleranceSchedule::force_exact());
    }

    let schedule = definition.to_schedule(dt)?;
    if context.verbosity > 1 {
        messages.push(format!("  minimal value : {}", definition.minimum_magnitude));
        messages.push(format!("  tolerance time : {}", join(&definition.times)));
        messages.push(format!(
            "  corresponding time step : {}",
            schedule
                .boundaries()
                .iter()
                .map(i64::to_string)
                .collect::<Vec<_>>()
                .join(",")
        ));
    }
    Ok(schedule)
}

/// Fails when `switch` is explicitly `.false.`; an absent switch is accepted.
fn require_switch(path: &Path, switch: &str, occurrence: usize) -> CheckResult<()> {
    let value = namelist::read_param(path, switch, occurrence)?;
    if value.as_deref().is_some_and(namelist::is_false_literal) {
        return Err(CheckError::input_validation(
            "INPUT.SWITCH_DISABLED",
            format!(
                "{switch} is set to .false. in {} for this simulation",
                path.display()
            ),
        ));
    }
    Ok(())
}

fn join(values: &[f64]) -> String {
    values
        .iter()
        .map(f64::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::{
        CheckContext, CheckKind, RecordSetCheckSettings, StepCheckSettings,
        run_identical_check, run_output_tolerance_check, run_success_check, run_tolerance_check,
    };
    use crate::domain::Verdict;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const YUPRTEST: &str = "\
# YUPRTEST
# test run
#
# var   nt lev       min imin jmin       max imax jmax      mean
T   0   1   2.5   1   1   4.5   2   2   3.25
P   0   1   1.5   1   1   9.5   2   2   7.75
T  60   1   2.5   1   1   4.5   2   2   3.25
";

    const YUCHKDAT: &str = "\
Check GRIB output  step: 0
  T   1   1    2.50000   1   1    4.50000   2   2    3.25000
Check GRIB output  step: 60
  T   1   1    2.50000   1   1    4.50000   2   2    3.25000
";

    struct Fixture {
        _temp: TempDir,
        context: CheckContext,
    }

    fn fixture(run_yuprtest: &str) -> Fixture {
        let temp = TempDir::new().expect("tempdir should be created");
        let run = temp.path().join("run");
        let reference = temp.path().join("reference");
        fs::create_dir_all(&run).expect("run dir should be created");
        fs::create_dir_all(&reference).expect("reference dir should be created");

        write(&run, "INPUT_ORG", " &RUNCTL\n  dt = 20.0, lyuprdbg = .TRUE.,\n /\n");
        write(&run, "INPUT_DIA", " &DIACTL\n  ltestsuite = .TRUE.,\n /\n");
        write(
            &run,
            "INPUT_IO",
            " &IOCTL ngribout = 2, /\n &GRIBOUT lcheck = .FALSE., /\n &GRIBOUT lcheck = .TRUE., /\n",
        );
        write(&run, "YUPRTEST", run_yuprtest);
        write(&reference, "YUPRTEST", YUPRTEST);
        write(&run, "YUCHKDAT", YUCHKDAT);
        write(&reference, "YUCHKDAT", YUCHKDAT);

        let context = CheckContext::new(&run, &reference);
        Fixture {
            _temp: temp,
            context,
        }
    }

    fn write(dir: &Path, name: &str, text: &str) {
        fs::write(dir.join(name), text).expect("fixture file should be written");
    }

    #[test]
    fn tolerance_check_grades_drift() {
        let settings = StepCheckSettings::default();

        let same = fixture(YUPRTEST);
        assert_eq!(run_tolerance_check(&same.context, &settings).verdict, Verdict::Match);

        let drift = fixture(&YUPRTEST.replace("7.75", "7.750000001"));
        let report = run_tolerance_check(&drift.context, &settings);
        assert_eq!(report.verdict, Verdict::Ok);
        assert_eq!(
            report.schedule.as_ref().map(|schedule| schedule.boundaries().to_vec()),
            Some(vec![60, 120, 180])
        );

        let broken = fixture(&YUPRTEST.replace("7.75", "8.75"));
        assert_eq!(run_tolerance_check(&broken.context, &settings).verdict, Verdict::Fail);
    }

    #[test]
    fn force_match_turns_small_drift_into_failure() {
        let mut drift = fixture(&YUPRTEST.replace("7.75", "7.750000001"));
        drift.context.force_match = true;
        let report = run_tolerance_check(&drift.context, &StepCheckSettings::default());
        assert_eq!(report.verdict, Verdict::Fail);
        assert!(
            report
                .messages
                .iter()
                .any(|message| message.contains("bit-reproducibility"))
        );
    }

    #[test]
    fn tolerance_file_missing_minval_fails_before_comparing() {
        let fixture = fixture(YUPRTEST);
        write(
            &fixture.context.namelist_dir,
            "TOLERANCE",
            "tol_times = 1200,2400\ntol_temp = 1e-9,1e-5\ntol_all = 1e-7,1e-4\n",
        );
        let report = run_tolerance_check(&fixture.context, &StepCheckSettings::default());
        assert_eq!(report.verdict, Verdict::Fail);
        assert!(report.evaluation.is_none());
        assert!(
            report
                .error
                .as_deref()
                .is_some_and(|line| line.contains("INPUT.TOLERANCE_KEYS"))
        );
    }

    #[test]
    fn disabled_switch_fails_the_check() {
        let fixture = fixture(YUPRTEST);
        write(
            &fixture.context.run_dir,
            "INPUT_DIA",
            " &DIACTL ltestsuite = .false., /\n",
        );
        let report = run_tolerance_check(&fixture.context, &StepCheckSettings::default());
        assert_eq!(report.verdict, Verdict::Fail);
        assert!(
            report
                .error
                .as_deref()
                .is_some_and(|line| line.contains("ltestsuite is set to .false."))
        );
    }

    #[test]
    fn output_check_reads_switch_of_last_output_list() {
        let fixture = fixture(YUPRTEST);
        let settings = RecordSetCheckSettings::default();
        let report = run_output_tolerance_check(&fixture.context, &settings);
        assert_eq!(report.check, CheckKind::OutputTolerance);
        assert_eq!(report.verdict, Verdict::Match);

        write(
            &fixture.context.run_dir,
            "INPUT_IO",
            " &IOCTL ngribout = 2, /\n &GRIBOUT lcheck = .TRUE., /\n &GRIBOUT lcheck = .FALSE., /\n",
        );
        assert_eq!(
            run_output_tolerance_check(&fixture.context, &settings).verdict,
            Verdict::Fail
        );
    }

    #[test]
    fn identical_check_only_accepts_bit_identical_logs() {
        let settings = StepCheckSettings::default();
        let same = fixture(YUPRTEST);
        assert_eq!(run_identical_check(&same.context, &settings).verdict, Verdict::Match);

        let drift = fixture(&YUPRTEST.replace("7.75", "7.750000001"));
        assert_eq!(run_identical_check(&drift.context, &settings).verdict, Verdict::Fail);
    }

    #[test]
    fn missing_dt_fails_every_comparison_check() {
        let fixture = fixture(YUPRTEST);
        write(&fixture.context.run_dir, "INPUT_ORG", " &RUNCTL nstop = 10, /\n");
        let report = run_identical_check(&fixture.context, &StepCheckSettings::default());
        assert_eq!(report.verdict, Verdict::Fail);
        assert!(
            report
                .error
                .as_deref()
                .is_some_and(|line| line.contains("'dt'"))
        );
    }

    #[test]
    fn run_success_looks_for_clean_up_line() {
        let fixture = fixture(YUPRTEST);
        assert_eq!(run_success_check(&fixture.context).verdict, Verdict::Crash);

        write(
            &fixture.context.run_dir,
            "exe.log",
            " STEP 10\n  CLEAN UP\n",
        );
        assert_eq!(run_success_check(&fixture.context).verdict, Verdict::Match);

        write(&fixture.context.run_dir, "exe.log", " STEP 10\n  CLEANUP\n");
        assert_eq!(run_success_check(&fixture.context).verdict, Verdict::Crash);
    }
}
