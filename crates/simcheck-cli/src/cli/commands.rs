use super::CliError;
use super::helpers::*;
use simcheck_core::checks::{
    CheckContext, CheckKind, CheckReport, RecordSetCheckSettings, StepCheckSettings,
    pretty_status_str, run_identical_check, run_output_tolerance_check, run_success_check,
    run_tolerance_check, write_status_file,
};
use simcheck_core::comparator::{LogFormat, evaluate_verdict};
use simcheck_core::domain::CheckError;
use simcheck_core::namelist;
use simcheck_core::numerics::MinimumMagnitude;
use simcheck_core::profiling::timings::{RunTimings, compare_timings, read_yutiming};
use simcheck_core::tolerance::{
    DEFAULT_MINIMUM_MAGNITUDE, ToleranceDefinition, ToleranceKeys, ToleranceSchedule,
};
use std::path::PathBuf;
use tracing::debug;

#[derive(Clone, Copy, clap::ValueEnum)]
pub(super) enum FormatArg {
    /// Step-indexed statistics log (YUPRTEST)
    Step,
    /// Record sets headed by `Check ... step: N` lines (YUCHKDAT)
    RecordSet,
}

impl FormatArg {
    fn log_format(self) -> LogFormat {
        match self {
            Self::Step => LogFormat::step(),
            Self::RecordSet => LogFormat::record_set(),
        }
    }

    fn tolerance_keys(self) -> ToleranceKeys {
        match self {
            Self::Step => ToleranceKeys::StepIndexed,
            Self::RecordSet => ToleranceKeys::RecordSet,
        }
    }
}

#[derive(clap::Args)]
pub(super) struct CompareArgs {
    /// Log of the run under test
    left: PathBuf,

    /// Reference log
    right: PathBuf,

    /// Layout of both logs
    #[arg(long, value_enum, default_value = "step")]
    format: FormatArg,

    /// Namelist-style tolerance file with times in seconds
    #[arg(long, requires = "dt", conflicts_with = "boundaries")]
    tolerance_file: Option<PathBuf>,

    /// Time step in seconds, converts tolerance times to step boundaries
    #[arg(long)]
    dt: Option<f64>,

    /// Step boundaries, comma separated
    #[arg(long, value_delimiter = ',', requires = "thresholds")]
    boundaries: Vec<i64>,

    /// Thresholds of general fields, one per boundary
    #[arg(long, value_delimiter = ',')]
    thresholds: Vec<f64>,

    /// Thresholds of temperature fields; defaults to --thresholds
    #[arg(long, value_delimiter = ',')]
    temperature_thresholds: Vec<f64>,

    /// Magnitude floor of relative deviations; -1 selects absolute deviations
    #[arg(long, default_value_t = DEFAULT_MINIMUM_MAGNITUDE, allow_hyphen_values = true)]
    minval: f64,

    /// Replace all thresholds by a bit-exact schedule
    #[arg(long)]
    force_match: bool,

    /// Diagnostic detail: -1 silent, 0 summary table, 1 worst lines, 2 every line
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    verbosity: i32,

    /// Write both comparison outcomes as JSON
    #[arg(long)]
    report: Option<PathBuf>,

    /// Print the status with ANSI colors
    #[arg(long)]
    color: bool,
}

impl CompareArgs {
    fn schedule(&self) -> Result<ToleranceSchedule, CliError> {
        if self.force_match {
            return Ok(ToleranceSchedule::force_exact());
        }

        let keys = self.format.tolerance_keys();
        if !self.boundaries.is_empty() {
            let temperature = if self.temperature_thresholds.is_empty() {
                self.thresholds.clone()
            } else {
                self.temperature_thresholds.clone()
            };
            return ToleranceSchedule::new(
                self.boundaries.clone(),
                temperature,
                self.thresholds.clone(),
                MinimumMagnitude::from_raw(self.minval),
            )
            .map_err(compute_error);
        }

        let Some(dt) = self.dt else {
            return Err(CliError::Usage(
                "either --boundaries or --dt is required to build a tolerance schedule"
                    .to_string(),
            ));
        };
        let definition = match &self.tolerance_file {
            Some(path) => ToleranceDefinition::from_file(path, keys).map_err(compute_error)?,
            None => ToleranceDefinition::defaults_for(keys),
        };
        definition.to_schedule(dt).map_err(compute_error)
    }
}

pub(super) fn run_compare_command(args: CompareArgs) -> Result<i32, CliError> {
    let schedule = args.schedule()?;
    debug!(boundaries = ?schedule.boundaries(), "tolerance schedule resolved");

    let evaluation = evaluate_verdict(
        &args.format.log_format(),
        &schedule,
        &args.left,
        &args.right,
        args.verbosity,
    )
    .map_err(compute_error)?;

    for line in &evaluation.tolerant.diagnostics {
        println!("{line}");
    }
    println!(
        "Errors: {} exact, {} above tolerance",
        evaluation.exact.error_count, evaluation.tolerant.error_count
    );
    println!(
        "Result: {}",
        pretty_status_str(evaluation.verdict.code(), args.color, true)
    );

    if let Some(path) = &args.report {
        write_json_report(path, &evaluation)?;
    }
    Ok(evaluation.verdict.code())
}

#[derive(Clone, Copy, clap::ValueEnum)]
pub(super) enum CheckKindArg {
    /// Step-indexed log, MATCH / OK / FAIL
    Tolerance,
    /// Record-set output log, MATCH / OK / FAIL
    OutputTolerance,
    /// Step-indexed log, MATCH / FAIL
    Identical,
    /// Run log reached its clean-up phase, MATCH / CRASH
    RunSuccess,
}

impl From<CheckKindArg> for CheckKind {
    fn from(kind: CheckKindArg) -> Self {
        match kind {
            CheckKindArg::Tolerance => Self::Tolerance,
            CheckKindArg::OutputTolerance => Self::OutputTolerance,
            CheckKindArg::Identical => Self::Identical,
            CheckKindArg::RunSuccess => Self::RunSuccess,
        }
    }
}

#[derive(clap::Args)]
pub(super) struct CheckArgs {
    /// Check to run
    #[arg(value_enum)]
    kind: CheckKindArg,

    /// Directory of the finished run
    #[arg(long, default_value = ".")]
    run_dir: PathBuf,

    /// Directory holding the reference logs
    #[arg(long)]
    reference_dir: Option<PathBuf>,

    /// Directory holding the test namelists and tolerance file; defaults to --run-dir
    #[arg(long)]
    namelist_dir: Option<PathBuf>,

    /// Standard output of the simulation, relative to --run-dir
    #[arg(long, default_value = "exe.log")]
    log_file: String,

    /// Tolerance file name, looked up in the namelist directory and its parent
    #[arg(long, default_value = "TOLERANCE")]
    tolerance_file: String,

    /// Replace all thresholds by a bit-exact schedule
    #[arg(long)]
    force_match: bool,

    /// Diagnostic detail: -1 silent, 0 summary, 1 worst lines, 2 every line, 3 progress
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    verbosity: i32,

    /// File receiving the resulting status string
    #[arg(long)]
    status_file: Option<PathBuf>,

    /// Write the check report as JSON
    #[arg(long)]
    report: Option<PathBuf>,

    /// Print the status with ANSI colors
    #[arg(long)]
    color: bool,
}

impl CheckArgs {
    fn context(&self) -> Result<CheckContext, CliError> {
        let kind = CheckKind::from(self.kind);
        let reference_dir = match (&self.reference_dir, kind) {
            (Some(dir), _) => dir.clone(),
            (None, CheckKind::RunSuccess) => self.run_dir.clone(),
            (None, _) => {
                return Err(CliError::Usage(format!(
                    "--reference-dir is required for the {} check",
                    kind.as_str()
                )));
            }
        };

        let mut context = CheckContext::new(&self.run_dir, reference_dir);
        if let Some(dir) = &self.namelist_dir {
            context.namelist_dir = dir.clone();
        }
        context.log_file = self.log_file.clone();
        context.tolerance_file = self.tolerance_file.clone();
        context.verbosity = self.verbosity;
        context.force_match = self.force_match;
        Ok(context)
    }
}

pub(super) fn run_check_command(args: CheckArgs) -> Result<i32, CliError> {
    let context = args.context()?;
    let report = match CheckKind::from(args.kind) {
        CheckKind::Tolerance => run_tolerance_check(&context, &StepCheckSettings::default()),
        CheckKind::OutputTolerance => {
            run_output_tolerance_check(&context, &RecordSetCheckSettings::default())
        }
        CheckKind::Identical => run_identical_check(&context, &StepCheckSettings::default()),
        CheckKind::RunSuccess => run_success_check(&context),
    };

    print_check_report(&report, args.color);
    if let Some(path) = &args.status_file {
        write_status_file(path, report.verdict)?;
    }
    if let Some(path) = &args.report {
        write_json_report(path, &report)?;
    }
    Ok(report.verdict.code())
}

fn print_check_report(report: &CheckReport, color: bool) {
    for message in &report.messages {
        println!("{message}");
    }
    if let Some(error) = &report.error {
        eprintln!("{error}");
    }
    println!(
        "{}: {}",
        report.check.as_str(),
        pretty_status_str(report.verdict.code(), color, true)
    );
}

#[derive(clap::Subcommand)]
pub(super) enum TimingsCommand {
    /// Print the header values and timer tree of a YUTIMING file
    Yutiming {
        path: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print wall clock and benchmark timings of one run
    Run {
        #[arg(default_value = ".")]
        run_dir: PathBuf,

        #[command(flatten)]
        logs: TimingLogArgs,
    },
    /// Difference of selected timers between two runs
    Compare {
        baseline_dir: PathBuf,
        candidate_dir: PathBuf,

        /// Timers to compare, e.g. `total` or `timeloop mean`
        #[arg(long, value_delimiter = ',', default_value = "total")]
        keys: Vec<String>,

        #[command(flatten)]
        logs: TimingLogArgs,
    },
}

#[derive(clap::Args)]
pub(super) struct TimingLogArgs {
    /// Run log holding the benchmark table
    #[arg(long, default_value = "exe.log")]
    run_log: String,

    /// Batch log holding `Start`/`End` markers
    #[arg(long)]
    batch_log: Option<String>,
}

impl TimingLogArgs {
    fn load(&self, run_dir: &std::path::Path) -> Result<RunTimings, CliError> {
        RunTimings::load(run_dir, Some(&self.run_log), self.batch_log.as_deref())
            .map_err(compute_error)
    }
}

pub(super) fn run_timings_command(command: TimingsCommand) -> Result<i32, CliError> {
    match command {
        TimingsCommand::Yutiming { path, json } => {
            let report = read_yutiming(&path).map_err(compute_error)?;
            if json {
                let value = serde_json::json!({
                    "header": report.header,
                    "body": report.body.to_json(),
                });
                println!("{}", to_pretty_json(&value)?);
            } else {
                for (key, value) in &report.header {
                    println!("{key}: {value}");
                }
                print!("{}", render_profile_tree(&report.body));
            }
        }
        TimingsCommand::Run { run_dir, logs } => {
            println!("{}", logs.load(&run_dir)?);
        }
        TimingsCommand::Compare {
            baseline_dir,
            candidate_dir,
            keys,
            logs,
        } => {
            let baseline = logs.load(&baseline_dir)?;
            let candidate = logs.load(&candidate_dir)?;
            let keys = keys.iter().map(String::as_str).collect::<Vec<_>>();
            for delta in compare_timings(&baseline, &candidate, &keys) {
                let percent = delta
                    .percent
                    .map_or_else(|| "n/a".to_string(), |percent| format!("{percent:+.1}%"));
                println!(
                    "{}: {} -> {} ({:+}s, {percent})",
                    delta.key, delta.baseline, delta.candidate, delta.difference
                );
            }
        }
    }
    Ok(0)
}

#[derive(clap::Subcommand)]
pub(super) enum NamelistCommand {
    /// Print the value of a parameter
    Get {
        path: PathBuf,
        name: String,

        /// Which assignment to read, counting from 1
        #[arg(long, default_value_t = 1)]
        occurrence: usize,
    },
    /// Replace an assignment in place
    Set {
        path: PathBuf,
        name: String,

        /// New assignment, e.g. `dt = 30.0`
        replacement: String,

        /// Which assignment to replace, counting from 1
        #[arg(long, default_value_t = 1)]
        occurrence: usize,
    },
}

pub(super) fn run_namelist_command(command: NamelistCommand) -> Result<i32, CliError> {
    match command {
        NamelistCommand::Get {
            path,
            name,
            occurrence,
        } => {
            let value = namelist::read_param(&path, &name, occurrence).map_err(compute_error)?;
            match value {
                Some(value) => {
                    println!("{value}");
                    Ok(0)
                }
                None => Err(CliError::Compute(CheckError::input_validation(
                    "INPUT.NAMELIST_PARAMETER",
                    format!(
                        "parameter '{name}' (occurrence {occurrence}) not found in '{}'",
                        path.display()
                    ),
                ))),
            }
        }
        NamelistCommand::Set {
            path,
            name,
            replacement,
            occurrence,
        } => {
            namelist::replace_param(&path, &name, &replacement, occurrence)
                .map_err(compute_error)?;
            Ok(0)
        }
    }
}
