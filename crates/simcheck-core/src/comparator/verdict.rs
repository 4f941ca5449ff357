use super::{Comparator, ComparatorError, ComparisonOutcome, LogFormat};
use crate::domain::Verdict;
use crate::tolerance::ToleranceSchedule;
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// Both comparison runs behind a tolerance verdict.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerdictEvaluation {
    pub verdict: Verdict,
    pub exact: ComparisonOutcome,
    pub tolerant: ComparisonOutcome,
}

/// MATCH when the bit-exact run is clean, OK when only the tolerant run is,
/// FAIL otherwise.
pub fn combine_error_counts(exact_errors: usize, tolerant_errors: usize) -> Verdict {
    if exact_errors == 0 {
        Verdict::Match
    } else if tolerant_errors == 0 {
        Verdict::Ok
    } else {
        Verdict::Fail
    }
}

/// Compares `left` against `right` bit-exactly and under `schedule`.
pub fn evaluate_verdict(
    format: &LogFormat,
    schedule: &ToleranceSchedule,
    left: &Path,
    right: &Path,
    verbosity: i32,
) -> Result<VerdictEvaluation, ComparatorError> {
    let exact = Comparator::exact(format.clone()).compare_files(left, right)?;
    info!(
        errors = exact.error_count,
        "{}",
        if exact.passed() {
            "results are bit identical"
        } else {
            "results are not bit identical"
        }
    );

    let tolerant = Comparator::new(format.clone(), schedule.clone())
        .with_verbosity(verbosity)
        .compare_files(left, right)?;
    let verdict = combine_error_counts(exact.error_count, tolerant.error_count);
    info!(errors = tolerant.error_count, %verdict, "tolerance comparison finished");

    Ok(VerdictEvaluation {
        verdict,
        exact,
        tolerant,
    })
}
