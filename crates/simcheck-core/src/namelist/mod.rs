//! Fortran namelist value access.
//!
//! Only the small subset needed by the checks is understood: assignments of
//! the form `name = value` where the value is a list of quoted strings, a
//! list of numbers, or a dotted logical literal such as `.TRUE.`. Anything
//! after a `!` is a comment.

use crate::domain::CheckError;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

const COMMENT_MARKER: char = '!';

static ASSIGNMENT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        (?P<name>[a-zA-Z]\w*)\x20*=\x20*
        (?P<value>
            (?:(?:\x20?,\x20?)?'[^']*')+
          | (?:(?:\x20?,\x20?)?[-+]?\d+\.?\d*(?:[eEdD][-+]?\d+)?)+
          | \.[a-zA-Z]+\.
        )
        \x20?,?",
    )
    .expect("namelist assignment pattern should compile")
});

#[derive(Debug, thiserror::Error)]
pub enum NamelistError {
    #[error("failed to read namelist '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write namelist '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("replacement '{replacement}' is not of the form 'name = value'")]
    InvalidReplacement { replacement: String },
    #[error("parameter '{name}' not found in {source_name}")]
    ParameterNotFound { name: String, source_name: String },
    #[error(
        "parameter '{name}' occurs {found} time(s) in {source_name}; occurrence {occurrence} cannot be replaced"
    )]
    OccurrenceNotFound {
        name: String,
        occurrence: usize,
        found: usize,
        source_name: String,
    },
    #[error("parameter '{name}' is required but missing in '{}'", path.display())]
    MissingParameter { name: String, path: PathBuf },
    #[error("parameter '{name}' in '{}' has invalid value '{value}'", path.display())]
    InvalidValue {
        name: String,
        value: String,
        path: PathBuf,
    },
}

impl From<NamelistError> for CheckError {
    fn from(error: NamelistError) -> Self {
        let message = error.to_string();
        match error {
            NamelistError::Read { .. } | NamelistError::Write { .. } => {
                CheckError::io_system("IO.NAMELIST", message)
            }
            NamelistError::InvalidReplacement { .. }
            | NamelistError::ParameterNotFound { .. }
            | NamelistError::OccurrenceNotFound { .. }
            | NamelistError::MissingParameter { .. }
            | NamelistError::InvalidValue { .. } => {
                CheckError::input_validation("INPUT.NAMELIST_PARAMETER", message)
            }
        }
    }
}

/// Raw value text of the `occurrence`-th (1-based) assignment to `name`.
///
/// Returns `None` when there is no such assignment, which callers must keep
/// apart from a value that is present but zero.
pub fn get_param(text: &str, name: &str, occurrence: usize) -> Option<String> {
    let mut seen = 0usize;
    for line in text.lines() {
        let code = strip_comment(line);
        for captures in ASSIGNMENT_PATTERN.captures_iter(code) {
            if &captures["name"] != name {
                continue;
            }
            seen += 1;
            if seen == occurrence {
                return Some(captures["value"].to_string());
            }
        }
    }
    None
}

pub fn read_param(
    path: impl AsRef<Path>,
    name: &str,
    occurrence: usize,
) -> Result<Option<String>, NamelistError> {
    let path = path.as_ref();
    let text = read_namelist(path)?;
    Ok(get_param(&text, name, occurrence))
}

/// Like [`read_param`] but a missing parameter is an error.
pub fn require_param(path: impl AsRef<Path>, name: &str) -> Result<String, NamelistError> {
    let path = path.as_ref();
    read_param(path, name, 1)?.ok_or_else(|| NamelistError::MissingParameter {
        name: name.to_string(),
        path: path.to_path_buf(),
    })
}

pub fn require_f64(path: impl AsRef<Path>, name: &str) -> Result<f64, NamelistError> {
    let path = path.as_ref();
    let value = require_param(path, name)?;
    parse_fortran_real(&value).ok_or_else(|| NamelistError::InvalidValue {
        name: name.to_string(),
        value,
        path: path.to_path_buf(),
    })
}

/// `true` for `.false.` in any letter case.
pub fn is_false_literal(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case(".false.")
}

/// Parses a single real written with either `E` or Fortran `D` exponents.
pub fn parse_fortran_real(value: &str) -> Option<f64> {
    let normalized = value.trim().replace(['D', 'd'], "E");
    normalized.parse::<f64>().ok()
}

/// Replaces the `occurrence`-th assignment to `name` with `replacement`.
///
/// The replacement must itself be an assignment (`other = value`); it is
/// written followed by a comma. Trailing comments on the line are kept.
pub fn replace_param_in_text(
    text: &str,
    name: &str,
    replacement: &str,
    occurrence: usize,
    source_name: &str,
) -> Result<String, NamelistError> {
    if !replacement.contains('=') {
        return Err(NamelistError::InvalidReplacement {
            replacement: replacement.to_string(),
        });
    }

    let mut seen = 0usize;
    let mut replaced = false;
    let mut output = String::with_capacity(text.len() + replacement.len());

    for line in text.lines() {
        let comment_start = line.find(COMMENT_MARKER).unwrap_or(line.len());
        let (code, comment) = line.split_at(comment_start);
        let mut new_code = code.to_string();

        let mut target = None;
        for found in ASSIGNMENT_PATTERN.captures_iter(code) {
            if &found["name"] != name {
                continue;
            }
            seen += 1;
            if seen == occurrence {
                if let Some(whole) = found.get(0) {
                    target = Some(whole.range());
                }
            }
        }

        if let Some(range) = target {
            new_code.replace_range(range, &format!("{replacement},"));
            replaced = true;
        }

        output.push_str(&new_code);
        output.push_str(comment);
        output.push('\n');
    }

    if seen == 0 {
        return Err(NamelistError::ParameterNotFound {
            name: name.to_string(),
            source_name: source_name.to_string(),
        });
    }
    if !replaced {
        return Err(NamelistError::OccurrenceNotFound {
            name: name.to_string(),
            occurrence,
            found: seen,
            source_name: source_name.to_string(),
        });
    }

    Ok(output)
}

/// File variant of [`replace_param_in_text`]; the file is left untouched on error.
pub fn replace_param(
    path: impl AsRef<Path>,
    name: &str,
    replacement: &str,
    occurrence: usize,
) -> Result<(), NamelistError> {
    let path = path.as_ref();
    let text = read_namelist(path)?;
    let source_name = format!("'{}'", path.display());
    let updated = replace_param_in_text(&text, name, replacement, occurrence, &source_name)?;
    fs::write(path, updated).map_err(|source| NamelistError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn read_namelist(path: &Path) -> Result<String, NamelistError> {
    fs::read_to_string(path).map_err(|source| NamelistError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn strip_comment(line: &str) -> &str {
    line.find(COMMENT_MARKER).map_or(line, |index| &line[..index])
}

#[cfg(test)]
mod tests {
    use super::{
        NamelistError, get_param, is_false_literal, parse_fortran_real, read_param,
        replace_param, replace_param_in_text, require_f64,
    };
    use std::fs;
    use tempfile::TempDir;

    const INPUT_ORG: &str = "\
 &RUNCTL
  dt = 40.0,  hstart = 0.0, hstop = 1.0,
  ydate_ini='2011010100',
  lphys = .TRUE., luseobs = .false.,  ! lyuprdbg = .TRUE.,
  nprocx = 4, nprocy = 4,
  ncomm_type = 1,  hincmxt = 1.0E+01,
 /
 &GRIBOUT
  ngrib = 0, 6, 12,
  lcheck = .TRUE.,
 /
 &GRIBOUT
  lcheck = .FALSE.,
 /
";

    #[test]
    fn reads_scalar_list_and_logical_values() {
        assert_eq!(get_param(INPUT_ORG, "dt", 1).as_deref(), Some("40.0"));
        assert_eq!(get_param(INPUT_ORG, "nprocy", 1).as_deref(), Some("4"));
        assert_eq!(get_param(INPUT_ORG, "ngrib", 1).as_deref(), Some("0, 6, 12"));
        assert_eq!(get_param(INPUT_ORG, "lphys", 1).as_deref(), Some(".TRUE."));
        assert_eq!(
            get_param(INPUT_ORG, "ydate_ini", 1).as_deref(),
            Some("'2011010100'")
        );
        assert_eq!(
            get_param(INPUT_ORG, "hincmxt", 1).as_deref(),
            Some("1.0E+01")
        );
    }

    #[test]
    fn commented_assignments_are_ignored() {
        assert_eq!(get_param(INPUT_ORG, "lyuprdbg", 1), None);
    }

    #[test]
    fn missing_parameter_is_distinct_from_zero() {
        assert_eq!(get_param(INPUT_ORG, "hstart", 1).as_deref(), Some("0.0"));
        assert_eq!(get_param(INPUT_ORG, "not_there", 1), None);
    }

    #[test]
    fn selects_requested_occurrence() {
        assert_eq!(get_param(INPUT_ORG, "lcheck", 1).as_deref(), Some(".TRUE."));
        assert_eq!(get_param(INPUT_ORG, "lcheck", 2).as_deref(), Some(".FALSE."));
        assert_eq!(get_param(INPUT_ORG, "lcheck", 3), None);
        assert!(is_false_literal(".FALSE."));
        assert!(is_false_literal(".false."));
        assert!(!is_false_literal(".TRUE."));
    }

    #[test]
    fn reads_tolerance_style_lists() {
        let text = "tol_times = 1200, 2400, 4000\ntol_out = 1.0e-7,1.0e-4,1.0e-0\nminval = -1\n";
        assert_eq!(
            get_param(text, "tol_times", 1).as_deref(),
            Some("1200, 2400, 4000")
        );
        assert_eq!(
            get_param(text, "tol_out", 1).as_deref(),
            Some("1.0e-7,1.0e-4,1.0e-0")
        );
        assert_eq!(get_param(text, "minval", 1).as_deref(), Some("-1"));
    }

    #[test]
    fn fortran_reals_accept_d_exponents() {
        assert_eq!(parse_fortran_real("1.5D-03"), Some(1.5e-3));
        assert_eq!(parse_fortran_real(" 40.0 "), Some(40.0));
        assert_eq!(parse_fortran_real(".TRUE."), None);
    }

    #[test]
    fn replace_keeps_trailing_comment() {
        let text = "  dt = 40.0, nstop = 10, ! time step\n  lphys = .TRUE.,\n";
        let updated = replace_param_in_text(text, "nstop", "nstop = 20", 1, "inline")
            .expect("replacement should succeed");
        assert_eq!(
            updated,
            "  dt = 40.0, nstop = 20, ! time step\n  lphys = .TRUE.,\n"
        );
        assert_eq!(get_param(&updated, "nstop", 1).as_deref(), Some("20"));
        assert_eq!(get_param(&updated, "dt", 1).as_deref(), Some("40.0"));
    }

    #[test]
    fn replace_targets_requested_occurrence_only() {
        let updated = replace_param_in_text(INPUT_ORG, "lcheck", "lcheck = .TRUE.", 2, "inline")
            .expect("replacement should succeed");
        assert_eq!(get_param(&updated, "lcheck", 1).as_deref(), Some(".TRUE."));
        assert_eq!(get_param(&updated, "lcheck", 2).as_deref(), Some(".TRUE."));
    }

    #[test]
    fn replace_fails_loudly() {
        let missing = replace_param_in_text(INPUT_ORG, "nstop", "nstop = 1", 1, "inline");
        assert!(matches!(
            missing,
            Err(NamelistError::ParameterNotFound { .. })
        ));

        let out_of_range = replace_param_in_text(INPUT_ORG, "lcheck", "lcheck = .TRUE.", 5, "inline");
        assert!(matches!(
            out_of_range,
            Err(NamelistError::OccurrenceNotFound { found: 2, .. })
        ));

        let malformed = replace_param_in_text(INPUT_ORG, "dt", "dt 20.0", 1, "inline");
        assert!(matches!(
            malformed,
            Err(NamelistError::InvalidReplacement { .. })
        ));
    }

    #[test]
    fn file_helpers_read_and_rewrite_in_place() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("INPUT_ORG");
        fs::write(&path, INPUT_ORG).expect("namelist should be written");

        assert_eq!(require_f64(&path, "dt").expect("dt should parse"), 40.0);
        replace_param(&path, "dt", "dt = 20.0", 1).expect("replacement should succeed");
        assert_eq!(
            read_param(&path, "dt", 1)
                .expect("namelist should be readable")
                .as_deref(),
            Some("20.0")
        );

        let missing = read_param(temp.path().join("INPUT_DIA"), "dt", 1);
        assert!(matches!(missing, Err(NamelistError::Read { .. })));
    }
}
