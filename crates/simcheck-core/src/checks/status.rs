use crate::domain::{CheckError, Verdict, status_str};
use std::fs;
use std::path::Path;

/// ANSI color code for a status code; unknown codes get a red background.
pub fn status_color(code: i32) -> u8 {
    match Verdict::from_code(code) {
        Some(Verdict::Match | Verdict::Ok) => 32,
        Some(Verdict::Skip) => 37,
        Some(Verdict::Fail | Verdict::Crash) => 31,
        None => 41,
    }
}

pub fn pretty_status_str(code: i32, color: bool, bold: bool) -> String {
    let label = status_str(code);
    if !color {
        return label.to_string();
    }
    format!(
        "\x1b[{};{}m{label}\x1b[0m",
        u8::from(bold),
        status_color(code)
    )
}

/// Writes the status string of `verdict` to `path`, the artifact later tests
/// read to decide whether their dependency succeeded.
pub fn write_status_file(path: impl AsRef<Path>, verdict: Verdict) -> Result<(), CheckError> {
    let path = path.as_ref();
    fs::write(path, verdict.as_str()).map_err(|error| {
        CheckError::io_system(
            "IO.STATUS_WRITE",
            format!("failed to write status file '{}': {error}", path.display()),
        )
    })
}

pub fn read_status_file(path: impl AsRef<Path>) -> Result<Verdict, CheckError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|error| {
        CheckError::io_system(
            "IO.STATUS_READ",
            format!("failed to read status file '{}': {error}", path.display()),
        )
    })?;
    let status = text.trim();
    Verdict::ALL
        .into_iter()
        .find(|verdict| verdict.as_str() == status)
        .ok_or_else(|| {
            CheckError::input_validation(
                "INPUT.STATUS_VALUE",
                format!("status file '{}' holds unknown status '{status}'", path.display()),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::{pretty_status_str, read_status_file, write_status_file};
    use crate::domain::Verdict;
    use tempfile::TempDir;

    #[test]
    fn pretty_status_uses_ansi_colors() {
        assert_eq!(pretty_status_str(0, true, true), "\x1b[1;32mMATCH\x1b[0m");
        assert_eq!(pretty_status_str(15, true, false), "\x1b[0;37mSKIP\x1b[0m");
        assert_eq!(pretty_status_str(30, true, false), "\x1b[0;31mCRASH\x1b[0m");
        assert_eq!(pretty_status_str(7, true, false), "\x1b[0;41mUNKNOWN\x1b[0m");
        assert_eq!(pretty_status_str(20, false, true), "FAIL");
    }

    #[test]
    fn status_file_round_trips_verdict() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("status");
        write_status_file(&path, Verdict::Ok).expect("status should be written");
        assert_eq!(
            std::fs::read_to_string(&path).expect("status should be readable"),
            "OK"
        );
        assert_eq!(
            read_status_file(&path).expect("status should parse"),
            Verdict::Ok
        );

        std::fs::write(&path, "MAYBE").expect("status should be written");
        let error = read_status_file(&path).expect_err("unknown status");
        assert_eq!(error.placeholder(), "INPUT.STATUS_VALUE");
    }
}
