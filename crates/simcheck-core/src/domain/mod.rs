pub mod errors;

pub use errors::{CheckError, CheckErrorCategory, CheckResult, HarnessMapping};

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Ordered outcome scale shared with the calling test harness.
///
/// The discriminants are the harness status codes; ordering follows severity
/// so that combining several checks is a plain maximum.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Deserialize, Serialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    #[default]
    Match = 0,
    Ok = 10,
    Skip = 15,
    Fail = 20,
    Crash = 30,
}

impl Verdict {
    pub const ALL: [Verdict; 5] = [
        Verdict::Match,
        Verdict::Ok,
        Verdict::Skip,
        Verdict::Fail,
        Verdict::Crash,
    ];

    pub const fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|verdict| verdict.code() == code)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Match => "MATCH",
            Self::Ok => "OK",
            Self::Skip => "SKIP",
            Self::Fail => "FAIL",
            Self::Crash => "CRASH",
        }
    }

    pub const fn is_success(self) -> bool {
        matches!(self, Self::Match | Self::Ok)
    }

    /// Most severe verdict of `verdicts`; `Match` when there is nothing to combine.
    pub fn worst<I>(verdicts: I) -> Self
    where
        I: IntoIterator<Item = Verdict>,
    {
        verdicts.into_iter().max().unwrap_or_default()
    }
}

impl Display for Verdict {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

/// Status string for a raw harness code, `UNKNOWN` outside the scale.
pub fn status_str(code: i32) -> &'static str {
    Verdict::from_code(code).map_or("UNKNOWN", Verdict::as_str)
}

/// Threshold class a compared field belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldClass {
    Temperature,
    General,
}

impl FieldClass {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::General => "all",
        }
    }
}

impl Display for FieldClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::{Verdict, status_str};

    #[test]
    fn verdict_codes_follow_harness_scale() {
        let codes: Vec<i32> = Verdict::ALL.iter().map(|verdict| verdict.code()).collect();
        assert_eq!(codes, vec![0, 10, 15, 20, 30]);
        assert_eq!(Verdict::from_code(15), Some(Verdict::Skip));
        assert_eq!(Verdict::from_code(11), None);
    }

    #[test]
    fn worst_verdict_is_maximum_severity() {
        assert_eq!(Verdict::worst([Verdict::Ok, Verdict::Match]), Verdict::Ok);
        assert_eq!(
            Verdict::worst([Verdict::Skip, Verdict::Fail, Verdict::Ok]),
            Verdict::Fail
        );
        assert_eq!(
            Verdict::worst([Verdict::Crash, Verdict::Fail]),
            Verdict::Crash
        );
        assert_eq!(Verdict::worst([]), Verdict::Match);
    }

    #[test]
    fn status_strings_cover_unknown_codes() {
        assert_eq!(status_str(0), "MATCH");
        assert_eq!(status_str(30), "CRASH");
        assert_eq!(status_str(42), "UNKNOWN");
    }
}
