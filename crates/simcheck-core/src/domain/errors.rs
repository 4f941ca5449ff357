use super::Verdict;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type CheckResult<T> = Result<T, CheckError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckErrorCategory {
    Success,
    InputValidationError,
    IoSystemError,
    ComputationError,
    InternalError,
}

impl CheckErrorCategory {
    pub const fn harness_mapping(self) -> HarnessMapping {
        match self {
            Self::Success => HarnessMapping {
                verdict: Verdict::Match,
                rust_category: "Success",
                legacy_class: "SUCCESS",
            },
            Self::InputValidationError => HarnessMapping {
                verdict: Verdict::Fail,
                rust_category: "InputValidationError",
                legacy_class: "CONFIG_FATAL",
            },
            Self::IoSystemError => HarnessMapping {
                verdict: Verdict::Fail,
                rust_category: "IoSystemError",
                legacy_class: "IO_FATAL",
            },
            Self::ComputationError => HarnessMapping {
                verdict: Verdict::Fail,
                rust_category: "ComputationError",
                legacy_class: "STRUCTURE_FATAL",
            },
            Self::InternalError => HarnessMapping {
                verdict: Verdict::Crash,
                rust_category: "InternalError",
                legacy_class: "SYS_FATAL",
            },
        }
    }

    pub const fn verdict(self) -> Verdict {
        self.harness_mapping().verdict
    }

    pub const fn exit_code(self) -> i32 {
        self.verdict().code()
    }

    pub const fn rust_category(self) -> &'static str {
        self.harness_mapping().rust_category
    }

    pub const fn legacy_class(self) -> &'static str {
        self.harness_mapping().legacy_class
    }

    pub const fn is_fatal(self) -> bool {
        !matches!(self, Self::Success)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarnessMapping {
    pub verdict: Verdict,
    pub rust_category: &'static str,
    pub legacy_class: &'static str,
}

/// Categorized failure surfaced to the calling harness.
///
/// Component errors (namelist, tolerance, comparator, profiling) convert into
/// this type so every check reports a placeholder code next to the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckError {
    category: CheckErrorCategory,
    placeholder: &'static str,
    message: String,
}

impl CheckError {
    pub fn new(
        category: CheckErrorCategory,
        placeholder: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            placeholder,
            message: message.into(),
        }
    }

    pub fn input_validation(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(
            CheckErrorCategory::InputValidationError,
            placeholder,
            message,
        )
    }

    pub fn io_system(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(CheckErrorCategory::IoSystemError, placeholder, message)
    }

    pub fn computation(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(CheckErrorCategory::ComputationError, placeholder, message)
    }

    pub fn internal(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(CheckErrorCategory::InternalError, placeholder, message)
    }

    pub const fn category(&self) -> CheckErrorCategory {
        self.category
    }

    pub const fn placeholder(&self) -> &'static str {
        self.placeholder
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn verdict(&self) -> Verdict {
        self.category.verdict()
    }

    pub const fn exit_code(&self) -> i32 {
        self.category.exit_code()
    }

    pub fn diagnostic_line(&self) -> String {
        let severity = if self.category.is_fatal() {
            "ERROR"
        } else {
            "INFO"
        };
        format!("{}: [{}] {}", severity, self.placeholder, self.message)
    }

    pub fn fatal_exit_line(&self) -> Option<String> {
        self.category
            .is_fatal()
            .then(|| format!("FATAL EXIT CODE: {} ({})", self.exit_code(), self.verdict()))
    }
}

impl Display for CheckError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.category.rust_category(),
            self.placeholder,
            self.message
        )
    }
}

impl Error for CheckError {}
