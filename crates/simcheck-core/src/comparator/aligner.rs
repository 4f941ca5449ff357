//! Alignment strategies pairing the lines of two logs.
//!
//! Both strategies hand the comparison loop a flat list of line pairs tagged
//! with the group (step or record set) they belong to; threshold lookup and
//! field classification stay in the loop.

use super::record::{Record, records};
use super::{ComparatorError, ComparisonMode};
use crate::domain::FieldClass;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// A log file's name and content.
#[derive(Debug, Clone, Copy)]
pub struct LogSource<'a> {
    pub path: &'a Path,
    pub text: &'a str,
}

impl<'a> LogSource<'a> {
    pub fn new(path: &'a Path, text: &'a str) -> Self {
        Self { path, text }
    }

    pub fn line_count(&self) -> usize {
        self.text.lines().count()
    }
}

/// Step or record set a pair of lines is compared under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GroupKey {
    pub index: usize,
    /// Step used for threshold lookup.
    pub step: i64,
    /// 1-based record set number; `None` for step-indexed logs and for lines
    /// preceding the first set header.
    pub record_set: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlignedPair<'a> {
    pub left: Record<'a>,
    pub right: Record<'a>,
    pub group: GroupKey,
}

#[derive(Debug, Default)]
pub struct Alignment<'a> {
    pub pairs: Vec<AlignedPair<'a>>,
    /// Format warnings met while aligning.
    pub notes: Vec<String>,
}

pub trait StreamAligner {
    fn mode(&self) -> ComparisonMode;

    /// Files with this many lines or fewer hold nothing beyond a header.
    fn header_lines(&self) -> usize;

    fn align<'a>(
        &self,
        left: LogSource<'a>,
        right: LogSource<'a>,
    ) -> Result<Alignment<'a>, ComparatorError>;

    fn field_class(&self, record: &Record<'_>) -> FieldClass;

    /// Token positions subject to numeric comparison.
    fn field_positions(&self, record: &Record<'_>) -> Vec<usize>;
}

/// Step-indexed table: `var step lev min imin jmin max imax jmax mean`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StepFormat {
    pub comment_marker: String,
    pub arity: usize,
    pub header_lines: usize,
    pub temperature_fields: Vec<String>,
}

impl Default for StepFormat {
    fn default() -> Self {
        Self {
            comment_marker: "#".to_string(),
            arity: 10,
            header_lines: 4,
            temperature_fields: vec!["T".to_string()],
        }
    }
}

impl StepFormat {
    /// Returns the record with its step when the line is a data line.
    fn data_record<'a>(&self, record: Record<'a>) -> Option<Record<'a>> {
        if record.is_blank()
            || record.name().starts_with(self.comment_marker.as_str())
            || record.arity() != self.arity
        {
            return None;
        }
        let step = record.token(1)?.parse::<i64>().ok()?;
        let numeric = (2..record.arity()).all(|index| record.field(index).is_some());
        numeric.then(|| record.with_step(step))
    }

    fn data_records<'a>(&self, source: LogSource<'a>) -> Result<Vec<Record<'a>>, ComparatorError> {
        let data: Vec<Record<'a>> = records(source.text)
            .filter_map(|record| self.data_record(record))
            .collect();
        if data.is_empty() {
            return Err(ComparatorError::NoValidLines {
                path: source.path.to_path_buf(),
            });
        }
        Ok(data)
    }
}

impl StreamAligner for StepFormat {
    fn mode(&self) -> ComparisonMode {
        ComparisonMode::Step
    }

    fn header_lines(&self) -> usize {
        self.header_lines
    }

    fn align<'a>(
        &self,
        left: LogSource<'a>,
        right: LogSource<'a>,
    ) -> Result<Alignment<'a>, ComparatorError> {
        let left_records = self.data_records(left)?;
        let right_records = self.data_records(right)?;

        let (mut left_start, mut right_start) = (0usize, 0usize);
        loop {
            let (Some(left_record), Some(right_record)) =
                (left_records.get(left_start), right_records.get(right_start))
            else {
                return Err(ComparatorError::NoOverlappingSteps {
                    left: left.path.to_path_buf(),
                    right: right.path.to_path_buf(),
                });
            };
            match left_record.step.cmp(&right_record.step) {
                std::cmp::Ordering::Less => left_start += 1,
                std::cmp::Ordering::Greater => right_start += 1,
                std::cmp::Ordering::Equal => break,
            }
        }
        debug!(
            left_skipped = left_start,
            right_skipped = right_start,
            first_step = left_records[left_start].step,
            "aligned step-indexed logs"
        );

        let mut pairs = Vec::with_capacity(
            (left_records.len() - left_start).min(right_records.len() - right_start),
        );
        let mut group: Option<GroupKey> = None;
        for (left_record, right_record) in left_records
            .into_iter()
            .skip(left_start)
            .zip(right_records.into_iter().skip(right_start))
        {
            let step = left_record.step.unwrap_or_default();
            let key = match group {
                Some(current) if current.step == step => current,
                Some(current) => GroupKey {
                    index: current.index + 1,
                    step,
                    record_set: None,
                },
                None => GroupKey {
                    index: 0,
                    step,
                    record_set: None,
                },
            };
            group = Some(key);
            pairs.push(AlignedPair {
                left: left_record,
                right: right_record,
                group: key,
            });
        }

        Ok(Alignment {
            pairs,
            notes: Vec::new(),
        })
    }

    fn field_class(&self, record: &Record<'_>) -> FieldClass {
        if self
            .temperature_fields
            .iter()
            .any(|name| name == record.name())
        {
            FieldClass::Temperature
        } else {
            FieldClass::General
        }
    }

    fn field_positions(&self, record: &Record<'_>) -> Vec<usize> {
        (2..record.arity()).collect()
    }
}

/// Record-set table: sets open on a line whose first token contains the set
/// keyword, optionally ending in `<step keyword> <step>`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RecordSetFormat {
    pub arity: usize,
    pub real_positions: Vec<usize>,
    pub set_keyword: String,
    pub step_keyword: String,
}

impl Default for RecordSetFormat {
    fn default() -> Self {
        Self {
            arity: 10,
            real_positions: vec![3, 6, 9],
            set_keyword: "Check".to_string(),
            step_keyword: "step:".to_string(),
        }
    }
}

impl RecordSetFormat {
    fn is_set_header(&self, record: &Record<'_>) -> bool {
        !record.is_blank() && record.name().contains(self.set_keyword.as_str())
    }

    /// Step encoded in a set header; step 0 when the header carries none or
    /// the trailing token is not an integer.
    fn header_step(&self, record: &Record<'_>, path: &Path, notes: &mut Vec<String>) -> i64 {
        let arity = record.arity();
        if arity < 2 || !record.tokens[arity - 2].contains(self.step_keyword.as_str()) {
            return 0;
        }
        match record.tokens[arity - 1].parse::<i64>() {
            Ok(step) => step,
            Err(_) => {
                warn!(
                    path = %path.display(),
                    line = record.line_number,
                    token = record.tokens[arity - 1],
                    "set header step is not an integer; using step 0"
                );
                notes.push(format!(
                    "!! Warning: set header format not recognized at line {} in file {}, using step 0",
                    record.line_number,
                    path.display()
                ));
                0
            }
        }
    }

    fn is_data_line(&self, record: &Record<'_>) -> bool {
        record.arity() == self.arity
            && self.real_positions.iter().all(|&index| {
                record
                    .token(index)
                    .is_some_and(|token| token.contains('.') && record.field(index).is_some())
            })
    }
}

impl StreamAligner for RecordSetFormat {
    fn mode(&self) -> ComparisonMode {
        ComparisonMode::RecordSet
    }

    fn header_lines(&self) -> usize {
        0
    }

    fn align<'a>(
        &self,
        left: LogSource<'a>,
        right: LogSource<'a>,
    ) -> Result<Alignment<'a>, ComparatorError> {
        let mut alignment = Alignment::default();
        let mut group = GroupKey {
            index: 0,
            step: 0,
            record_set: None,
        };

        for (left_record, right_record) in records(left.text).zip(records(right.text)) {
            if self.is_set_header(&left_record) {
                let step = self.header_step(&left_record, left.path, &mut alignment.notes);
                let set = group.record_set.map_or(1, |set| set + 1);
                group = GroupKey {
                    index: group.index + 1,
                    step,
                    record_set: Some(set),
                };
                debug!(set, step, line = left_record.line_number, "record set opened");
            }

            if self.is_data_line(&left_record) && self.is_data_line(&right_record) {
                alignment.pairs.push(AlignedPair {
                    left: left_record,
                    right: right_record,
                    group,
                });
            }
        }

        if alignment.pairs.is_empty() {
            return Err(ComparatorError::NoValidLines {
                path: left.path.to_path_buf(),
            });
        }
        Ok(alignment)
    }

    fn field_class(&self, _record: &Record<'_>) -> FieldClass {
        FieldClass::General
    }

    fn field_positions(&self, _record: &Record<'_>) -> Vec<usize> {
        self.real_positions.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::{LogSource, RecordSetFormat, StepFormat, StreamAligner};
    use crate::comparator::ComparatorError;
    use crate::domain::FieldClass;
    use std::path::Path;

    const LEFT_STEPS: &str = "\
# header 1
# header 2
# var nt lev min imin jmin max imax jmax mean
T 0 1 2.5 1 1 4.5 2 2 3.25
T 1 1 2.5 1 1 4.5 2 2 3.25
P 1 1 2.5 1 1 4.5 2 2 3.25
T 2 1 2.5 1 1 4.5 2 2 3.25
";

    const RIGHT_STEPS: &str = "\
# header 1
# header 2
# var nt lev min imin jmin max imax jmax mean
T 1 1 2.5 1 1 4.5 2 2 3.25
P 1 1 2.5 1 1 4.5 2 2 3.25
T 2 1 2.5 1 1 4.5 2 2 3.25
T 3 1 2.5 1 1 4.5 2 2 3.25
";

    #[test]
    fn step_alignment_skips_to_first_shared_step() {
        let format = StepFormat::default();
        let alignment = format
            .align(
                LogSource::new(Path::new("left"), LEFT_STEPS),
                LogSource::new(Path::new("right"), RIGHT_STEPS),
            )
            .expect("logs should align");

        assert_eq!(alignment.pairs.len(), 3);
        assert_eq!(alignment.pairs[0].left.line_number, 5);
        assert_eq!(alignment.pairs[0].right.line_number, 4);
        assert_eq!(alignment.pairs[0].group.step, 1);
        assert_eq!(alignment.pairs[1].group.index, 0);
        assert_eq!(alignment.pairs[2].group.index, 1);
        assert_eq!(alignment.pairs[2].group.step, 2);
        assert_eq!(format.field_class(&alignment.pairs[0].left), FieldClass::Temperature);
        assert_eq!(format.field_class(&alignment.pairs[1].left), FieldClass::General);
    }

    #[test]
    fn disjoint_step_ranges_do_not_overlap() {
        let left = "# h\nT 0 1 2.5 1 1 4.5 2 2 3.25\nT 1 1 2.5 1 1 4.5 2 2 3.25\n";
        let right = "# h\nT 5 1 2.5 1 1 4.5 2 2 3.25\nT 6 1 2.5 1 1 4.5 2 2 3.25\n";
        let error = StepFormat::default()
            .align(
                LogSource::new(Path::new("left"), left),
                LogSource::new(Path::new("right"), right),
            )
            .expect_err("step ranges are disjoint");
        assert!(matches!(error, ComparatorError::NoOverlappingSteps { .. }));
    }

    #[test]
    fn record_sets_take_step_from_header() {
        let text = "\
Check GRIB  step: 50
  T   1   1    2.50   1   1    4.50   2   2    3.25
  junk line
Check initial
  P   1   1    2.50   1   1    4.50   2   2    3.25
";
        let alignment = RecordSetFormat::default()
            .align(
                LogSource::new(Path::new("left"), text),
                LogSource::new(Path::new("right"), text),
            )
            .expect("record sets should align");

        assert!(alignment.notes.is_empty());
        assert_eq!(alignment.pairs.len(), 2);
        assert_eq!(alignment.pairs[0].group.step, 50);
        assert_eq!(alignment.pairs[0].group.record_set, Some(1));
        assert_eq!(alignment.pairs[1].group.step, 0);
        assert_eq!(alignment.pairs[1].group.record_set, Some(2));
    }

    #[test]
    fn malformed_set_step_falls_back_to_zero_with_note() {
        let text = "Check output step: ten\n  T 1 1 2.50 1 1 4.50 2 2 3.25\n";
        let alignment = RecordSetFormat::default()
            .align(
                LogSource::new(Path::new("left"), text),
                LogSource::new(Path::new("right"), text),
            )
            .expect("record sets should align");
        assert_eq!(alignment.pairs[0].group.step, 0);
        assert_eq!(alignment.notes.len(), 1);
        assert!(alignment.notes[0].contains("format not recognized"));
    }

    #[test]
    fn record_set_logs_without_data_lines_cannot_be_compared() {
        let text = "Check output\nnothing to see here\n";
        let error = RecordSetFormat::default()
            .align(
                LogSource::new(Path::new("left"), text),
                LogSource::new(Path::new("right"), text),
            )
            .expect_err("no data lines");
        assert!(matches!(error, ComparatorError::NoValidLines { .. }));
    }
}
