//! Indentation-structured timing tables.
//!
//! Rows live in an arena and refer to each other by [`RowId`]; a row's parent
//! is assigned once, through [`ProfileTable::link`], which also records the
//! child on the parent.

pub mod timings;

pub use timings::{
    BenchmarkEntry, RunTimings, TimingDelta, YutimingReport, compare_timings, parse_benchmark,
    parse_marker_seconds, read_yutiming, wall_clock_seconds,
};

use crate::domain::CheckError;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ProfilingError {
    #[error("failed to read timing file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid row pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
    #[error("indent unit must not be empty")]
    EmptyIndentUnit,
    #[error(
        "a hierarchical level was skipped at line {line}: found element of depth {depth}, but parent element is of depth {parent_depth}"
    )]
    SkippedLevel {
        line: usize,
        depth: usize,
        parent_depth: isize,
    },
    #[error("parent of row '{name}' is already set")]
    ParentAlreadySet { name: String },
    #[error("linking '{child}' under '{parent}' would create a cycle")]
    CircularRelationship { parent: String, child: String },
}

impl From<ProfilingError> for CheckError {
    fn from(error: ProfilingError) -> Self {
        let message = error.to_string();
        match error {
            ProfilingError::Read { .. } => CheckError::io_system("IO.TIMING_READ", message),
            ProfilingError::InvalidPattern(_) | ProfilingError::EmptyIndentUnit => {
                CheckError::input_validation("INPUT.TIMING_FORMAT", message)
            }
            ProfilingError::SkippedLevel { .. } => {
                CheckError::computation("RUN.TIMING_HIERARCHY", message)
            }
            ProfilingError::ParentAlreadySet { .. }
            | ProfilingError::CircularRelationship { .. } => {
                CheckError::internal("SYS.TIMING_TREE", message)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RowId(usize);

impl RowId {
    pub const fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileRow {
    pub name: String,
    pub values: Vec<(String, f64)>,
    parent: Option<RowId>,
    children: Vec<RowId>,
}

impl ProfileRow {
    pub fn parent(&self) -> Option<RowId> {
        self.parent
    }

    pub fn children(&self) -> &[RowId] {
        &self.children
    }

    /// Column value, matched case-insensitively.
    pub fn value(&self, column: &str) -> Option<f64> {
        self.values
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| *value)
    }
}

/// Forest of rows parsed from one table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfileTable {
    rows: Vec<ProfileRow>,
}

impl ProfileTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, values: Vec<(String, f64)>) -> RowId {
        let id = RowId(self.rows.len());
        self.rows.push(ProfileRow {
            name: name.into(),
            values,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// Makes `child` a child of `parent`.
    pub fn link(&mut self, parent: RowId, child: RowId) -> Result<(), ProfilingError> {
        if self.rows[child.0].parent.is_some() {
            return Err(ProfilingError::ParentAlreadySet {
                name: self.rows[child.0].name.clone(),
            });
        }
        if parent == child || self.ancestors(parent).contains(&child) {
            return Err(ProfilingError::CircularRelationship {
                parent: self.rows[parent.0].name.clone(),
                child: self.rows[child.0].name.clone(),
            });
        }

        self.rows[child.0].parent = Some(parent);
        self.rows[parent.0].children.push(child);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, id: RowId) -> &ProfileRow {
        &self.rows[id.0]
    }

    pub fn rows(&self) -> impl Iterator<Item = (RowId, &ProfileRow)> {
        self.rows
            .iter()
            .enumerate()
            .map(|(index, row)| (RowId(index), row))
    }

    pub fn roots(&self) -> impl Iterator<Item = RowId> + '_ {
        self.rows()
            .filter(|(_, row)| row.parent.is_none())
            .map(|(id, _)| id)
    }

    pub fn root_names(&self) -> Vec<&str> {
        self.roots().map(|id| self.rows[id.0].name.as_str()).collect()
    }

    pub fn find_root(&self, name: &str) -> Option<RowId> {
        self.roots().find(|id| self.rows[id.0].name == name)
    }

    pub fn child_by_name(&self, parent: RowId, name: &str) -> Option<RowId> {
        self.rows[parent.0]
            .children
            .iter()
            .copied()
            .find(|child| self.rows[child.0].name == name)
    }

    /// Row reached by following `path` from a root, e.g. `["total", "dyn"]`.
    pub fn lookup(&self, path: &[&str]) -> Option<RowId> {
        let (first, rest) = path.split_first()?;
        rest.iter()
            .try_fold(self.find_root(first)?, |row, name| {
                self.child_by_name(row, name)
            })
    }

    /// Depth of the deepest descendant below `id`; 0 for a leaf.
    pub fn child_depth(&self, id: RowId) -> usize {
        self.rows[id.0]
            .children
            .iter()
            .map(|child| self.child_depth(*child) + 1)
            .max()
            .unwrap_or(0)
    }

    /// Ancestors of `id`, outermost first.
    pub fn ancestors(&self, id: RowId) -> Vec<RowId> {
        let mut chain = Vec::new();
        let mut current = self.rows[id.0].parent;
        while let Some(parent) = current {
            chain.push(parent);
            current = self.rows[parent.0].parent;
        }
        chain.reverse();
        chain
    }

    /// Nested object keyed by root names; each row holds its values and its
    /// children keyed by name.
    pub fn to_json(&self) -> Value {
        let roots = self
            .roots()
            .map(|id| (self.rows[id.0].name.clone(), self.row_json(id)))
            .collect::<Map<String, Value>>();
        Value::Object(roots)
    }

    fn row_json(&self, id: RowId) -> Value {
        let row = &self.rows[id.0];
        let mut object = row
            .values
            .iter()
            .map(|(column, value)| (column.clone(), Value::from(*value)))
            .collect::<Map<String, Value>>();
        for child in &row.children {
            object.insert(self.rows[child.0].name.clone(), self.row_json(*child));
        }
        Value::Object(object)
    }
}

/// Parses `<name> <number> <number> ...` rows whose nesting is given by
/// indentation in multiples of a fixed unit.
#[derive(Debug, Clone)]
pub struct HierarchicalTableParser {
    columns: Vec<String>,
    indent_width: usize,
    row_pattern: Regex,
}

impl HierarchicalTableParser {
    pub fn new(columns: Vec<String>, indent_unit: &str) -> Result<Self, ProfilingError> {
        if indent_unit.is_empty() {
            return Err(ProfilingError::EmptyIndentUnit);
        }
        let pattern = format!(r"^(\s*.*?){}", r"(\d+\.\d*)\s*".repeat(columns.len()));
        Ok(Self {
            row_pattern: Regex::new(&pattern)?,
            indent_width: indent_unit.len(),
            columns,
        })
    }

    /// Body layout of a YUTIMING file.
    pub fn yutiming() -> Result<Self, ProfilingError> {
        Self::new(
            ["min", "avg", "max", "total"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            "  ",
        )
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn parse_file(&self, path: impl AsRef<Path>) -> Result<ProfileTable, ProfilingError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ProfilingError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        self.parse_str(&text)
    }

    pub fn parse_str(&self, text: &str) -> Result<ProfileTable, ProfilingError> {
        self.parse_lines(text.lines())
    }

    pub fn parse_lines<'a, I>(&self, lines: I) -> Result<ProfileTable, ProfilingError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut table = ProfileTable::new();
        let mut path: Vec<RowId> = Vec::new();

        for (index, line) in lines.into_iter().enumerate() {
            let Some(captures) = self.row_pattern.captures(line) else {
                continue;
            };
            let raw_name = captures.get(1).map_or("", |name| name.as_str());
            let name = raw_name.split_whitespace().collect::<Vec<_>>().join(" ");
            let mut values = Vec::with_capacity(self.columns.len());
            for (column, capture) in self.columns.iter().zip(captures.iter().skip(2)) {
                let Some(value) = capture.and_then(|text| text.as_str().parse::<f64>().ok())
                else {
                    continue;
                };
                values.push((column.clone(), value));
            }

            let indent = raw_name.len() - raw_name.trim_start().len();
            let depth = indent / self.indent_width;
            if depth > path.len() {
                return Err(ProfilingError::SkippedLevel {
                    line: index + 1,
                    depth,
                    parent_depth: path.len() as isize - 1,
                });
            }

            let id = table.push(name, values);
            path.truncate(depth);
            if let Some(parent) = path.last() {
                table.link(*parent, id)?;
            }
            path.push(id);
        }

        debug!(rows = table.len(), "parsed hierarchical table");
        Ok(table)
    }
}

/// `key: value` pairs from the 1-based inclusive line range `first..=last`.
pub fn parse_header_values(lines: &[&str], first: usize, last: usize) -> BTreeMap<String, f64> {
    static HEADER_PATTERN: std::sync::LazyLock<Regex> = std::sync::LazyLock::new(|| {
        Regex::new(r"^(\s*.*?)(\d+\.\d*)\s*").expect("header pattern should compile")
    });

    lines
        .iter()
        .skip(first.saturating_sub(1))
        .take((last + 1).saturating_sub(first.max(1)))
        .filter_map(|line| {
            let captures = HEADER_PATTERN.captures(line)?;
            let key = captures[1].trim().trim_end_matches(':').to_string();
            let value = captures[2].parse::<f64>().ok()?;
            Some((key, value))
        })
        .collect()
}
