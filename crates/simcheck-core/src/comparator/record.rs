use crate::numerics::{is_integral_field, parse_number};

/// One tokenized line of a diagnostic log.
#[derive(Debug, Clone, PartialEq)]
pub struct Record<'a> {
    /// 1-based line number in the source file.
    pub line_number: usize,
    pub raw: &'a str,
    pub tokens: Vec<&'a str>,
    /// Simulation step carried by the line, when the format has one.
    pub step: Option<i64>,
}

impl<'a> Record<'a> {
    pub fn new(line_number: usize, raw: &'a str) -> Self {
        Self {
            line_number,
            raw,
            tokens: raw.split_whitespace().collect(),
            step: None,
        }
    }

    pub fn with_step(mut self, step: i64) -> Self {
        self.step = Some(step);
        self
    }

    /// Variable name in the first column.
    pub fn name(&self) -> &'a str {
        self.tokens.first().copied().unwrap_or_default()
    }

    pub fn token(&self, index: usize) -> Option<&'a str> {
        self.tokens.get(index).copied()
    }

    pub fn arity(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_blank(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Numeric value at `index` together with whether it counts as integral.
    pub fn field(&self, index: usize) -> Option<Field> {
        let token = self.token(index)?;
        let value = parse_number(token)?;
        Some(Field {
            index,
            value,
            integral: is_integral_field(token, value),
        })
    }

    pub fn display_line(&self) -> &'a str {
        self.raw.trim_end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Field {
    pub index: usize,
    pub value: f64,
    pub integral: bool,
}

/// Splits `text` into records numbered from 1.
pub fn records(text: &str) -> impl Iterator<Item = Record<'_>> {
    text.lines()
        .enumerate()
        .map(|(index, line)| Record::new(index + 1, line))
}
