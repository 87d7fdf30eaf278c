//! Line-addressed edits over an in-memory list of lines.
//!
//! Ranges are inclusive and zero-based. An end of [`END_OF_FILE`] selects
//! through the last line. Starts beyond the current length clamp to the end,
//! which turns a write into an append.

use thiserror::Error;

/// End sentinel meaning "through the end of the file".
pub const END_OF_FILE: i64 = -1;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RangeError {
    #[error("start line must be >= 0, got {0}")]
    NegativeStart(i64),
    #[error("end line must be >= 0 or -1, got {0}")]
    NegativeEnd(i64),
    #[error("end line {end} is before start line {start}")]
    EndBeforeStart { start: i64, end: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRange {
    start: i64,
    end: i64,
}

impl LineRange {
    pub fn new(start: i64, end: i64) -> Result<Self, RangeError> {
        if start < 0 {
            return Err(RangeError::NegativeStart(start));
        }
        if end < END_OF_FILE {
            return Err(RangeError::NegativeEnd(end));
        }
        if end != END_OF_FILE && end < start {
            return Err(RangeError::EndBeforeStart { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn end(&self) -> i64 {
        self.end
    }

    /// Half-open index span `[lo, hi)` clamped to `len`.
    fn span(&self, len: usize) -> (usize, usize) {
        let lo = usize::try_from(self.start).unwrap_or(usize::MAX).min(len);
        let hi = if self.end == END_OF_FILE {
            len
        } else {
            usize::try_from(self.end)
                .unwrap_or(usize::MAX)
                .saturating_add(1)
                .min(len)
        };
        (lo, hi.max(lo))
    }
}

/// Replace the selected lines with `payload`.
pub fn write_lines(lines: &mut Vec<String>, range: LineRange, payload: &[String]) {
    let (lo, hi) = range.span(lines.len());
    lines.splice(lo..hi, payload.iter().cloned());
}

/// Render the selected lines, each prefixed with its zero-based index.
pub fn read_lines(lines: &[String], range: LineRange) -> String {
    let (lo, hi) = range.span(lines.len());
    lines[lo..hi]
        .iter()
        .enumerate()
        .map(|(offset, line)| format!("[{}]{}", lo + offset, line))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn delete_lines(lines: &mut Vec<String>, range: LineRange) {
    let (lo, hi) = range.span(lines.len());
    lines.drain(lo..hi);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn write_through_end_then_read_prefixes_indices() {
        let mut file = Vec::new();
        let payload = lines(&["alpha", "beta", "gamma"]);
        write_lines(&mut file, LineRange::new(0, END_OF_FILE).unwrap(), &payload);
        let rendered = read_lines(&file, LineRange::new(0, END_OF_FILE).unwrap());
        assert_eq!(rendered, "[0]alpha\n[1]beta\n[2]gamma");
    }

    #[test]
    fn delete_first_two_of_three_leaves_third_at_zero() {
        let mut file = lines(&["one", "two", "three"]);
        delete_lines(&mut file, LineRange::new(0, 1).unwrap());
        assert_eq!(file, lines(&["three"]));
        assert_eq!(
            read_lines(&file, LineRange::new(0, END_OF_FILE).unwrap()),
            "[0]three"
        );
    }

    #[test]
    fn write_replaces_inclusive_range() {
        let mut file = lines(&["a", "b", "c", "d"]);
        write_lines(&mut file, LineRange::new(1, 2).unwrap(), &lines(&["x"]));
        assert_eq!(file, lines(&["a", "x", "d"]));
    }

    #[test]
    fn start_beyond_length_appends() {
        let mut file = lines(&["a"]);
        write_lines(&mut file, LineRange::new(10, 12).unwrap(), &lines(&["z"]));
        assert_eq!(file, lines(&["a", "z"]));
    }

    #[test]
    fn read_clamps_end_and_keeps_absolute_indices() {
        let file = lines(&["a", "b", "c"]);
        assert_eq!(read_lines(&file, LineRange::new(1, 9).unwrap()), "[1]b\n[2]c");
    }

    #[test]
    fn end_before_start_is_rejected() {
        assert_eq!(
            LineRange::new(3, 1).unwrap_err(),
            RangeError::EndBeforeStart { start: 3, end: 1 }
        );
        assert_eq!(
            LineRange::new(0, -2).unwrap_err(),
            RangeError::NegativeEnd(-2)
        );
    }
}
