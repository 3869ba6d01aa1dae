//! Grades derived from handwriting stroke results.

use serde::{Deserialize, Serialize};

use crate::types::Rating;

/// Stroke counts from one handwriting attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrokeResult {
    pub correct_stroke_count: u32,
    pub incorrect_stroke_count: u32,
    pub total_stroke_count: u32,
}

impl StrokeResult {
    pub fn mistake_rate(&self) -> f64 {
        if self.total_stroke_count == 0 {
            return 0.0;
        }
        f64::from(self.incorrect_stroke_count) / f64::from(self.total_stroke_count)
    }

    /// Automatic grading never yields Easy.
    pub fn grade(&self) -> Rating {
        let rate = self.mistake_rate();
        let mistakes = self.incorrect_stroke_count;
        if rate < 0.25 || mistakes <= 2 {
            Rating::Good
        } else if rate < 0.5 || mistakes <= 4 {
            Rating::Hard
        } else {
            Rating::Again
        }
    }
}

/// Record of an automatically assigned grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoGradeLog {
    pub correct_count: u32,
    pub mistake_count: u32,
    pub grade: u8,
}

impl AutoGradeLog {
    pub fn new(correct_count: u32, mistake_count: u32, grade: Rating) -> Self {
        Self {
            correct_count,
            mistake_count,
            grade: grade.to_value(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strokes(incorrect: u32, total: u32) -> StrokeResult {
        StrokeResult {
            correct_stroke_count: total.saturating_sub(incorrect),
            incorrect_stroke_count: incorrect,
            total_stroke_count: total,
        }
    }

    #[test]
    fn test_grade_thresholds() {
        assert_eq!(strokes(0, 8).grade(), Rating::Good);
        assert_eq!(strokes(2, 3).grade(), Rating::Good);
        assert_eq!(strokes(4, 20).grade(), Rating::Good);
        assert_eq!(strokes(3, 10).grade(), Rating::Hard);
        assert_eq!(strokes(4, 5).grade(), Rating::Hard);
        assert_eq!(strokes(6, 10).grade(), Rating::Again);
    }

    #[test]
    fn test_zero_strokes_is_good() {
        assert_eq!(strokes(0, 0).grade(), Rating::Good);
    }

    #[test]
    fn test_log_wire_format() {
        let log = AutoGradeLog::new(7, 1, Rating::Good);
        let json = serde_json::to_value(log).unwrap();
        assert_eq!(json, serde_json::json!({"correctCount": 7, "mistakeCount": 1, "grade": 3}));
    }
}
