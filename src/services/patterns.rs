//! Line bingo and bonus pattern detection over a card grid.

use std::collections::HashSet;

use crate::{dao::models::BingoGrid, state::game::BonusRules};

/// Checker deciding whether a named pattern is fully marked.
type PatternChecker = fn(&[Vec<bool>]) -> bool;

/// Registry of the bonus patterns the server knows how to evaluate.
const PATTERN_CHECKERS: &[(&str, PatternChecker)] =
    &[("fourCorners", four_corners), ("x", x_pattern)];

/// Bonus pattern found on a card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternMatch {
    /// Registry key of the pattern.
    pub id: String,
    /// Display label from the rule set.
    pub label: String,
    /// Points configured for the pattern.
    pub points: i32,
}

/// Persisted marks merged with every drawn number found on the grid.
pub fn merged_marks(grid: &BingoGrid, drawn: &HashSet<u8>) -> Vec<Vec<bool>> {
    grid.numbers
        .iter()
        .enumerate()
        .map(|(row_index, row)| {
            row.iter()
                .enumerate()
                .map(|(col_index, number)| {
                    let marked = grid
                        .marked
                        .get(row_index)
                        .and_then(|marks| marks.get(col_index))
                        .copied()
                        .unwrap_or(false);
                    marked || drawn.contains(number)
                })
                .collect()
        })
        .collect()
}

fn cell(marks: &[Vec<bool>], row: usize, col: usize) -> bool {
    marks
        .get(row)
        .and_then(|cells| cells.get(col))
        .copied()
        .unwrap_or(false)
}

/// Any full row, full column or full diagonal of the N×N matrix.
pub fn has_line_bingo(marks: &[Vec<bool>]) -> bool {
    let size = marks.len();
    if size == 0 {
        return false;
    }

    let any_row = (0..size).any(|row| (0..size).all(|col| cell(marks, row, col)));
    let any_col = (0..size).any(|col| (0..size).all(|row| cell(marks, row, col)));

    any_row || any_col || main_diagonal(marks) || anti_diagonal(marks)
}

fn main_diagonal(marks: &[Vec<bool>]) -> bool {
    let size = marks.len();
    size > 0 && (0..size).all(|i| cell(marks, i, i))
}

fn anti_diagonal(marks: &[Vec<bool>]) -> bool {
    let size = marks.len();
    size > 0 && (0..size).all(|i| cell(marks, i, size - 1 - i))
}

fn four_corners(marks: &[Vec<bool>]) -> bool {
    let size = marks.len();
    if size == 0 {
        return false;
    }
    let last = size - 1;
    cell(marks, 0, 0) && cell(marks, 0, last) && cell(marks, last, 0) && cell(marks, last, last)
}

fn x_pattern(marks: &[Vec<bool>]) -> bool {
    main_diagonal(marks) && anti_diagonal(marks)
}

fn checker(id: &str) -> Option<PatternChecker> {
    PATTERN_CHECKERS
        .iter()
        .find(|(key, _)| *key == id)
        .map(|(_, check)| *check)
}

/// Bonus patterns of `rules` fully marked on `grid`, in rule order.
///
/// Rules without positive points and ids missing from the registry are skipped.
pub fn detect_patterns(
    grid: &BingoGrid,
    drawn: &HashSet<u8>,
    rules: &BonusRules,
) -> Vec<PatternMatch> {
    let marks = merged_marks(grid, drawn);
    rules
        .patterns
        .iter()
        .filter(|rule| rule.points > 0)
        .filter_map(|rule| {
            let check = checker(&rule.id)?;
            check(&marks).then(|| PatternMatch {
                id: rule.id.clone(),
                label: rule.label.clone(),
                points: rule.points,
            })
        })
        .collect()
}

/// Display label derived from a pattern id (`fourCorners` becomes `Four Corners`).
pub fn title_case(id: &str) -> String {
    let mut label = String::with_capacity(id.len() + 4);
    let mut start_word = true;
    for ch in id.chars() {
        if ch == '_' || ch == '-' || ch == ' ' {
            if !label.ends_with(' ') && !label.is_empty() {
                label.push(' ');
            }
            start_word = true;
            continue;
        }
        if ch.is_uppercase() && !label.is_empty() && !label.ends_with(' ') {
            label.push(' ');
            start_word = true;
        }
        if start_word {
            label.extend(ch.to_uppercase());
            start_word = false;
        } else {
            label.push(ch);
        }
    }
    label
}
