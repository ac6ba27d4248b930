//! Puzzle grid and solution matrix
//!
//! The [`Grid`] is the canonical answer layout of a puzzle and never changes
//! for the lifetime of that puzzle. The [`Solution`] is the shared, in-progress
//! fill that every participant edits; it always has the grid's dimensions.

use serde::{Deserialize, Serialize};

use crate::models::Coordinates;

/// Marker used by puzzle payloads for a block square
pub const BLOCK: &str = ".";

/// Author id stamped on entries produced by a `reveal`
pub const SYSTEM_AUTHOR: &str = "system";

/// A single square of the canonical grid
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridCell {
    /// Black square, never holds an entry
    Block,
    /// Answer string (more than one character for rebus squares)
    Answer(String),
}

impl GridCell {
    /// Parse a payload square; `"."` and empty strings are blocks
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            None => GridCell::Block,
            Some(s) if s.is_empty() || s == BLOCK => GridCell::Block,
            Some(s) => GridCell::Answer(s.to_string()),
        }
    }

    pub fn is_block(&self) -> bool {
        matches!(self, GridCell::Block)
    }

    /// The answer, or `None` for a block
    pub fn answer(&self) -> Option<&str> {
        match self {
            GridCell::Block => None,
            GridCell::Answer(answer) => Some(answer),
        }
    }
}

/// Immutable `rows x cols` answer grid
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grid {
    cells: Vec<Vec<GridCell>>,
}

impl Grid {
    /// Build a grid from rows of payload squares (`"."` marks a block)
    pub fn from_rows<R, S>(rows: R) -> Self
    where
        R: IntoIterator,
        R::Item: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let cells = rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|s| GridCell::parse(Some(s.as_ref())))
                    .collect()
            })
            .collect();
        Self { cells }
    }

    /// Build a grid from rows that may contain nulls for blocks
    pub fn from_optional_rows(rows: Vec<Vec<Option<String>>>) -> Self {
        let cells = rows
            .into_iter()
            .map(|row| row.iter().map(|s| GridCell::parse(s.as_deref())).collect())
            .collect();
        Self { cells }
    }

    /// An empty grid means the puzzle has not been resolved yet
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn rows(&self) -> usize {
        self.cells.len()
    }

    /// Every row has the same length
    pub fn is_rectangular(&self) -> bool {
        let cols = self.cols();
        self.cells.iter().all(|row| row.len() == cols)
    }

    pub fn cols(&self) -> usize {
        self.cells.first().map_or(0, Vec::len)
    }

    pub fn cell(&self, at: Coordinates) -> Option<&GridCell> {
        self.cells.get(at.r).and_then(|row| row.get(at.c))
    }

    pub fn contains(&self, at: Coordinates) -> bool {
        self.cell(at).is_some()
    }

    /// Canonical answer flattened row-major, `None` for blocks
    pub fn answers(&self) -> Vec<Option<&str>> {
        self.cells
            .iter()
            .flat_map(|row| row.iter().map(GridCell::answer))
            .collect()
    }

    /// Canonical answers as rows, `None` for blocks
    pub fn answer_rows(&self) -> Vec<Vec<Option<String>>> {
        self.cells
            .iter()
            .map(|row| row.iter().map(|c| c.answer().map(str::to_string)).collect())
            .collect()
    }
}

/// Clue lists indexed by clue number; gaps are `None`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clues {
    #[serde(default)]
    pub across: Vec<Option<String>>,
    #[serde(default)]
    pub down: Vec<Option<String>>,
}

/// How an entry relates to the canonical answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Correctness {
    Correct,
    Incorrect,
    Revealed,
    Penciled {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color: Option<String>,
    },
}

impl Correctness {
    /// Compare a value against the canonical answer
    pub fn check(value: &str, answer: &str) -> Self {
        if value == answer {
            Correctness::Correct
        } else {
            Correctness::Incorrect
        }
    }

    /// `correct` and `revealed` cells are locked
    pub fn is_writable(&self) -> bool {
        !matches!(self, Correctness::Correct | Correctness::Revealed)
    }
}

/// A filled square of the solution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellEntry {
    pub author_id: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correctness: Option<Correctness>,
}

impl CellEntry {
    pub fn new(author_id: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            author_id: author_id.into(),
            value: value.into(),
            correctness: None,
        }
    }

    pub fn with_correctness(mut self, correctness: Option<Correctness>) -> Self {
        self.correctness = correctness;
        self
    }

    /// Synthetic entry written by a reveal
    pub fn revealed(answer: impl Into<String>) -> Self {
        Self {
            author_id: SYSTEM_AUTHOR.to_string(),
            value: answer.into(),
            correctness: Some(Correctness::Revealed),
        }
    }

    pub fn is_writable(&self) -> bool {
        self.correctness
            .as_ref()
            .map_or(true, Correctness::is_writable)
    }

    pub fn is_correct(&self) -> bool {
        matches!(self.correctness, Some(Correctness::Correct))
    }
}

/// Mutable `rows x cols` fill; serialized as a bare matrix
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Solution {
    cells: Vec<Vec<Option<CellEntry>>>,
}

impl Solution {
    /// All-empty solution sized to `grid`
    pub fn empty_for(grid: &Grid) -> Self {
        Self::empty(grid.rows(), grid.cols())
    }

    pub fn empty(rows: usize, cols: usize) -> Self {
        Self {
            cells: vec![vec![None; cols]; rows],
        }
    }

    pub fn from_cells(cells: Vec<Vec<Option<CellEntry>>>) -> Self {
        Self { cells }
    }

    pub fn rows(&self) -> usize {
        self.cells.len()
    }

    pub fn cols(&self) -> usize {
        self.cells.first().map_or(0, Vec::len)
    }

    /// True when every row has the grid's width and the row count matches
    pub fn fits(&self, grid: &Grid) -> bool {
        self.rows() == grid.rows() && self.cells.iter().all(|row| row.len() == grid.cols())
    }

    pub fn get(&self, at: Coordinates) -> Option<&CellEntry> {
        self.cells
            .get(at.r)
            .and_then(|row| row.get(at.c))
            .and_then(Option::as_ref)
    }

    /// Replace the entry at `at`; out-of-range writes are ignored
    pub fn set(&mut self, at: Coordinates, entry: CellEntry) {
        if let Some(slot) = self.slot_mut(at) {
            *slot = Some(entry);
        }
    }

    pub fn clear(&mut self, at: Coordinates) {
        if let Some(slot) = self.slot_mut(at) {
            *slot = None;
        }
    }

    pub fn get_mut(&mut self, at: Coordinates) -> Option<&mut CellEntry> {
        self.slot_mut(at).and_then(Option::as_mut)
    }

    fn slot_mut(&mut self, at: Coordinates) -> Option<&mut Option<CellEntry>> {
        self.cells.get_mut(at.r).and_then(|row| row.get_mut(at.c))
    }

    pub fn cells(&self) -> &[Vec<Option<CellEntry>>] {
        &self.cells
    }

    /// Number of filled squares
    pub fn filled_count(&self) -> usize {
        self.cells.iter().flatten().filter(|c| c.is_some()).count()
    }
}

/// Completion state derived from the solution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SolutionState {
    /// Solved
    Correct,
    /// Every square filled but something is wrong
    Incorrect,
    Incomplete,
}

impl SolutionState {
    pub fn is_solved(self) -> bool {
        matches!(self, SolutionState::Correct)
    }
}

/// Recompute completion in one pass over the grid
///
/// Builds the proposed answer grid from the entries (`None` for blocks and
/// empty squares) and compares it with the canonical answers.
pub fn resolve_solution_state(grid: &Grid, solution: &Solution) -> SolutionState {
    if grid.is_empty() {
        return SolutionState::Incomplete;
    }

    let mut filled = true;
    let mut proposed = Vec::with_capacity(grid.rows() * grid.cols());

    for (r, row) in grid.cells.iter().enumerate() {
        for (c, cell) in row.iter().enumerate() {
            if cell.is_block() {
                proposed.push(None);
                continue;
            }
            match solution.get(Coordinates::new(r, c)) {
                Some(entry) => proposed.push(Some(entry.value.as_str())),
                None => {
                    filled = false;
                    proposed.push(None);
                }
            }
        }
    }

    if proposed == grid.answers() {
        SolutionState::Correct
    } else if filled {
        SolutionState::Incorrect
    } else {
        SolutionState::Incomplete
    }
}
