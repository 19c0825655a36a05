//! Region-queens puzzle generation and verification.
//!
//! A puzzle is an N×N grid split into N contiguous regions of N cells.
//! A valid placement puts one marker in every row, column and region with
//! no two markers touching, diagonals included. Generated puzzles have
//! exactly one valid placement.
//!
//! # Generation
//!
//! 1. place N markers by randomized backtracking
//! 2. grow one region from each marker, round-robin, one cell per region per
//!    round, until the grid is covered (regrow until the sizes come out equal)
//! 3. refine: tabu search over boundary cell swaps that keep sizes and
//!    contiguity, steering towards a single solution
//! 4. confirm uniqueness with an exhaustive count
//!
//! Random growth alone almost never yields a unique equal-region grid, so
//! step 3 does most of the work.

use std::collections::VecDeque;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use thiserror::Error;

use crate::config::QueensConfig;

/// `(row, column)`
pub type Cell = (usize, usize);

/// Region id for every cell, indexed `[row][col]`.
pub type Regions = Vec<Vec<usize>>;

/// Growth retries on one placement before drawing a new one.
const GROWTH_RETRIES: usize = 64;

/// Solution count cap while refining.
const REFINE_COUNT_CAP: usize = 2_000;

/// Tabu list length (both orientations of each swap are stored).
const TABU_LEN: usize = 30;

/// A generated puzzle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Puzzle {
    pub size: usize,

    pub regions: Regions,

    /// Marker column for each row
    pub solution: Vec<usize>,
}

impl Puzzle {
    /// Solution as `(row, col)` cells.
    pub fn solution_cells(&self) -> Vec<Cell> {
        self.solution.iter().copied().enumerate().collect()
    }

    /// Cell count per region id.
    pub fn region_sizes(&self) -> Vec<usize> {
        region_sizes(&self.regions)
    }
}

/// Generation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("no unique puzzle found in {attempts} attempts")]
    Exhausted { attempts: usize },
}

/// Why a submitted placement is not a solution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlacementError {
    #[error("expected {expected} markers, got {found}")]
    WrongCount { expected: usize, found: usize },

    #[error("marker ({row}, {col}) is off the grid")]
    OutOfBounds { row: usize, col: usize },

    #[error("row {0} has more than one marker")]
    DuplicateRow(usize),

    #[error("column {0} has more than one marker")]
    DuplicateColumn(usize),

    #[error("region {0} has more than one marker")]
    DuplicateRegion(usize),

    #[error("markers {first:?} and {second:?} touch")]
    Adjacent { first: Cell, second: Cell },
}

impl PlacementError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::WrongCount { .. } => "wrong_count",
            Self::OutOfBounds { .. } => "out_of_bounds",
            Self::DuplicateRow(_) => "duplicate_row",
            Self::DuplicateColumn(_) => "duplicate_column",
            Self::DuplicateRegion(_) => "duplicate_region",
            Self::Adjacent { .. } => "adjacent",
        }
    }
}

/// Generate a puzzle with a unique solution.
pub fn generate<R: Rng + ?Sized>(
    config: &QueensConfig,
    rng: &mut R,
) -> Result<Puzzle, GenerationError> {
    let size = config.size;

    for attempt in 1..=config.max_attempts {
        let Some(solution) = place(size, rng) else {
            continue;
        };
        let Some(mut regions) = (0..GROWTH_RETRIES).find_map(|_| grow(&solution, rng)) else {
            continue;
        };

        refine(&mut regions, &solution, config.refine_steps, rng);

        if count_solutions(&regions, 2) == 1 {
            tracing::debug!(attempt, size, "generated region-queens puzzle");
            return Ok(Puzzle {
                size,
                regions,
                solution,
            });
        }
    }

    Err(GenerationError::Exhausted {
        attempts: config.max_attempts,
    })
}

/// Random valid marker placement, ignoring regions.
///
/// Returns the marker column per row.
pub fn place<R: Rng + ?Sized>(size: usize, rng: &mut R) -> Option<Vec<usize>> {
    let mut cols = Vec::with_capacity(size);
    let mut used = vec![false; size];
    if place_row(size, &mut cols, &mut used, rng) {
        Some(cols)
    } else {
        None
    }
}

fn place_row<R: Rng + ?Sized>(
    size: usize,
    cols: &mut Vec<usize>,
    used: &mut [bool],
    rng: &mut R,
) -> bool {
    if cols.len() == size {
        return true;
    }

    let mut order: Vec<usize> = (0..size).collect();
    order.shuffle(rng);

    for c in order {
        if used[c] || cols.last().is_some_and(|&prev| prev.abs_diff(c) <= 1) {
            continue;
        }
        cols.push(c);
        used[c] = true;
        if place_row(size, cols, used, rng) {
            return true;
        }
        cols.pop();
        used[c] = false;
    }
    false
}

/// Round-robin region growth seeded at each marker.
///
/// Returns `None` when the regions come out with unequal sizes.
fn grow<R: Rng + ?Sized>(solution: &[usize], rng: &mut R) -> Option<Regions> {
    let size = solution.len();
    let mut regions: Vec<Vec<Option<usize>>> = vec![vec![None; size]; size];
    let mut cells: Vec<Vec<Cell>> = Vec::with_capacity(size);

    for (row, &col) in solution.iter().enumerate() {
        regions[row][col] = Some(row);
        cells.push(vec![(row, col)]);
    }

    let mut left = size * size - size;
    while left > 0 {
        let mut progressed = false;

        for (id, owned) in cells.iter_mut().enumerate() {
            let mut frontier: Vec<Cell> = Vec::new();
            for &(r, c) in owned.iter() {
                for next in neighbours(size, r, c) {
                    if regions[next.0][next.1].is_none() && !frontier.contains(&next) {
                        frontier.push(next);
                    }
                }
            }

            if let Some(&(r, c)) = frontier.choose(rng) {
                regions[r][c] = Some(id);
                owned.push((r, c));
                left -= 1;
                progressed = true;
                if left == 0 {
                    break;
                }
            }
        }

        if !progressed {
            return None;
        }
    }

    if cells.iter().any(|owned| owned.len() != size) {
        return None;
    }

    regions
        .into_iter()
        .map(|row| row.into_iter().collect::<Option<Vec<usize>>>())
        .collect()
}

/// Size-preserving exchange of two boundary cells.
#[derive(Debug, Clone, Copy)]
struct Swap {
    from: Cell,
    to: Cell,
    a: usize,
    b: usize,
}

impl Swap {
    fn apply(&self, regions: &mut Regions) {
        regions[self.from.0][self.from.1] = self.b;
        regions[self.to.0][self.to.1] = self.a;
    }

    fn revert(&self, regions: &mut Regions) {
        regions[self.from.0][self.from.1] = self.a;
        regions[self.to.0][self.to.1] = self.b;
    }
}

/// Tabu search towards a single solution. Returns the final (capped) count.
fn refine<R: Rng + ?Sized>(
    regions: &mut Regions,
    solution: &[usize],
    steps: usize,
    rng: &mut R,
) -> usize {
    let mut current = count_solutions(regions, REFINE_COUNT_CAP);
    let mut tabu: VecDeque<(Cell, Cell)> = VecDeque::with_capacity(TABU_LEN + 2);

    for _ in 0..steps {
        if current == 1 {
            break;
        }

        let mut swaps = boundary_swaps(regions, solution);
        swaps.shuffle(rng);

        let mut best: Option<(usize, Swap)> = None;
        for swap in swaps {
            if tabu.contains(&(swap.from, swap.to)) {
                continue;
            }

            swap.apply(regions);
            if is_contiguous(regions, swap.a) && is_contiguous(regions, swap.b) {
                let limit = best.map_or(REFINE_COUNT_CAP, |(n, _)| n);
                let n = count_solutions(regions, limit);
                if best.map_or(true, |(b, _)| n < b) {
                    best = Some((n, swap));
                }
            }
            swap.revert(regions);
        }

        // Take the best move even when it is worse than the current grid.
        let Some((n, swap)) = best else {
            break;
        };
        swap.apply(regions);
        current = n;

        tabu.push_back((swap.from, swap.to));
        tabu.push_back((swap.to, swap.from));
        while tabu.len() > TABU_LEN {
            tabu.pop_front();
        }
    }

    current
}

/// Every swap of a non-marker cell of region `a` touching `b` with a
/// non-marker cell of `b` touching `a`.
fn boundary_swaps(regions: &Regions, solution: &[usize]) -> Vec<Swap> {
    let size = regions.len();
    let is_marker = |(r, c): Cell| solution[r] == c;
    let touches = |(r, c): Cell, other: usize| {
        neighbours(size, r, c).any(|(nr, nc)| regions[nr][nc] == other)
    };
    let border = |own: usize, other: usize| -> Vec<Cell> {
        (0..size)
            .flat_map(|r| (0..size).map(move |c| (r, c)))
            .filter(|&(r, c)| regions[r][c] == own)
            .filter(|&cell| !is_marker(cell) && touches(cell, other))
            .collect()
    };

    let mut swaps = Vec::new();
    for a in 0..size {
        for b in (a + 1)..size {
            let from_a = border(a, b);
            if from_a.is_empty() {
                continue;
            }
            let from_b = border(b, a);
            for &from in &from_a {
                for &to in &from_b {
                    swaps.push(Swap { from, to, a, b });
                }
            }
        }
    }
    swaps
}

/// Count valid placements, stopping once `limit` are found.
pub fn count_solutions(regions: &[Vec<usize>], limit: usize) -> usize {
    let size = regions.len();
    let mut found = 0;
    let mut used_cols = vec![false; size];
    let mut used_regions = vec![false; size];

    count_row(
        regions,
        0,
        None,
        &mut used_cols,
        &mut used_regions,
        &mut found,
        limit,
    );
    found
}

fn count_row(
    regions: &[Vec<usize>],
    row: usize,
    prev: Option<usize>,
    used_cols: &mut [bool],
    used_regions: &mut [bool],
    found: &mut usize,
    limit: usize,
) {
    let size = regions.len();
    if row == size {
        *found += 1;
        return;
    }

    for col in 0..size {
        if *found >= limit {
            return;
        }
        let region = regions[row][col];
        if used_cols[col] || region >= size || used_regions[region] {
            continue;
        }
        if prev.is_some_and(|p| p.abs_diff(col) <= 1) {
            continue;
        }

        used_cols[col] = true;
        used_regions[region] = true;
        count_row(regions, row + 1, Some(col), used_cols, used_regions, found, limit);
        used_cols[col] = false;
        used_regions[region] = false;
    }
}

/// Check a submitted placement. Reports the first failing constraint family.
pub fn verify(regions: &[Vec<usize>], placements: &[Cell]) -> Result<(), PlacementError> {
    let size = regions.len();

    if placements.len() != size {
        return Err(PlacementError::WrongCount {
            expected: size,
            found: placements.len(),
        });
    }

    if let Some(&(row, col)) = placements.iter().find(|&&(r, c)| r >= size || c >= size) {
        return Err(PlacementError::OutOfBounds { row, col });
    }

    let mut rows = vec![false; size];
    for &(r, _) in placements {
        if std::mem::replace(&mut rows[r], true) {
            return Err(PlacementError::DuplicateRow(r));
        }
    }

    let mut cols = vec![false; size];
    for &(_, c) in placements {
        if std::mem::replace(&mut cols[c], true) {
            return Err(PlacementError::DuplicateColumn(c));
        }
    }

    let mut seen = vec![false; size];
    for &(r, c) in placements {
        let region = regions[r][c];
        if region >= size || std::mem::replace(&mut seen[region], true) {
            return Err(PlacementError::DuplicateRegion(region));
        }
    }

    for (i, &first) in placements.iter().enumerate() {
        for &second in &placements[i + 1..] {
            if first.0.abs_diff(second.0) <= 1 && first.1.abs_diff(second.1) <= 1 {
                return Err(PlacementError::Adjacent { first, second });
            }
        }
    }

    Ok(())
}

/// Cell count per region id.
pub fn region_sizes(regions: &[Vec<usize>]) -> Vec<usize> {
    let mut sizes = vec![0; regions.len()];
    for &id in regions.iter().flatten() {
        if let Some(n) = sizes.get_mut(id) {
            *n += 1;
        }
    }
    sizes
}

/// Whether region `id` is one orthogonally connected piece.
pub fn is_contiguous(regions: &[Vec<usize>], id: usize) -> bool {
    let size = regions.len();
    let members: Vec<Cell> = (0..size)
        .flat_map(|r| (0..size).map(move |c| (r, c)))
        .filter(|&(r, c)| regions[r][c] == id)
        .collect();

    let Some(&start) = members.first() else {
        return false;
    };

    let mut seen = vec![vec![false; size]; size];
    seen[start.0][start.1] = true;
    let mut stack = vec![start];
    let mut reached = 1;

    while let Some((r, c)) = stack.pop() {
        for (nr, nc) in neighbours(size, r, c) {
            if regions[nr][nc] == id && !seen[nr][nc] {
                seen[nr][nc] = true;
                reached += 1;
                stack.push((nr, nc));
            }
        }
    }

    reached == members.len()
}

fn neighbours(size: usize, r: usize, c: usize) -> impl Iterator<Item = Cell> {
    let up = r.checked_sub(1).map(|r| (r, c));
    let down = (r + 1 < size).then_some((r + 1, c));
    let left = c.checked_sub(1).map(|c| (r, c));
    let right = (c + 1 < size).then_some((r, c + 1));
    [down, up, right, left].into_iter().flatten()
}

/// Known 6×6 puzzle with the unique solution `[3, 1, 5, 0, 4, 2]`.
#[cfg(test)]
pub(crate) fn fixture_puzzle() -> Puzzle {
    Puzzle {
        size: 6,
        regions: vec![
            vec![0, 0, 0, 0, 2, 2],
            vec![1, 1, 1, 0, 0, 2],
            vec![3, 3, 1, 4, 4, 2],
            vec![3, 1, 1, 4, 2, 2],
            vec![3, 5, 5, 4, 4, 4],
            vec![3, 3, 5, 5, 5, 5],
        ],
        solution: vec![3, 1, 5, 0, 4, 2],
    }
}
