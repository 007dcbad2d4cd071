use itertools::Itertools;
use miette::{miette, Result};
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use crate::machine::{self, accumulate_joltages, Button};

// -----------------------------------------------------------------------------
// Constants & Configuration
// -----------------------------------------------------------------------------

/// Singular values at or below this are treated as zero when computing rank.
const RANK_TOLERANCE: f64 = 1e-10;

/// Convergence threshold of the SVD iteration, nalgebra's own default. A
/// tighter value leaves padded or rank-deficient matrices unconverged.
const SVD_EPSILON: f64 = f64::EPSILON * 5.0;

/// Smallest magnitude accepted as a pivot while reducing the null-space basis.
const PIVOT_TOLERANCE: f64 = 1e-9;

/// Systems with at most this many buttons may fall back to exhaustive searches.
const SMALL_SYSTEM_BUTTONS: usize = 5;

/// Chebyshev radius of the neighbourhood searched around a rounded solution.
const SEARCH_RADIUS: i64 = 3;

/// Largest single-coordinate step tried when perturbing a rounded solution.
const MAX_PERTURBATION: i64 = 2;

/// A coordinate below `-ROUNDING_SLACK` rounds to a negative press count.
const ROUNDING_SLACK: f64 = 0.5;

// -----------------------------------------------------------------------------
// Domain Models
// -----------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct LinearSystem {
    /// Incidence matrix (positions x buttons), zero-padded to at least one row
    /// per button so the SVD yields a complete right-singular basis.
    pub a: DMatrix<f64>,
    /// Goal vector, zero-padded like `a`.
    pub b: DVector<f64>,
    /// Kept for exact integer verification.
    goal: Vec<i64>,
    /// Positions each button increments, deduplicated and in range.
    affects: Vec<Vec<usize>>,
    /// Buttons incrementing each position.
    touching: Vec<Vec<usize>>,
    /// No button can be pressed more often than the smallest goal it feeds.
    limits: Vec<i64>,
}

/// A verified press vector and its total press count.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Candidate {
    presses: Vec<i64>,
    total: i64,
}

/// What the SVD tells us about a system.
#[derive(Clone, Debug)]
struct Decomposition {
    rank: usize,
    /// Minimum-norm least-squares solution `V Σ⁺ Uᵀ b`.
    particular: DVector<f64>,
    /// Rows of `Vᵀ` whose singular value is zero; they span the null space.
    null_basis: DMatrix<f64>,
}

fn keep_best(best: &mut Option<Candidate>, candidate: Candidate) {
    if best.as_ref().map_or(true, |b| candidate.total < b.total) {
        *best = Some(candidate);
    }
}

impl LinearSystem {
    pub fn new(goal: &[u64], buttons: &[Button]) -> Self {
        let m = goal.len();
        let n = buttons.len();

        let mut a = DMatrix::zeros(m.max(n), n);
        let mut b = DVector::zeros(m.max(n));
        let mut affects = vec![Vec::new(); n];
        let mut touching = vec![Vec::new(); m];

        for (col, button) in buttons.iter().enumerate() {
            for &row in button {
                if row < m && a[(row, col)] == 0.0 {
                    a[(row, col)] = 1.0;
                    affects[col].push(row);
                    touching[row].push(col);
                }
            }
        }
        for (row, &val) in goal.iter().enumerate() {
            b[row] = val as f64;
        }

        let goal: Vec<i64> = goal.iter().map(|&g| g as i64).collect();
        let limits = affects
            .iter()
            .map(|rows| rows.iter().map(|&r| goal[r]).min().unwrap_or(0))
            .collect();

        Self {
            a,
            b,
            goal,
            affects,
            touching,
            limits,
        }
    }

    fn num_buttons(&self) -> usize {
        self.a.ncols()
    }

    /// Accepts `presses` only if every count is non-negative and the summed
    /// contributions hit every goal exactly.
    fn verify(&self, presses: &[i64]) -> bool {
        presses.iter().all(|&p| p >= 0)
            && self
                .touching
                .iter()
                .zip(&self.goal)
                .all(|(buttons, &goal)| buttons.iter().map(|&b| presses[b]).sum::<i64>() == goal)
    }

    fn candidate(&self, presses: Vec<i64>) -> Option<Candidate> {
        if !self.verify(&presses) {
            return None;
        }
        let total = presses.iter().sum();
        Some(Candidate { presses, total })
    }

    fn decompose(&self) -> Option<Decomposition> {
        let n = self.num_buttons();
        let svd = self.a.clone().try_svd(true, true, SVD_EPSILON, 0)?;

        let rank = svd.rank(RANK_TOLERANCE);
        let particular = svd.solve(&self.b, RANK_TOLERANCE).ok()?;

        let v_t = svd.v_t.as_ref()?;
        let null_rows: Vec<usize> = svd
            .singular_values
            .iter()
            .enumerate()
            .filter(|&(_, &s)| s <= RANK_TOLERANCE)
            .map(|(i, _)| i)
            .collect();
        let null_basis = DMatrix::from_fn(null_rows.len(), n, |r, c| v_t[(null_rows[r], c)]);

        tracing::debug!(
            buttons = n,
            rank,
            nullity = null_rows.len(),
            "decomposed incidence matrix"
        );

        Some(Decomposition {
            rank,
            particular,
            null_basis,
        })
    }

    /// Finds non-negative press counts reproducing the goal exactly, preferring
    /// the fewest total presses. `None` when no search stage finds one.
    pub fn solve(&self) -> Option<Vec<u64>> {
        if self.num_buttons() == 0 {
            return self.candidate(Vec::new()).map(|_| Vec::new());
        }

        let decomposition = self.decompose()?;
        let best = if decomposition.rank >= self.num_buttons() {
            full_rank::solve(self, &decomposition.particular)
        } else {
            lattice::Lattice::new(self, &decomposition.particular, decomposition.null_basis)
                .search()
        }?;

        Some(best.presses.into_iter().map(|p| p as u64).collect())
    }
}

// -----------------------------------------------------------------------------
// Full Rank: Rounding & Local Search
// -----------------------------------------------------------------------------

mod full_rank {
    use super::*;

    /// The real solution is unique, so an integer one can only sit at (or,
    /// through float drift, next to) its rounding.
    pub(super) fn solve(sys: &LinearSystem, particular: &DVector<f64>) -> Option<Candidate> {
        let rounded: Vec<i64> = particular.iter().map(|x| x.round() as i64).collect();
        let small = sys.num_buttons() <= SMALL_SYSTEM_BUTTONS;

        if let Some(found) = sys.candidate(rounded.clone()) {
            tracing::debug!(total = found.total, "rounded solution verified");
            return Some(found);
        }

        if small {
            tracing::trace!(radius = SEARCH_RADIUS, "searching around rounded solution");
            if let Some(found) = search_around(sys, &rounded, SEARCH_RADIUS) {
                return Some(found);
            }
        }

        tracing::trace!("perturbing rounded solution");
        if let Some(found) = perturb(sys, &rounded) {
            return Some(found);
        }

        if small {
            tracing::trace!("falling back to brute force");
            return brute_force(sys);
        }

        None
    }

    /// Every non-negative vector within `radius` of `start` in each coordinate.
    pub(super) fn search_around(
        sys: &LinearSystem,
        start: &[i64],
        radius: i64,
    ) -> Option<Candidate> {
        start
            .iter()
            .map(|&s| (s - radius).max(0)..=s + radius)
            .multi_cartesian_product()
            .filter_map(|presses| sys.candidate(presses))
            .min_by_key(|c| c.total)
    }

    /// First vector found by moving a single coordinate by ±1, then ±2.
    pub(super) fn perturb(sys: &LinearSystem, start: &[i64]) -> Option<Candidate> {
        (1..=MAX_PERTURBATION)
            .flat_map(|delta| (0..start.len()).flat_map(move |i| [(i, delta), (i, -delta)]))
            .find_map(|(i, step)| {
                let mut presses = start.to_vec();
                presses[i] += step;
                sys.candidate(presses)
            })
    }

    /// Depth-first search over press counts, one button per level.
    pub(super) fn brute_force(sys: &LinearSystem) -> Option<Candidate> {
        let n = sys.num_buttons();

        // Positions whose last contributing button is `depth` are final once
        // that button's count has been chosen.
        let mut settled = vec![Vec::new(); n];
        for (pos, buttons) in sys.touching.iter().enumerate() {
            if let Some(&last) = buttons.iter().max() {
                settled[last].push(pos);
            }
        }

        let mut search = BruteForce {
            sys,
            settled,
            cap: sys.goal.iter().copied().max().unwrap_or(0),
            current: vec![0; n],
            partial: vec![0; sys.goal.len()],
            best: None,
        };
        search.descend(0, 0);
        search.best
    }

    struct BruteForce<'s> {
        sys: &'s LinearSystem,
        settled: Vec<Vec<usize>>,
        /// Most presses any single button could plausibly need.
        cap: i64,
        current: Vec<i64>,
        partial: Vec<i64>,
        best: Option<Candidate>,
    }

    impl BruteForce<'_> {
        fn descend(&mut self, depth: usize, total: i64) {
            if self.best.as_ref().is_some_and(|b| total >= b.total) {
                return;
            }

            let sys = self.sys;
            if depth == self.current.len() {
                if self.partial == sys.goal {
                    keep_best(
                        &mut self.best,
                        Candidate {
                            presses: self.current.clone(),
                            total,
                        },
                    );
                }
                return;
            }

            let rows = &sys.affects[depth];
            // Pressing further would overshoot some goal this button feeds
            let max_useful = rows
                .iter()
                .map(|&r| sys.goal[r] - self.partial[r])
                .min()
                .unwrap_or(0)
                .min(self.cap);

            for presses in 0..=max_useful {
                self.current[depth] = presses;
                for &r in rows {
                    self.partial[r] += presses;
                }

                let consistent = self.settled[depth]
                    .iter()
                    .all(|&r| self.partial[r] == sys.goal[r]);
                if consistent {
                    self.descend(depth + 1, total + presses);
                }

                for &r in rows {
                    self.partial[r] -= presses;
                }
            }
            self.current[depth] = 0;
        }
    }
}

// -----------------------------------------------------------------------------
// Rank Deficient: Null-Space Lattice Search
// -----------------------------------------------------------------------------

mod lattice {
    use super::*;

    /// Integer points `origin + Σ tᵢ · directionᵢ` of the solution space.
    ///
    /// After reduction each direction has a 1 at its own free button and a 0
    /// at every other free button, so `tᵢ` is exactly the press count of free
    /// button `i` and its range is `0..=limits[i]`.
    pub(super) struct Lattice<'s> {
        sys: &'s LinearSystem,
        pub(super) origin: Vec<f64>,
        pub(super) directions: Vec<Vec<f64>>,
        pub(super) free: Vec<usize>,
        pub(super) limits: Vec<i64>,
    }

    impl<'s> Lattice<'s> {
        pub(super) fn new(
            sys: &'s LinearSystem,
            particular: &DVector<f64>,
            null_basis: DMatrix<f64>,
        ) -> Self {
            let (free, basis) = reduce(null_basis);

            let directions: Vec<Vec<f64>> = basis
                .row_iter()
                .map(|row| row.iter().copied().collect())
                .collect();

            // Slide the particular solution along each direction until its
            // free button reads zero.
            let mut origin: Vec<f64> = particular.iter().copied().collect();
            for (&f, direction) in free.iter().zip(&directions) {
                let offset = particular[f];
                for (o, d) in origin.iter_mut().zip(direction) {
                    *o -= offset * d;
                }
            }

            let limits = free.iter().map(|&f| sys.limits[f]).collect();

            Self {
                sys,
                origin,
                directions,
                free,
                limits,
            }
        }

        pub(super) fn search(&self) -> Option<Candidate> {
            tracing::debug!(
                dims = self.directions.len(),
                free = ?self.free,
                limits = ?self.limits,
                "searching null space"
            );

            match self.directions.len() {
                0 => self.evaluate(&[]),
                1 => self.scan_1d(),
                2 => self.scan_2d(),
                3 => self.scan_3d_parallel(),
                _ => self.scan_nd(),
            }
        }

        /// Rounds the lattice point at `coeffs` and verifies it exactly.
        pub(super) fn evaluate(&self, coeffs: &[i64]) -> Option<Candidate> {
            let mut presses = Vec::with_capacity(self.origin.len());
            for (j, &o) in self.origin.iter().enumerate() {
                let x = coeffs
                    .iter()
                    .zip(&self.directions)
                    .fold(o, |acc, (&t, direction)| acc + t as f64 * direction[j]);
                let rounded = x.round();
                if rounded < 0.0 {
                    return None;
                }
                presses.push(rounded as i64);
            }
            self.sys.candidate(presses)
        }

        fn scan_1d(&self) -> Option<Candidate> {
            let direction = &self.directions[0];
            let (mut lo, mut hi) = (0, self.limits[0]);

            // Narrow the range to where every coordinate stays non-negative
            for (&o, &d) in self.origin.iter().zip(direction) {
                if d.abs() < PIVOT_TOLERANCE {
                    continue;
                }
                let bound = (-ROUNDING_SLACK - o) / d;
                if d > 0.0 {
                    lo = lo.max(bound.ceil() as i64);
                } else {
                    hi = hi.min(bound.floor() as i64);
                }
            }

            (lo..=hi)
                .filter_map(|t| self.evaluate(&[t]))
                .min_by_key(|c| c.total)
        }

        fn scan_2d(&self) -> Option<Candidate> {
            (0..=self.limits[0])
                .cartesian_product(0..=self.limits[1])
                .filter_map(|(t0, t1)| self.evaluate(&[t0, t1]))
                .min_by_key(|c| c.total)
        }

        /// Splits the first coordinate into one contiguous slab per worker.
        /// Each worker scans its slab exhaustively; the local bests are then
        /// folded by total.
        fn scan_3d_parallel(&self) -> Option<Candidate> {
            let workers = rayon::current_num_threads().max(1) as i64;
            let span = self.limits[0] + 1;
            let chunk = (span + workers - 1) / workers;

            (0..workers)
                .into_par_iter()
                .filter_map(|w| {
                    let start = w * chunk;
                    let end = (start + chunk).min(span);
                    (start..end)
                        .cartesian_product(0..=self.limits[1])
                        .cartesian_product(0..=self.limits[2])
                        .filter_map(|((t0, t1), t2)| self.evaluate(&[t0, t1, t2]))
                        .min_by_key(|c| c.total)
                })
                .min_by_key(|c| c.total)
        }

        fn scan_nd(&self) -> Option<Candidate> {
            let dims = self.directions.len();
            let width = self.origin.len();

            // reach[d][j]: the most coordinate j can still grow using free
            // buttons d.. within their limits.
            // cost_floor[d]: the most the total can still shrink the same way.
            let weights: Vec<f64> = self.directions.iter().map(|d| d.iter().sum()).collect();
            let mut reach = vec![vec![0.0; width]; dims + 1];
            let mut cost_floor = vec![0.0; dims + 1];
            for d in (0..dims).rev() {
                let limit = self.limits[d] as f64;
                for j in 0..width {
                    reach[d][j] = reach[d + 1][j] + (self.directions[d][j] * limit).max(0.0);
                }
                cost_floor[d] = cost_floor[d + 1] + (weights[d] * limit).min(0.0);
            }

            let mut descent = Descent {
                lattice: self,
                reach,
                cost_floor,
                weights,
                coeffs: vec![0; dims],
                best: None,
            };
            descent.descend(0, &self.origin, self.origin.iter().sum());
            descent.best
        }
    }

    /// Gauss-Jordan elimination with partial pivoting. Returns the pivot
    /// columns (the free buttons) and the reduced rows, one per pivot.
    pub(super) fn reduce(mut basis: DMatrix<f64>) -> (Vec<usize>, DMatrix<f64>) {
        let (k, n) = basis.shape();
        let mut free = Vec::with_capacity(k);
        let mut pivot_row = 0;

        for c in 0..n {
            if pivot_row == k {
                break;
            }

            let (best_row, magnitude) = (pivot_row..k)
                .map(|r| (r, basis[(r, c)].abs()))
                .fold((pivot_row, 0.0), |acc, cur| if cur.1 > acc.1 { cur } else { acc });
            if magnitude < PIVOT_TOLERANCE {
                continue;
            }

            basis.swap_rows(pivot_row, best_row);
            pivot(&mut basis, pivot_row, c);
            free.push(c);
            pivot_row += 1;
        }

        (free, basis.rows(0, pivot_row).into_owned())
    }

    fn pivot(mat: &mut DMatrix<f64>, pr: usize, pc: usize) {
        let (k, n) = mat.shape();
        let inv = 1.0 / mat[(pr, pc)];

        // Normalize pivot row
        for c in 0..n {
            mat[(pr, c)] *= inv;
        }

        // Eliminate other rows
        for r in 0..k {
            if r != pr {
                let factor = mat[(r, pc)];
                if factor != 0.0 {
                    for c in 0..n {
                        mat[(r, c)] -= factor * mat[(pr, c)];
                    }
                }
            }
        }
    }

    /// Depth-first state for the general-dimension scan.
    struct Descent<'l, 's> {
        lattice: &'l Lattice<'s>,
        reach: Vec<Vec<f64>>,
        cost_floor: Vec<f64>,
        weights: Vec<f64>,
        coeffs: Vec<i64>,
        best: Option<Candidate>,
    }

    impl Descent<'_, '_> {
        fn descend(&mut self, depth: usize, point: &[f64], cost: f64) {
            // Some coordinate can no longer reach a non-negative count
            if point
                .iter()
                .zip(&self.reach[depth])
                .any(|(x, r)| x + r < -ROUNDING_SLACK)
            {
                return;
            }

            // Even the cheapest completion cannot beat the best total
            if let Some(best) = &self.best {
                if cost + self.cost_floor[depth] > best.total as f64 - ROUNDING_SLACK {
                    return;
                }
            }

            let lattice = self.lattice;
            if depth == self.coeffs.len() {
                if let Some(found) = lattice.evaluate(&self.coeffs) {
                    keep_best(&mut self.best, found);
                }
                return;
            }

            let direction = &lattice.directions[depth];
            let mut next = point.to_vec();
            for t in 0..=lattice.limits[depth] {
                self.coeffs[depth] = t;
                self.descend(depth + 1, &next, cost + t as f64 * self.weights[depth]);
                for (x, d) in next.iter_mut().zip(direction) {
                    *x += d;
                }
            }
            self.coeffs[depth] = 0;
        }
    }
}

// -----------------------------------------------------------------------------
// Entry Points
// -----------------------------------------------------------------------------

/// Non-negative press counts that raise every counter from zero to `goal`
/// with as few presses as the search finds, or `None` when none is found.
pub fn solve(goal: &[u64], buttons: &[Button]) -> Option<Vec<u64>> {
    let presses = LinearSystem::new(goal, buttons).solve()?;
    debug_assert_eq!(goal, accumulate_joltages(goal.len(), buttons, &presses).as_slice());
    Some(presses)
}

#[tracing::instrument]
pub fn process(input: &str) -> Result<String> {
    let machines = machine::parse(input)?;

    let totals = machines
        .par_iter()
        .enumerate()
        .map(|(i, m)| {
            let goal = m
                .joltages
                .as_deref()
                .ok_or_else(|| miette!("Machine {} has no joltage requirements", i + 1))?;
            let presses = solve(goal, &m.buttons)
                .ok_or_else(|| miette!("Machine {} cannot reach its joltage requirements", i + 1))?;
            Ok(presses.iter().sum::<u64>())
        })
        .collect::<Result<Vec<u64>>>()?;

    Ok(totals.iter().sum::<u64>().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    const SAMPLE: &str = "[.##.] (3) (1,3) (2) (2,3) (0,2) (0,1) {3,5,4,7}
[...#.] (0,2,3,4) (2,3) (0,4) (0,1,2) (1,2,3,4) {7,5,12,7,2}
[.###.#] (0,1,2,3,4) (0,3,4) (0,1,2,4,5) (1,2) {10,11,11,5,10,5}";

    fn total(presses: &[u64]) -> u64 {
        presses.iter().sum()
    }

    /// Smallest total over every press vector with no count above the largest goal.
    fn exhaustive_min_total(goal: &[u64], buttons: &[Button]) -> Option<u64> {
        let cap = goal.iter().copied().max().unwrap_or(0);
        buttons
            .iter()
            .map(|_| 0..=cap)
            .multi_cartesian_product()
            .filter(|presses| accumulate_joltages(goal.len(), buttons, presses).as_slice() == goal)
            .map(|presses| presses.iter().sum())
            .min()
    }

    /// Every button shape over `width` positions, the empty one included.
    fn all_buttons(width: usize) -> Vec<Button> {
        (0usize..1 << width)
            .map(|mask| (0..width).filter(|&i| (mask >> i) & 1 == 1).collect())
            .collect()
    }

    fn assert_matches_exhaustive(goal: &[u64], buttons: &[Button]) {
        let found = solve(goal, buttons);
        if let Some(presses) = &found {
            assert_eq!(goal, accumulate_joltages(goal.len(), buttons, presses).as_slice());
        }
        assert_eq!(
            exhaustive_min_total(goal, buttons),
            found.as_deref().map(total),
            "goal {goal:?} buttons {buttons:?}"
        );
    }

    #[test]
    fn it_works() -> Result<()> {
        assert_eq!("33", process(SAMPLE)?);
        Ok(())
    }

    #[rstest]
    #[case(0, 10)]
    #[case(1, 12)]
    #[case(2, 11)]
    fn sample_machines_round_trip(#[case] index: usize, #[case] expected: u64) -> Result<()> {
        let machines = machine::parse(SAMPLE)?;
        let m = &machines[index];
        let goal = m.joltages.clone().ok_or_else(|| miette!("missing joltages"))?;

        let presses = solve(&goal, &m.buttons).ok_or_else(|| miette!("unsolvable"))?;
        assert_eq!(m.buttons.len(), presses.len());
        assert_eq!(goal, m.joltages_after(&presses));
        assert_eq!(expected, total(&presses));
        Ok(())
    }

    #[rstest]
    #[case(vec![2, 3], vec![vec![0], vec![1]], vec![2, 3])]
    #[case(vec![3, 4], vec![vec![0, 1], vec![1]], vec![3, 1])]
    #[case(vec![3, 4], vec![vec![0], vec![0, 1], vec![1]], vec![0, 3, 1])]
    #[case(vec![0, 0], vec![], vec![])]
    #[case(vec![], vec![vec![0], vec![1]], vec![0, 0])]
    fn exact_press_vectors(
        #[case] goal: Vec<u64>,
        #[case] buttons: Vec<Button>,
        #[case] expected: Vec<u64>,
    ) {
        assert_eq!(Some(expected), solve(&goal, &buttons));
    }

    #[rstest]
    #[case(vec![1, 2], vec![vec![0, 1]])]
    #[case(vec![1, 0], vec![vec![0, 1], vec![1]])]
    #[case(vec![1], vec![])]
    #[case(vec![1, 1, 3], vec![vec![0, 1], vec![1, 2]])]
    fn unreachable_goals_are_rejected(#[case] goal: Vec<u64>, #[case] buttons: Vec<Button>) {
        assert_eq!(None, solve(&goal, &buttons));
    }

    #[rstest]
    #[case(vec![1, 1], vec![vec![0, 1], vec![], vec![0, 1]], 1)]
    #[case(vec![3, 3, 4], vec![vec![0, 1], vec![2], vec![], vec![2]], 7)]
    #[case(vec![2, 2], vec![vec![0, 1], vec![0, 1], vec![0, 1]], 2)]
    #[case(vec![2, 1], vec![vec![], vec![0], vec![0], vec![1], vec![]], 3)]
    #[case(vec![4, 4, 2], vec![vec![0, 1], vec![0, 1, 2], vec![2], vec![0, 1]], 4)]
    #[case(vec![0, 0, 0], vec![vec![], vec![0, 2], vec![1]], 0)]
    fn repeated_and_empty_buttons_stay_minimal(
        #[case] goal: Vec<u64>,
        #[case] buttons: Vec<Button>,
        #[case] expected: u64,
    ) {
        let presses = solve(&goal, &buttons).expect("reachable");
        assert_eq!(goal, accumulate_joltages(goal.len(), &buttons, &presses));
        assert_eq!(expected, total(&presses));
        assert_eq!(exhaustive_min_total(&goal, &buttons), Some(expected));
    }

    #[test]
    fn every_three_button_system_on_three_positions_is_minimal() {
        let shapes = all_buttons(3);
        for buttons in (0..3).map(|_| shapes.iter().cloned()).multi_cartesian_product() {
            for goal in (0..3).map(|_| 0..=2u64).multi_cartesian_product() {
                assert_matches_exhaustive(&goal, &buttons);
            }
        }
    }

    #[test]
    fn every_four_button_system_on_two_positions_is_minimal() {
        let shapes = all_buttons(2);
        for buttons in (0..4).map(|_| shapes.iter().cloned()).multi_cartesian_product() {
            for goal in (0..2).map(|_| 0..=2u64).multi_cartesian_product() {
                assert_matches_exhaustive(&goal, &buttons);
            }
        }
    }

    #[test]
    fn two_free_buttons_prefer_shared_presses() {
        let goal = [2, 3];
        let buttons = vec![vec![0], vec![1], vec![0, 1], vec![0, 1]];

        let sys = LinearSystem::new(&goal, &buttons);
        let decomposition = sys.decompose().expect("decomposes");
        assert_eq!(2, decomposition.rank);
        assert_eq!(2, decomposition.null_basis.nrows());

        let presses = solve(&goal, &buttons).expect("reachable");
        assert_eq!(vec![2, 3], accumulate_joltages(2, &buttons, &presses));
        assert_eq!(3, total(&presses));
    }

    #[test]
    fn three_free_buttons_use_parallel_scan() {
        let goal = [5];
        let buttons = vec![vec![0]; 4];

        let sys = LinearSystem::new(&goal, &buttons);
        let decomposition = sys.decompose().expect("decomposes");
        assert_eq!(1, decomposition.rank);
        assert_eq!(3, decomposition.null_basis.nrows());

        let presses = solve(&goal, &buttons).expect("reachable");
        assert_eq!(5, total(&presses));
    }

    #[test]
    fn many_free_buttons_match_brute_force() {
        let goal = [4, 3];
        let buttons = vec![vec![0], vec![1], vec![0, 1], vec![0, 1], vec![0], vec![1]];
        let sys = LinearSystem::new(&goal, &buttons);

        let decomposition = sys.decompose().expect("decomposes");
        assert_eq!(4, decomposition.null_basis.nrows());

        let exhaustive = full_rank::brute_force(&sys).expect("reachable");
        let presses = solve(&goal, &buttons).expect("reachable");
        assert_eq!(vec![4, 3], accumulate_joltages(2, &buttons, &presses));
        assert_eq!(exhaustive.total as u64, total(&presses));
        assert_eq!(4, total(&presses));
    }

    #[test]
    fn sample_null_space_has_two_dimensions() -> Result<()> {
        let machines = machine::parse(SAMPLE)?;
        let m = &machines[0];
        let goal = m.joltages.clone().ok_or_else(|| miette!("missing joltages"))?;

        let sys = LinearSystem::new(&goal, &m.buttons);
        let decomposition = sys.decompose().ok_or_else(|| miette!("svd failed"))?;
        assert_eq!(4, decomposition.rank);
        assert_eq!(2, decomposition.null_basis.nrows());
        Ok(())
    }

    #[test]
    fn reduced_directions_isolate_free_buttons() {
        let goal = [4, 3];
        let buttons = vec![vec![0], vec![1], vec![0, 1], vec![0, 1], vec![0], vec![1]];
        let sys = LinearSystem::new(&goal, &buttons);
        let decomposition = sys.decompose().expect("decomposes");

        let lattice = lattice::Lattice::new(&sys, &decomposition.particular, decomposition.null_basis);
        assert_eq!(4, lattice.free.len());
        for (i, direction) in lattice.directions.iter().enumerate() {
            for (j, &f) in lattice.free.iter().enumerate() {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((direction[f] - expected).abs() < 1e-9);
            }
        }
        for &f in &lattice.free {
            assert!(lattice.origin[f].abs() < 1e-9);
        }
    }

    #[test]
    fn local_searches_recover_from_bad_rounding() {
        let goal = [3, 4];
        let buttons = vec![vec![0, 1], vec![1]];
        let sys = LinearSystem::new(&goal, &buttons);
        let expected = Candidate {
            presses: vec![3, 1],
            total: 4,
        };

        assert_eq!(Some(expected.clone()), full_rank::search_around(&sys, &[2, 0], SEARCH_RADIUS));
        assert_eq!(Some(expected.clone()), full_rank::perturb(&sys, &[3, 2]));
        assert_eq!(None, full_rank::perturb(&sys, &[0, 0]));
        assert_eq!(Some(expected), full_rank::brute_force(&sys));
    }

    #[test]
    fn verification_rejects_negative_counts() {
        let sys = LinearSystem::new(&[2, 0], &[vec![0], vec![0], vec![1]]);
        assert!(sys.verify(&[1, 1, 0]));
        assert!(!sys.verify(&[3, -1, 0]));
        assert!(!sys.verify(&[2, 0, 1]));
    }

    #[test]
    fn solving_twice_gives_the_same_answer() -> Result<()> {
        let machines = machine::parse(SAMPLE)?;
        for m in &machines {
            let goal = m.joltages.clone().ok_or_else(|| miette!("missing joltages"))?;
            assert_eq!(solve(&goal, &m.buttons), solve(&goal, &m.buttons));
        }
        Ok(())
    }

    #[test]
    fn missing_joltages_is_an_error() {
        assert!(process("[.#] (1)").is_err());
    }
}
