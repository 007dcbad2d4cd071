use bitvec::prelude::*;
use miette::*;

use crate::machine::{self, incidence_rows, toggle_lights, Button, Row};

/// Augmented system `[A | b]` over GF(2).
///
/// Rows are equations (one per indicator), columns are variables (one per
/// button) followed by the goal bit. All rows live in one flat bit buffer with
/// a fixed stride of `num_vars + 1` bits.
struct LinearSystem {
    cells: Row,
    stride: usize,
    num_vars: usize,
    num_eqs: usize,
    /// Row holding each button's pivot after `rref`, `None` for free buttons.
    col_to_pivot: Vec<Option<usize>>,
    /// Buttons whose column received no pivot, in ascending order.
    free_vars: Vec<usize>,
}

impl LinearSystem {
    /// Transposes the button-by-indicator incidence rows into the augmented
    /// indicator-by-button system.
    fn new(target: &BitSlice<usize, Lsb0>, incidence: &[Row]) -> Self {
        let num_eqs = target.len();
        let num_vars = incidence.len();
        let stride = num_vars + 1;

        let mut cells = Row::repeat(false, num_eqs * stride);
        for r in 0..num_eqs {
            for (c, button) in incidence.iter().enumerate() {
                if button.get(r).is_some_and(|bit| *bit) {
                    cells.set(r * stride + c, true);
                }
            }
            if target[r] {
                cells.set(r * stride + num_vars, true);
            }
        }

        Self {
            cells,
            stride,
            num_vars,
            num_eqs,
            col_to_pivot: vec![None; num_vars],
            free_vars: Vec::new(),
        }
    }

    #[inline]
    fn at(&self, r: usize, c: usize) -> bool {
        self.cells[r * self.stride + c]
    }

    #[inline]
    fn goal_bit(&self, r: usize) -> bool {
        self.at(r, self.num_vars)
    }

    fn swap_rows(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        for c in 0..self.stride {
            self.cells.swap(a * self.stride + c, b * self.stride + c);
        }
    }

    /// Gauss-Jordan over the flat buffer: each pivot row is XOR-ed into every
    /// other row with a 1 in its column. `false` when some emptied row still
    /// demands a lit indicator.
    fn rref(&mut self) -> bool {
        let mut pivot_row = 0;

        for c in 0..self.num_vars {
            if pivot_row >= self.num_eqs {
                self.free_vars.push(c);
                continue;
            }

            let Some(r) = (pivot_row..self.num_eqs).find(|&r| self.at(r, c)) else {
                self.free_vars.push(c);
                continue;
            };

            self.swap_rows(pivot_row, r);
            self.col_to_pivot[c] = Some(pivot_row);

            // Copy the pivot row out so the buffer can be mutated while XOR-ing
            let start = pivot_row * self.stride;
            let pivot = self.cells[start..start + self.stride].to_bitvec();

            // XOR eliminate other rows (both below AND above for RREF)
            for i in 0..self.num_eqs {
                if i != pivot_row && self.at(i, c) {
                    let start = i * self.stride;
                    let row = &mut self.cells[start..start + self.stride];
                    *row ^= pivot.as_bitslice();
                }
            }
            pivot_row += 1;
        }

        // 0 = 1 in any row past the last pivot means no solution exists
        (pivot_row..self.num_eqs).all(|r| !self.goal_bit(r))
    }

    /// Press vector with every free button unpressed, plus one null-space
    /// vector per free button.
    fn extract_solution_space(&self) -> (Row, Vec<Row>) {
        // With every free variable at 0, each pivot variable takes the value
        // of its row's goal bit.
        let mut x_p = Row::repeat(false, self.num_vars);
        for (c, pivot_row) in self.col_to_pivot.iter().enumerate() {
            if let Some(r) = *pivot_row {
                x_p.set(c, self.goal_bit(r));
            }
        }

        // One basis vector per free variable f: x_f = 1, other free variables 0.
        // In RREF each pivot variable then equals the coefficient of f in its row.
        let basis = self
            .free_vars
            .iter()
            .map(|&f| {
                let mut v = Row::repeat(false, self.num_vars);
                v.set(f, true);
                for (c, pivot_row) in self.col_to_pivot.iter().enumerate() {
                    if let Some(r) = *pivot_row {
                        if self.at(r, f) {
                            v.set(c, true);
                        }
                    }
                }
                v
            })
            .collect();

        (x_p, basis)
    }

    /// Press vector with the fewest set bits, found by walking every
    /// combination of free buttons in Gray-code order.
    fn solve_min_weight(mut self) -> Option<Row> {
        if !self.rref() {
            tracing::debug!(
                equations = self.num_eqs,
                buttons = self.num_vars,
                "indicator system is inconsistent"
            );
            return None;
        }

        let (mut current_sol, null_basis) = self.extract_solution_space();
        let k = null_basis.len();
        tracing::debug!(free_vars = k, "indicator system reduced");

        let mut best = current_sol.clone();
        let mut min_weight = best.count_ones();

        // Step i flips exactly one free variable: the one at the lowest set
        // bit of i. After 2^k - 1 steps every combination has been visited.
        let Some(num_combinations) = 1usize.checked_shl(k as u32) else {
            tracing::warn!(free_vars = k, "too many free buttons to enumerate");
            return None;
        };
        for i in 1..num_combinations {
            let basis_idx = i.trailing_zeros() as usize;
            current_sol ^= &null_basis[basis_idx];

            let weight = current_sol.count_ones();
            if weight < min_weight {
                min_weight = weight;
                best.copy_from_bitslice(&current_sol);
            }
        }

        Some(best)
    }
}

/// Finds the press vector with the fewest pressed buttons that turns the
/// all-off indicators into `goal`, or `None` when no combination reaches it.
pub fn solve(goal: &BitSlice<usize, Lsb0>, buttons: &[Button]) -> Option<Row> {
    let incidence = incidence_rows(goal.len(), buttons);
    let presses = LinearSystem::new(goal, &incidence).solve_min_weight()?;
    debug_assert_eq!(goal, toggle_lights(goal.len(), buttons, &presses).as_bitslice());
    Some(presses)
}

#[tracing::instrument]
pub fn process(input: &str) -> Result<String> {
    let machines = machine::parse(input)?;

    let mut total_presses = 0;
    for (i, m) in machines.iter().enumerate() {
        let presses = LinearSystem::new(&m.lights, &m.button_matrix())
            .solve_min_weight()
            .ok_or_else(|| miette!("Machine {} cannot reach its indicator pattern", i + 1))?;
        debug_assert_eq!(m.lights, m.lights_after(&presses));
        total_presses += presses.count_ones();
    }

    Ok(total_presses.to_string())
}
