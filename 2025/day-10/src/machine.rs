use bitvec::prelude::*;
use chumsky::prelude::*;
use itertools::Itertools;
use miette::*;

/// A bit vector backed by `usize` words with Least Significant Bit first ordering.
/// Used for indicator patterns, incidence rows and boolean press vectors alike.
pub type Row = BitVec<usize, Lsb0>;

/// The positions a button affects, 0-based. Order carries no meaning.
pub type Button = Vec<usize>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Machine {
    /// Target indicator pattern from the `[.##.]` diagram.
    pub lights: Row,
    pub buttons: Vec<Button>,
    /// Target counters from the `{3,5,4,7}` block, when the line has one.
    pub joltages: Option<Vec<u64>>,
}

impl Machine {
    /// Number of indicators, which is also the number of joltage counters.
    pub fn width(&self) -> usize {
        self.lights.len()
    }

    /// Button-by-indicator incidence matrix: one row per button, one bit per indicator.
    pub fn button_matrix(&self) -> Vec<Row> {
        incidence_rows(self.width(), &self.buttons)
    }

    pub fn lights_after(&self, presses: &BitSlice<usize, Lsb0>) -> Row {
        toggle_lights(self.width(), &self.buttons, presses)
    }

    pub fn joltages_after(&self, presses: &[u64]) -> Vec<u64> {
        accumulate_joltages(self.width(), &self.buttons, presses)
    }
}

/// Builds one `width`-bit row per button. Indices past `width` are dropped.
pub fn incidence_rows(width: usize, buttons: &[Button]) -> Vec<Row> {
    buttons
        .iter()
        .map(|button| {
            let mut row = Row::repeat(false, width);
            for &i in button {
                if i < width {
                    row.set(i, true);
                }
            }
            row
        })
        .collect()
}

/// Starting from all lights off, flips every light of each pressed button.
/// A button lists a set of lights, so a repeated index flips only once.
pub fn toggle_lights(width: usize, buttons: &[Button], presses: &BitSlice<usize, Lsb0>) -> Row {
    let mut lights = Row::repeat(false, width);
    for (button, pressed) in buttons.iter().zip(presses.iter().by_vals()) {
        if !pressed {
            continue;
        }
        for &i in button.iter().unique() {
            if i < width {
                let lit = lights[i];
                lights.set(i, !lit);
            }
        }
    }
    lights
}

/// Starting from all counters at zero, adds each button's press count to every
/// counter it touches.
pub fn accumulate_joltages(width: usize, buttons: &[Button], presses: &[u64]) -> Vec<u64> {
    let mut counters = vec![0; width];
    for (button, &count) in buttons.iter().zip(presses) {
        for &i in button.iter().unique() {
            if i < width {
                counters[i] += count;
            }
        }
    }
    counters
}

/// A decimal integer. Values that do not fit `T` are reported, not truncated.
fn number<'a, T>() -> impl Parser<'a, &'a str, T, extra::Err<Rich<'a, char>>> + Clone
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    text::int(10).try_map(|digits: &str, span| {
        digits
            .parse::<T>()
            .map_err(|e| Rich::custom(span, format!("invalid number {digits}: {e}")))
    })
}

fn parser<'a>() -> impl Parser<'a, &'a str, Vec<Machine>, extra::Err<Rich<'a, char>>> {
    // Horizontal whitespace only, newlines separate machines
    let hspace = one_of(" \t").repeated();

    let light = choice((just('.').to(false), just('#').to(true)));

    // [.##.]
    let diagram = light
        .repeated()
        .collect::<Vec<bool>>()
        .map(|v| v.into_iter().collect::<Row>())
        .delimited_by(just('['), just(']'));

    // (0,2,3)
    let button = number::<usize>()
        .separated_by(just(','))
        .collect::<Vec<usize>>()
        .delimited_by(just('('), just(')'));

    // (0,2) (1,3) ...
    let buttons = button.padded_by(hspace.clone()).repeated().collect::<Vec<_>>();

    // {3,5,4,7}
    let joltages = number::<u64>()
        .separated_by(just(','))
        .collect::<Vec<u64>>()
        .delimited_by(just('{'), just('}'));

    let machine = diagram
        .then_ignore(hspace.clone())
        .then(buttons)
        .then(joltages.or_not())
        .then_ignore(hspace)
        .try_map(|((lights, buttons), joltages), span| {
            let width = lights.len();

            if let Some(&i) = buttons.iter().flatten().find(|&&i| i >= width) {
                return Err(Rich::custom(
                    span,
                    format!("button index {i} is out of range for {width} indicators"),
                ));
            }

            if let Some(counters) = &joltages {
                if counters.len() != width {
                    return Err(Rich::custom(
                        span,
                        format!(
                            "expected {width} joltage counters, found {}",
                            counters.len()
                        ),
                    ));
                }
            }

            Ok(Machine {
                lights,
                buttons,
                joltages,
            })
        });

    machine
        .separated_by(text::newline())
        .allow_trailing()
        .collect::<Vec<_>>()
        .padded()
}

/// Parses one machine per line.
pub fn parse(input: &str) -> Result<Vec<Machine>> {
    parser()
        .parse(input)
        .into_result()
        .map_err(|e| miette!("Parse failed: {:?}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    const SAMPLE: &str = "[.##.] (3) (1,3) (2) (2,3) (0,2) (0,1) {3,5,4,7}
[...#.] (0,2,3,4) (2,3) (0,4) (0,1,2) (1,2,3,4) {7,5,12,7,2}
[.###.#] (0,1,2,3,4) (0,3,4) (0,1,2,4,5) (1,2) {10,11,11,5,10,5}
";

    #[rstest]
    #[case(0, 4, 6)]
    #[case(1, 5, 5)]
    #[case(2, 6, 4)]
    fn parses_sample_shapes(
        #[case] index: usize,
        #[case] width: usize,
        #[case] buttons: usize,
    ) -> Result<()> {
        let machines = parse(SAMPLE)?;
        assert_eq!(3, machines.len());

        let machine = &machines[index];
        assert_eq!(width, machine.width());
        assert_eq!(buttons, machine.buttons.len());
        assert_eq!(Some(width), machine.joltages.as_ref().map(Vec::len));
        Ok(())
    }

    #[test]
    fn parses_diagram_buttons_and_joltages() -> Result<()> {
        let machines = parse(SAMPLE)?;
        let first = &machines[0];

        assert_eq!(bitvec![usize, Lsb0; 0, 1, 1, 0], first.lights);
        assert_eq!(
            vec![
                vec![3],
                vec![1, 3],
                vec![2],
                vec![2, 3],
                vec![0, 2],
                vec![0, 1]
            ],
            first.buttons
        );
        assert_eq!(Some(vec![3, 5, 4, 7]), first.joltages);
        assert_eq!(bitvec![usize, Lsb0; 0, 1, 1, 1, 0, 1], machines[2].lights);
        Ok(())
    }

    #[test]
    fn joltage_block_is_optional() -> Result<()> {
        let machines = parse("[#.] (0) (0,1)\n[..] (1)")?;
        assert_eq!(2, machines.len());
        assert!(machines.iter().all(|m| m.joltages.is_none()));
        Ok(())
    }

    #[test]
    fn accepts_crlf_and_blank_tail() -> Result<()> {
        let machines = parse("[#] (0) {1}\r\n[.] (0) {0}\r\n\r\n")?;
        assert_eq!(2, machines.len());
        Ok(())
    }

    #[rstest]
    #[case("[.#] (0,2) {1,1}")]
    #[case("[.#] (0,1) {1,1,1}")]
    #[case("[.#] (0,1 {1,1}")]
    #[case("[.x] (0) {1,1}")]
    fn rejects_malformed_machines(#[case] input: &str) {
        assert!(parse(input).is_err());
    }

    #[rstest]
    #[case("[.#] (99999999999999999999999) {1,1}")]
    #[case("[.#] (0,1) {1,99999999999999999999999}")]
    fn rejects_numbers_that_overflow(#[case] input: &str) {
        assert!(parse(input).is_err());
    }

    #[test]
    fn button_matrix_marks_affected_indicators() -> Result<()> {
        let machines = parse(SAMPLE)?;
        for machine in &machines {
            let matrix = machine.button_matrix();
            assert_eq!(machine.buttons.len(), matrix.len());
            for (row, button) in matrix.iter().zip(&machine.buttons) {
                assert_eq!(machine.width(), row.len());
                for k in 0..machine.width() {
                    assert_eq!(button.contains(&k), row[k]);
                }
            }
        }
        Ok(())
    }

    #[test]
    fn toggling_twice_cancels_out() {
        let buttons = vec![vec![0, 1], vec![1, 2]];
        let presses = bitvec![usize, Lsb0; 1, 1];
        assert_eq!(
            bitvec![usize, Lsb0; 1, 0, 1],
            toggle_lights(3, &buttons, &presses)
        );
    }

    #[test]
    fn repeated_indices_count_once() {
        let buttons = vec![vec![1, 1]];
        assert_eq!(vec![0, 2], accumulate_joltages(2, &buttons, &[2]));
        assert_eq!(
            bitvec![usize, Lsb0; 0, 1],
            toggle_lights(2, &buttons, bits![usize, Lsb0; 1])
        );
    }

    #[test]
    fn accumulates_counts_per_position() {
        let buttons = vec![vec![0, 1], vec![1]];
        assert_eq!(vec![3, 4], accumulate_joltages(2, &buttons, &[3, 1]));
    }
}
