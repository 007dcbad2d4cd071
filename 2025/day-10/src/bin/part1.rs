use miette::*;

use aoc2025_day_10::part1;

/// Solves `input1.txt`, or the file given as the first argument.
fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let input = match std::env::args().nth(1) {
        Some(path) => std::fs::read_to_string(&path)
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to read {path}"))?,
        None => include_str!("../../input1.txt").to_string(),
    };
    let result = part1::process(&input)?;
    println!("Result: {}", result);
    Ok(())
}
