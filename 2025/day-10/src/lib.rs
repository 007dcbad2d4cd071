pub mod machine;
pub mod part1;
pub mod part2;
