// bin/median_filter.rs - Command-line entry point for the median_filter sample.

use std::process::ExitCode;

use compute_samples::application::run_main;
use compute_samples::samples::MedianFilter;

fn main() -> ExitCode {
    run_main(&MedianFilter)
}
