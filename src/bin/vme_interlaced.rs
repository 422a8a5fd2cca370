// bin/vme_interlaced.rs - Command-line entry point for the vme_interlaced sample.

use std::process::ExitCode;

use compute_samples::application::run_main;
use compute_samples::samples::VmeInterlaced;

fn main() -> ExitCode {
    run_main(&VmeInterlaced)
}
