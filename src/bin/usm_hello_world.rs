// bin/usm_hello_world.rs - Command-line entry point for the usm_hello_world sample.

use std::process::ExitCode;

use compute_samples::application::run_main;
use compute_samples::samples::UsmHelloWorld;

fn main() -> ExitCode {
    run_main(&UsmHelloWorld)
}
