mod harness;

pub use harness::{RunResult, run_strata, write_file};
