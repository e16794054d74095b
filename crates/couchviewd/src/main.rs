//! Query server binary speaking the view server protocol on standard streams.

use std::io::{self, StderrLock, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    match couchviewd::run() {
        Ok(_) => ExitCode::SUCCESS,
        Err(error) => {
            let mut stderr: StderrLock<'_> = io::stderr().lock();
            let _ = writeln!(stderr, "couchviewd: {error}");
            ExitCode::FAILURE
        }
    }
}
