use std::process::ExitCode;

fn main() -> ExitCode {
    match sqlbridged::run_daemon() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("sqlbridged: {error}");
            ExitCode::FAILURE
        }
    }
}
