use std::process::ExitCode;

fn main() -> ExitCode {
    match jirrit_lib::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("jirrit: {e}");
            ExitCode::FAILURE
        }
    }
}
