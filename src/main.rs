use std::process::ExitCode;

fn main() -> ExitCode {
    teamplay_manifest::app::run()
}
