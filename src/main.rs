use jsh::Interpreter;
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut shell = match Interpreter::new() {
        Ok(shell) => shell,
        Err(e) => {
            eprintln!("jsh: {e}");
            return ExitCode::FAILURE;
        }
    };
    match shell.repl() {
        Ok(code) => ExitCode::from((code & 0xff) as u8),
        Err(e) => {
            eprintln!("jsh: {e}");
            ExitCode::FAILURE
        }
    }
}
