use std::{
    fs,
    path::Path,
    process, thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};

use evy::{
    cli::{Cli, Command},
    evaluator::{self, EvalError, Evaluator, Event, SleepingYielder, StdRuntime},
    lexer,
    parser::{self, ParseErrors},
};

/// Parse errors shown before the rest are elided.
const MAX_ERRORS: usize = 8;

const FRAME: Duration = Duration::from_millis(16);

fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))
}

fn report_parse_errors(errors: &ParseErrors) {
    eprintln!("{}", errors.truncate(MAX_ERRORS));
    if errors.len() > MAX_ERRORS {
        eprintln!("...");
    }
}

/// Maps the outcome of an evaluation to a process exit code.
fn exit_code(result: Result<(), EvalError>) -> i32 {
    let Err(err) = result else {
        return 0;
    };
    if let Some(code) = err.exit_code() {
        return code;
    }
    match err.unlocated() {
        EvalError::Stopped => 0,
        EvalError::Parse(errors) => {
            report_parse_errors(errors);
            1
        }
        _ => {
            eprintln!("{}", err);
            1
        }
    }
}

fn run(path: &Path, frames: usize, skip_sleep: bool) -> Result<i32> {
    let source = read_source(path)?;
    let runtime = StdRuntime { skip_sleep };
    let mut evaluator =
        Evaluator::new(Box::new(runtime)).with_yielder(Box::new(SleepingYielder::new()));
    info!("running {}", path.display());
    if let Err(err) = evaluator.run(&source) {
        return Ok(exit_code(Err(err)));
    }

    let handlers = evaluator.event_handler_names();
    if frames == 0 || !handlers.iter().any(|name| name == "animate") {
        return Ok(0);
    }
    debug!("driving animate for {} frames", frames);
    let start = Instant::now();
    let stopped = evaluator.stopped_flag();
    for _ in 0..frames {
        if stopped.get() {
            break;
        }
        let elapsed = start.elapsed().as_secs_f64() * 1000.0;
        if let Err(err) = evaluator.handle_event(Event::animate(elapsed)) {
            return Ok(exit_code(Err(err)));
        }
        if !skip_sleep {
            thread::sleep(FRAME);
        }
    }
    Ok(0)
}

fn fmt(path: &Path, write: bool, check: bool) -> Result<i32> {
    let source = read_source(path)?;
    let program = match parser::parse(&source, &evaluator::builtins()) {
        Ok(program) => program,
        Err(errors) => {
            report_parse_errors(&errors);
            return Ok(1);
        }
    };
    let formatted = program.format();
    if check {
        if formatted != source {
            eprintln!("{} is not formatted", path.display());
            return Ok(1);
        }
    } else if write {
        if formatted != source {
            fs::write(path, &formatted)
                .with_context(|| format!("cannot write {}", path.display()))?;
            info!("formatted {}", path.display());
        }
    } else {
        print!("{}", formatted);
    }
    Ok(0)
}

fn main() -> Result<()> {
    env_logger::init();
    let code = match Cli::parse().command {
        Command::Run {
            path,
            frames,
            skip_sleep,
        } => run(&path, frames, skip_sleep)?,
        Command::Fmt { path, write, check } => fmt(&path, write, check)?,
        Command::Tokens { path } => {
            print!("{}", lexer::dump(&read_source(&path)?));
            0
        }
    };
    process::exit(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes() {
        assert_eq!(exit_code(Ok(())), 0);
        assert_eq!(exit_code(Err(EvalError::Exit(3))), 3);
        assert_eq!(exit_code(Err(EvalError::Stopped)), 0);
        assert_eq!(exit_code(Err(EvalError::UserPanic("boom".into()))), 1);
    }
}
