use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "evy", about = "Run and format Evy programs.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Evaluate a program
    Run {
        path: PathBuf,
        /// Drive the `animate` handler for this many frames
        #[arg(long, default_value_t = 0)]
        frames: usize,
        /// Return from `sleep` immediately
        #[arg(long)]
        skip_sleep: bool,
    },
    /// Print the program in canonical form
    Fmt {
        path: PathBuf,
        /// Rewrite the file in place
        #[arg(long, conflicts_with = "check")]
        write: bool,
        /// Fail if the file is not formatted
        #[arg(long)]
        check: bool,
    },
    /// Print the token stream, one token per line
    Tokens { path: PathBuf },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Result<Command, clap::Error> {
        let args = std::iter::once("evy").chain(s.split_whitespace());
        Cli::try_parse_from(args).map(|cli| cli.command)
    }

    #[test]
    fn commands() {
        match parse("run prog.evy --frames 10 --skip-sleep") {
            Ok(Command::Run {
                path,
                frames,
                skip_sleep,
            }) => {
                assert_eq!(path, PathBuf::from("prog.evy"));
                assert_eq!(frames, 10);
                assert!(skip_sleep);
            }
            other => panic!("expected run command, got {:?}", other),
        }
        assert!(matches!(
            parse("run prog.evy"),
            Ok(Command::Run { frames: 0, skip_sleep: false, .. })
        ));
        assert!(matches!(
            parse("fmt --check prog.evy"),
            Ok(Command::Fmt { check: true, write: false, .. })
        ));
        assert!(matches!(parse("tokens prog.evy"), Ok(Command::Tokens { .. })));
    }

    #[test]
    fn bad_commands() {
        for input in [
            "",
            "run",
            "fly prog.evy",
            "run prog.evy --frames",
            "run prog.evy --frames many",
            "fmt prog.evy --write --check",
            "tokens prog.evy --write",
            "run a.evy b.evy",
        ] {
            assert!(parse(input).is_err(), "input: {:?}", input);
        }
    }
}
