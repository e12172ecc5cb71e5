mod post;
mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::Result;

#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory in which the per-run temporary directory is created. Defaults to the temporary
    /// directory of the system.
    #[arg(long = "tmp-dir", global = true, env = "RUNNER_TEMP")]
    tmp_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Build the targets described by the action inputs
    Main,

    /// Clean up after the build
    Post,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Main => {
                let tmp_dir = self
                    .tmp_dir
                    .filter(|dir| !dir.as_os_str().is_empty())
                    .unwrap_or_else(std::env::temp_dir);
                run::run(&tmp_dir)?;
            }
            Commands::Post => {
                post::post()?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_works() {
        let cli = Cli::try_parse_from(["bake-action", "main", "--tmp-dir", "/runner/_temp"]).unwrap();
        assert!(matches!(cli.command, Commands::Main));
        assert_eq!(cli.tmp_dir, Some(PathBuf::from("/runner/_temp")));

        let cli = Cli::try_parse_from(["bake-action", "post"]).unwrap();
        assert!(matches!(cli.command, Commands::Post));

        assert!(Cli::try_parse_from(["bake-action"]).is_err());
        assert!(Cli::try_parse_from(["bake-action", "build"]).is_err());
    }
}
