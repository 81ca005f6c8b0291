//! Shell completion scripts for the `stage` binary (clap_complete).

use std::{fs, io::Write, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Command, CommandFactory};
use clap_complete::{Shell as CompletionShell, generate, generate_to};

use crate::cli::{Cli, CompletionsArgs, Shell};

impl From<Shell> for CompletionShell
{
    fn from(shell: Shell) -> Self
    {
        match shell
        {
            Shell::Bash => CompletionShell::Bash,
            Shell::Zsh => CompletionShell::Zsh,
            Shell::Fish => CompletionShell::Fish,
            Shell::PowerShell => CompletionShell::PowerShell,
            Shell::Elvish => CompletionShell::Elvish,
        }
    }
}

fn command() -> (Command, String)
{
    let cmd = Cli::command();
    let name = cmd
        .get_name()
        .to_string();
    (cmd, name)
}

/// Write the completion script for `shell` into `out`
pub fn write_script(
    shell: Shell,
    out: &mut dyn Write,
)
{
    let (mut cmd, name) = command();
    generate(CompletionShell::from(shell), &mut cmd, name, out);
}

pub fn run(args: CompletionsArgs) -> Result<()>
{
    if args.stdout
    {
        write_script(args.shell, &mut std::io::stdout());
        return Ok(());
    }

    let dir: PathBuf = args
        .out_dir
        .ok_or_else(|| anyhow::anyhow!("--out-dir is required unless --stdout is set"))?;

    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create completion dir {}", dir.display()))?;

    let (mut cmd, name) = command();
    let path = generate_to(CompletionShell::from(args.shell), &mut cmd, name, &dir)
        .context("Failed to generate completion file")?;

    eprintln!("Wrote completion to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn bash_script_names_the_binary_and_subcommands()
    {
        let mut buf = Vec::new();
        write_script(Shell::Bash, &mut buf);
        let script = String::from_utf8(buf).unwrap();

        assert!(script.contains("stage"));
        assert!(script.contains("manifests"));
        assert!(script.contains("ingest"));
    }
}
