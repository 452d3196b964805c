//! Command-line interface.

use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::PathBuf;

/// Homebase - household dashboard backend
#[derive(Parser)]
#[command(name = "homebase")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to a config file. Defaults to the usual search locations.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the HTTP server (default)
    Serve,

    /// Create the first administrator account
    Seed {
        /// Administrator email. Prompted if omitted.
        #[arg(long)]
        email: Option<String>,

        /// Administrator password. Prompted if omitted.
        #[arg(long)]
        password: Option<String>,

        /// Display name
        #[arg(long)]
        name: Option<String>,
    },
}

/// Returns `value` or asks for it on stdin. Empty answers are rejected.
pub fn value_or_prompt(value: Option<String>, label: &str) -> anyhow::Result<String> {
    if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
        return Ok(value);
    }

    let stdin = std::io::stdin();
    prompt(&mut stdin.lock(), &mut std::io::stdout(), label)
}

fn prompt<R: BufRead, W: Write>(input: &mut R, output: &mut W, label: &str) -> anyhow::Result<String> {
    write!(output, "{label}: ")?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    let line = line.trim();

    if line.is_empty() {
        anyhow::bail!("{label} is required");
    }

    Ok(line.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_is_default() {
        let cli = Cli::try_parse_from(["homebase"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_parse_seed() {
        let cli = Cli::try_parse_from([
            "homebase",
            "seed",
            "--email",
            "admin@example.com",
            "--config",
            "/tmp/homebase.toml",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("/tmp/homebase.toml")));
        match cli.command {
            Some(Command::Seed {
                email,
                password,
                name,
            }) => {
                assert_eq!(email.as_deref(), Some("admin@example.com"));
                assert!(password.is_none());
                assert!(name.is_none());
            }
            _ => panic!("expected seed command"),
        }
    }

    #[test]
    fn test_prompt_reads_trimmed_line() {
        let mut input = std::io::Cursor::new("  secret-password \n");
        let mut output = Vec::new();
        let value = prompt(&mut input, &mut output, "Password").unwrap();

        assert_eq!(value, "secret-password");
        assert_eq!(String::from_utf8(output).unwrap(), "Password: ");
    }

    #[test]
    fn test_prompt_rejects_empty() {
        let mut input = std::io::Cursor::new("\n");
        let mut output = Vec::new();
        assert!(prompt(&mut input, &mut output, "Email").is_err());
    }

    #[test]
    fn test_value_skips_prompt() {
        let value = value_or_prompt(Some("a@b.c".to_string()), "Email").unwrap();
        assert_eq!(value, "a@b.c");
    }
}
