//! `vzip shell`: prompt for archive/extract, a path, and whether to go again.

use anyhow::Result;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use vzip_core::config::VzipConfig;
use vzip_crypto::Key;

/// What the loop does once it has a validated path.
pub(crate) trait ShellActions {
    fn archive(&mut self, source: &Path) -> Result<()>;
    fn extract(&mut self, container: &Path) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Archive,
    Extract,
}

impl Command {
    fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "archive" | "zip" | "a" => Some(Self::Archive),
            "extract" | "unzip" | "x" => Some(Self::Extract),
            _ => None,
        }
    }
}

/// Runs the real CLI operations; the key is derived on first use.
struct CliActions<'a> {
    config: &'a VzipConfig,
    key: Option<Key>,
}

impl CliActions<'_> {
    fn key(&mut self, confirm: bool) -> Result<&Key> {
        if self.key.is_none() {
            self.key = Some(crate::load_key(self.config, confirm)?);
        }
        match &self.key {
            Some(key) => Ok(key),
            None => anyhow::bail!("no key available"),
        }
    }
}

impl ShellActions for CliActions<'_> {
    fn archive(&mut self, source: &Path) -> Result<()> {
        let output = crate::default_container_path(self.config, source);
        let config = self.config;
        let key = self.key(true)?;
        crate::cmd_archive(config, key, source, &output)
    }

    fn extract(&mut self, container: &Path) -> Result<()> {
        let config = self.config;
        let key = self.key(false)?;
        crate::cmd_extract(config, key, container, Path::new(".")).map(|_| ())
    }
}

pub fn run(config: &VzipConfig) -> Result<()> {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut actions = CliActions { config, key: None };
    run_loop(stdin.lock(), stdout.lock(), &mut actions)
}

/// Reads a trimmed line; `None` on EOF.
fn read_line<R: BufRead>(input: &mut R) -> Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn prompt<R: BufRead, W: Write>(input: &mut R, out: &mut W, text: &str) -> Result<Option<String>> {
    writeln!(out, "{text}")?;
    out.flush()?;
    read_line(input)
}

pub(crate) fn run_loop<R, W, A>(mut input: R, mut out: W, actions: &mut A) -> Result<()>
where
    R: BufRead,
    W: Write,
    A: ShellActions,
{
    loop {
        let command = loop {
            let Some(line) = prompt(&mut input, &mut out, "\nCommand (archive/extract):")? else {
                writeln!(out, "Exiting.")?;
                return Ok(());
            };
            match Command::parse(&line) {
                Some(cmd) => break cmd,
                None => writeln!(out, "Unknown command. Type 'archive' or 'extract'.")?,
            }
        };

        let question = match command {
            Command::Archive => "Path of the file or directory to archive:",
            Command::Extract => "Path of the container to extract:",
        };
        let path = loop {
            let Some(line) = prompt(&mut input, &mut out, question)? else {
                writeln!(out, "Exiting.")?;
                return Ok(());
            };
            let path = PathBuf::from(line);
            if path.exists() {
                break path;
            }
            writeln!(out, "'{}' does not exist.", path.display())?;
        };

        let result = match command {
            Command::Archive => actions.archive(&path),
            Command::Extract => actions.extract(&path),
        };
        if let Err(e) = result {
            writeln!(out, "Error: {e:#}")?;
        }

        loop {
            let Some(line) = prompt(&mut input, &mut out, "\nAnother operation? (y/n)")? else {
                writeln!(out, "Exiting.")?;
                return Ok(());
            };
            match line.to_ascii_lowercase().as_str() {
                "y" | "yes" => break,
                "n" | "no" => {
                    writeln!(out, "Exiting.")?;
                    return Ok(());
                }
                _ => writeln!(out, "Please answer 'y' or 'n'.")?,
            }
        }
    }
}
