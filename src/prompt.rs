//! Interactive confirmation for destructive commands.

use anyhow::{bail, Result};
use std::io::{BufRead, Write};

/// Ask a yes/no question on stdout and read the answer from stdin.
///
/// Refuses to guess when stdin is not a terminal; callers offer `--yes`
/// for scripted use.
pub fn confirm(question: &str) -> Result<bool> {
    if !atty::is(atty::Stream::Stdin) {
        bail!("{} (stdin is not a terminal; pass --yes to confirm)", question);
    }
    print!("{} [y/N] ", question);
    std::io::stdout().flush()?;

    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(is_yes(&answer))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
