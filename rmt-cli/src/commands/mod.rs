//! CLI command implementations.

pub mod mount;
pub mod reset;
pub mod status;
pub mod sync;
pub mod unmount;

use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};

/// Ask a yes/no question on stdin. Anything but `y`/`yes` is a no.
pub fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush().context("Failed to flush stdout")?;
    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("Failed to read answer")?;
    Ok(is_yes(&answer))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
