//! Interactive editing support
//!
//! Opens $EDITOR for writing task descriptions, and asks for confirmation
//! before destructive commands.

use anyhow::{bail, Context, Result};
use std::env;
use std::fs;
use std::io::{self, IsTerminal, Write};
use std::process::Command;

/// Lines starting with this marker are dropped from the edited text
const COMMENT_MARKER: &str = "#";

/// Open a task description in the user's preferred editor
///
/// Uses $EDITOR, $VISUAL, or falls back to common editors. Returns `None`
/// when the result is empty.
pub fn edit_description(title: &str, initial: Option<&str>) -> Result<Option<String>> {
    let editor = find_editor()?;

    let temp_path = env::temp_dir().join(format!("qadash_task_{}.md", std::process::id()));
    let template = format!(
        "{}\n{} Description for \"{}\". Lines starting with '{}' are ignored.\n",
        initial.unwrap_or(""),
        COMMENT_MARKER,
        title,
        COMMENT_MARKER
    );
    fs::write(&temp_path, template)
        .with_context(|| format!("Failed to create temp file: {:?}", temp_path))?;

    let status = Command::new(&editor)
        .arg(&temp_path)
        .status()
        .with_context(|| format!("Failed to run editor: {}", editor))?;

    if !status.success() {
        let _ = fs::remove_file(&temp_path);
        bail!(
            "Editor '{}' exited with non-zero status. Check that your editor is configured correctly.",
            editor
        );
    }

    let content = fs::read_to_string(&temp_path)
        .with_context(|| format!("Failed to read edited file: {:?}", temp_path))?;
    let _ = fs::remove_file(&temp_path);

    Ok(strip_comments(&content))
}

fn strip_comments(content: &str) -> Option<String> {
    let body = content
        .lines()
        .filter(|line| !line.trim_start().starts_with(COMMENT_MARKER))
        .collect::<Vec<_>>()
        .join("\n");
    let body = body.trim();
    (!body.is_empty()).then(|| body.to_string())
}

/// Find the user's preferred editor
fn find_editor() -> Result<String> {
    for var in ["EDITOR", "VISUAL"] {
        if let Ok(editor) = env::var(var) {
            if !editor.is_empty() {
                return Ok(editor);
            }
        }
    }

    let common_editors = ["nano", "vim", "vi", "emacs", "notepad"];
    for editor in common_editors {
        if command_exists(editor) {
            return Ok(editor.to_string());
        }
    }

    bail!(
        "No editor found. Set $EDITOR environment variable.\n\
         Example: export EDITOR=nano"
    )
}

/// Check if a command exists in PATH
fn command_exists(cmd: &str) -> bool {
    Command::new("which")
        .arg(cmd)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Prompt for confirmation
///
/// Returns true if user confirms, false otherwise.
/// In non-interactive mode (no TTY), returns false.
pub fn confirm(prompt: &str) -> Result<bool> {
    if !io::stdin().is_terminal() {
        return Ok(false);
    }

    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    let input = input.trim().to_lowercase();
    Ok(input == "y" || input == "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_comments() {
        let edited = "Steps:\n1. open login\n# Description for \"x\"\n";
        assert_eq!(
            strip_comments(edited).as_deref(),
            Some("Steps:\n1. open login")
        );
    }

    #[test]
    fn test_strip_comments_empty() {
        assert_eq!(strip_comments("\n# only a comment\n  \n"), None);
    }

    #[test]
    fn test_command_exists() {
        #[cfg(unix)]
        assert!(command_exists("ls"));

        assert!(!command_exists("definitely_not_a_real_command_12345"));
    }
}
