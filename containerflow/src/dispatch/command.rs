//! Argument-vector construction for local stages.
//!
//! Command lines are split into an explicit argv up front and are never
//! handed to a shell.

use crate::config::VolumeMount;
use thiserror::Error;

/// Container runtimes whose `run` subcommand accepts `-v`.
const CONTAINER_RUNTIMES: &[&str] = &["docker", "podman"];

/// Flags that already declare a mount.
const MOUNT_FLAGS: &[&str] = &["-v", "--volume", "--mount"];

/// Error returned when a command line cannot be tokenized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenizeError {
    /// A quote was opened but never closed.
    #[error("unterminated {0} quote")]
    UnterminatedQuote(char),
    /// The line ended with a lone backslash.
    #[error("dangling escape at end of command")]
    DanglingEscape,
}

/// Splits a command line into arguments.
///
/// Whitespace separates arguments. Single quotes preserve their contents
/// literally; double quotes allow `\"` and `\\` escapes; a backslash outside
/// quotes escapes the next character.
///
/// # Errors
///
/// Returns an error on an unterminated quote or a trailing backslash.
pub fn tokenize(line: &str) -> Result<Vec<String>, TokenizeError> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_token {
                    args.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            '\'' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(inner) => current.push(inner),
                        None => return Err(TokenizeError::UnterminatedQuote('\'')),
                    }
                }
            }
            '"' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(escaped @ ('"' | '\\')) => current.push(escaped),
                            Some(other) => {
                                current.push('\\');
                                current.push(other);
                            }
                            None => return Err(TokenizeError::UnterminatedQuote('"')),
                        },
                        Some(inner) => current.push(inner),
                        None => return Err(TokenizeError::UnterminatedQuote('"')),
                    }
                }
            }
            '\\' => {
                in_token = true;
                match chars.next() {
                    Some(escaped) => current.push(escaped),
                    None => return Err(TokenizeError::DanglingEscape),
                }
            }
            other => {
                in_token = true;
                current.push(other);
            }
        }
    }

    if in_token {
        args.push(current);
    }
    Ok(args)
}

/// Returns true if `argv` is `<runtime> run ...` for a known container runtime.
#[must_use]
pub fn is_container_run(argv: &[String]) -> bool {
    let Some(program) = argv.first() else {
        return false;
    };
    let name = std::path::Path::new(program)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(program);
    CONTAINER_RUNTIMES.contains(&name) && argv.get(1).is_some_and(|a| a == "run")
}

/// Returns true if `argv` already declares a mount.
#[must_use]
pub fn has_mount_flag(argv: &[String]) -> bool {
    argv.iter().any(|arg| {
        MOUNT_FLAGS.contains(&arg.as_str())
            || MOUNT_FLAGS
                .iter()
                .any(|flag| flag.starts_with("--") && arg.starts_with(&format!("{flag}=")))
    })
}

/// Builds the final argv for a local stage.
///
/// When `argv` is a container `run` invocation without any mount flag and a
/// mount is declared, `-v host:container` is inserted right after `run`.
#[must_use]
pub fn build_argv(argv: &[String], mount: Option<&VolumeMount>) -> Vec<String> {
    let mut out = argv.to_vec();
    if let Some(mount) = mount {
        if is_container_run(&out) && !has_mount_flag(&out) {
            out.splice(2..2, ["-v".to_string(), mount.to_flag_value()]);
        }
    }
    out
}
