use std::io::{self, BufRead, Write};

use crate::error::DeployError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssumeYes {
    AlwaysAsk,
    DefaultYes,
}

impl AssumeYes {
    pub fn from_boolean(assume_yes: bool) -> Self {
        if assume_yes {
            AssumeYes::DefaultYes
        } else {
            AssumeYes::AlwaysAsk
        }
    }
}

/// Asks the operator to confirm the next step. Declining is a cancellation.
pub fn ask_user_to_confirm(message: &str, assume_yes: AssumeYes) -> anyhow::Result<()> {
    if assume_yes == AssumeYes::DefaultYes {
        return Ok(());
    }

    let stdin = io::stdin();
    confirm_from(message, &mut stdin.lock())
}

fn confirm_from(message: &str, input: &mut impl BufRead) -> anyhow::Result<()> {
    loop {
        print!("{message} [y/N]: ");
        io::stdout().flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Err(DeployError::Cancelled.into());
        }

        match line.trim().to_lowercase().as_str() {
            "y" | "yes" => return Ok(()),
            "" | "n" | "no" => return Err(DeployError::Cancelled.into()),
            _ => println!("Please answer 'y' or 'n'."),
        }
    }
}

/// Presents a numbered list of choices and returns the one picked.
pub fn ask_user_to_choose<T>(message: &str, choices: &[T]) -> anyhow::Result<T>
where
    T: Copy + std::fmt::Display,
{
    let stdin = io::stdin();
    choose_from(message, choices, &mut stdin.lock())
}

fn choose_from<T>(message: &str, choices: &[T], input: &mut impl BufRead) -> anyhow::Result<T>
where
    T: Copy + std::fmt::Display,
{
    if choices.is_empty() {
        anyhow::bail!("No choices available for prompt '{message}'");
    }

    loop {
        println!("{message}");
        for (i, choice) in choices.iter().enumerate() {
            println!("  {}) {choice}", i + 1);
        }
        print!("Enter a number between 1 and {}: ", choices.len());
        io::stdout().flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Err(DeployError::Cancelled.into());
        }

        match line.trim().parse::<usize>() {
            Ok(n) if (1..=choices.len()).contains(&n) => return Ok(choices[n - 1]),
            _ => println!("'{}' is not a valid choice.", line.trim()),
        }
    }
}

/// Reads a single free-text answer, falling back to `default` on an empty line.
pub fn ask_user_for_value(message: &str, default: Option<&str>) -> anyhow::Result<String> {
    let stdin = io::stdin();
    value_from(message, default, &mut stdin.lock())
}

fn value_from(
    message: &str,
    default: Option<&str>,
    input: &mut impl BufRead,
) -> anyhow::Result<String> {
    loop {
        match default {
            Some(default) => print!("{message} [{default}]: "),
            None => print!("{message}: "),
        }
        io::stdout().flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Err(DeployError::Cancelled.into());
        }

        let answer = line.trim();
        if !answer.is_empty() {
            return Ok(answer.to_string());
        }
        if let Some(default) = default {
            return Ok(default.to_string());
        }
    }
}
