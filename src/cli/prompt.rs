//! Startup prompts
//!
//! Each prompt parses one line into a sum type and re-asks on invalid input,
//! up to `MAX_ATTEMPTS` times. Readers and writers are injected so the
//! prompts run against stdin/stdout in the binary and buffers in tests.

use std::io::{BufRead, Write};

use crate::model::MessageType;
use crate::utils::error::ConfigurationError;

pub const MAX_ATTEMPTS: usize = 3;

/// Parsed answer to the filter prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterChoice {
    Only(MessageType),
    All,
    Invalid,
}

impl FilterChoice {
    pub fn message_type(self) -> Option<MessageType> {
        match self {
            FilterChoice::Only(t) => Some(t),
            FilterChoice::All | FilterChoice::Invalid => None,
        }
    }
}

/// Accepts a 1-based menu number or a subscription name.
pub fn parse_subscription_choice<'a>(input: &str, available: &'a [String]) -> Option<&'a str> {
    let input = input.trim();
    if let Ok(n) = input.parse::<usize>() {
        return n
            .checked_sub(1)
            .and_then(|i| available.get(i))
            .map(String::as_str);
    }
    available
        .iter()
        .find(|name| name.as_str() == input)
        .map(String::as_str)
}

pub fn parse_filter_choice(input: &str) -> FilterChoice {
    match input.trim() {
        "1" => FilterChoice::Only(MessageType::Vip),
        "2" => FilterChoice::Only(MessageType::Regular),
        "" => FilterChoice::All,
        _ => FilterChoice::Invalid,
    }
}

pub fn prompt_subscription<R, W>(
    input: &mut R,
    output: &mut W,
    available: &[String],
) -> Result<String, ConfigurationError>
where
    R: BufRead,
    W: Write,
{
    if available.is_empty() {
        return Err(ConfigurationError::Missing("entities.subscriptions".to_string()));
    }

    for _ in 0..MAX_ATTEMPTS {
        writeln!(output, "\nChoose a subscription:")?;
        for (i, name) in available.iter().enumerate() {
            writeln!(output, "{}: {name}", i + 1)?;
        }
        output.flush()?;

        let Some(line) = read_line(input)? else {
            break;
        };
        if let Some(name) = parse_subscription_choice(&line, available) {
            return Ok(name.to_string());
        }
        writeln!(output, "Invalid choice. Please try again.")?;
    }

    Err(ConfigurationError::SelectionExhausted(MAX_ATTEMPTS))
}

pub fn prompt_filter<R, W>(
    input: &mut R,
    output: &mut W,
) -> Result<Option<MessageType>, ConfigurationError>
where
    R: BufRead,
    W: Write,
{
    for _ in 0..MAX_ATTEMPTS {
        writeln!(output, "\nChoose message type to filter (or press Enter for no filter):")?;
        writeln!(output, "1: VIP messages only")?;
        writeln!(output, "2: Regular messages only")?;
        writeln!(output, "Press Enter: Receive all messages")?;
        output.flush()?;

        let Some(line) = read_line(input)? else {
            break;
        };
        match parse_filter_choice(&line) {
            FilterChoice::Invalid => writeln!(output, "Invalid choice. Please try again.")?,
            choice => return Ok(choice.message_type()),
        }
    }

    Err(ConfigurationError::SelectionExhausted(MAX_ATTEMPTS))
}

/// `None` at end of input.
fn read_line<R: BufRead>(input: &mut R) -> Result<Option<String>, ConfigurationError> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line))
}
