//! The `cli` module holds the interactive parts of the subscriber program:
//! choosing a subscription and a message-type filter at startup.

pub mod prompt;

pub use prompt::{
    FilterChoice, MAX_ATTEMPTS, parse_filter_choice, parse_subscription_choice, prompt_filter,
    prompt_subscription,
};
