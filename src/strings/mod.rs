//! # Strings Module
//!
//! Centralizes user-facing strings, system prompts, and help text.
//! Ensures consistency in messaging and easier localization/updates.

pub mod messages;
pub mod prompts;
