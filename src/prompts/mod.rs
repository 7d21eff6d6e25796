//! Prompt module for LLM-based operations.
//!
//! This module provides prompt templates for the summarization call.

pub mod summarize;

pub use summarize::*;
