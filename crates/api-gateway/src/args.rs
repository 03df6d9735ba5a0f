//! Argument cursor
//!
//! Commands arrive as a list of tokens. The cursor walks them front to back;
//! keyword matches are case-insensitive.

use common::error::{Error, Result};

/// Splits a command line into tokens
pub fn tokenize(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_string).collect()
}

/// Cursor over command arguments
#[derive(Debug, Clone)]
pub struct ArgsCursor<'a> {
    args: &'a [String],
    offset: usize,
}

impl<'a> ArgsCursor<'a> {
    pub fn new(args: &'a [String]) -> Self {
        Self { args, offset: 0 }
    }

    /// Returns true when every argument was consumed
    pub fn is_at_end(&self) -> bool {
        self.offset >= self.args.len()
    }

    /// Number of arguments left
    pub fn remaining(&self) -> usize {
        self.args.len().saturating_sub(self.offset)
    }

    /// Looks at the next argument without consuming it
    pub fn peek(&self) -> Option<&'a str> {
        self.args.get(self.offset).map(String::as_str)
    }

    /// Consumes the next argument
    pub fn next_arg(&mut self) -> Option<&'a str> {
        let arg = self.peek()?;
        self.offset += 1;
        Some(arg)
    }

    /// Consumes the next argument if it equals `keyword`
    pub fn advance_if_match(&mut self, keyword: &str) -> bool {
        match self.peek() {
            Some(arg) if arg.eq_ignore_ascii_case(keyword) => {
                self.offset += 1;
                true
            }
            _ => false,
        }
    }

    /// Consumes the next argument as an unsigned integer
    ///
    /// `keyword` names the option in the error message.
    pub fn next_u64(&mut self, keyword: &str) -> Result<u64> {
        self.next_arg()
            .and_then(|arg| arg.parse::<u64>().ok())
            .ok_or_else(|| Error::Validation(format!("Invalid argument for {}", keyword)))
    }

    /// Consumes arguments up to (not including) the first `keyword`
    pub fn slice_until(&mut self, keyword: &str) -> &'a [String] {
        let start = self.offset;
        while let Some(arg) = self.peek() {
            if arg.eq_ignore_ascii_case(keyword) {
                break;
            }
            self.offset += 1;
        }
        &self.args[start..self.offset]
    }

    /// Consumes every remaining argument
    pub fn rest(&mut self) -> &'a [String] {
        let start = self.offset.min(self.args.len());
        self.offset = self.args.len();
        &self.args[start..]
    }
}
