//! Size measurement for chunk budgets.

use serde::{Deserialize, Serialize};

const CHARS_PER_TOKEN: usize = 4;

/// Unit in which chunk budgets are measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SizeUnit {
    /// Unicode scalar values
    #[default]
    Chars,
    /// Estimated model tokens (~4 characters per token)
    Tokens,
}

impl SizeUnit {
    /// Measure `text` in this unit.
    ///
    /// Measuring two strings separately never yields less than measuring
    /// their concatenation, so summed sizes are a safe upper bound.
    pub fn measure(self, text: &str) -> usize {
        let chars = text.chars().count();
        match self {
            SizeUnit::Chars => chars,
            SizeUnit::Tokens => chars.div_ceil(CHARS_PER_TOKEN),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chars() {
        assert_eq!(SizeUnit::Chars.measure(""), 0);
        assert_eq!(SizeUnit::Chars.measure("héllo"), 5);
    }

    #[test]
    fn test_tokens_round_up() {
        assert_eq!(SizeUnit::Tokens.measure(""), 0);
        assert_eq!(SizeUnit::Tokens.measure("abc"), 1);
        assert_eq!(SizeUnit::Tokens.measure("abcd"), 1);
        assert_eq!(SizeUnit::Tokens.measure("abcde"), 2);
    }

    #[test]
    fn test_tokens_sum_is_upper_bound() {
        let a = "abcde";
        let b = "fgh";
        let joined = format!("{}{}", a, b);
        assert!(SizeUnit::Tokens.measure(a) + SizeUnit::Tokens.measure(b)
            >= SizeUnit::Tokens.measure(&joined));
    }
}
