//! Token budgeting for the writer's input.
//!
//! # Rules
//! - Size is estimated at 4 characters per token
//! - If all extracted text fits under the ceiling (`<=`), every source goes
//!   to the writer verbatim
//! - Otherwise sources are summarized in extraction order while
//!   `running + per_summary * 1.2 < ceiling`; the first source that does not
//!   fit stops the loop and every later source is dropped
//!
//! Allocation is first-come-first-served. There is no ranking by value.

/// Characters per estimated token.
pub const CHARS_PER_TOKEN: f64 = 4.0;

/// Safety factor applied to the per-summary budget when projecting.
pub const SUMMARY_HEADROOM: f64 = 1.2;

/// Summarizer input is capped at this many characters per summary token.
pub const SUMMARY_INPUT_CHARS_PER_TOKEN: usize = 10;

/// Estimated tokens for `chars` characters.
pub fn estimate_tokens(chars: usize) -> f64 {
    chars as f64 / CHARS_PER_TOKEN
}

/// Estimated tokens for a piece of text, counted in characters.
pub fn estimate_text_tokens(text: &str) -> f64 {
    estimate_tokens(text.chars().count())
}

/// Whether all `texts` can be handed to the writer as-is.
///
/// # Postconditions
/// An estimate exactly equal to `ceiling` fits.
pub fn fits_verbatim<'a>(texts: impl IntoIterator<Item = &'a str>, ceiling: usize) -> bool {
    let total_chars: usize = texts.into_iter().map(|t| t.chars().count()).sum();
    estimate_tokens(total_chars) <= ceiling as f64
}

/// Maximum summarizer input length, in characters.
pub fn summary_input_limit(max_tokens_per_summary: usize) -> usize {
    max_tokens_per_summary.saturating_mul(SUMMARY_INPUT_CHARS_PER_TOKEN)
}

/// Running tally for the summarize-until-full loop.
#[derive(Debug, Clone)]
pub struct SummaryBudget {
    ceiling: f64,
    per_summary: f64,
    used: f64,
}

impl SummaryBudget {
    pub fn new(ceiling: usize, max_tokens_per_summary: usize) -> Self {
        Self {
            ceiling: ceiling as f64,
            per_summary: max_tokens_per_summary as f64,
            used: 0.0,
        }
    }

    /// Projected check before summarizing the next source (strict `<`).
    pub fn has_room(&self) -> bool {
        self.used + self.per_summary * SUMMARY_HEADROOM < self.ceiling
    }

    /// Account for a produced summary at its actual size.
    pub fn record(&mut self, summary: &str) {
        self.used += estimate_text_tokens(summary);
    }

    /// Estimated tokens consumed so far.
    pub fn used(&self) -> f64 {
        self.used
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimates_four_chars_per_token() {
        assert_eq!(estimate_tokens(0), 0.0);
        assert_eq!(estimate_tokens(10), 2.5);
        assert_eq!(estimate_text_tokens("héllo wörld!"), 3.0);
    }

    #[test]
    fn exact_ceiling_fits_verbatim() {
        let a = "a".repeat(200);
        let b = "b".repeat(200);
        assert!(fits_verbatim([a.as_str(), b.as_str()], 100));
        let c = "c".repeat(201);
        assert!(!fits_verbatim([a.as_str(), c.as_str()], 100));
    }

    #[test]
    fn projection_is_strict() {
        // 100 * 1.2 == 120: equal is not room.
        let budget = SummaryBudget::new(120, 100);
        assert!(!budget.has_room());
        let budget = SummaryBudget::new(121, 100);
        assert!(budget.has_room());
    }

    #[test]
    fn recorded_summaries_consume_room() {
        let mut budget = SummaryBudget::new(300, 100);
        assert!(budget.has_room());
        budget.record(&"s".repeat(400));
        assert_eq!(budget.used(), 100.0);
        assert!(budget.has_room());
        budget.record(&"s".repeat(400));
        // 200 + 120 >= 300
        assert!(!budget.has_room());
    }

    #[test]
    fn summary_input_is_ten_chars_per_token() {
        assert_eq!(summary_input_limit(1500), 15000);
        assert_eq!(summary_input_limit(usize::MAX), usize::MAX);
    }
}
