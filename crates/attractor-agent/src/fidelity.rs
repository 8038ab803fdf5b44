//! Context fidelity modes control how conversation history is managed as it grows.

/// Fidelity mode for managing conversation context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FidelityMode {
    /// Keep full history — no truncation.
    #[default]
    Full,
    /// Truncate old messages, keeping the most recent N messages.
    Truncate { keep_last: usize },
    /// Compact old messages into a summary.
    Compact,
    /// Replace history with an LLM-generated summary.
    Summary,
}

impl FidelityMode {
    /// Parse from a string attribute value.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "full" => FidelityMode::Full,
            "compact" => FidelityMode::Compact,
            "summary" => FidelityMode::Summary,
            s if s.starts_with("truncate") => {
                // Parse "truncate:N" or "truncate(N)"
                let n = s.trim_start_matches("truncate")
                    .trim_start_matches(|c: char| c == ':' || c == '(' || c.is_whitespace())
                    .trim_end_matches(')')
                    .parse::<usize>()
                    .unwrap_or(50);
                FidelityMode::Truncate { keep_last: n }
            }
            _ => FidelityMode::Full,
        }
    }
}

/// Apply fidelity mode to a message history.
/// Returns the processed messages (does NOT modify in place).
pub fn apply_fidelity<T: Clone>(messages: &[T], mode: &FidelityMode) -> Vec<T> {
    match mode {
        FidelityMode::Full => messages.to_vec(),
        FidelityMode::Truncate { keep_last } => {
            if messages.len() <= *keep_last {
                messages.to_vec()
            } else {
                messages[messages.len() - keep_last..].to_vec()
            }
        }
        FidelityMode::Compact | FidelityMode::Summary => {
            // These would need LLM calls; for now just keep all
            messages.to_vec()
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
