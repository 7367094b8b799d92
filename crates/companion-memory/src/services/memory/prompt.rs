use super::types::{join_contents, SimilarityResult};
use crate::config::{PromptsConfig, ReplyPolicyConfig};

/// Assembles the completion prompt: persona preamble, companion instructions,
/// relevant history, recent window, then a `{name}:` cue.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    preamble: String,
    relevant_history_intro: String,
}

impl PromptBuilder {
    pub fn new(config: &PromptsConfig) -> Self {
        Self {
            preamble: config.preamble.clone(),
            relevant_history_intro: config.relevant_history_intro.clone(),
        }
    }

    pub fn build(
        &self,
        companion_name: &str,
        instructions: &str,
        relevant: &[SimilarityResult],
        recent_history: &[String],
    ) -> String {
        format!(
            "{}\n\n{}\n\n{}\n{}\n\n\n{}\n{}:",
            self.preamble.replace("{name}", companion_name),
            instructions,
            self.relevant_history_intro.replace("{name}", companion_name),
            join_contents(relevant),
            recent_history.join("\n"),
            companion_name
        )
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(&PromptsConfig::default())
    }
}

/// Post-processing of raw model output: remove `strip_chars`, split on
/// `split_on`, keep one segment, trim it.
///
/// With the defaults this keeps only the first line, so a reply whose first
/// line is empty comes back empty.
#[derive(Debug, Clone)]
pub struct ReplyPolicy {
    strip_chars: Vec<char>,
    split_on: String,
    skip_empty_segments: bool,
}

impl ReplyPolicy {
    pub fn new(config: &ReplyPolicyConfig) -> Self {
        Self {
            strip_chars: config.strip_chars.chars().collect(),
            split_on: config.split_on.clone(),
            skip_empty_segments: config.skip_empty_segments,
        }
    }

    /// The kept segment before trimming.
    pub fn extract(&self, raw: &str) -> String {
        let cleaned: String = raw
            .chars()
            .filter(|c| !self.strip_chars.contains(c))
            .collect();

        if self.split_on.is_empty() {
            return cleaned;
        }

        let mut segments = cleaned.split(self.split_on.as_str());
        let kept = if self.skip_empty_segments {
            segments.find(|s| !s.trim().is_empty())
        } else {
            segments.next()
        };

        kept.unwrap_or_default().to_string()
    }

    pub fn apply(&self, raw: &str) -> String {
        self.extract(raw).trim().to_string()
    }
}

impl Default for ReplyPolicy {
    fn default() -> Self {
        Self::new(&ReplyPolicyConfig::default())
    }
}
