//! Output classifier: scrub backend housekeeping from raw output, then decide whether what is
//! left is a usable reply or one of the fallback kinds.
//!
//! Rules run in order and checks short-circuit: keyword detection comes before the empty and
//! length checks, so a short error message is reported as an error.

use regex::Regex;

use crate::exec::{ExecutionResult, FailureKind};

/// Replies shorter than this many UTF-8 bytes are rejected as too short. Counted in bytes, not
/// characters: a two-character CJK reply (6 bytes) passes, while `ok!` does not.
pub const MIN_REPLY_LEN: usize = 5;

const FAILURE_KEYWORDS: &[&str] = &["error", "错误", "failed", "失败", "exception", "异常"];

/// One scrub step: every match of `pattern` is replaced with `replacement`, then the text is trimmed.
#[derive(Debug, Clone)]
pub struct ScrubRule {
    pattern: Regex,
    replacement: String,
}

impl ScrubRule {
    pub fn new(pattern: Regex, replacement: impl Into<String>) -> Self {
        Self {
            pattern,
            replacement: replacement.into(),
        }
    }

    /// Remove every match of `pattern`.
    pub fn strip(pattern: Regex) -> Self {
        Self::new(pattern, "")
    }

    fn apply(&self, text: &str) -> String {
        self.pattern
            .replace_all(text, self.replacement.as_str())
            .trim()
            .to_string()
    }
}

/// Backend telemetry block and token-refresh notice, in that order.
fn default_rules() -> Vec<ScrubRule> {
    vec![
        ScrubRule::strip(
            Regex::new(r"(?s)<Execution Info>.*?</Execution Info>")
                .expect("execution info pattern is valid"),
        ),
        ScrubRule::strip(
            Regex::new(r"(?i)OAuth2 令牌刷新成功").expect("token refresh pattern is valid"),
        ),
    ]
}

#[derive(Debug, Clone)]
pub struct OutputClassifier {
    rules: Vec<ScrubRule>,
    keywords: Vec<String>,
    min_len: usize,
}

impl Default for OutputClassifier {
    fn default() -> Self {
        Self {
            rules: default_rules(),
            keywords: FAILURE_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            min_len: MIN_REPLY_LEN,
        }
    }
}

impl OutputClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule after the built-in ones.
    pub fn with_rule(mut self, rule: ScrubRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Apply every scrub rule in order and trim the result.
    pub fn scrub(&self, raw: &str) -> String {
        self.rules
            .iter()
            .fold(raw.trim().to_string(), |text, rule| rule.apply(&text))
    }

    /// Verdict for already-scrubbed text.
    pub fn judge(&self, cleaned: &str) -> ExecutionResult {
        let lower = cleaned.to_lowercase();
        if self.keywords.iter().any(|k| lower.contains(k.as_str())) {
            return ExecutionResult::Fallback(FailureKind::OutputError);
        }
        if cleaned.is_empty() {
            return ExecutionResult::Fallback(FailureKind::EmptyOutput);
        }
        if cleaned.len() < self.min_len {
            return ExecutionResult::Fallback(FailureKind::ShortOutput);
        }
        ExecutionResult::Reply(cleaned.to_string())
    }

    pub fn classify(&self, raw: &str) -> ExecutionResult {
        self.judge(&self.scrub(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(raw: &str) -> ExecutionResult {
        OutputClassifier::default().classify(raw)
    }

    #[test]
    fn execution_info_block_is_removed() {
        let raw = "今天天气不错，适合出去走走。\n<Execution Info>\n\
                   {\"tokens\": 812,\n\"secret\": \"session-abc\"}\n</Execution Info>\n";
        let result = classify(raw);
        assert_eq!(
            result,
            ExecutionResult::Reply("今天天气不错，适合出去走走。".to_string())
        );
        assert!(!result.text().contains("session-abc"));
    }

    #[test]
    fn every_execution_info_block_is_removed() {
        let raw =
            "<Execution Info>a</Execution Info>前半句话<Execution Info>b</Execution Info>后半句话";
        assert_eq!(classify(raw).text(), "前半句话后半句话");
    }

    #[test]
    fn token_refresh_notice_is_removed_case_insensitively() {
        let raw = "oauth2 令牌刷新成功\n好的，我们继续上次的话题吧。";
        assert_eq!(classify(raw).text(), "好的，我们继续上次的话题吧。");
    }

    #[test]
    fn failure_keywords_win_even_in_normal_sentences() {
        for raw in [
            "Request FAILED with status 500",
            "An Error occurred while thinking",
            "这里出现了一个错误，请稍后",
            "java.lang.NullPointerException at line 3",
        ] {
            assert_eq!(
                classify(raw),
                ExecutionResult::Fallback(FailureKind::OutputError),
                "{raw}"
            );
        }
    }

    #[test]
    fn keyword_is_checked_before_length() {
        assert_eq!(classify("失败"), ExecutionResult::Fallback(FailureKind::OutputError));
        assert_eq!(classify(" error "), ExecutionResult::Fallback(FailureKind::OutputError));
    }

    #[test]
    fn nothing_left_is_empty_output() {
        for raw in [
            "",
            "   \n\t",
            "<Execution Info>only telemetry</Execution Info>",
            "OAuth2 令牌刷新成功",
        ] {
            let result = classify(raw);
            assert_eq!(
                result,
                ExecutionResult::Fallback(FailureKind::EmptyOutput),
                "{raw:?}"
            );
            assert_eq!(result.text(), FailureKind::EmptyOutput.fallback_message());
        }
    }

    #[test]
    fn under_five_bytes_is_short_output() {
        assert_eq!(classify("ok!"), ExecutionResult::Fallback(FailureKind::ShortOutput));
        assert_eq!(classify("  嗯 "), ExecutionResult::Fallback(FailureKind::ShortOutput));
        assert_eq!(classify("hello"), ExecutionResult::Reply("hello".to_string()));
        assert_eq!(classify("你好"), ExecutionResult::Reply("你好".to_string()));
    }

    #[test]
    fn clean_reply_is_returned_verbatim_and_stable() {
        let c = OutputClassifier::default();
        let first = c.classify("  你好呀！很高兴认识你。\n第二行  ");
        assert_eq!(first.text(), "你好呀！很高兴认识你。\n第二行");
        assert_eq!(c.classify(first.text()), first);
    }

    #[test]
    fn custom_rule_runs_after_builtin_rules() {
        let c = OutputClassifier::default()
            .with_rule(ScrubRule::strip(Regex::new(r"(?m)^\[debug\].*$").unwrap()));
        assert_eq!(
            c.classify("[debug] warmup\n真正的回答在这里"),
            ExecutionResult::Reply("真正的回答在这里".to_string())
        );
    }
}
