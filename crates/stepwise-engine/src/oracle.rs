//! Assertion judging: URL checks and free-text claims against the page.

use crate::llm::{ChatMessage, ChatModel};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

const ORACLE_SYSTEM_PROMPT: &str =
    "You are a strict QA oracle. Answer STRICTLY: PASS or FAIL, then <=2 sentence reason.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub passed: bool,
    pub explanation: String,
}

impl Verdict {
    pub fn pass(explanation: impl Into<String>) -> Self {
        Self {
            passed: true,
            explanation: explanation.into(),
        }
    }

    pub fn fail(explanation: impl Into<String>) -> Self {
        Self {
            passed: false,
            explanation: explanation.into(),
        }
    }
}

#[async_trait]
pub trait Oracle: Send + Sync {
    /// Judge a free-text claim about the rendered page.
    async fn judge(&self, page_html: &str, url: &str, claim: &str) -> Verdict;
}

/// Case-insensitive substring check on the page URL.
pub fn assert_url_contains(url: &str, fragment: &str) -> Verdict {
    Verdict {
        passed: url.to_lowercase().contains(&fragment.to_lowercase()),
        explanation: format!("URL was {}", url),
    }
}

/// Fragment of an assertion of the form `URL contains <fragment>`, if it is one.
pub fn url_assertion_fragment(text: &str) -> Option<&str> {
    const PREFIX: &str = "url contains";
    let head = text.get(..PREFIX.len())?;
    if !head.eq_ignore_ascii_case(PREFIX) {
        return None;
    }
    Some(text[PREFIX.len()..].trim_matches(|c| c == ' ' || c == '\'' || c == '"'))
}

/// Judge one assertion: URL assertions are checked directly, anything else
/// goes to the oracle.
pub async fn evaluate_assertion(oracle: &dyn Oracle, page_html: &str, url: &str, text: &str) -> Verdict {
    match url_assertion_fragment(text) {
        Some(fragment) => assert_url_contains(url, fragment),
        None => oracle.judge(page_html, url, text).await,
    }
}

/// Confirmation-token scan, then an optional LLM judgment.
pub struct KeywordOracle {
    tokens: Vec<String>,
    model: Option<Arc<dyn ChatModel>>,
    snippet_chars: usize,
}

impl KeywordOracle {
    pub fn new(tokens: Vec<String>, model: Option<Arc<dyn ChatModel>>, snippet_chars: usize) -> Self {
        Self {
            tokens: tokens.into_iter().map(|t| t.to_lowercase()).collect(),
            model,
            snippet_chars,
        }
    }

    fn scan(&self, page_html: &str) -> bool {
        let page = page_html.to_lowercase();
        self.tokens.iter().any(|t| page.contains(t.as_str()))
    }
}

#[async_trait]
impl Oracle for KeywordOracle {
    async fn judge(&self, page_html: &str, _url: &str, claim: &str) -> Verdict {
        if self.scan(page_html) {
            return Verdict::pass("Heuristic DOM check suggests confirmation present.");
        }
        let Some(model) = &self.model else {
            return Verdict::fail("No confirmation tokens on the page and no LLM configured.");
        };

        let snippet: String = page_html.chars().take(self.snippet_chars).collect();
        let messages = [
            ChatMessage::system(ORACLE_SYSTEM_PROMPT),
            ChatMessage::user(format!("Assertion: {}\nPage DOM (truncated):\n{}", claim, snippet)),
        ];
        match model.chat(&messages, 0.0).await {
            Ok(answer) => Verdict {
                passed: answer.trim().to_lowercase().starts_with("pass"),
                explanation: answer,
            },
            Err(e) => {
                warn!(claim, "Oracle LLM call failed: {}", e);
                Verdict::fail(format!("Oracle unavailable: {}", e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;

    struct Answer(&'static str);

    #[async_trait]
    impl ChatModel for Answer {
        async fn chat(&self, _messages: &[ChatMessage], _temperature: f32) -> Result<String, LlmError> {
            Ok(self.0.to_string())
        }
    }

    fn tokens() -> Vec<String> {
        vec!["Thank you".into(), "order".into()]
    }

    #[test]
    fn test_url_assertion_routing() {
        assert_eq!(
            url_assertion_fragment("URL contains 'checkout-complete'"),
            Some("checkout-complete")
        );
        assert_eq!(url_assertion_fragment("url contains inventory"), Some("inventory"));
        assert_eq!(url_assertion_fragment("Order is confirmed"), None);
    }

    #[test]
    fn test_assert_url_contains_is_case_insensitive() {
        let verdict = assert_url_contains("https://shop.test/Checkout-Complete.html", "checkout-complete");
        assert!(verdict.passed);
        assert_eq!(verdict.explanation, "URL was https://shop.test/Checkout-Complete.html");
        assert!(!assert_url_contains("https://shop.test/cart", "checkout").passed);
    }

    #[tokio::test]
    async fn test_keyword_scan_short_circuits() {
        let oracle = KeywordOracle::new(tokens(), Some(Arc::new(Answer("FAIL nope"))), 100);
        let verdict = oracle.judge("<h2>THANK YOU for your purchase</h2>", "", "Order placed").await;
        assert!(verdict.passed);
    }

    #[tokio::test]
    async fn test_llm_judgment() {
        let oracle = KeywordOracle::new(tokens(), Some(Arc::new(Answer("PASS. Banner shown."))), 100);
        assert!(oracle.judge("<p>Welcome back</p>", "", "User is logged in").await.passed);

        let oracle = KeywordOracle::new(tokens(), Some(Arc::new(Answer("Fail: no banner"))), 100);
        let verdict = oracle.judge("<p>Welcome back</p>", "", "User is logged in").await;
        assert!(!verdict.passed);
        assert_eq!(verdict.explanation, "Fail: no banner");
    }

    #[tokio::test]
    async fn test_without_model_failed_scan_fails() {
        let oracle = KeywordOracle::new(tokens(), None, 100);
        assert!(!oracle.judge("<p>Welcome</p>", "", "User sees a receipt").await.passed);
    }

    #[tokio::test]
    async fn test_evaluate_assertion_routes_url_checks() {
        let oracle = KeywordOracle::new(tokens(), None, 100);
        let verdict = evaluate_assertion(
            &oracle,
            "",
            "https://www.saucedemo.com/checkout-complete.html",
            "URL contains checkout-complete",
        )
        .await;
        assert!(verdict.passed);
    }
}
