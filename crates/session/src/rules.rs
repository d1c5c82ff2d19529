//! Ordered keyword rules for deciding whether a login POST succeeded.
//!
//! The site answers both outcomes with HTTP 200 and an HTML page, so the body text
//! is all there is to go on. Rules are tried in order; the first rule with a keyword
//! present in the page decides. When nothing matches, `fallback` decides.

use courtwatch_core::config::LoginConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginVerdict {
    Accepted,
    Rejected,
}

#[derive(Debug, Clone)]
pub struct KeywordRule {
    pub verdict: LoginVerdict,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LoginRules {
    rules: Vec<KeywordRule>,
    fallback: LoginVerdict,
}

impl LoginRules {
    pub fn new(rules: Vec<KeywordRule>, fallback: LoginVerdict) -> Self {
        let rules = rules
            .into_iter()
            .map(|rule| KeywordRule {
                verdict: rule.verdict,
                keywords: rule
                    .keywords
                    .into_iter()
                    .map(|k| k.to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect(),
            })
            .collect();
        Self { rules, fallback }
    }

    /// Failure keywords first, then success keywords
    pub fn from_config(config: &LoginConfig) -> Self {
        let fallback = if config.assume_success_when_unrecognized {
            LoginVerdict::Accepted
        } else {
            LoginVerdict::Rejected
        };
        Self::new(
            vec![
                KeywordRule {
                    verdict: LoginVerdict::Rejected,
                    keywords: config.failure_keywords.clone(),
                },
                KeywordRule {
                    verdict: LoginVerdict::Accepted,
                    keywords: config.success_keywords.clone(),
                },
            ],
            fallback,
        )
    }

    /// First matching rule's verdict and the keyword that matched
    pub fn first_match<'a>(&'a self, body: &str) -> Option<(LoginVerdict, &'a str)> {
        let body = body.to_lowercase();
        self.rules.iter().find_map(|rule| {
            rule.keywords
                .iter()
                .find(|k| body.contains(k.as_str()))
                .map(|k| (rule.verdict, k.as_str()))
        })
    }

    pub fn fallback(&self) -> LoginVerdict {
        self.fallback
    }

    pub fn classify(&self, body: &str) -> LoginVerdict {
        self.first_match(body)
            .map(|(verdict, _)| verdict)
            .unwrap_or(self.fallback)
    }
}

impl Default for LoginRules {
    fn default() -> Self {
        Self::from_config(&LoginConfig::default())
    }
}
