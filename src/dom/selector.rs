//! CSS selectors for marker lookups, backed by `scraper`.

use scraper::ElementRef;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectorError {
    #[error("selector is empty")]
    Empty,
    #[error("invalid selector {selector:?}: {reason}")]
    Invalid { selector: String, reason: String },
}

/// A parsed selector such as `div.call[jsname="CQylAd"]`.
///
/// Keeps the source text for logging and config round trips.
#[derive(Debug, Clone)]
pub struct Selector {
    source: String,
    inner: scraper::Selector,
}

impl Selector {
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        let source = input.trim();
        if source.is_empty() {
            return Err(SelectorError::Empty);
        }

        let inner = scraper::Selector::parse(source).map_err(|e| SelectorError::Invalid {
            selector: source.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            source: source.to_string(),
            inner,
        })
    }

    pub(crate) fn matches(&self, element: &ElementRef<'_>) -> bool {
        self.inner.matches(element)
    }
}

impl PartialEq for Selector {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Selector {}

impl FromStr for Selector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_marker_selector() {
        let selector = Selector::parse(r#"  [jsname="CQylAd"] "#).unwrap();
        assert_eq!(selector.to_string(), r#"[jsname="CQylAd"]"#);
    }

    #[test]
    fn test_from_str() {
        let selector: Selector = "div.call > span".parse().unwrap();
        assert_eq!(selector, Selector::parse("div.call > span").unwrap());
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Selector::parse("   "), Err(SelectorError::Empty));
        assert!(matches!(
            Selector::parse("[jsname="),
            Err(SelectorError::Invalid { .. })
        ));
        assert!(matches!(
            Selector::parse("div >"),
            Err(SelectorError::Invalid { .. })
        ));
    }
}
