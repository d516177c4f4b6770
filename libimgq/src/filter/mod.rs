//! Tag and label filters.

use crate::error::{ImgqError, Result};
use regex::Regex;
use std::collections::HashMap;


/// A compiled tag pattern.
///
/// A pattern wrapped in slashes (`/^v\d+$/`) is a regular expression that
/// may match anywhere in the tag. Anything else matches one tag exactly.
#[derive(Debug, Clone)]
pub struct TagFilter {
    pattern: String,
    regex: Regex,
}

impl TagFilter {
    /// Compiles `pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`ImgqError::Configuration`] if a `/…/` pattern is not a
    /// valid regular expression.
    ///
    /// # Examples
    ///
    /// ```
    /// use libimgq::filter::TagFilter;
    ///
    /// let filter = TagFilter::new(r"/^v\d+$/").unwrap();
    /// assert!(filter.is_match("v12"));
    /// assert!(!filter.is_match("latest"));
    ///
    /// let literal = TagFilter::new("1.0").unwrap();
    /// assert!(literal.is_match("1.0"));
    /// assert!(!literal.is_match("1x0"));
    /// ```
    pub fn new(pattern: &str) -> Result<Self> {
        let expression = match regex_body(pattern) {
            Some(body) => body.to_string(),
            None => format!("^{}$", regex::escape(pattern)),
        };

        let regex = Regex::new(&expression).map_err(|e| {
            ImgqError::configuration_with_source(format!("Invalid tag pattern '{pattern}'"), e)
        })?;

        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_match(&self, tag: &str) -> bool {
        self.regex.is_match(tag)
    }

    /// Returns the matching tags in their original order.
    pub fn apply<'a, I>(&self, tags: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        tags.into_iter()
            .filter(|tag| self.is_match(tag))
            .cloned()
            .collect()
    }
}

fn regex_body(pattern: &str) -> Option<&str> {
    if pattern.len() >= 2 {
        pattern.strip_prefix('/')?.strip_suffix('/')
    } else {
        None
    }
}

/// Filters `tags` by `pattern`, preserving input order.
///
/// # Examples
///
/// ```
/// use libimgq::filter::filter_tags;
///
/// let tags = vec!["v1".to_string(), "v2".to_string(), "latest".to_string()];
/// assert_eq!(filter_tags(&tags, r"/^v\d+$/").unwrap(), vec!["v1", "v2"]);
/// assert_eq!(filter_tags(&tags, "latest").unwrap(), vec!["latest"]);
/// ```
pub fn filter_tags(tags: &[String], pattern: &str) -> Result<Vec<String>> {
    Ok(TagFilter::new(pattern)?.apply(tags))
}

/// Returns true if every required label is present in `labels` with the
/// identical value.
pub fn labels_match(labels: &HashMap<String, String>, required: &HashMap<String, String>) -> bool {
    required
        .iter()
        .all(|(key, value)| labels.get(key) == Some(value))
}
