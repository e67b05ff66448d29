//! Request parameter declarations and supplied parameter values.
//!
//! A request type declares its [`Parameter`]s once; callers supply values as
//! a [`ParameterCollection`], an ordered list of key/value pairs that may
//! repeat keys.

use percent_encoding::percent_decode_str;
use regex::Regex;

use crate::{Error, Result};

/// Where a parameter is placed in the request URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    /// Substituted into the REST path template.
    Path,
    /// Appended to the query string.
    Query,
}

/// A parameter declared by a request type.
///
/// # Examples
///
/// ```
/// use vws_client::parameter::{Parameter, ParameterKind};
///
/// let target_id = Parameter::path("targetId").required();
/// assert_eq!(target_id.kind(), ParameterKind::Path);
/// assert!(target_id.is_required());
///
/// let page = Parameter::query("page").with_default("1").with_pattern(r"^\d+$").unwrap();
/// assert!(page.validate("3"));
/// assert!(!page.validate("three"));
/// ```
#[derive(Debug, Clone)]
pub struct Parameter {
    name: String,
    kind: ParameterKind,
    required: bool,
    default_value: Option<String>,
    pattern: Option<Regex>,
}

impl Parameter {
    /// Declares an optional parameter of the given kind.
    pub fn new(name: impl Into<String>, kind: ParameterKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            default_value: None,
            pattern: None,
        }
    }

    /// Declares an optional path parameter.
    pub fn path(name: impl Into<String>) -> Self {
        Self::new(name, ParameterKind::Path)
    }

    /// Declares an optional query parameter.
    pub fn query(name: impl Into<String>) -> Self {
        Self::new(name, ParameterKind::Query)
    }

    /// Marks the parameter as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Sets the value used when the caller supplies an empty value.
    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Sets a regular expression every non-empty value must match.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern does not compile.
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| {
            Error::ConfigurationError(format!(
                "Invalid pattern for parameter \"{}\": {}",
                self.name, e
            ))
        })?;
        self.pattern = Some(regex);
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ParameterKind {
        self.kind
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn default_value(&self) -> Option<&str> {
        self.default_value.as_deref()
    }

    /// Checks a supplied value against this declaration.
    ///
    /// An empty value is valid only for optional parameters; a non-empty
    /// value must match the pattern, if one is declared.
    pub fn validate(&self, value: &str) -> bool {
        if value.is_empty() {
            return !self.required;
        }
        self.pattern
            .as_ref()
            .map_or(true, |pattern| pattern.is_match(value))
    }
}

/// A value for one parameter name; multiple values expand to one pair each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterValue {
    Single(String),
    Multiple(Vec<String>),
}

impl From<String> for ParameterValue {
    fn from(value: String) -> Self {
        ParameterValue::Single(value)
    }
}

impl From<&str> for ParameterValue {
    fn from(value: &str) -> Self {
        ParameterValue::Single(value.to_string())
    }
}

impl From<&String> for ParameterValue {
    fn from(value: &String) -> Self {
        ParameterValue::Single(value.clone())
    }
}

impl From<Vec<String>> for ParameterValue {
    fn from(values: Vec<String>) -> Self {
        ParameterValue::Multiple(values)
    }
}

impl From<Vec<&str>> for ParameterValue {
    fn from(values: Vec<&str>) -> Self {
        ParameterValue::Multiple(values.into_iter().map(str::to_string).collect())
    }
}

/// An ordered collection of key/value pairs. Keys may repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterCollection {
    pairs: Vec<(String, String)>,
}

impl ParameterCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a single pair.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    /// Returns `true` if at least one pair has this key.
    pub fn contains_key(&self, key: &str) -> bool {
        self.first_match(key).is_some()
    }

    /// Returns the value of the first pair with this key.
    pub fn first_match(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns every value stored under this key, in insertion order.
    pub fn all_matches<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.pairs
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Parses a URL encoded query string such as `foo=bar&chocolate=cookie`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidQueryString`] if a part does not contain
    /// exactly one `=`.
    pub fn from_query_string(query: &str) -> Result<Self> {
        let mut collection = Self::new();
        for part in query.split('&') {
            let mut pieces = part.split('=');
            match (pieces.next(), pieces.next(), pieces.next()) {
                (Some(key), Some(value), None) => collection.add(
                    percent_decode_str(key).decode_utf8_lossy(),
                    percent_decode_str(value).decode_utf8_lossy(),
                ),
                _ => {
                    return Err(Error::InvalidQueryString {
                        query: query.to_string(),
                        part: part.to_string(),
                    })
                }
            }
        }
        Ok(collection)
    }

    /// Builds a collection from named values; multi-valued entries expand to
    /// one pair per element.
    ///
    /// ```
    /// use vws_client::parameter::{ParameterCollection, ParameterValue};
    ///
    /// let collection = ParameterCollection::from_values([
    ///     ("targetId", ParameterValue::from("abc")),
    ///     ("tag", ParameterValue::from(vec!["a", "b"])),
    /// ]);
    /// assert_eq!(collection.len(), 3);
    /// assert_eq!(collection.all_matches("tag").collect::<Vec<_>>(), vec!["a", "b"]);
    /// ```
    pub fn from_values<K, V, I>(values: I) -> Self
    where
        K: Into<String>,
        V: Into<ParameterValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut collection = Self::new();
        for (key, value) in values {
            let key = key.into();
            match value.into() {
                ParameterValue::Single(value) => collection.add(key, value),
                ParameterValue::Multiple(values) => {
                    for value in values {
                        collection.add(key.clone(), value);
                    }
                }
            }
        }
        collection
    }
}

impl<'a> IntoIterator for &'a ParameterCollection {
    type Item = &'a (String, String);
    type IntoIter = std::slice::Iter<'a, (String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_string_keeps_duplicates_in_order() {
        let collection = ParameterCollection::from_query_string("a=1&b=x%20y&a=2").unwrap();

        assert_eq!(collection.len(), 3);
        assert_eq!(collection.first_match("a"), Some("1"));
        assert_eq!(collection.all_matches("a").collect::<Vec<_>>(), vec!["1", "2"]);
        assert_eq!(collection.first_match("b"), Some("x y"));
        assert!(!collection.contains_key("c"));
    }

    #[test]
    fn query_string_rejects_parts_without_single_equals() {
        let err = ParameterCollection::from_query_string("a=1&broken").unwrap_err();
        match err {
            Error::InvalidQueryString { part, .. } => assert_eq!(part, "broken"),
            other => panic!("Expected InvalidQueryString, got {:?}", other),
        }
        assert!(ParameterCollection::from_query_string("a=1=2").is_err());
    }

    #[test]
    fn required_parameter_rejects_empty_value() {
        let required = Parameter::path("targetId").required();
        let optional = Parameter::query("filter");

        assert!(!required.validate(""));
        assert!(required.validate("abc"));
        assert!(optional.validate(""));
    }

    #[test]
    fn invalid_pattern_is_a_configuration_error() {
        let result = Parameter::query("x").with_pattern("(unclosed");
        assert!(matches!(result, Err(Error::ConfigurationError(_))));
    }
}
