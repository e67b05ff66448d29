//! URI construction from a REST path template and request parameters.
//!
//! Path templates follow a subset of RFC 6570: a group is written
//! `{[operator]name[:maxlen][*][,name...]}` where the operator is one of
//! `+ # . / ; ? &`. Query parameters are appended after the expanded path.

use std::collections::HashMap;
use std::sync::OnceLock;

use http::Method;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use url::Url;

use crate::parameter::ParameterKind;
use crate::{Error, Result};

/// Everything except RFC 3986 unreserved characters is escaped.
const DATA: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

const OPERATORS: &str = "+#./;?&|!@=";

fn path_group_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{[^{}]*\}").expect("static path group pattern"))
}

pub(crate) fn escape_data(value: &str) -> String {
    utf8_percent_encode(value, DATA).to_string()
}

/// Builds the URI of one request from its path template and parameters.
///
/// # Examples
///
/// ```
/// use http::Method;
/// use url::Url;
/// use vws_client::request_builder::RequestBuilder;
/// use vws_client::parameter::ParameterKind;
///
/// let mut builder = RequestBuilder::new(
///     Url::parse("https://vws.example.com/").unwrap(),
///     "/targets/{targetId}",
///     Method::GET,
/// ).unwrap();
/// builder.add_parameter(ParameterKind::Path, "targetId", "abc");
/// builder.add_parameter(ParameterKind::Query, "verbose", "");
///
/// let uri = builder.build_uri().unwrap();
/// assert_eq!(uri.as_str(), "https://vws.example.com/targets/abc?verbose");
/// ```
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    base_url: Url,
    path: String,
    method: Method,
    path_parameters: HashMap<String, Vec<String>>,
    query_parameters: Vec<(String, String)>,
}

impl RequestBuilder {
    /// Creates a builder for `method` on `path` relative to `base_url`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::UnsupportedMethod`] unless the method is GET, POST,
    /// PUT or DELETE.
    pub fn new(base_url: Url, path: impl Into<String>, method: Method) -> Result<Self> {
        if ![Method::GET, Method::POST, Method::PUT, Method::DELETE].contains(&method) {
            return Err(Error::UnsupportedMethod(method));
        }
        Ok(Self {
            base_url,
            path: path.into(),
            method,
            path_parameters: HashMap::new(),
            query_parameters: Vec::new(),
        })
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Adds a value. Path parameters accumulate values per name; query
    /// parameters keep insertion order.
    pub fn add_parameter(&mut self, kind: ParameterKind, name: &str, value: &str) {
        match kind {
            ParameterKind::Path => self
                .path_parameters
                .entry(name.to_string())
                .or_default()
                .push(value.to_string()),
            ParameterKind::Query => self
                .query_parameters
                .push((name.to_string(), value.to_string())),
        }
    }

    /// Expands the path template, appends the query string and resolves the
    /// result against the base URL.
    pub fn build_uri(&self) -> Result<Url> {
        let mut relative = self.build_rest_path()?;
        if !self.query_parameters.is_empty() {
            relative.push(if relative.contains('?') { '&' } else { '?' });
            let query = self
                .query_parameters
                .iter()
                .map(|(key, value)| {
                    if value.is_empty() {
                        escape_data(key)
                    } else {
                        format!("{}={}", escape_data(key), escape_data(value))
                    }
                })
                .collect::<Vec<_>>()
                .join("&");
            relative.push_str(&query);
        }
        Ok(self.base_url.join(&relative)?)
    }

    fn build_rest_path(&self) -> Result<String> {
        let mut expanded = String::with_capacity(self.path.len());
        let mut last = 0;
        for group in path_group_pattern().find_iter(&self.path) {
            expanded.push_str(&self.path[last..group.start()]);
            let inner = &group.as_str()[1..group.as_str().len() - 1];
            expanded.push_str(&self.expand_group(inner)?);
            last = group.end();
        }
        expanded.push_str(&self.path[last..]);
        Ok(expanded)
    }

    fn expand_group(&self, group: &str) -> Result<String> {
        let (operator, variables) = match group.chars().next() {
            Some(first) if OPERATORS.contains(first) => (Some(first), &group[first.len_utf8()..]),
            _ => (None, group),
        };

        let mut out = String::new();
        for (index, spec) in variables.split(',').enumerate() {
            let (spec, explode) = match spec.strip_suffix('*') {
                Some(stripped) => (stripped, true),
                None => (spec, false),
            };
            let (key, max_len) = match spec.split_once(':') {
                Some((key, len)) => {
                    let len = len.parse::<usize>().map_err(|_| Error::MalformedPathTemplate {
                        path: self.path.clone(),
                        parameter: spec.to_string(),
                    })?;
                    (key, len)
                }
                None => (spec, 0),
            };

            let (prefix, separator) = expansion_rules(operator, key, index, explode);

            let values = self
                .path_parameters
                .get(key)
                .ok_or_else(|| Error::MissingParameter {
                    path: self.path.clone(),
                    name: key.to_string(),
                })?;

            let mut value = values.join(&separator);
            if max_len != 0 && max_len < value.chars().count() {
                value = value.chars().take(max_len).collect();
            }
            if !matches!(operator, Some('+') | Some('#')) && values.len() == 1 {
                value = escape_data(&value);
            }
            out.push_str(&prefix);
            out.push_str(&value);
        }

        if operator == Some(';') {
            if out.ends_with('=') {
                out.pop();
            }
            out = out.replace("=;", ";");
        }
        Ok(out)
    }
}

/// Prefix emitted before a variable and the separator joining its values.
fn expansion_rules(
    operator: Option<char>,
    key: &str,
    index: usize,
    explode: bool,
) -> (String, String) {
    let first = index == 0;
    match operator {
        Some('#') => ((if first { "#" } else { "," }).to_string(), ",".to_string()),
        Some(op @ ('&' | ';')) => {
            let named = format!("{op}{key}=");
            let separator = if explode { named.clone() } else { ",".to_string() };
            (named, separator)
        }
        Some('+') => ((if first { "" } else { "," }).to_string(), ",".to_string()),
        Some(op @ ('.' | '/')) => {
            let separator = if explode { op.to_string() } else { ",".to_string() };
            (op.to_string(), separator)
        }
        Some('?') => {
            let prefix = format!("{}{key}=", if first { "?" } else { "&" });
            let separator = if explode {
                format!("&{key}=")
            } else {
                ",".to_string()
            };
            (prefix, separator)
        }
        Some(op) => {
            let prefix = if first { op.to_string() } else { ",".to_string() };
            (prefix, ",".to_string())
        }
        None => ((if first { "" } else { "," }).to_string(), ",".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder(path: &str) -> RequestBuilder {
        RequestBuilder::new(
            Url::parse("https://vws.example.com/").unwrap(),
            path,
            Method::GET,
        )
        .unwrap()
    }

    fn expand(path: &str, params: &[(&str, &str)]) -> String {
        let mut b = builder(path);
        for (name, value) in params {
            b.add_parameter(ParameterKind::Path, name, value);
        }
        b.build_rest_path().unwrap()
    }

    #[test]
    fn test_simple_substitution_is_escaped() {
        assert_eq!(expand("/targets/{targetId}", &[("targetId", "abc")]), "/targets/abc");
        assert_eq!(
            expand("/targets/{targetId}", &[("targetId", "a b/c")]),
            "/targets/a%20b%2Fc"
        );
    }

    #[test]
    fn test_reserved_and_fragment_are_not_escaped() {
        assert_eq!(expand("/x{+path}", &[("path", "/a b")]), "/x/a b");
        assert_eq!(expand("/x{#frag}", &[("frag", "a/b")]), "/x#a/b");
    }

    #[test]
    fn test_multi_value_joins() {
        let values = [("list", "red"), ("list", "green")];
        assert_eq!(expand("/x/{list}", &values), "/x/red,green");
        assert_eq!(expand("/x{/list*}", &values), "/x/red/green");
        assert_eq!(expand("/x{.list*}", &values), "/x.red.green");
        assert_eq!(expand("/x{;list*}", &values), "/x;list=red;list=green");
        assert_eq!(expand("/x{?list*}", &values), "/x?list=red&list=green");
        assert_eq!(expand("/x{?list}", &values), "/x?list=red,green");
    }

    #[test]
    fn test_semicolon_operator_omits_empty_value() {
        assert_eq!(expand("/x{;a,b}", &[("a", "1"), ("b", "")]), "/x;a=1;b");
    }

    #[test]
    fn test_query_operator_with_several_variables() {
        assert_eq!(
            expand("/x{?a,b}", &[("a", "1"), ("b", "2")]),
            "/x?a=1&b=2"
        );
    }

    #[test]
    fn test_prefix_modifier_truncates() {
        assert_eq!(expand("/x/{name:3}", &[("name", "abcdef")]), "/x/abc");
        assert_eq!(expand("/x/{name:30}", &[("name", "abc")]), "/x/abc");
    }

    #[test]
    fn test_malformed_prefix_modifier() {
        let b = builder("/x/{name:abc}");
        match b.build_rest_path() {
            Err(Error::MalformedPathTemplate { parameter, .. }) => {
                assert_eq!(parameter, "name:abc")
            }
            other => panic!("Expected MalformedPathTemplate, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_path_parameter() {
        let b = builder("/targets/{targetId}");
        match b.build_uri() {
            Err(Error::MissingParameter { path, name }) => {
                assert_eq!(path, "/targets/{targetId}");
                assert_eq!(name, "targetId");
            }
            other => panic!("Expected MissingParameter, got {:?}", other),
        }
    }

    #[test]
    fn test_query_assembly_preserves_order_and_bare_keys() {
        let mut b = builder("/x");
        b.add_parameter(ParameterKind::Query, "a", "1");
        b.add_parameter(ParameterKind::Query, "b", "");
        let uri = b.build_uri().unwrap();
        assert_eq!(uri.path(), "/x");
        assert_eq!(uri.query(), Some("a=1&b"));
    }

    #[test]
    fn test_query_appends_to_existing_query() {
        let mut b = builder("/x{?a}");
        b.add_parameter(ParameterKind::Path, "a", "1");
        b.add_parameter(ParameterKind::Query, "b", "two words");
        assert_eq!(b.build_uri().unwrap().query(), Some("a=1&b=two%20words"));
    }

    #[test]
    fn test_unsupported_method() {
        let result = RequestBuilder::new(
            Url::parse("https://vws.example.com/").unwrap(),
            "/x",
            Method::PATCH,
        );
        assert!(matches!(result, Err(Error::UnsupportedMethod(_))));
    }
}
