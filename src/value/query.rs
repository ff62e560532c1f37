//! Request-like values exposing query parameters.

use super::{CacheValue, ToCacheValue};
use url::Url;

/// Query parameters of an incoming request.
///
/// Keys keep the position of their first occurrence and the value of their
/// last one, matching how web frameworks expose repeated parameters as a
/// single-valued mapping.
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    params: Vec<(String, CacheValue)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an `application/x-www-form-urlencoded` query string. A leading
    /// `?` is ignored.
    pub fn parse(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut params = Self::new();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            params.insert(key.into_owned(), value.into_owned());
        }
        params
    }

    pub fn from_url(url: &Url) -> Self {
        let mut params = Self::new();
        for (key, value) in url.query_pairs() {
            params.insert(key.into_owned(), value.into_owned());
        }
        params
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl ToCacheValue) {
        let key = key.into();
        let value = value.to_cache_value();
        match self.params.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.params.push((key, value)),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl ToCacheValue) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&CacheValue> {
        self.params.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CacheValue)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

impl ToCacheValue for QueryParams {
    fn to_cache_value(&self) -> CacheValue {
        CacheValue::Request(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_str(value: Option<&CacheValue>) -> Option<&str> {
        match value {
            Some(CacheValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    #[test]
    fn test_parse_keeps_first_position_and_last_value() {
        let params = QueryParams::parse("?page=1&sort=name&page=3");
        let keys: Vec<_> = params.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["page", "sort"]);
        assert_eq!(as_str(params.get("page")), Some("3"));
    }

    #[test]
    fn test_parse_decodes_percent_encoding() {
        let params = QueryParams::parse("q=hello%20world&tag=a+b");
        assert_eq!(as_str(params.get("q")), Some("hello world"));
        assert_eq!(as_str(params.get("tag")), Some("a b"));
    }

    #[test]
    fn test_from_url() {
        let url = Url::parse("https://example.com/reports?year=2025&region=eu").unwrap();
        let params = QueryParams::from_url(&url);
        assert_eq!(params.len(), 2);
        assert_eq!(as_str(params.get("region")), Some("eu"));
    }
}
