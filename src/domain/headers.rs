//! Header-like mappings reported by actions.
//!
//! Actions report whatever their transport returned as a [`Headers`] value.
//! Names are matched case-insensitively; values are either text or numbers,
//! mirroring what HTTP clients and JSON envelopes typically expose.

use std::fmt;

/// A single header value.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    /// Raw textual value, e.g. `"120"` or `"Wed, 21 Oct 2026 07:28:00 GMT"`.
    Text(String),
    /// Numeric value, e.g. a `Retry-After` already decoded to seconds.
    Number(f64),
}

impl HeaderValue {
    /// Numeric interpretation of the value.
    ///
    /// Text is trimmed and parsed as a float; blank text is not a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            HeaderValue::Number(n) => Some(*n),
            HeaderValue::Text(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    trimmed.parse::<f64>().ok()
                }
            }
        }
    }

    /// Textual value, if this is a text header.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            HeaderValue::Text(text) => Some(text),
            HeaderValue::Number(_) => None,
        }
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::Text(text) => f.write_str(text),
            HeaderValue::Number(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::Text(value.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        HeaderValue::Text(value)
    }
}

impl From<f64> for HeaderValue {
    fn from(value: f64) -> Self {
        HeaderValue::Number(value)
    }
}

macro_rules! number_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for HeaderValue {
                fn from(value: $ty) -> Self {
                    HeaderValue::Number(value as f64)
                }
            }
        )*
    };
}

number_from!(f32, i32, i64, u32, u64, usize);

/// Ordered, case-insensitive header mapping.
///
/// Inserting a name that differs only in case from an existing one replaces
/// that entry, so every name appears at most once.
///
/// # Example
/// ```
/// use call_governor::{HeaderValue, Headers};
///
/// let headers = Headers::new()
///     .with("Retry-After", 3)
///     .with("Content-Type", "application/json");
///
/// assert_eq!(headers.get("retry-after"), Some(&HeaderValue::Number(3.0)));
/// assert!(headers.contains("CONTENT-TYPE"));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Headers {
    entries: Vec<(String, HeaderValue)>,
}

impl Headers {
    /// Create an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<HeaderValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert a header, returning the value it replaced.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<HeaderValue>,
    ) -> Option<HeaderValue> {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(index) => {
                let (stored_name, stored_value) = &mut self.entries[index];
                *stored_name = name;
                Some(std::mem::replace(stored_value, value))
            }
            None => {
                self.entries.push((name, value));
                None
            }
        }
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        self.position(name).map(|index| &self.entries[index].1)
    }

    /// Check whether a header is present, ignoring case.
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Number of headers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are no headers.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over headers in insertion order, with their original casing.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(stored, _)| stored.eq_ignore_ascii_case(name))
    }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: Into<String>,
    V: Into<HeaderValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        headers.extend(iter);
        headers
    }
}

impl<K, V> Extend<(K, V)> for Headers
where
    K: Into<String>,
    V: Into<HeaderValue>,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (name, value) in iter {
            self.insert(name, value);
        }
    }
}
