//! Path parameter storage.
//!
//! Parameters captured while resolving a path are kept in a small vector,
//! since most routes carry between zero and four of them.

use smallvec::SmallVec;

/// Maximum number of parameters stored inline (stack allocated).
const INLINE_PARAMS: usize = 4;

/// Parameters captured from positional and catch-all segments.
///
/// # Example
///
/// ```rust
/// use meridian_router::Params;
///
/// let mut params = Params::new();
/// params.insert("id", "42");
/// params.insert("path", "a/b");
///
/// assert_eq!(params.get("id"), Some("42"));
/// assert_eq!(params.int("id"), 42);
/// assert_eq!(params.int("path"), 0);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Params {
    inner: SmallVec<[(String, String); INLINE_PARAMS]>,
}

impl Params {
    /// Creates a new empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a parameter, replacing any previous value with the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();

        if let Some(slot) = self.inner.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.inner.push((name, value));
        }
    }

    /// Returns the value for a parameter by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the parameter as an `i64`, or `0` when it is absent or malformed.
    #[must_use]
    pub fn int64(&self, name: &str) -> i64 {
        self.get(name).and_then(|v| v.parse().ok()).unwrap_or(0)
    }

    /// Returns the parameter as an `i32`, or `0` when it is absent, malformed
    /// or out of range.
    #[must_use]
    pub fn int32(&self, name: &str) -> i32 {
        self.get(name).and_then(|v| v.parse().ok()).unwrap_or(0)
    }

    /// Returns the parameter as an `isize`, or `0` when it is absent or malformed.
    #[must_use]
    pub fn int(&self, name: &str) -> isize {
        self.get(name).and_then(|v| v.parse().ok()).unwrap_or(0)
    }

    /// Returns true if there are no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns the number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns an iterator over the parameters.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl<'a> IntoIterator for &'a Params {
    type Item = (&'a str, &'a str);
    type IntoIter = std::iter::Map<
        std::slice::Iter<'a, (String, String)>,
        fn(&'a (String, String)) -> (&'a str, &'a str),
    >;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (name, value) in iter {
            params.insert(name, value);
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_new() {
        let params = Params::new();
        assert!(params.is_empty());
        assert_eq!(params.len(), 0);
    }

    #[test]
    fn test_insert_replaces_existing_value() {
        let mut params = Params::new();
        params.insert("id", "1");
        params.insert("id", "2");

        assert_eq!(params.len(), 1);
        assert_eq!(params.get("id"), Some("2"));
    }

    #[test]
    fn test_int_helpers() {
        let params: Params = [("a", "12"), ("b", "-7"), ("c", "abc"), ("d", "3000000000")]
            .into_iter()
            .collect();

        assert_eq!(params.int("a"), 12);
        assert_eq!(params.int32("b"), -7);
        assert_eq!(params.int64("c"), 0);
        assert_eq!(params.int("missing"), 0);
        assert_eq!(params.int64("d"), 3_000_000_000);
        assert_eq!(params.int32("d"), 0);
    }

    #[test]
    fn test_params_iter() {
        let params: Params = [("x", "1"), ("y", "2")].into_iter().collect();
        let collected: Vec<_> = params.iter().collect();
        assert_eq!(collected, vec![("x", "1"), ("y", "2")]);
    }
}
