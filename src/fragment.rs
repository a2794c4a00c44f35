use std::fmt;

use percent_encoding::percent_decode_str;
use url::Url;

pub const KEY_BOOK_ID: &str = "h5pbookid";
pub const KEY_CHAPTER: &str = "chapter";
pub const KEY_SECTION: &str = "section";
pub const KEY_HEADER_NUMBER: &str = "headerNumber";

/// Keys compared when deciding whether a redirect points at the current location.
pub const RELEVANT_KEYS: [&str; 4] = [KEY_BOOK_ID, KEY_CHAPTER, KEY_SECTION, KEY_HEADER_NUMBER];

/// Navigation state carried in the URL fragment, e.g.
/// `#h5pbookid=7&chapter=abc&section=top`. Ordered `key=value` pairs;
/// insertion order is kept so that encoding is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    pairs: Vec<(String, String)>,
}

impl Fragment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key`, keeping its original position when it already exists.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.pairs.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.pairs.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn book_id(&self) -> Option<u64> {
        self.get(KEY_BOOK_ID)
            .and_then(|raw| raw.trim().parse::<u64>().ok())
    }

    pub fn chapter(&self) -> Option<&str> {
        self.get(KEY_CHAPTER)
    }

    pub fn section(&self) -> Option<&str> {
        self.get(KEY_SECTION)
    }

    pub fn header_number(&self) -> Option<u32> {
        self.get(KEY_HEADER_NUMBER)
            .and_then(|raw| raw.trim().parse::<u32>().ok())
    }

    /// Reads the fragment of a page URL. A URL without a fragment decodes empty.
    /// Values come back percent-decoded: the URL parser escapes spaces and
    /// other characters when a fragment is written.
    pub fn from_url(url: &Url) -> Self {
        match url.fragment() {
            Some(raw) => decode(raw).unescaped(),
            None => Self::new(),
        }
    }

    fn unescaped(mut self) -> Self {
        for (_, value) in &mut self.pairs {
            let decoded = percent_decode_str(value).decode_utf8_lossy().into_owned();
            *value = decoded;
        }
        self
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode(self))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Fragment {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut fragment = Fragment::new();
        for (k, v) in iter {
            fragment.insert(k, v);
        }
        fragment
    }
}

/// `#k1=v1&k2=v2`, every pair in insertion order.
pub fn encode(fragment: &Fragment) -> String {
    let body = fragment
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    format!("#{body}")
}

/// Splits on `&` and keeps only segments with exactly one `=`. Total: malformed
/// segments are dropped instead of failing.
pub fn decode(raw: &str) -> Fragment {
    let raw = raw.strip_prefix('#').unwrap_or(raw);
    let mut fragment = Fragment::new();
    if raw.is_empty() {
        return fragment;
    }

    for segment in raw.split('&') {
        if segment.matches('=').count() != 1 {
            continue;
        }
        if let Some((key, value)) = segment.split_once('=') {
            fragment.insert(key, value);
        }
    }
    fragment
}

/// True iff the fragment names a chapter and belongs to `expected_book_id`.
pub fn validate(fragment: &Fragment, expected_book_id: u64) -> bool {
    fragment.contains_key(KEY_CHAPTER) && fragment.book_id() == Some(expected_book_id)
}

/// Compares only `keys`; a key missing on both sides counts as equal.
pub fn equal_relevant(a: &Fragment, b: &Fragment, keys: &[&str]) -> bool {
    keys.iter().all(|key| a.get(key) == b.get(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_keeps_well_formed_pairs() {
        let fragment = decode("#h5pbookid=7&chapter=abc&section=top");
        assert_eq!(fragment.get("h5pbookid"), Some("7"));
        assert_eq!(fragment.chapter(), Some("abc"));
        assert_eq!(fragment.section(), Some("top"));
        assert_eq!(fragment.len(), 3);
        assert!(validate(&fragment, 7));
        assert!(!validate(&fragment, 8));
    }

    #[test]
    fn decode_drops_segments_without_single_equals() {
        let fragment = decode("#chapter&foo=bar&a=b=c&=x");
        assert_eq!(fragment.get("foo"), Some("bar"));
        assert_eq!(fragment.get("chapter"), None);
        assert_eq!(fragment.get("a"), None);
        assert_eq!(fragment.get(""), Some("x"));
    }

    #[test]
    fn decode_empty_input_is_empty() {
        assert!(decode("").is_empty());
        assert!(decode("#").is_empty());
    }

    #[test]
    fn validate_requires_chapter_and_numeric_book_id() {
        assert!(!validate(&decode("h5pbookid=7"), 7));
        assert!(!validate(&decode("h5pbookid=seven&chapter=a"), 7));
        assert!(validate(&decode("chapter=a&h5pbookid=7&extra=1"), 7));
    }

    #[test]
    fn encode_preserves_insertion_order_and_unknown_keys() {
        let fragment: Fragment = [("h5pbookid", "3"), ("chapter", "c1"), ("custom", "x")]
            .into_iter()
            .collect();
        assert_eq!(encode(&fragment), "#h5pbookid=3&chapter=c1&custom=x");
    }

    #[test]
    fn insert_overwrites_in_place() {
        let mut fragment = Fragment::new();
        fragment.insert("chapter", "a");
        fragment.insert("section", "s");
        fragment.insert("chapter", "b");
        assert_eq!(encode(&fragment), "#chapter=b&section=s");
    }

    #[test]
    fn equal_relevant_ignores_other_keys() {
        let a = decode("h5pbookid=1&chapter=c&noise=1");
        let b = decode("h5pbookid=1&chapter=c&noise=2");
        assert!(equal_relevant(&a, &b, &RELEVANT_KEYS));
        let c = decode("h5pbookid=1&chapter=c&section=s");
        assert!(!equal_relevant(&a, &c, &RELEVANT_KEYS));
    }

    #[test]
    fn from_url_reads_fragment() {
        let url = Url::parse("https://example.test/node/1#h5pbookid=5&chapter=x").unwrap();
        let fragment = Fragment::from_url(&url);
        assert_eq!(fragment.book_id(), Some(5));
        assert_eq!(fragment.chapter(), Some("x"));

        let bare = Url::parse("https://example.test/node/1").unwrap();
        assert!(Fragment::from_url(&bare).is_empty());
    }

    #[test]
    fn from_url_unescapes_values() {
        let mut url = Url::parse("https://example.test/node/1").unwrap();
        url.set_fragment(Some("h5pbookid=5&chapter=my chapter&section=a+b"));
        assert_eq!(url.fragment(), Some("h5pbookid=5&chapter=my%20chapter&section=a+b"));
        let fragment = Fragment::from_url(&url);
        assert_eq!(fragment.chapter(), Some("my chapter"));
        assert_eq!(fragment.section(), Some("a+b"));
    }
}
