//! Hierarchical key composition.
//!
//! Storage keys are colon-joined segments, outermost first:
//!
//! - `bucket` for the root bucket
//! - `bucket:package` for a child bucket base
//! - `bucket:package:my-lib@1.0.0` for an item inside it
//!
//! Absent and empty segments are dropped before joining, so a missing base
//! never yields a leading or doubled separator.

/// Separator between key segments.
pub const KEY_SEPARATOR: char = ':';

/// A value that may contribute one segment to a composed key.
///
/// `None` and the empty string contribute nothing.
pub trait KeySegment {
    fn as_segment(&self) -> Option<&str>;
}

impl KeySegment for str {
    fn as_segment(&self) -> Option<&str> {
        (!self.is_empty()).then_some(self)
    }
}

impl KeySegment for String {
    fn as_segment(&self) -> Option<&str> {
        self.as_str().as_segment()
    }
}

impl<T: KeySegment + ?Sized> KeySegment for &T {
    fn as_segment(&self) -> Option<&str> {
        (**self).as_segment()
    }
}

impl<T: KeySegment> KeySegment for Option<T> {
    fn as_segment(&self) -> Option<&str> {
        self.as_ref().and_then(KeySegment::as_segment)
    }
}

/// Join segments into one storage key.
///
/// # Examples
///
/// ```
/// use stowage_core::key::join_key;
///
/// assert_eq!(join_key(["bucket", "package"]), "bucket:package");
/// assert_eq!(join_key([Some("bucket"), None, Some("x")]), "bucket:x");
/// assert_eq!(join_key(["", "cursor"]), "cursor");
/// ```
pub fn join_key<I>(segments: I) -> String
where
    I: IntoIterator,
    I::Item: KeySegment,
{
    let mut key = String::new();
    for segment in segments {
        let Some(part) = segment.as_segment() else {
            continue;
        };
        if !key.is_empty() {
            key.push(KEY_SEPARATOR);
        }
        key.push_str(part);
    }
    key
}

/// Strip `base` and its trailing separator from `key`.
///
/// Returns `None` when `key` does not live under `base`. An empty `base`
/// matches every key unchanged.
pub fn strip_base<'a>(key: &'a str, base: &str) -> Option<&'a str> {
    if base.is_empty() {
        return Some(key);
    }
    key.strip_prefix(base)?.strip_prefix(KEY_SEPARATOR)
}
