//! Ordered, deduplicated multi-value container.
//!
//! Every tag that may resolve to zero, one or many strings (loop values,
//! argument tags, resolved paths) is carried as an [`ArgList`]. Rendering
//! joins the elements with the list's separator, so a single-element list
//! renders as exactly that element.

use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Add, Index, Sub};

use serde::{Serialize, Serializer};

pub const DEFAULT_SEPARATOR: &str = " ";

/// Capability of a value to be enumerated as a list of arguments.
///
/// Any tag value exposing it takes part in argument-tag expansion and in
/// input/output group unions.
pub trait AsArgs {
    fn as_args(&self) -> Vec<String>;
}

#[derive(Debug, Clone)]
pub struct ArgList {
    items: Vec<String>,
    /// Membership index over `items`.
    seen: HashSet<String>,
    separator: String,
}

impl ArgList {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            seen: HashSet::new(),
            separator: DEFAULT_SEPARATOR.to_string(),
        }
    }

    /// A one-element list; a bare string is never split.
    pub fn single(value: impl Into<String>) -> Self {
        let mut list = Self::new();
        list.push(value);
        list
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Append `value` unless it is already present.
    pub fn push(&mut self, value: impl Into<String>) {
        let value = value.into();
        if self.seen.insert(value.clone()) {
            self.items.push(value);
        }
    }

    pub fn extend<I, S>(&mut self, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for value in values {
            self.push(value);
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, value: &str) -> bool {
        self.seen.contains(value)
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.items.get(index).map(String::as_str)
    }

    pub fn first(&self) -> Option<&str> {
        self.get(0)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.items
    }

    pub fn into_vec(self) -> Vec<String> {
        self.items
    }

    /// Union preserving `self`'s order, then `other`'s new items.
    pub fn union(&self, other: &ArgList) -> ArgList {
        let mut out = self.clone();
        out.extend(other.items.iter().cloned());
        out
    }

    /// Elements of `self` not present in `other`.
    pub fn difference(&self, other: &ArgList) -> ArgList {
        let mut out = ArgList::new().with_separator(self.separator.as_str());
        out.extend(self.items.iter().filter(|v| !other.contains(v)).cloned());
        out
    }
}

impl Default for ArgList {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ArgList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.items.join(&self.separator))
    }
}

// Equality and hashing follow the rendered form, so two lists that print the
// same are interchangeable as tag values.
impl PartialEq for ArgList {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

impl Eq for ArgList {}

impl Hash for ArgList {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_string().hash(state);
    }
}

impl<S: Into<String>> FromIterator<S> for ArgList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut list = ArgList::new();
        list.extend(iter);
        list
    }
}

impl From<&str> for ArgList {
    fn from(value: &str) -> Self {
        ArgList::single(value)
    }
}

impl From<String> for ArgList {
    fn from(value: String) -> Self {
        ArgList::single(value)
    }
}

impl From<Vec<String>> for ArgList {
    fn from(values: Vec<String>) -> Self {
        values.into_iter().collect()
    }
}

impl Index<usize> for ArgList {
    type Output = str;

    fn index(&self, index: usize) -> &str {
        &self.items[index]
    }
}

impl<'a> IntoIterator for &'a ArgList {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl IntoIterator for ArgList {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl Add for ArgList {
    type Output = ArgList;

    fn add(self, rhs: ArgList) -> ArgList {
        self.union(&rhs)
    }
}

impl Add<&ArgList> for &ArgList {
    type Output = ArgList;

    fn add(self, rhs: &ArgList) -> ArgList {
        self.union(rhs)
    }
}

impl Sub for ArgList {
    type Output = ArgList;

    fn sub(self, rhs: ArgList) -> ArgList {
        self.difference(&rhs)
    }
}

impl Sub<&ArgList> for &ArgList {
    type Output = ArgList;

    fn sub(self, rhs: &ArgList) -> ArgList {
        self.difference(rhs)
    }
}

impl AsArgs for ArgList {
    fn as_args(&self) -> Vec<String> {
        self.items.clone()
    }
}

impl Serialize for ArgList {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.items.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(values: &[&str]) -> ArgList {
        values.iter().copied().collect()
    }

    #[test]
    fn construction_deduplicates_in_order() {
        let a = list(&["b", "a", "b", "c", "a"]);
        assert_eq!(a.as_slice(), &["b", "a", "c"]);
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn bare_string_is_one_element() {
        let a = ArgList::from("hello world");
        assert_eq!(a.len(), 1);
        assert_eq!(a.to_string(), "hello world");
    }

    #[test]
    fn single_element_renders_without_separator() {
        let a = list(&["only"]).with_separator(",");
        assert_eq!(a.to_string(), "only");
    }

    #[test]
    fn custom_separator_joins() {
        let a = list(&["LAB0", "LAB1"]).with_separator(",");
        assert_eq!(a.to_string(), "LAB0,LAB1");
    }

    #[test]
    fn union_keeps_left_order_then_new_items() {
        let a = list(&["x", "y"]);
        let b = list(&["y", "z", "x", "w"]);
        assert_eq!((&a + &b).as_slice(), &["x", "y", "z", "w"]);
    }

    #[test]
    fn difference_law_holds() {
        let a = list(&["1", "2", "3"]);
        let b = list(&["3", "4"]);
        assert_eq!(&(&a + &b) - &b, &a - &b);
        assert_eq!((&a - &b).as_slice(), &["1", "2"]);
    }

    #[test]
    fn equality_follows_rendering() {
        let a = list(&["a", "b"]);
        let b = list(&["a", "b"]);
        let c = list(&["b", "a"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        // "a b" with a space separator renders the same as the single element "a b"
        assert_eq!(a, ArgList::single("a b"));
    }

    #[test]
    fn large_lists_stay_deduplicated() {
        let mut a = ArgList::new();
        for hour in 0..9000 {
            a.push(format!("in/{hour}.rw"));
        }
        a.extend((0..9000).map(|hour| format!("in/{hour}.rw")));
        assert_eq!(a.len(), 9000);
        assert!(a.contains("in/8999.rw"));
        assert_eq!(a.first(), Some("in/0.rw"));
        assert_eq!((&a - &list(&["in/0.rw"])).len(), 8999);
    }

    #[test]
    fn sequence_behaviour() {
        let a = list(&["p", "q"]);
        assert_eq!(&a[1], "q");
        assert!(a.contains("p"));
        assert!(!a.contains("z"));
        let collected: Vec<&String> = a.iter().collect();
        assert_eq!(collected.len(), 2);
        assert!(ArgList::new().is_empty());
        assert_eq!(ArgList::new().to_string(), "");
    }
}
