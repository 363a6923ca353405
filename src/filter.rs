//! Class-based filtering of report sequences
//!
//! Filtering is a pure predicate over the "class" of each item. Records of
//! other classes are consumed and dropped; errors always pass through so a
//! terminal failure is never hidden by the filter.

use std::collections::HashSet;

use crate::record::Classed;

/// Set of accepted report classes
///
/// An empty set accepts every class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassFilter {
    classes: HashSet<String>,
}

impl ClassFilter {
    /// Filter that accepts everything
    pub fn all() -> Self {
        Self::default()
    }

    /// Filter that accepts only the given class names
    ///
    /// # Example
    /// ```
    /// use gpsdclient::filter::ClassFilter;
    ///
    /// let filter = ClassFilter::new(["SKY", "TPV"]);
    /// assert!(filter.accepts("SKY"));
    /// assert!(!filter.accepts("VERSION"));
    /// ```
    pub fn new<I, S>(classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ClassFilter {
            classes: classes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn accepts(&self, class: &str) -> bool {
        self.classes.is_empty() || self.classes.contains(class)
    }

    pub fn is_pass_all(&self) -> bool {
        self.classes.is_empty()
    }

    /// Decides whether a stream item is kept; errors are always kept
    pub fn accepts_item<T: Classed, E>(&self, item: &Result<T, E>) -> bool {
        match item {
            Ok(record) => self.accepts(record.class_name()),
            Err(_) => true,
        }
    }
}

impl<S: Into<String>> FromIterator<S> for ClassFilter {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        ClassFilter::new(iter)
    }
}

/// Iterator adapter returned by [`FilterClasses::filter_classes`]
#[derive(Debug)]
pub struct Filtered<I> {
    inner: I,
    filter: ClassFilter,
}

impl<I, T, E> Iterator for Filtered<I>
where
    I: Iterator<Item = Result<T, E>>,
    T: Classed,
{
    type Item = Result<T, E>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let item = self.inner.next()?;
            if self.filter.accepts_item(&item) {
                return Some(item);
            }
        }
    }
}

/// Extension for narrowing a record or report sequence to a set of classes
pub trait FilterClasses: Iterator + Sized {
    fn filter_classes(self, filter: ClassFilter) -> Filtered<Self> {
        Filtered {
            inner: self,
            filter,
        }
    }
}

impl<I: Iterator> FilterClasses for I {}
