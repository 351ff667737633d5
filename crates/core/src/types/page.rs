//! Paginated collection envelope.

use serde::{Deserialize, Deserializer, Serialize};

/// One page of a backend collection.
///
/// Collection endpoints answer either with a bare JSON list or with a
/// `{ "items": [...], "totalPages": n }` envelope; both deserialize into a
/// `Page`. A bare list is treated as a single page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Total number of pages (at least 1).
    pub total_pages: u32,
}

impl<T> Page<T> {
    /// A single page holding every item.
    #[must_use]
    pub const fn single(items: Vec<T>) -> Self {
        Self {
            items,
            total_pages: 1,
        }
    }

    /// Whether a page after `current` (1-based) exists.
    #[must_use]
    pub const fn has_next(&self, current: u32) -> bool {
        current < self.total_pages
    }

    /// 1-based page numbers, for rendering pagination controls.
    pub fn page_numbers(&self) -> impl Iterator<Item = u32> {
        1..=self.total_pages
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self::single(Vec::new())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PageWire<T> {
    Envelope {
        items: Vec<T>,
        #[serde(rename = "totalPages", default)]
        total_pages: u32,
    },
    List(Vec<T>),
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Page<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match PageWire::deserialize(deserializer)? {
            PageWire::Envelope { items, total_pages } => Self {
                items,
                total_pages: total_pages.max(1),
            },
            PageWire::List(items) => Self::single(items),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_bare_list() {
        let page: Page<u32> = serde_json::from_str("[1, 2, 3]").unwrap();
        assert_eq!(page.items, vec![1, 2, 3]);
        assert_eq!(page.total_pages, 1);
    }

    #[test]
    fn test_deserialize_envelope() {
        let page: Page<u32> = serde_json::from_str(r#"{"items": [4], "totalPages": 5}"#).unwrap();
        assert_eq!(page.items, vec![4]);
        assert_eq!(page.total_pages, 5);
        assert!(page.has_next(4));
        assert!(!page.has_next(5));
    }

    #[test]
    fn test_envelope_with_zero_pages_is_one_page() {
        let page: Page<u32> = serde_json::from_str(r#"{"items": [], "totalPages": 0}"#).unwrap();
        assert_eq!(page.total_pages, 1);
        assert_eq!(page.page_numbers().collect::<Vec<_>>(), vec![1]);
    }
}
