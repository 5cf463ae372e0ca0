//! Catalog item model.
//!
//! Items arrive from the catalog layer with an externally owned identity
//! and the text payload to encode. Both are immutable for the duration of
//! a generation run.

use std::fmt;

/// Unique identity of a catalog item.
///
/// Assigned by the catalog layer; the pipeline only requires it to be
/// unique within a run and usable as a map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(String);

impl ItemId {
    /// Create an item id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One catalog item queued for QR generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogItem {
    /// Externally owned identity.
    pub id: ItemId,
    /// Text the encoder turns into a QR raster, typically a URL.
    pub payload: String,
}

impl CatalogItem {
    /// Create a new catalog item.
    pub fn new(id: impl Into<ItemId>, payload: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            payload: payload.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_item_id_from_str() {
        let id = ItemId::from("item-42");
        assert_eq!(id.as_str(), "item-42");
    }

    #[test]
    fn test_item_id_from_string() {
        let id = ItemId::from(String::from("item-7"));
        assert_eq!(id.as_str(), "item-7");
    }

    #[test]
    fn test_item_id_display() {
        let id = ItemId::new("sku-1001");
        assert_eq!(format!("{}", id), "sku-1001");
    }

    #[test]
    fn test_item_id_usable_as_map_key() {
        let mut map = HashMap::new();
        map.insert(ItemId::new("a"), 1);
        map.insert(ItemId::new("b"), 2);

        assert_eq!(map.get(&ItemId::new("a")), Some(&1));
        assert_eq!(map.get(&ItemId::new("c")), None);
    }

    #[test]
    fn test_catalog_item_new() {
        let item = CatalogItem::new("item-1", "https://example.com/item/1");

        assert_eq!(item.id, ItemId::new("item-1"));
        assert_eq!(item.payload, "https://example.com/item/1");
    }

    #[test]
    fn test_catalog_item_equality() {
        let a = CatalogItem::new("x", "payload");
        let b = CatalogItem::new("x", "payload");
        let c = CatalogItem::new("x", "other");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
