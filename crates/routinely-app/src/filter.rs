// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::model::{Catalog, Product};

/// Category plus free-text narrowing of the catalog. An absent category or
/// a blank search term imposes no constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductFilter {
    pub category: Option<String>,
    pub search: String,
}

impl ProductFilter {
    pub fn new(category: Option<String>, search: impl Into<String>) -> Self {
        Self {
            category,
            search: search.into(),
        }
    }

    pub fn matches(&self, product: &Product) -> bool {
        if let Some(category) = self.category.as_deref()
            && !category.is_empty()
            && product.category != category
        {
            return false;
        }

        let needle = self.search.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }

        product.name.to_lowercase().contains(&needle)
            || product.brand.to_lowercase().contains(&needle)
            || product
                .description
                .as_deref()
                .is_some_and(|description| description.to_lowercase().contains(&needle))
    }

    /// Matching products in catalog order.
    pub fn apply<'a>(&self, catalog: &'a Catalog) -> Vec<&'a Product> {
        catalog
            .products()
            .iter()
            .filter(|product| self.matches(product))
            .collect()
    }

    pub fn is_active(&self) -> bool {
        self.category.as_deref().is_some_and(|c| !c.is_empty()) || !self.search.trim().is_empty()
    }
}
