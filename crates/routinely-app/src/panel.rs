// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::model::{Catalog, Product};
use crate::selection::SelectionSet;

pub const EMPTY_SELECTION_MESSAGE: &str = "No products selected yet";
pub const EMPTY_SELECTION_HINT: &str = "Press enter on a product to add it!";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionGroup<'a> {
    pub category: &'a str,
    pub products: Vec<&'a Product>,
}

/// Selected products that still resolve against the catalog, in selection
/// order. Stale ids are skipped.
pub fn resolve_selection<'a>(catalog: &'a Catalog, selection: &SelectionSet) -> Vec<&'a Product> {
    selection
        .iter()
        .filter_map(|id| catalog.get(id))
        .collect()
}

/// Groups resolved selections by category. Groups appear in the order their
/// first member was selected; members keep selection order.
pub fn selection_groups<'a>(
    catalog: &'a Catalog,
    selection: &SelectionSet,
) -> Vec<SelectionGroup<'a>> {
    let mut groups: Vec<SelectionGroup<'a>> = Vec::new();
    for product in resolve_selection(catalog, selection) {
        match groups
            .iter_mut()
            .find(|group| group.category == product.category)
        {
            Some(group) => group.products.push(product),
            None => groups.push(SelectionGroup {
                category: &product.category,
                products: vec![product],
            }),
        }
    }
    groups
}
