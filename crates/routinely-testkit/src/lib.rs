// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use routinely_app::{Catalog, Product, ProductId};
use std::fs;
use std::path::{Path, PathBuf};

const CATEGORIES: [&str; 7] = [
    "cleanser",
    "moisturizer",
    "serum",
    "suncare",
    "makeup",
    "haircare",
    "fragrance",
];

const BRANDS: [&str; 10] = [
    "Dewfield",
    "Lumina Labs",
    "Petal & Pine",
    "Clearwater",
    "Solstice",
    "Northglow",
    "Verdant",
    "Halcyon",
    "Moonmilk",
    "Arden Row",
];

const ADJECTIVES: [&str; 12] = [
    "Hydrating",
    "Gentle",
    "Brightening",
    "Daily",
    "Overnight",
    "Soothing",
    "Purifying",
    "Renewing",
    "Balancing",
    "Ultra",
    "Calming",
    "Radiant",
];

const INGREDIENTS: [&str; 10] = [
    "hyaluronic acid",
    "niacinamide",
    "ceramides",
    "vitamin C",
    "retinol",
    "squalane",
    "green tea",
    "zinc oxide",
    "salicylic acid",
    "aloe",
];

const BENEFITS: [&str; 8] = [
    "locks in moisture",
    "evens skin tone",
    "calms redness",
    "refines pores",
    "protects the barrier",
    "smooths texture",
    "shields from UV",
    "adds lasting shine",
];

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }

    fn chance(&mut self, one_in: u64) -> bool {
        one_in > 0 && self.next_u64() % one_in == 0
    }
}

/// Seeded product generator. The same seed always yields the same catalog.
#[derive(Debug, Clone)]
pub struct ProductFaker {
    rng: DeterministicRng,
    next_id: i64,
}

impl ProductFaker {
    pub fn new(seed: u64) -> Self {
        let normalized = if seed == 0 { 1 } else { seed };
        Self {
            rng: DeterministicRng::new(normalized),
            next_id: 1,
        }
    }

    pub fn product(&mut self) -> Product {
        let category = self.pick(&CATEGORIES);
        self.product_in(category)
    }

    pub fn product_in(&mut self, category: &str) -> Product {
        let id = ProductId::from(self.next_id);
        self.next_id += 1;

        let adjective = self.pick(&ADJECTIVES);
        let ingredient = self.pick(&INGREDIENTS);
        let description = if self.rng.chance(8) {
            None
        } else {
            Some(format!(
                "Formulated with {ingredient}, this {category} {}.",
                self.pick(&BENEFITS)
            ))
        };

        Product {
            name: format!("{adjective} {} {}", title_case(ingredient), title_case(category)),
            brand: self.pick(&BRANDS).to_owned(),
            category: category.to_owned(),
            description,
            image: format!("https://example.invalid/products/{id}.png"),
            id,
        }
    }

    pub fn catalog(&mut self, count: usize) -> Catalog {
        Catalog::new((0..count).map(|_| self.product()).collect())
    }

    fn pick<'a>(&mut self, items: &'a [&'a str]) -> &'a str {
        items[self.rng.int_n(items.len())]
    }
}

/// Two-product catalog: `1` is a cleanser named "Cleanser A", `2` a serum
/// named "Serum B". Fixed so tests can name products directly.
pub fn sample_catalog() -> Catalog {
    let make = |id: i64, name: &str, brand: &str, category: &str, description: &str| Product {
        id: ProductId::from(id),
        name: name.to_owned(),
        brand: brand.to_owned(),
        category: category.to_owned(),
        description: Some(description.to_owned()),
        image: format!("https://example.invalid/products/{id}.png"),
    };
    Catalog::new(vec![
        make(1, "Cleanser A", "Dewfield", "cleanser", "Gentle foaming wash"),
        make(2, "Serum B", "Lumina Labs", "serum", "Brightening vitamin C drops"),
    ])
}

pub fn temp_db_path() -> Result<(tempfile::TempDir, PathBuf)> {
    let dir = tempfile::tempdir().context("create temp dir")?;
    let db_path = dir.path().join("routinely.db");
    Ok((dir, db_path))
}

pub fn write_catalog_file(dir: &Path, catalog: &Catalog) -> Result<PathBuf> {
    let path = dir.join("products.json");
    let raw = serde_json::to_string_pretty(catalog).context("encode catalog")?;
    fs::write(&path, raw).with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}

pub fn categories() -> &'static [&'static str] {
    &CATEGORIES
}

fn title_case(words: &str) -> String {
    words
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
