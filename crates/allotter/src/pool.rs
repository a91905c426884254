//! Static pool definitions.
//!
//! Pools are fixed at process configuration time: the catalog is built once,
//! handed to the engine and never mutated afterwards. Pools can be populated
//! and emptied at runtime but never created or destroyed.

use crate::error::{Error, Result};
use core::{convert::Infallible, fmt, str::FromStr};
use std::collections::HashMap;

/// Stable key of a pool (e.g. `telegram`, `email`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct PoolKey(String);

impl PoolKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PoolKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl FromStr for PoolKey {
    type Err = Infallible;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        Ok(Self::new(s.trim()))
    }
}

/// One allocatable pool.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolSpec {
    /// Stable key used by callers and in the quota ledger.
    pub key: PoolKey,
    /// Human readable name, also used as the sheet name on export.
    pub name: String,
    /// File name of the pool inside the data directory.
    pub file_name: String,
    /// Records an identity may claim without any extra allowance.
    pub base_limit: u32,
}

impl PoolSpec {
    pub fn new(key: &str, name: &str, base_limit: u32) -> Self {
        Self {
            key: PoolKey::new(key),
            name: name.to_string(),
            file_name: format!("base_{key}.csv"),
            base_limit,
        }
    }

    /// Overrides the storage file name.
    #[must_use]
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }
}

/// The ordered set of pools known to the process.
///
/// Iteration order is the declaration order and drives the order of sheets
/// in exports and of rows in statistics.
#[derive(Clone, Debug)]
pub struct PoolCatalog {
    pools: Vec<PoolSpec>,
    sheet_aliases: HashMap<String, PoolKey>,
}

impl PoolCatalog {
    /// Creates an empty catalog. Use [`PoolCatalog::with_pool`] to populate it.
    pub fn empty() -> Self {
        Self {
            pools: Vec::new(),
            sheet_aliases: HashMap::new(),
        }
    }

    /// Adds a pool. Its key and display name become sheet aliases.
    ///
    /// # Panics
    ///
    /// Panics if a pool with the same key was already added.
    #[must_use]
    pub fn with_pool(mut self, spec: PoolSpec) -> Self {
        assert!(
            self.spec(&spec.key).is_none(),
            "duplicate pool key `{}`",
            spec.key
        );
        self.sheet_aliases
            .insert(spec.key.as_str().to_string(), spec.key.clone());
        self.sheet_aliases.insert(spec.name.clone(), spec.key.clone());
        self.pools.push(spec);
        self
    }

    /// Maps an additional spreadsheet sheet name onto a pool.
    #[must_use]
    pub fn with_alias(mut self, sheet_name: &str, key: &str) -> Self {
        self.sheet_aliases
            .insert(sheet_name.to_string(), PoolKey::new(key));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &PoolSpec> {
        self.pools.iter()
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    pub fn spec(&self, key: &PoolKey) -> Option<&PoolSpec> {
        self.pools.iter().find(|p| &p.key == key)
    }

    /// Looks up a pool, failing with [`Error::UnknownPool`].
    pub fn get(&self, key: &PoolKey) -> Result<&PoolSpec> {
        self.spec(key).ok_or_else(|| Error::UnknownPool {
            key: key.to_string(),
        })
    }

    /// Resolves a spreadsheet sheet name to a pool. Matching is exact.
    pub fn resolve_sheet(&self, sheet_name: &str) -> Option<&PoolSpec> {
        self.sheet_aliases
            .get(sheet_name)
            .and_then(|key| self.spec(key))
    }
}

impl Default for PoolCatalog {
    /// The eight contact pools of the production deployment, with the sheet
    /// names operators use in their upload workbooks.
    fn default() -> Self {
        Self::empty()
            .with_pool(PoolSpec::new("telegram", "Telegram", 50))
            .with_pool(PoolSpec::new("whatsapp", "WhatsApp", 35))
            .with_pool(PoolSpec::new("max", "Max", 35))
            .with_pool(PoolSpec::new("viber", "Viber", 35))
            .with_pool(PoolSpec::new("instagram", "Нельзяграм (там где Reels)", 300))
            .with_pool(PoolSpec::new("vk", "ВКонтакте", 250))
            .with_pool(PoolSpec::new("ok", "Одноклассники", 250))
            .with_pool(PoolSpec::new("email", "Почта", 100))
            .with_alias("Тг", "telegram")
            .with_alias("ТГ", "telegram")
            .with_alias("Вотсап", "whatsapp")
            .with_alias("Whatsapp", "whatsapp")
            .with_alias("Макс", "max")
            .with_alias("Вайбер", "viber")
            .with_alias("Инст", "instagram")
            .with_alias("Нельзяграм", "instagram")
            .with_alias("Instagram", "instagram")
            .with_alias("ВК", "vk")
            .with_alias("Вконтакте", "vk")
            .with_alias("вконтакте", "vk")
            .with_alias("VK", "vk")
            .with_alias("Ок", "ok")
            .with_alias("Ok", "ok")
            .with_alias("OK", "ok")
            .with_alias("одноклассники", "ok")
            .with_alias("Email", "email")
            .with_alias("Почты", "email")
    }
}
