//! Capability maps: one capability set per resource key, plus a default entry.
//!
//! The map owns one live [`CapabilitySet`] per declared key. Entries are never
//! replaced or removed; assignment and deletion go through the entry's own
//! mutators so a `&mut` handle obtained from [`CapabilityMap::entry_mut`] always
//! refers to the slot the map reads from.
//!
//! Lookups fall back to the default entry for keys whose value is zero,
//! whether they were explicitly cleared or never configured.

use core::fmt;
use std::collections::HashMap;
use std::sync::Arc;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::capability_set::{CapabilitySet, FlagSet, IntoBits};
use crate::error::{CapabilityError, ConfigError};

/// Key of the distinguished fallback entry.
pub const DEFAULT_KEY: &str = "default";

/// Separator between key and flag in the array form (`"orders-read"`).
pub const TOKEN_SEPARATOR: char = '-';

/// The ordered list of keys a family of capability maps is defined over.
///
/// Built once (typically from the registered resource names) and shared
/// read-only through an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    keys: Vec<String>,
    index: HashMap<String, usize>,
}

impl KeySpace {
    pub fn new<I, S>(keys: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut space = Self {
            keys: Vec::new(),
            index: HashMap::new(),
        };
        for key in keys {
            let key = key.into();
            if key == DEFAULT_KEY {
                return Err(ConfigError::ReservedKey { key });
            }
            if key.is_empty()
                || key
                    .chars()
                    .any(|c| c == ',' || c == ':' || c == '[' || c == ']' || c.is_whitespace())
            {
                return Err(ConfigError::InvalidKey { key });
            }
            if space.index.contains_key(&key) {
                return Err(ConfigError::DuplicateKey { key });
            }
            space.index.insert(key.clone(), space.keys.len());
            space.keys.push(key);
        }
        Ok(space)
    }

    /// A key space with no declared keys: maps over it hold only a default.
    pub fn empty() -> Self {
        Self {
            keys: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Declared keys, in declaration order (the default key is not included).
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }
}

/// A keyed collection of capability sets with a default fallback entry.
pub struct CapabilityMap<F> {
    keys: Arc<KeySpace>,
    entries: Vec<CapabilitySet<F>>,
    default: CapabilitySet<F>,
}

impl<F: FlagSet> CapabilityMap<F> {
    /// All entries (default included) start empty.
    pub fn new(keys: Arc<KeySpace>) -> Self {
        let entries = vec![CapabilitySet::empty(); keys.len()];
        Self {
            keys,
            entries,
            default: CapabilitySet::empty(),
        }
    }

    pub fn key_space(&self) -> &Arc<KeySpace> {
        &self.keys
    }

    /// Effective value for `key`: the key's own entry when non-zero, else the default.
    ///
    /// Unknown keys and the default key itself resolve to the default entry.
    pub fn get(&self, key: &str) -> CapabilitySet<F> {
        match self.keys.position(key).map(|idx| self.entries[idx]) {
            Some(value) if !value.is_empty() => value,
            _ => self.default,
        }
    }

    /// The key's own entry, without fallback.
    pub fn entry(&self, key: &str) -> Option<&CapabilitySet<F>> {
        if key == DEFAULT_KEY {
            return Some(&self.default);
        }
        self.keys.position(key).map(|idx| &self.entries[idx])
    }

    /// Live handle to the key's entry; mutations through it are visible to `get`.
    pub fn entry_mut(&mut self, key: &str) -> Option<&mut CapabilitySet<F>> {
        if key == DEFAULT_KEY {
            return Some(&mut self.default);
        }
        self.keys.position(key).map(|idx| &mut self.entries[idx])
    }

    pub fn default_entry(&self) -> &CapabilitySet<F> {
        &self.default
    }

    pub fn default_entry_mut(&mut self) -> &mut CapabilitySet<F> {
        &mut self.default
    }

    /// Zero every keyed entry and set the default to `default`.
    pub fn reset(&mut self, default: impl IntoBits<F>) -> Result<(), CapabilityError> {
        let default = CapabilitySet::new(default)?;
        self.entries.iter_mut().for_each(CapabilitySet::clear);
        self.default = default;
        Ok(())
    }

    /// Assign `value` to `key` through the entry's own `set`.
    pub fn set(&mut self, key: &str, value: impl IntoBits<F>) -> Result<(), CapabilityError> {
        let universe = F::universe().name().to_string();
        let entry = self.entry_mut(key).ok_or(CapabilityError::UnknownKey {
            universe,
            key: key.to_string(),
        })?;
        entry.set(value)?;
        Ok(())
    }

    /// Clear `key`'s entry; the slot itself stays in the map.
    ///
    /// Returns `false` for keys outside the key space.
    pub fn delete(&mut self, key: &str) -> bool {
        match self.entry_mut(key) {
            Some(entry) => {
                entry.clear();
                true
            }
            None => false,
        }
    }

    /// OR `value` into every non-zero keyed entry and into the default.
    pub fn add_all(&mut self, value: impl IntoBits<F>) -> Result<(), CapabilityError> {
        let value = CapabilitySet::<F>::new(value)?;
        for entry in self.entries.iter_mut().filter(|e| !e.is_empty()) {
            entry.add(value)?;
        }
        self.default.add(value)?;
        Ok(())
    }

    /// AND-NOT `value` out of every non-zero keyed entry and out of the default.
    pub fn remove_all(&mut self, value: impl IntoBits<F>) -> Result<(), CapabilityError> {
        let value = CapabilitySet::<F>::new(value)?;
        for entry in self.entries.iter_mut().filter(|e| !e.is_empty()) {
            entry.remove(value)?;
        }
        self.default.remove(value)?;
        Ok(())
    }

    /// OR each value of `partial` into the entry with the same key.
    ///
    /// Keys outside the key space are ignored. Every value is resolved before
    /// anything is applied, so a bad flag name leaves the map untouched.
    pub fn add_object<I, K, V>(&mut self, partial: I) -> Result<(), CapabilityError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: IntoBits<F>,
    {
        for (key, value) in self.resolve_partial(partial)? {
            if let Some(entry) = self.entry_mut(&key) {
                entry.add(value)?;
            }
        }
        Ok(())
    }

    /// AND-NOT each value of `partial` out of the entry with the same key.
    pub fn remove_object<I, K, V>(&mut self, partial: I) -> Result<(), CapabilityError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: IntoBits<F>,
    {
        for (key, value) in self.resolve_partial(partial)? {
            if let Some(entry) = self.entry_mut(&key) {
                entry.remove(value)?;
            }
        }
        Ok(())
    }

    fn resolve_partial<I, K, V>(
        &self,
        partial: I,
    ) -> Result<Vec<(String, CapabilitySet<F>)>, CapabilityError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: IntoBits<F>,
    {
        partial
            .into_iter()
            .filter(|(key, _)| self.entry(key.as_ref()).is_some())
            .map(|(key, value)| -> Result<_, CapabilityError> {
                Ok((key.as_ref().to_string(), CapabilitySet::new(value)?))
            })
            .collect()
    }

    /// Declared keys with their own entries, followed by the default entry.
    pub fn iter(&self) -> impl Iterator<Item = (&str, CapabilitySet<F>)> + '_ {
        self.keys
            .keys()
            .iter()
            .map(String::as_str)
            .zip(self.entries.iter().copied())
            .chain(core::iter::once((DEFAULT_KEY, self.default)))
    }

    /// `["orders-read", "orders-write", "default-read"]`: one token per set bit per key.
    pub fn to_array(&self) -> Vec<String> {
        self.iter()
            .flat_map(|(key, value)| {
                value
                    .names()
                    .into_iter()
                    .map(move |flag| format!("{key}{TOKEN_SEPARATOR}{flag}"))
            })
            .collect()
    }

    /// Lenient inverse of [`to_array`](Self::to_array).
    ///
    /// Tokens naming an unknown key or flag, or lacking a separator, are skipped.
    pub fn from_array<I, S>(keys: Arc<KeySpace>, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut map = Self::new(keys);
        for token in tokens {
            let Some((key, flag)) = token.as_ref().trim().rsplit_once(TOKEN_SEPARATOR) else {
                continue;
            };
            let Some(bit) = F::universe().bit(flag) else {
                continue;
            };
            if let Some(entry) = map.entry_mut(key) {
                *entry |= CapabilitySet::from_bits(bit);
            }
        }
        map
    }

    /// The array form joined with `", "`.
    pub fn to_list_string(&self) -> String {
        self.to_array().join(", ")
    }

    /// Lenient inverse of [`to_list_string`](Self::to_list_string).
    pub fn parse_list(keys: Arc<KeySpace>, input: &str) -> Self {
        Self::from_array(keys, input.split(',').filter(|t| !t.trim().is_empty()))
    }

    /// `"orders: [rw], default: [-]"`.
    ///
    /// Lists every non-zero keyed entry, then the default entry. Requires the
    /// universe to carry a character map.
    pub fn to_display(&self) -> Result<String, CapabilityError> {
        let universe = F::universe();
        if !universe.has_char_map() {
            return Err(CapabilityError::NoCharMap {
                universe: universe.name().to_string(),
            });
        }
        Ok(self
            .iter()
            .filter(|(key, value)| *key == DEFAULT_KEY || !value.is_empty())
            .map(|(key, value)| format!("{key}: [{}]", value.to_chars().unwrap_or_default()))
            .collect::<Vec<_>>()
            .join(", "))
    }

    /// Lenient inverse of [`to_display`](Self::to_display).
    ///
    /// Segments without a `key:` prefix or naming an unknown key are skipped;
    /// unknown characters inside the brackets are ignored.
    pub fn parse_display(keys: Arc<KeySpace>, input: &str) -> Result<Self, CapabilityError> {
        let mut map = Self::new(keys);
        for segment in input.split(',') {
            let Some((key, chars)) = segment.split_once(':') else {
                continue;
            };
            let chars = chars.trim().trim_start_matches('[').trim_end_matches(']');
            let value = CapabilitySet::<F>::from_chars(chars)?;
            if let Some(entry) = map.entry_mut(key.trim()) {
                entry.set(value)?;
            }
        }
        Ok(map)
    }

    /// Persisted JSON object: non-zero keyed entries plus the default.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.iter()
                .filter(|(key, value)| *key == DEFAULT_KEY || !value.is_empty())
                .map(|(key, value)| (key.to_string(), serde_json::Value::from(value.bits())))
                .collect(),
        )
    }

    /// Decode the persisted JSON object.
    ///
    /// Keys outside the key space and non-integer values are skipped; integers
    /// are masked. A missing key means "use the default".
    pub fn from_json(keys: Arc<KeySpace>, value: &serde_json::Value) -> Result<Self, CapabilityError> {
        let object = value.as_object().ok_or_else(|| CapabilityError::Malformed {
            universe: F::universe().name().to_string(),
            reason: format!("expected a JSON object, got {value}"),
        })?;

        let mut map = Self::new(keys);
        for (key, raw) in object {
            let Some(bits) = raw.as_i64() else {
                continue;
            };
            if let Some(entry) = map.entry_mut(key) {
                *entry = CapabilitySet::from_bits(bits as i32);
            }
        }
        Ok(map)
    }

    pub fn from_json_str(keys: Arc<KeySpace>, input: &str) -> Result<Self, CapabilityError> {
        let value: serde_json::Value =
            serde_json::from_str(input).map_err(|e| CapabilityError::Malformed {
                universe: F::universe().name().to_string(),
                reason: e.to_string(),
            })?;
        Self::from_json(keys, &value)
    }
}

impl<F> Clone for CapabilityMap<F> {
    fn clone(&self) -> Self {
        Self {
            keys: Arc::clone(&self.keys),
            entries: self.entries.clone(),
            default: self.default,
        }
    }
}

impl<F> PartialEq for CapabilityMap<F> {
    fn eq(&self, other: &Self) -> bool {
        self.keys == other.keys && self.entries == other.entries && self.default == other.default
    }
}

impl<F> Eq for CapabilityMap<F> {}

impl<F: FlagSet> fmt::Debug for CapabilityMap<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<F: FlagSet> Serialize for CapabilityMap<F> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let live: Vec<_> = self
            .iter()
            .filter(|(key, value)| *key == DEFAULT_KEY || !value.is_empty())
            .collect();
        let mut map = serializer.serialize_map(Some(live.len()))?;
        for (key, value) in live {
            map.serialize_entry(key, &value.bits())?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::LazyLock;

    use proptest::prelude::*;

    use super::*;
    use crate::flags::FlagUniverse;

    struct Rw;

    static RW: LazyLock<FlagUniverse> = LazyLock::new(|| {
        FlagUniverse::new("rw", ["read", "write"])
            .and_then(|u| u.with_empty("none"))
            .and_then(|u| u.with_char_map([("read", "r"), ("write", "w"), ("none", "-")]))
            .unwrap()
    });

    impl FlagSet for Rw {
        fn universe() -> &'static FlagUniverse {
            &RW
        }
    }

    type Map = CapabilityMap<Rw>;

    fn keys() -> Arc<KeySpace> {
        Arc::new(KeySpace::new(["orders", "billing", "users"]).unwrap())
    }

    #[test]
    fn key_space_rejects_bad_keys() {
        assert!(matches!(
            KeySpace::new(["a", "a"]),
            Err(ConfigError::DuplicateKey { .. })
        ));
        assert!(matches!(
            KeySpace::new(["default"]),
            Err(ConfigError::ReservedKey { .. })
        ));
        assert!(matches!(
            KeySpace::new(["a b"]),
            Err(ConfigError::InvalidKey { .. })
        ));
    }

    #[test]
    fn get_falls_back_to_default_for_zero_and_unknown_keys() {
        let mut map = Map::new(keys());
        map.reset("read").unwrap();
        map.set("orders", ["read", "write"]).unwrap();

        assert_eq!(map.get("orders").bits(), 3);
        assert_eq!(map.get("billing").bits(), 1);
        assert_eq!(map.get("nonexistent").bits(), 1);

        // Explicitly zeroed keys fall back as well.
        map.set("orders", ()).unwrap();
        assert_eq!(map.get("orders").bits(), 1);
    }

    #[test]
    fn fallback_is_evaluated_per_call() {
        let mut map = Map::new(keys());
        assert!(map.get("billing").is_empty());
        map.default_entry_mut().add("write").unwrap();
        assert_eq!(map.get("billing").bits(), 2);
    }

    #[test]
    fn mutation_goes_through_live_handles() {
        let mut map = Map::new(keys());
        {
            let handle = map.entry_mut("orders").unwrap();
            handle.add("read").unwrap();
        }
        assert!(map.get("orders").is_superset("read").unwrap());

        assert!(map.delete("orders"));
        assert_eq!(map.entry("orders").map(|e| e.bits()), Some(0));
        assert!(!map.delete("nope"));
    }

    #[test]
    fn set_on_unknown_key_is_an_error() {
        let mut map = Map::new(keys());
        assert!(matches!(
            map.set("ghost", "read"),
            Err(CapabilityError::UnknownKey { .. })
        ));
        map.set(DEFAULT_KEY, "write").unwrap();
        assert_eq!(map.default_entry().bits(), 2);
    }

    #[test]
    fn add_all_skips_zero_entries_but_always_hits_default() {
        let mut map = Map::new(keys());
        map.set("orders", "read").unwrap();
        map.add_all("write").unwrap();

        assert_eq!(map.entry("orders").unwrap().bits(), 3);
        assert_eq!(map.entry("billing").unwrap().bits(), 0);
        assert_eq!(map.default_entry().bits(), 2);

        map.remove_all("read").unwrap();
        assert_eq!(map.entry("orders").unwrap().bits(), 2);
        assert_eq!(map.default_entry().bits(), 2);
    }

    #[test]
    fn object_updates_ignore_unknown_keys() {
        let mut map = Map::new(keys());
        map.add_object([("orders", "read"), ("ghost", "write"), ("default", "read")])
            .unwrap();
        assert_eq!(map.entry("orders").unwrap().bits(), 1);
        assert_eq!(map.default_entry().bits(), 1);

        map.remove_object([("orders", "read")]).unwrap();
        assert_eq!(map.entry("orders").unwrap().bits(), 0);
    }

    #[test]
    fn object_update_with_bad_flag_is_atomic() {
        let mut map = Map::new(keys());
        let err = map.add_object([("orders", "read"), ("billing", "delete")]);
        assert!(err.is_err());
        assert_eq!(map.entry("orders").unwrap().bits(), 0);
    }

    #[test]
    fn array_form() {
        let mut map = Map::new(keys());
        map.set("orders", ["read", "write"]).unwrap();
        map.set("users", "write").unwrap();
        map.reset(()).unwrap();
        map.set("billing", "read").unwrap();
        map.set(DEFAULT_KEY, "read").unwrap();

        assert_eq!(
            map.to_array(),
            vec!["billing-read", "default-read"]
        );
        assert_eq!(map.to_list_string(), "billing-read, default-read");

        let parsed = Map::from_array(
            keys(),
            ["billing-read", "ghost-read", "orders-delete", "garbage", "default-read"],
        );
        assert_eq!(parsed, map);
        assert_eq!(Map::parse_list(keys(), "billing-read, default-read"), map);
    }

    #[test]
    fn array_tokens_for_one_key_accumulate() {
        let parsed = Map::from_array(keys(), ["orders-write", "orders-read", "orders-write"]);
        assert_eq!(parsed.get("orders").bits(), 3);
        assert_eq!(parsed.get(DEFAULT_KEY).bits(), 0);
    }

    #[test]
    fn display_form() {
        let mut map = Map::new(keys());
        map.set("orders", ["read", "write"]).unwrap();
        assert_eq!(map.to_display().unwrap(), "orders: [rw], default: [-]");

        let parsed =
            Map::parse_display(keys(), "orders: [rw], ghost: [r], billing: [xw], default: [-]")
                .unwrap();
        assert_eq!(parsed.get("orders").bits(), 3);
        assert_eq!(parsed.get("billing").bits(), 2);
        assert!(parsed.default_entry().is_empty());
    }

    #[test]
    fn json_form() {
        let mut map = Map::new(keys());
        map.set("orders", 3).unwrap();
        map.set(DEFAULT_KEY, 1).unwrap();

        let json = map.to_json();
        assert_eq!(json, serde_json::json!({ "orders": 3, "default": 1 }));
        assert_eq!(serde_json::to_value(&map).unwrap(), json);

        let back = Map::from_json_str(keys(), r#"{"orders":3,"ghost":2,"users":"x","default":1}"#)
            .unwrap();
        assert_eq!(back, map);

        assert!(Map::from_json_str(keys(), "[1,2]").is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        #[test]
        fn fresh_map_resolves_unconfigured_keys_to_default(default in 0i32..4, key in "[a-z]{1,8}") {
            let mut map = Map::new(keys());
            map.reset(default).unwrap();
            prop_assert_eq!(map.get(&key), map.get(DEFAULT_KEY));
        }

        #[test]
        fn array_and_json_forms_round_trip(values in prop::collection::vec(0i32..4, 4)) {
            let mut map = Map::new(keys());
            for (key, value) in ["orders", "billing", "users", DEFAULT_KEY].iter().zip(&values) {
                map.set(key, *value).unwrap();
            }
            prop_assert_eq!(Map::from_array(keys(), map.to_array()), map.clone());
            prop_assert_eq!(Map::from_json(keys(), &map.to_json()).unwrap(), map);
        }
    }
}
