//! Flag universes: the ordered, fixed list of named bits a capability set ranges over.
//!
//! A universe is declared once per use case (roles, per-resource access) and
//! then shared read-only by every value built over it. All lookup tables
//! (name → bit, bit → display character) are computed here, at construction.

use std::collections::{HashMap, HashSet};

use crate::error::{CapabilityError, ConfigError};

/// Maximum number of flags a universe may declare (one per bit of an `i32`).
pub const MAX_FLAGS: usize = 32;

/// Separator of the human-readable name form (`"api/gui"`).
pub const NAME_SEPARATOR: char = '/';

/// An ordered set of named flags, each owning one bit.
///
/// # Invariants
/// - 1..=32 flags, pairwise distinct, bit `i` belongs to flag `i`.
/// - `mask == (1 << n) - 1` (all 32 bits when `n == 32`).
/// - The optional empty name stands for the value `0` and never owns a bit.
/// - When a character map is present, every flag has exactly one character and
///   no two entries (including the empty flag's) share a character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagUniverse {
    name: String,
    flags: Vec<String>,
    empty: Option<String>,
    chars: Option<Vec<char>>,
    empty_char: Option<char>,
    bits: HashMap<String, i32>,
    mask: i32,
}

impl FlagUniverse {
    /// Declare a universe from its flags, in bit order.
    pub fn new<I, S>(name: impl Into<String>, flags: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        let flags: Vec<String> = flags.into_iter().map(Into::into).collect();

        if flags.is_empty() {
            return Err(ConfigError::NoFlags { universe: name });
        }
        if flags.len() > MAX_FLAGS {
            return Err(ConfigError::TooManyFlags {
                universe: name,
                count: flags.len(),
            });
        }

        let mut bits = HashMap::with_capacity(flags.len());
        for (idx, flag) in flags.iter().enumerate() {
            if !is_valid_flag_name(flag) {
                return Err(ConfigError::InvalidFlagName {
                    universe: name,
                    flag: flag.clone(),
                });
            }
            if bits.insert(flag.clone(), (1u32 << idx) as i32).is_some() {
                return Err(ConfigError::DuplicateFlag {
                    universe: name,
                    flag: flag.clone(),
                });
            }
        }

        let mask = (u32::MAX >> (MAX_FLAGS - flags.len())) as i32;

        Ok(Self {
            name,
            flags,
            empty: None,
            chars: None,
            empty_char: None,
            bits,
            mask,
        })
    }

    /// Name the value `0` (e.g. `"none"`).
    pub fn with_empty(mut self, empty: impl Into<String>) -> Result<Self, ConfigError> {
        let empty = empty.into();
        if !is_valid_flag_name(&empty) {
            return Err(ConfigError::InvalidFlagName {
                universe: self.name,
                flag: empty,
            });
        }
        if self.bits.contains_key(&empty) {
            return Err(ConfigError::EmptyNameCollision {
                universe: self.name,
                name: empty,
            });
        }
        self.empty = Some(empty);
        Ok(self)
    }

    /// Attach a single-character display code to every flag.
    ///
    /// The empty flag may be given a character too; it is rendered for the
    /// value `0`. Call [`with_empty`](Self::with_empty) first if so.
    pub fn with_char_map<I, K, V>(mut self, entries: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut chars: Vec<Option<char>> = vec![None; self.flags.len()];
        let mut empty_char = None;
        let mut seen = HashSet::new();

        for (flag, value) in entries {
            let (flag, value) = (flag.as_ref(), value.as_ref());

            let mut it = value.chars();
            let ch = match (it.next(), it.next()) {
                (Some(ch), None) => ch,
                _ => {
                    return Err(ConfigError::CharMapNotSingleChar {
                        universe: self.name,
                        flag: flag.to_string(),
                        value: value.to_string(),
                    });
                }
            };
            if !seen.insert(ch) {
                return Err(ConfigError::CharMapDuplicateChar {
                    universe: self.name,
                    ch,
                });
            }

            if self.empty.as_deref() == Some(flag) {
                empty_char = Some(ch);
            } else if let Some(idx) = self.index_of(flag) {
                chars[idx] = Some(ch);
            } else {
                return Err(ConfigError::CharMapUnknownFlag {
                    universe: self.name,
                    flag: flag.to_string(),
                });
            }
        }

        let mut resolved = Vec::with_capacity(chars.len());
        for (idx, ch) in chars.into_iter().enumerate() {
            match ch {
                Some(ch) => resolved.push(ch),
                None => {
                    return Err(ConfigError::CharMapIncomplete {
                        universe: self.name,
                        flag: self.flags[idx].clone(),
                    });
                }
            }
        }

        self.chars = Some(resolved);
        self.empty_char = empty_char;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared flags in bit order (the empty name is not included).
    pub fn flags(&self) -> &[String] {
        &self.flags
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn mask(&self) -> i32 {
        self.mask
    }

    pub fn empty_name(&self) -> Option<&str> {
        self.empty.as_deref()
    }

    pub fn has_char_map(&self) -> bool {
        self.chars.is_some()
    }

    /// Bit owned by `name`; the empty name resolves to `0`.
    pub fn bit(&self, name: &str) -> Option<i32> {
        if self.empty.as_deref() == Some(name) {
            return Some(0);
        }
        self.bits.get(name).copied()
    }

    /// Like [`bit`](Self::bit) but reports unknown names.
    pub fn resolve(&self, name: &str) -> Result<i32, CapabilityError> {
        self.bit(name).ok_or_else(|| CapabilityError::UnknownFlag {
            universe: self.name.clone(),
            flag: name.to_string(),
        })
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.flags.iter().position(|f| f == name)
    }

    /// Names of the flags set in `bits`, in bit order.
    pub fn names(&self, bits: i32) -> impl Iterator<Item = &str> + '_ {
        self.flags
            .iter()
            .enumerate()
            .filter(move |(idx, _)| bits & (1u32 << idx) as i32 != 0)
            .map(|(_, f)| f.as_str())
    }

    /// `"api/gui"` form; `0` renders as the empty name (or `""`).
    pub fn encode_names(&self, bits: i32) -> String {
        let bits = bits & self.mask;
        if bits == 0 {
            return self.empty.clone().unwrap_or_default();
        }
        self.names(bits).collect::<Vec<_>>().join("/")
    }

    /// Strict inverse of [`encode_names`](Self::encode_names).
    ///
    /// Every `/`-separated token must be a declared flag or the empty name.
    /// An empty input is the value `0`.
    pub fn decode_names(&self, input: &str) -> Result<i32, CapabilityError> {
        if input.is_empty() {
            return Ok(0);
        }
        input
            .split(NAME_SEPARATOR)
            .try_fold(0, |acc, token| -> Result<i32, CapabilityError> {
                Ok(acc | self.resolve(token)?)
            })
    }

    /// Character form (`"rw"`); `0` renders as the empty flag's character (or `""`).
    ///
    /// `None` when the universe has no character map.
    pub fn encode_chars(&self, bits: i32) -> Option<String> {
        let chars = self.chars.as_ref()?;
        let bits = bits & self.mask;
        if bits == 0 {
            return Some(self.empty_char.map(String::from).unwrap_or_default());
        }
        Some(
            chars
                .iter()
                .enumerate()
                .filter(|(idx, _)| bits & (1u32 << idx) as i32 != 0)
                .map(|(_, ch)| *ch)
                .collect(),
        )
    }

    /// Lenient inverse of [`encode_chars`](Self::encode_chars): a flag is set
    /// when its character occurs anywhere in `input`; other characters are ignored.
    pub fn decode_chars(&self, input: &str) -> Result<i32, CapabilityError> {
        let chars = self.chars.as_ref().ok_or_else(|| CapabilityError::NoCharMap {
            universe: self.name.clone(),
        })?;
        Ok(chars
            .iter()
            .enumerate()
            .filter(|(_, ch)| input.contains(**ch))
            .fold(0, |acc, (idx, _)| acc | (1u32 << idx) as i32))
    }
}

fn is_valid_flag_name(name: &str) -> bool {
    !name.is_empty()
        && !name
            .chars()
            .any(|c| c == NAME_SEPARATOR || c == ',' || c == ':' || c.is_whitespace())
}
