//! Capability sets: an `i32` bitmask over one [`FlagUniverse`].
//!
//! `CapabilitySet<F>` is parameterized by a zero-sized marker implementing
//! [`FlagSet`], so a role can never be mixed up with a per-resource access
//! value at compile time while the flag names themselves stay data.

use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;
use core::ops::{BitOr, BitOrAssign};
use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CapabilityError;
use crate::flags::FlagUniverse;

/// Binds a marker type to its (lazily built, immutable) flag universe.
pub trait FlagSet: 'static {
    fn universe() -> &'static FlagUniverse;
}

/// Anything that can be turned into the bits of a `CapabilitySet<F>`.
///
/// Integers are accepted as-is (masking happens at the set), flag names are
/// resolved strictly, and lists are OR-ed together.
pub trait IntoBits<F: FlagSet> {
    fn into_bits(self) -> Result<i32, CapabilityError>;
}

impl<F: FlagSet> IntoBits<F> for () {
    fn into_bits(self) -> Result<i32, CapabilityError> {
        Ok(0)
    }
}

impl<F: FlagSet> IntoBits<F> for i32 {
    fn into_bits(self) -> Result<i32, CapabilityError> {
        Ok(self)
    }
}

impl<F: FlagSet> IntoBits<F> for &str {
    fn into_bits(self) -> Result<i32, CapabilityError> {
        F::universe().resolve(self)
    }
}

impl<F: FlagSet> IntoBits<F> for &String {
    fn into_bits(self) -> Result<i32, CapabilityError> {
        F::universe().resolve(self)
    }
}

impl<F: FlagSet> IntoBits<F> for String {
    fn into_bits(self) -> Result<i32, CapabilityError> {
        F::universe().resolve(&self)
    }
}

impl<F: FlagSet> IntoBits<F> for CapabilitySet<F> {
    fn into_bits(self) -> Result<i32, CapabilityError> {
        Ok(self.bits)
    }
}

impl<F: FlagSet> IntoBits<F> for &CapabilitySet<F> {
    fn into_bits(self) -> Result<i32, CapabilityError> {
        Ok(self.bits)
    }
}

impl<F: FlagSet, T: IntoBits<F> + Clone> IntoBits<F> for &[T] {
    fn into_bits(self) -> Result<i32, CapabilityError> {
        self.iter()
            .cloned()
            .try_fold(0, |acc, v| -> Result<i32, CapabilityError> {
                Ok(acc | v.into_bits()?)
            })
    }
}

impl<F: FlagSet, T: IntoBits<F> + Clone, const N: usize> IntoBits<F> for [T; N] {
    fn into_bits(self) -> Result<i32, CapabilityError> {
        IntoBits::<F>::into_bits(&self[..])
    }
}

impl<F: FlagSet, T: IntoBits<F>> IntoBits<F> for Vec<T> {
    fn into_bits(self) -> Result<i32, CapabilityError> {
        self.into_iter()
            .try_fold(0, |acc, v| -> Result<i32, CapabilityError> {
                Ok(acc | v.into_bits()?)
            })
    }
}

/// A set of flags from `F`'s universe, stored pre-masked.
///
/// # Invariants
/// - `bits & !mask == 0` at all times.
/// - `0` is the empty set and renders with the universe's empty name.
pub struct CapabilitySet<F> {
    bits: i32,
    _flags: PhantomData<fn() -> F>,
}

impl<F> CapabilitySet<F> {
    /// Build from bits already known to lie inside the mask.
    pub(crate) const fn from_raw(bits: i32) -> Self {
        Self {
            bits,
            _flags: PhantomData,
        }
    }

    pub const fn empty() -> Self {
        Self::from_raw(0)
    }

    /// Raw integer value (the persisted and JSON form).
    pub const fn bits(&self) -> i32 {
        self.bits
    }

    pub const fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// True when every bit of `other` is set here.
    pub const fn contains(&self, other: Self) -> bool {
        self.bits & other.bits == other.bits
    }
}

impl<F: FlagSet> CapabilitySet<F> {
    /// Build from any supported input; unknown flag names are an error.
    pub fn new(value: impl IntoBits<F>) -> Result<Self, CapabilityError> {
        Ok(Self::from_bits(value.into_bits()?))
    }

    /// Build from an integer, silently discarding bits outside the universe.
    pub fn from_bits(bits: i32) -> Self {
        Self::from_raw(bits & F::universe().mask())
    }

    /// Singleton set for one named flag.
    pub fn flag(name: &str) -> Result<Self, CapabilityError> {
        Self::new(name)
    }

    /// Every flag of the universe.
    pub fn all() -> Self {
        Self::from_raw(F::universe().mask())
    }

    pub fn universe(&self) -> &'static FlagUniverse {
        F::universe()
    }

    /// Replace the value. `set(())` clears it.
    pub fn set(&mut self, value: impl IntoBits<F>) -> Result<&mut Self, CapabilityError> {
        self.bits = value.into_bits()? & F::universe().mask();
        Ok(self)
    }

    /// Bitwise OR.
    pub fn add(&mut self, value: impl IntoBits<F>) -> Result<&mut Self, CapabilityError> {
        self.bits |= value.into_bits()? & F::universe().mask();
        Ok(self)
    }

    /// Bitwise AND-NOT.
    pub fn remove(&mut self, value: impl IntoBits<F>) -> Result<&mut Self, CapabilityError> {
        self.bits &= !value.into_bits()?;
        Ok(self)
    }

    pub fn clear(&mut self) {
        self.bits = 0;
    }

    /// Every set flag also appears in `value`.
    ///
    /// The empty set is a subset of anything; a non-empty set is never a
    /// subset of the empty set.
    pub fn is_subset(&self, value: impl IntoBits<F>) -> Result<bool, CapabilityError> {
        let test = value.into_bits()? & F::universe().mask();
        Ok(self.bits & test == self.bits)
    }

    /// Every flag of `value` is set here.
    pub fn is_superset(&self, value: impl IntoBits<F>) -> Result<bool, CapabilityError> {
        let test = value.into_bits()? & F::universe().mask();
        Ok(self.bits & test == test)
    }

    /// At least one flag in common.
    pub fn intersects(&self, value: impl IntoBits<F>) -> Result<bool, CapabilityError> {
        let test = value.into_bits()?;
        Ok(self.bits & test != 0)
    }

    /// No flag in common. Anything is exclusive with the empty set,
    /// including the empty set itself.
    pub fn is_exclusive(&self, value: impl IntoBits<F>) -> Result<bool, CapabilityError> {
        Ok(!self.intersects(value)?)
    }

    pub fn equals(&self, value: impl IntoBits<F>) -> Result<bool, CapabilityError> {
        let test = value.into_bits()? & F::universe().mask();
        Ok(self.bits == test)
    }

    /// Names of the set flags, in bit order.
    pub fn names(&self) -> Vec<&'static str> {
        F::universe().names(self.bits).collect()
    }

    /// `"api/gui"` form, regardless of any character map.
    pub fn to_names_string(&self) -> String {
        F::universe().encode_names(self.bits)
    }

    /// Character form (`"rw"`), when the universe has a character map.
    pub fn to_chars(&self) -> Option<String> {
        F::universe().encode_chars(self.bits)
    }

    /// Strict parse of the `/`-delimited name form.
    pub fn parse_names(input: &str) -> Result<Self, CapabilityError> {
        Ok(Self::from_raw(F::universe().decode_names(input)?))
    }

    /// Lenient parse of the character form; unknown characters are ignored.
    pub fn from_chars(input: &str) -> Result<Self, CapabilityError> {
        Ok(Self::from_raw(F::universe().decode_chars(input)?))
    }
}

impl<F> Clone for CapabilitySet<F> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<F> Copy for CapabilitySet<F> {}

impl<F> PartialEq for CapabilitySet<F> {
    fn eq(&self, other: &Self) -> bool {
        self.bits == other.bits
    }
}

impl<F> Eq for CapabilitySet<F> {}

impl<F> Hash for CapabilitySet<F> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits.hash(state);
    }
}

impl<F> Default for CapabilitySet<F> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<F: FlagSet> BitOr for CapabilitySet<F> {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self::from_raw(self.bits | rhs.bits)
    }
}

impl<F: FlagSet> BitOrAssign for CapabilitySet<F> {
    fn bitor_assign(&mut self, rhs: Self) {
        self.bits |= rhs.bits;
    }
}

impl<F: FlagSet> fmt::Display for CapabilitySet<F> {
    /// Character form when available, otherwise the name form.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_chars() {
            Some(chars) => f.write_str(&chars),
            None => f.write_str(&self.to_names_string()),
        }
    }
}

impl<F: FlagSet> fmt::Debug for CapabilitySet<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({:#x} {})",
            F::universe().name(),
            self.bits,
            self.to_names_string()
        )
    }
}

impl<F: FlagSet> FromStr for CapabilitySet<F> {
    type Err = CapabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_names(s)
    }
}

impl<F> Serialize for CapabilitySet<F> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.bits)
    }
}

impl<'de, F: FlagSet> Deserialize<'de> for CapabilitySet<F> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        i32::deserialize(deserializer).map(Self::from_bits)
    }
}
