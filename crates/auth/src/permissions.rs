//! Per-resource access: `{read, write}` sets keyed by resource name.

use std::sync::{Arc, LazyLock};

use crate::capability_map::{CapabilityMap, KeySpace};
use crate::capability_set::{CapabilitySet, FlagSet};
use crate::error::ConfigError;
use crate::flags::FlagUniverse;

static ACCESS_UNIVERSE: LazyLock<FlagUniverse> = LazyLock::new(|| {
    FlagUniverse::new("access", ["read", "write"])
        .and_then(|u| u.with_empty("none"))
        .and_then(|u| u.with_char_map([("read", "r"), ("write", "w"), ("none", "-")]))
        .expect("access flag universe is well-formed")
});

/// Marker for the `{read, write}` universe (`r`/`w`, `-` for none).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessFlags;

impl FlagSet for AccessFlags {
    fn universe() -> &'static FlagUniverse {
        &ACCESS_UNIVERSE
    }
}

/// Access to one resource.
pub type Access = CapabilitySet<AccessFlags>;

/// Access to every registered resource, with a default for the rest.
///
/// Persisted as a JSON object of resource name → integer.
pub type ModelAccess = CapabilityMap<AccessFlags>;

impl CapabilitySet<AccessFlags> {
    pub const NONE: Self = Self::from_raw(0);
    pub const READ: Self = Self::from_raw(1);
    pub const WRITE: Self = Self::from_raw(1 << 1);
    pub const READ_WRITE: Self = Self::from_raw(0b11);
}

/// Key space over the registered resource names.
pub fn resource_keys<I, S>(resources: I) -> Result<Arc<KeySpace>, ConfigError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    KeySpace::new(resources).map(Arc::new)
}
