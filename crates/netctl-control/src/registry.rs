//! Lookup of adapters by physical device identity.
//!
//! The registry is an ordinary value owned by whoever drives device discovery; there is no
//! process-global table.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{CtlError, Result};

/// PCI function address, `domain:bus:device.function`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId {
    pub domain: u16,
    pub bus: u8,
    pub device: u8,
    pub function: u8,
}

impl DeviceId {
    pub const fn new(domain: u16, bus: u8, device: u8, function: u8) -> Self {
        Self {
            domain,
            bus,
            device,
            function,
        }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:02x}:{:02x}.{:x}",
            self.domain, self.bus, self.device, self.function
        )
    }
}

impl FromStr for DeviceId {
    type Err = CtlError;

    /// Accepts `dddd:bb:dd.f` and the short form `bb:dd.f` (domain 0).
    fn from_str(s: &str) -> Result<Self> {
        let bad = || CtlError::InvalidConfig(format!("invalid PCI address {s:?}"));

        let (rest, function) = s.rsplit_once('.').ok_or_else(bad)?;
        let mut parts = rest.rsplitn(3, ':');
        let device = parts.next().ok_or_else(bad)?;
        let bus = parts.next().ok_or_else(bad)?;
        let domain = parts.next().unwrap_or("0");

        let id = Self {
            domain: u16::from_str_radix(domain, 16).map_err(|_| bad())?,
            bus: u8::from_str_radix(bus, 16).map_err(|_| bad())?,
            device: u8::from_str_radix(device, 16).map_err(|_| bad())?,
            function: u8::from_str_radix(function, 16).map_err(|_| bad())?,
        };
        if id.device > 0x1f || id.function > 7 {
            return Err(bad());
        }
        Ok(id)
    }
}

/// Adapters keyed by [`DeviceId`]. Insertion and removal are driven by device discovery and
/// teardown.
#[derive(Debug)]
pub struct AdapterRegistry<A> {
    adapters: BTreeMap<DeviceId, A>,
}

impl<A> AdapterRegistry<A> {
    pub fn new() -> Self {
        Self {
            adapters: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, id: DeviceId, adapter: A) -> Result<()> {
        if self.adapters.contains_key(&id) {
            return Err(CtlError::DuplicateAdapter(id));
        }
        self.adapters.insert(id, adapter);
        Ok(())
    }

    pub fn remove(&mut self, id: &DeviceId) -> Option<A> {
        self.adapters.remove(id)
    }

    pub fn get(&self, id: &DeviceId) -> Option<&A> {
        self.adapters.get(id)
    }

    pub fn get_mut(&mut self, id: &DeviceId) -> Option<&mut A> {
        self.adapters.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DeviceId, &A)> {
        self.adapters.iter()
    }
}

impl<A> Default for AdapterRegistry<A> {
    fn default() -> Self {
        Self::new()
    }
}
