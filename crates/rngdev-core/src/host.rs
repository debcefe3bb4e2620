//! The host's device-registration surface.
//!
//! The driver core never talks to an operating system directly. It asks a
//! [`Host`] for a numeric id, a class and a node, and hands each back when it
//! is done. Failures come back as negative errno values, the way the kernel's
//! registration calls report them.
//!
//! [`SimulatedHost`] keeps everything in memory, tracks what is currently
//! claimed, and can be told to fail a particular step.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::error::RegistrationStage;

/// Negative errno on failure.
pub type HostResult<T> = std::result::Result<T, i32>;

/// Highest dynamically assigned major, allocated downward like Linux does.
pub const DYNAMIC_MAJOR_END: u32 = 254;
/// Lowest dynamically assigned major.
pub const DYNAMIC_MAJOR_START: u32 = 234;

/// Bits of a packed device number that hold the minor (`MINORBITS`).
pub const MINOR_BITS: u32 = 20;
/// Majors occupy the remaining 12 bits of a packed device number.
pub const MAX_MAJOR: u32 = (1 << (32 - MINOR_BITS)) - 1;
const MINOR_MASK: u32 = (1 << MINOR_BITS) - 1;

/// A major/minor device number pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DeviceNumber {
    pub major: u32,
    pub minor: u32,
}

impl DeviceNumber {
    /// Pair a major and minor as given; [`encode`](Self::encode) masks each to its field.
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Packed form, same layout as the kernel's `MKDEV`. Out-of-range
    /// majors and minors are masked to their fields.
    pub fn encode(self) -> u32 {
        ((self.major & MAX_MAJOR) << MINOR_BITS) | (self.minor & MINOR_MASK)
    }
}

impl std::fmt::Display for DeviceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.major, self.minor)
    }
}

/// Registration calls a device driver makes against its host.
///
/// Class and node handles are owned values: whoever holds one is responsible
/// for giving it back exactly once.
pub trait Host: Send + Sync {
    type Class: Send + Sync + std::fmt::Debug;
    type Node: Send + Sync + std::fmt::Debug;

    /// Claim a dynamically assigned major number for `name`.
    fn register_major(&self, name: &str) -> HostResult<u32>;
    fn unregister_major(&self, major: u32, name: &str);

    fn create_class(&self, name: &str) -> HostResult<Self::Class>;
    fn destroy_class(&self, class: Self::Class);

    /// Create the addressable node `name` for `number` under `class`.
    fn create_node(
        &self,
        class: &Self::Class,
        number: DeviceNumber,
        name: &str,
    ) -> HostResult<Self::Node>;
    fn destroy_node(&self, class: &Self::Class, node: Self::Node);
}

// ---------------------------------------------------------------------------
// Simulated host
// ---------------------------------------------------------------------------

/// Everything a host currently has claimed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Inventory {
    pub majors: Vec<(u32, String)>,
    pub classes: Vec<String>,
    pub nodes: Vec<(String, DeviceNumber)>,
}

impl Inventory {
    /// True when the host holds no major, class or node.
    pub fn is_empty(&self) -> bool {
        self.majors.is_empty() && self.classes.is_empty() && self.nodes.is_empty()
    }
}

#[derive(Debug)]
pub struct SimClass {
    name: String,
}

impl SimClass {
    /// Class name as registered.
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug)]
pub struct SimNode {
    name: String,
    number: DeviceNumber,
}

impl SimNode {
    /// Node name as registered.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Device number the node was created for.
    pub fn number(&self) -> DeviceNumber {
        self.number
    }
}

#[derive(Debug, Default)]
struct SimState {
    majors: BTreeMap<u32, String>,
    classes: BTreeSet<String>,
    nodes: BTreeMap<String, DeviceNumber>,
    pending_failure: Option<(RegistrationStage, i32)>,
}

impl SimState {
    fn take_failure(&mut self, stage: RegistrationStage) -> HostResult<()> {
        match self.pending_failure {
            Some((s, code)) if s == stage => {
                self.pending_failure = None;
                Err(code)
            }
            _ => Ok(()),
        }
    }
}

/// In-memory host. Clones share state, so a test can keep one clone to
/// inspect the inventory after the device owning the other is gone.
#[derive(Debug, Clone, Default)]
pub struct SimulatedHost {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedHost {
    /// Empty host with no pending failure.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next call for `stage` fail with `-ENOMEM`.
    pub fn fail_next(&self, stage: RegistrationStage) {
        self.fail_next_with(stage, -libc::ENOMEM);
    }

    /// Make the next call for `stage` fail with `code`.
    pub fn fail_next_with(&self, stage: RegistrationStage, code: i32) {
        self.state().pending_failure = Some((stage, code));
    }

    /// Snapshot of everything currently claimed.
    pub fn inventory(&self) -> Inventory {
        let st = self.state();
        Inventory {
            majors: st.majors.iter().map(|(m, n)| (*m, n.clone())).collect(),
            classes: st.classes.iter().cloned().collect(),
            nodes: st.nodes.iter().map(|(n, d)| (n.clone(), *d)).collect(),
        }
    }
}

impl Host for SimulatedHost {
    type Class = SimClass;
    type Node = SimNode;

    fn register_major(&self, name: &str) -> HostResult<u32> {
        let mut st = self.state();
        st.take_failure(RegistrationStage::MajorNumber)?;
        let major = (DYNAMIC_MAJOR_START..=DYNAMIC_MAJOR_END)
            .rev()
            .find(|m| !st.majors.contains_key(m))
            .ok_or(-libc::EBUSY)?;
        st.majors.insert(major, name.to_string());
        Ok(major)
    }

    fn unregister_major(&self, major: u32, name: &str) {
        let mut st = self.state();
        if st.majors.get(&major).is_some_and(|owner| owner == name) {
            st.majors.remove(&major);
        } else {
            log::warn!("sim host: major {major} is not held by {name}");
        }
    }

    fn create_class(&self, name: &str) -> HostResult<SimClass> {
        let mut st = self.state();
        st.take_failure(RegistrationStage::Class)?;
        if st.classes.contains(name) {
            return Err(-libc::EEXIST);
        }
        st.classes.insert(name.to_string());
        Ok(SimClass {
            name: name.to_string(),
        })
    }

    fn destroy_class(&self, class: SimClass) {
        self.state().classes.remove(&class.name);
    }

    fn create_node(
        &self,
        class: &SimClass,
        number: DeviceNumber,
        name: &str,
    ) -> HostResult<SimNode> {
        let mut st = self.state();
        st.take_failure(RegistrationStage::Node)?;
        if !st.classes.contains(&class.name) {
            return Err(-libc::ENOENT);
        }
        if st.nodes.contains_key(name) {
            return Err(-libc::EEXIST);
        }
        st.nodes.insert(name.to_string(), number);
        Ok(SimNode {
            name: name.to_string(),
            number,
        })
    }

    fn destroy_node(&self, _class: &SimClass, node: SimNode) {
        self.state().nodes.remove(&node.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_number_encode() {
        let d = DeviceNumber::new(254, 0);
        assert_eq!(d.encode(), 254 << 20);
        assert_eq!(DeviceNumber::new(1, 9).encode(), (1 << 20) | 9);
        assert_eq!(d.to_string(), "254:0");
    }

    #[test]
    fn test_device_number_encode_masks_fields() {
        assert_eq!(MAX_MAJOR, 4095);
        assert_eq!(DeviceNumber::new(MAX_MAJOR, 0).encode(), 0xFFF0_0000);
        // Neither field bleeds into the other.
        assert_eq!(DeviceNumber::new(4096 + 7, 0).encode(), 7 << 20);
        assert_eq!(DeviceNumber::new(1, 1 << 20).encode(), 1 << 20);
    }

    #[test]
    fn test_majors_allocated_downward() {
        let host = SimulatedHost::new();
        assert_eq!(host.register_major("a"), Ok(254));
        assert_eq!(host.register_major("b"), Ok(253));
        host.unregister_major(254, "a");
        assert_eq!(host.register_major("c"), Ok(254));
    }

    #[test]
    fn test_majors_exhausted() {
        let host = SimulatedHost::new();
        let n = (DYNAMIC_MAJOR_END - DYNAMIC_MAJOR_START + 1) as usize;
        for i in 0..n {
            assert!(host.register_major(&format!("dev{i}")).is_ok());
        }
        assert_eq!(host.register_major("one_too_many"), Err(-libc::EBUSY));
    }

    #[test]
    fn test_unregister_wrong_owner_is_ignored() {
        let host = SimulatedHost::new();
        let m = host.register_major("a").unwrap();
        host.unregister_major(m, "b");
        assert_eq!(host.inventory().majors, vec![(m, "a".to_string())]);
    }

    #[test]
    fn test_duplicate_class_rejected() {
        let host = SimulatedHost::new();
        let _c = host.create_class("cls").unwrap();
        assert_eq!(host.create_class("cls").unwrap_err(), -libc::EEXIST);
    }

    #[test]
    fn test_injected_failure_is_one_shot() {
        let host = SimulatedHost::new();
        host.fail_next(RegistrationStage::Class);
        assert_eq!(host.create_class("cls").unwrap_err(), -libc::ENOMEM);
        assert!(host.create_class("cls").is_ok());
    }

    #[test]
    fn test_injected_failure_only_hits_its_stage() {
        let host = SimulatedHost::new();
        host.fail_next_with(RegistrationStage::Node, -libc::ENODEV);
        assert!(host.register_major("a").is_ok());
        let class = host.create_class("cls").unwrap();
        let err = host
            .create_node(&class, DeviceNumber::new(254, 0), "n")
            .unwrap_err();
        assert_eq!(err, -libc::ENODEV);
    }

    #[test]
    fn test_inventory_round_trip() {
        let host = SimulatedHost::new();
        let m = host.register_major("dev").unwrap();
        let class = host.create_class("cls").unwrap();
        let node = host
            .create_node(&class, DeviceNumber::new(m, 0), "dev")
            .unwrap();
        let inv = host.inventory();
        assert_eq!(inv.nodes, vec![("dev".to_string(), DeviceNumber::new(m, 0))]);
        assert_eq!(inv.classes, vec!["cls".to_string()]);

        host.destroy_node(&class, node);
        host.destroy_class(class);
        host.unregister_major(m, "dev");
        assert!(host.inventory().is_empty());
    }

    #[test]
    fn test_clones_share_state() {
        let host = SimulatedHost::new();
        let observer = host.clone();
        host.register_major("dev").unwrap();
        assert_eq!(observer.inventory().majors.len(), 1);
    }
}
