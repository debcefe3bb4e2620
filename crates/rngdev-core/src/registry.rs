//! Device identity registration with rollback.
//!
//! Registration is three ordered steps against the [`Host`]: a dynamic major,
//! a class, and a node under that class. A [`Registration`] guard records each
//! resource as it is acquired. If the guard is dropped before
//! [`Registration::commit`], whatever it holds is released in reverse order,
//! so a failed `initialize()` never leaves a partial registration behind.

use crate::error::{DeviceError, RegistrationStage, Result};
use crate::host::{DeviceNumber, Host};

/// Names a device registers under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceNames {
    pub device: String,
    pub class: String,
    pub minor: u32,
}

/// The registered triple of numeric id, class and node.
///
/// Only [`DeviceRegistry`] creates or destroys one.
#[derive(Debug)]
pub struct DeviceIdentity<H: Host> {
    number: DeviceNumber,
    name: String,
    class: H::Class,
    node: H::Node,
}

impl<H: Host> DeviceIdentity<H> {
    /// Major/minor the node was created for.
    pub fn number(&self) -> DeviceNumber {
        self.number
    }

    /// Name the major and node are registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Host handle for the class.
    pub fn class(&self) -> &H::Class {
        &self.class
    }

    /// Host handle for the addressable node.
    pub fn node(&self) -> &H::Node {
        &self.node
    }
}

// ---------------------------------------------------------------------------
// Scoped acquisition
// ---------------------------------------------------------------------------

/// In-progress registration. Releases everything it holds when dropped
/// uncommitted.
pub struct Registration<'h, H: Host> {
    host: &'h H,
    names: &'h DeviceNames,
    major: Option<u32>,
    class: Option<H::Class>,
    node: Option<H::Node>,
}

impl<'h, H: Host> Registration<'h, H> {
    /// Start an empty registration of `names` on `host`.
    pub fn begin(host: &'h H, names: &'h DeviceNames) -> Self {
        Self {
            host,
            names,
            major: None,
            class: None,
            node: None,
        }
    }

    /// Step 1: claim a dynamic major under the device name.
    pub fn claim_major(&mut self) -> Result<u32> {
        let major = self
            .host
            .register_major(&self.names.device)
            .map_err(|code| stage_failed(RegistrationStage::MajorNumber, code))?;
        log::info!("RNG: registered correctly with major number {major}");
        self.major = Some(major);
        Ok(major)
    }

    /// Step 2: create the device class.
    pub fn create_class(&mut self) -> Result<()> {
        let class = self
            .host
            .create_class(&self.names.class)
            .map_err(|code| stage_failed(RegistrationStage::Class, code))?;
        log::info!("RNG: device class registered correctly");
        self.class = Some(class);
        Ok(())
    }

    /// Step 3: create the node for `(major, minor)` under the class.
    /// Fails with `-EINVAL` if either earlier step is missing.
    pub fn create_node(&mut self) -> Result<()> {
        let (Some(major), Some(class)) = (self.major, self.class.as_ref()) else {
            // Steps out of order: the node needs both a major and a class.
            return Err(stage_failed(RegistrationStage::Node, -libc::EINVAL));
        };
        let number = DeviceNumber::new(major, self.names.minor);
        let node = self
            .host
            .create_node(class, number, &self.names.device)
            .map_err(|code| stage_failed(RegistrationStage::Node, code))?;
        log::info!("RNG: device node {number} created correctly");
        self.node = Some(node);
        Ok(())
    }

    /// Hand the acquired resources over as a [`DeviceIdentity`].
    pub fn commit(mut self) -> Result<DeviceIdentity<H>> {
        match (self.major, self.class.take(), self.node.take()) {
            (Some(major), Some(class), Some(node)) => {
                self.major = None;
                Ok(DeviceIdentity {
                    number: DeviceNumber::new(major, self.names.minor),
                    name: self.names.device.clone(),
                    class,
                    node,
                })
            }
            (_, class, node) => {
                // Put back whatever was taken so Drop rolls it back.
                self.class = class;
                self.node = node;
                Err(stage_failed(RegistrationStage::Node, -libc::EINVAL))
            }
        }
    }
}

impl<H: Host> Drop for Registration<'_, H> {
    fn drop(&mut self) {
        if let Some(node) = self.node.take() {
            if let Some(class) = self.class.as_ref() {
                self.host.destroy_node(class, node);
            }
        }
        if let Some(class) = self.class.take() {
            self.host.destroy_class(class);
            log::info!("RNG: rolled back device class");
        }
        if let Some(major) = self.major.take() {
            self.host.unregister_major(major, &self.names.device);
            log::info!("RNG: rolled back major number {major}");
        }
    }
}

fn stage_failed(stage: RegistrationStage, code: i32) -> DeviceError {
    log::error!("RNG: failed to register the {stage} (status {code})");
    DeviceError::Registration { stage, code }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Owns the host and, while registered, the device identity.
pub struct DeviceRegistry<H: Host> {
    host: H,
    names: DeviceNames,
    identity: Option<DeviceIdentity<H>>,
}

impl<H: Host> DeviceRegistry<H> {
    /// Unregistered registry; nothing touches `host` until
    /// [`initialize`](Self::initialize).
    pub fn new(host: H, names: DeviceNames) -> Self {
        Self {
            host,
            names,
            identity: None,
        }
    }

    /// The registered identity, if any.
    pub fn identity(&self) -> Option<&DeviceIdentity<H>> {
        self.identity.as_ref()
    }

    /// True between a successful `initialize` and `teardown`.
    pub fn is_registered(&self) -> bool {
        self.identity.is_some()
    }

    /// Run all three registration steps, rolling back on any failure.
    pub fn initialize(&mut self) -> Result<&DeviceIdentity<H>> {
        if self.identity.is_some() {
            log::warn!("RNG: initialize called while already registered");
            return Err(DeviceError::AlreadyRegistered);
        }

        let identity = {
            let mut reg = Registration::begin(&self.host, &self.names);
            reg.claim_major()?;
            reg.create_class()?;
            reg.create_node()?;
            reg.commit()?
        };

        Ok(self.identity.insert(identity))
    }

    /// Release node, class and major, in that order. A no-op when nothing is
    /// registered.
    pub fn teardown(&mut self) {
        let Some(identity) = self.identity.take() else {
            log::debug!("RNG: teardown with nothing registered");
            return;
        };
        let DeviceIdentity {
            number,
            name,
            class,
            node,
        } = identity;
        self.host.destroy_node(&class, node);
        self.host.destroy_class(class);
        self.host.unregister_major(number.major, &name);
        log::info!("RNG: unregistered {name} ({number})");
    }
}

impl<H: Host> Drop for DeviceRegistry<H> {
    fn drop(&mut self) {
        self.teardown();
    }
}
