//! Device registry.
//!
//! [`DeviceRegistry`] owns the vendor backend and every handle it has opened, keyed by
//! slot. Slots are 1-based positions in scan order, so they are only stable within one
//! discovery pass: if the attached set changes, a slot can name a different device on the
//! next scan. A slot whose device path changed is re-attached.
//!
//! Handles live until [`DeviceRegistry::close_all`] or until the registry is dropped.

use crate::device::{DeviceBackend, ResponseDevice};
use crate::error::{EvtError, EvtResult};
use crate::metadata::DeviceDescriptor;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

struct OpenDevice {
    descriptor: DeviceDescriptor,
    handle: Box<dyn ResponseDevice>,
}

/// Slot → open handle, for one experiment session.
pub struct DeviceRegistry {
    backend: Box<dyn DeviceBackend>,
    open: BTreeMap<usize, OpenDevice>,
}

impl DeviceRegistry {
    pub fn new(backend: Box<dyn DeviceBackend>) -> Self {
        Self {
            backend,
            open: BTreeMap::new(),
        }
    }

    /// Scan for devices in `group`. An empty result is `Ok`; a failing scan is
    /// [`EvtError::DeviceScan`].
    pub fn discover(&mut self, group: &str) -> EvtResult<Vec<DeviceDescriptor>> {
        let found = self.backend.scan(group).map_err(|e| match e {
            e @ EvtError::DeviceScan(_) => e,
            other => EvtError::DeviceScan(other.to_string()),
        })?;
        debug!(group, count = found.len(), "Scanned for EVT devices");
        Ok(found)
    }

    /// Return the handle in `slot`, attaching `descriptor` first if the slot is empty or
    /// currently holds a different device.
    pub fn ensure_open(
        &mut self,
        slot: usize,
        descriptor: &DeviceDescriptor,
    ) -> EvtResult<&mut dyn ResponseDevice> {
        match self.open.entry(slot) {
            Entry::Occupied(mut e) => {
                if e.get().descriptor.path != descriptor.path {
                    info!(
                        slot,
                        old = %e.get().descriptor.path,
                        new = %descriptor.path,
                        "Slot now holds a different device, re-attaching"
                    );
                    // The slot must not keep the old device's handle if this fails.
                    let handle = match self.backend.attach(descriptor) {
                        Ok(handle) => handle,
                        Err(err) => {
                            e.remove();
                            return Err(err);
                        }
                    };
                    e.insert(OpenDevice {
                        descriptor: descriptor.clone(),
                        handle,
                    });
                }
                Ok(e.into_mut().handle.as_mut())
            }
            Entry::Vacant(e) => {
                let handle = self.backend.attach(descriptor)?;
                let open = e.insert(OpenDevice {
                    descriptor: descriptor.clone(),
                    handle,
                });
                Ok(open.handle.as_mut())
            }
        }
    }

    /// Discover `group` and make sure every device found is open in its slot.
    ///
    /// Attach failures are logged and skipped; the failed slot stays empty. Slots beyond
    /// the end of the scan are released. Returns the devices discovered.
    pub fn populate(&mut self, group: &str) -> EvtResult<Vec<DeviceDescriptor>> {
        let found = self.discover(group)?;
        for (slot, dev) in self.open.split_off(&(found.len() + 1)) {
            info!(slot, device = dev.handle.id(), "Device no longer present, releasing");
        }
        for (i, descriptor) in found.iter().enumerate() {
            let slot = i + 1;
            if let Err(e) = self.ensure_open(slot, descriptor) {
                warn!(slot, error = %e, "Attaching EVT device failed");
            }
        }
        debug!(slots = ?self.slots(), "Open devices");
        Ok(found)
    }

    /// Handle in `slot`, or [`EvtError::UnknownSlot`].
    pub fn select(&mut self, slot: usize) -> EvtResult<&mut dyn ResponseDevice> {
        match self.open.get_mut(&slot) {
            Some(d) => Ok(d.handle.as_mut()),
            None => Err(EvtError::UnknownSlot(slot)),
        }
    }

    /// Whether `slot` holds an open handle to `descriptor`'s device.
    pub fn holds(&self, slot: usize, descriptor: &DeviceDescriptor) -> bool {
        self.descriptor(slot).is_some_and(|d| d.path == descriptor.path)
    }

    pub fn contains(&self, slot: usize) -> bool {
        self.open.contains_key(&slot)
    }

    /// Descriptor of the device open in `slot`.
    pub fn descriptor(&self, slot: usize) -> Option<&DeviceDescriptor> {
        self.open.get(&slot).map(|d| &d.descriptor)
    }

    pub fn slots(&self) -> Vec<usize> {
        self.open.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    /// Release every handle.
    pub fn close_all(&mut self) {
        for (slot, dev) in std::mem::take(&mut self.open) {
            debug!(slot, device = dev.handle.id(), "Releasing device handle");
        }
    }
}

impl Drop for DeviceRegistry {
    fn drop(&mut self) {
        self.close_all();
    }
}
