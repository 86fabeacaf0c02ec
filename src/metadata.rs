//! Device descriptors.
//!
//! [`DeviceDescriptor`] is what a scan reports for one attached EVT device. It is cheap to
//! clone and serializable so it can be shown in a device list, logged, or persisted.
//!
//! # Conventions
//! - `path` is the unique, OS-specific identifier used to attach the device. Treat it as
//!   opaque; it may change across ports and reconnects.
//! - `product_string` is the firmware name, e.g. `"EventExchanger-RSP-LT-4"`. The product
//!   group used for filtering (`"RSP-LT"`) is a substring of it.
//! - `serial_number` is the most stable way to tell two boxes of the same model apart.

use serde::{Deserialize, Serialize};

/// Prefix every EVT firmware puts in front of its model name.
pub const PRODUCT_PREFIX: &str = "EventExchanger-";

/// One device reported by a scan.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Unique OS path used to attach.
    pub path: String,

    /// Firmware product string.
    pub product_string: String,

    /// Serial number, empty if the firmware reports none.
    pub serial_number: String,
}

impl DeviceDescriptor {
    pub fn new(
        path: impl Into<String>,
        product_string: impl Into<String>,
        serial_number: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            product_string: product_string.into(),
            serial_number: serial_number.into(),
        }
    }

    /// Model name without the `EventExchanger-` prefix.
    pub fn model(&self) -> &str {
        self.product_string
            .strip_prefix(PRODUCT_PREFIX)
            .unwrap_or(&self.product_string)
    }

    /// Whether this device belongs to a product group such as `"RSP-LT"`.
    pub fn in_group(&self, group: &str) -> bool {
        self.product_string.contains(group)
    }

    /// Label used in device choice lists: `"<slot>: <model> s/n: <serial>"`.
    pub fn label(&self, slot: usize) -> String {
        format!("{slot}: {} s/n: {}", self.model(), self.serial_number)
    }
}
