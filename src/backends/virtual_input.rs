//! Scripted in-process devices.
//!
//! [`VirtualBackend`] plays the vendor layer from a script: a list of devices to report,
//! optional scan/attach failures, and per-device queues of events to deliver. Every call
//! that reaches it is appended to a shared call log so tests (and dry runs) can check
//! exactly what was sent. [`VirtualKeyboard`] does the same for the keyboard fallback.

use crate::color::Rgb;
use crate::device::{DeviceBackend, KeyboardInput, LedTrigger, ResponseDevice};
use crate::error::{EvtError, EvtResult};
use crate::event::{DeviceEvent, KeyPress};
use crate::metadata::DeviceDescriptor;
use crate::response::{button_bit, NO_EVENT};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;
use std::time::Duration;

/// One call observed by a virtual backend, device or keyboard.
#[derive(Clone, Debug, PartialEq)]
pub enum VirtualCall {
    Scan {
        group: String,
    },
    Attach {
        path: String,
    },
    SetLed {
        device: String,
        led: u8,
        color: Rgb,
        trigger: LedTrigger,
    },
    Wait {
        device: String,
        mask: u8,
        timeout: Option<Duration>,
    },
    GetKey {
        keylist: Vec<String>,
        timeout: Option<Duration>,
    },
}

#[derive(Default)]
struct Shared {
    devices: Vec<DeviceDescriptor>,
    fail_scan: bool,
    fail_attach: HashSet<String>,
    calls: Vec<VirtualCall>,
    events: HashMap<String, VecDeque<DeviceEvent>>,
    attached: usize,
}

/// Scripted vendor layer.
///
/// Clones made with [`handle`](Self::handle) share one script, so the attached set can
/// change between scans while a session holds the backend.
#[derive(Default)]
pub struct VirtualBackend {
    shared: Rc<RefCell<Shared>>,
}

impl VirtualBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `descriptor` from every scan whose group it matches.
    pub fn with_device(self, descriptor: DeviceDescriptor) -> Self {
        self.plug(descriptor);
        self
    }

    /// Make every scan fail.
    pub fn failing_scan(self) -> Self {
        self.shared.borrow_mut().fail_scan = true;
        self
    }

    /// Make attaching the device at `path` fail.
    pub fn failing_attach(self, path: &str) -> Self {
        self.refuse_attach(path);
        self
    }

    /// Add a device to the end of the scan order.
    pub fn plug(&self, descriptor: DeviceDescriptor) {
        self.shared.borrow_mut().devices.push(descriptor);
    }

    /// Remove the device at `path` from later scans.
    pub fn unplug(&self, path: &str) {
        self.shared.borrow_mut().devices.retain(|d| d.path != path);
    }

    /// Fail every later attach of the device at `path`.
    pub fn refuse_attach(&self, path: &str) {
        self.shared.borrow_mut().fail_attach.insert(path.to_string());
    }

    /// Queue a raw event for the device at `path`.
    pub fn feed(&self, path: &str, event: DeviceEvent) {
        self.shared
            .borrow_mut()
            .events
            .entry(path.to_string())
            .or_default()
            .push_back(event);
    }

    /// Queue a press of `button` (1-based) arriving after `elapsed`.
    pub fn press_button(&self, path: &str, button: u8, elapsed: Duration) {
        self.feed(
            path,
            DeviceEvent {
                raw: button_bit(button) as i32,
                elapsed,
            },
        );
    }

    /// Snapshot of all calls seen so far, in order.
    pub fn calls(&self) -> Vec<VirtualCall> {
        self.shared.borrow().calls.clone()
    }

    /// Number of handles opened so far.
    pub fn attach_count(&self) -> usize {
        self.shared.borrow().attached
    }

    /// A second handle to the same script and call log.
    pub fn handle(&self) -> VirtualBackend {
        VirtualBackend {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl DeviceBackend for VirtualBackend {
    fn scan(&mut self, group: &str) -> EvtResult<Vec<DeviceDescriptor>> {
        let mut shared = self.shared.borrow_mut();
        shared.calls.push(VirtualCall::Scan {
            group: group.to_string(),
        });
        if shared.fail_scan {
            return Err(EvtError::DeviceScan("virtual scan failure".into()));
        }
        Ok(shared
            .devices
            .iter()
            .filter(|d| d.in_group(group))
            .cloned()
            .collect())
    }

    fn attach(&mut self, descriptor: &DeviceDescriptor) -> EvtResult<Box<dyn ResponseDevice>> {
        let mut shared = self.shared.borrow_mut();
        shared.calls.push(VirtualCall::Attach {
            path: descriptor.path.clone(),
        });
        if shared.fail_attach.contains(&descriptor.path) {
            return Err(EvtError::DeviceAttach {
                path: descriptor.path.clone(),
                reason: "virtual attach failure".into(),
            });
        }
        shared.attached += 1;
        Ok(Box::new(VirtualDevice {
            id: format!("virtual:{}#{}", descriptor.path, shared.attached),
            name: descriptor.product_string.clone(),
            path: descriptor.path.clone(),
            shared: Rc::clone(&self.shared),
        }))
    }
}

/// Handle returned by [`VirtualBackend::attach`].
pub struct VirtualDevice {
    id: String,
    name: String,
    path: String,
    shared: Rc<RefCell<Shared>>,
}

impl ResponseDevice for VirtualDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn set_led(&mut self, led: u8, color: Rgb, trigger: LedTrigger) -> EvtResult<()> {
        self.shared.borrow_mut().calls.push(VirtualCall::SetLed {
            device: self.id.clone(),
            led,
            color,
            trigger,
        });
        Ok(())
    }

    /// Delivers the next queued event that intersects `mask`; non-matching events are
    /// discarded the way the hardware ignores disallowed buttons.
    fn wait_for_event(&mut self, mask: u8, timeout: Option<Duration>) -> EvtResult<DeviceEvent> {
        let mut shared = self.shared.borrow_mut();
        shared.calls.push(VirtualCall::Wait {
            device: self.id.clone(),
            mask,
            timeout,
        });

        let queue = shared.events.entry(self.path.clone()).or_default();
        while let Some(event) = queue.pop_front() {
            if event.raw > 0 && event.raw & mask as i32 != 0 {
                return Ok(event);
            }
        }

        match timeout {
            Some(t) => Ok(DeviceEvent {
                raw: NO_EVENT,
                elapsed: t,
            }),
            None => Err(EvtError::Hid(format!(
                "{}: unbounded wait with no scripted event",
                self.id
            ))),
        }
    }
}

/// Scripted keyboard.
#[derive(Default)]
pub struct VirtualKeyboard {
    keys: VecDeque<KeyPress>,
    calls: Rc<RefCell<Vec<VirtualCall>>>,
}

impl VirtualKeyboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `key` pressed after `elapsed`.
    pub fn press(&mut self, key: &str, elapsed: Duration) {
        self.keys.push_back(KeyPress {
            key: Some(key.to_string()),
            elapsed,
        });
    }

    pub fn calls(&self) -> Vec<VirtualCall> {
        self.calls.borrow().clone()
    }
}

impl KeyboardInput for VirtualKeyboard {
    fn get_key(&mut self, keylist: &[String], timeout: Option<Duration>) -> EvtResult<KeyPress> {
        self.calls.borrow_mut().push(VirtualCall::GetKey {
            keylist: keylist.to_vec(),
            timeout,
        });

        while let Some(press) = self.keys.pop_front() {
            let listed = press
                .key
                .as_ref()
                .is_some_and(|k| keylist.is_empty() || keylist.contains(k));
            if listed {
                return Ok(press);
            }
        }

        match timeout {
            Some(t) => Ok(KeyPress {
                key: None,
                elapsed: t,
            }),
            None => Err(EvtError::Keyboard(
                "unbounded wait with no scripted key".into(),
            )),
        }
    }
}
