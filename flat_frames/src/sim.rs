//! A scripted stand-in for an INDI server with a mount, a camera and a flat cap.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use indi::{
    client::{
        device::{DeviceStore, MemoryDeviceStore},
        BlobPayload, ClientError, Update, UpdateKind,
    },
    BlobEnable, Command, DefBlob, DefBlobVector, DefNumber, DefNumberVector, DefSwitch,
    DefSwitchVector, DefText, DefTextVector, EncodedBlob, OneBlob, OneSwitch, Parameter,
    PropertyPerm, PropertyState, SetBlobVector, SetNumberVector, SetOneNumber, SetSwitchVector,
    SetTextVector, SwitchRule, SwitchState,
};
use tokio::sync::broadcast;

use crate::session::Session;

pub const UPDATE_BUFFER: usize = indi::client::UPDATE_BUFFER;

const MOUNT: &str = "EQMod Mount";
const CAMERA: &str = "Canon DSLR EOS 1500D";
const FLAT_CAP: &str = "Gastro Flatcap";

/// Number of reads a park request stays `Busy` for.
const PARK_BUSY_READS: usize = 2;

#[derive(Debug, Clone)]
pub struct SimOptions {
    /// Devices the server never announces.
    pub missing: Vec<String>,
    /// Devices that answer every connection request with `Alert`.
    pub never_connects: Vec<String>,
    /// Devices that answer a park request with `Alert`.
    pub park_alert: Vec<String>,
    /// Park requests stay `Busy` forever.
    pub park_stalls: bool,
    /// The camera sends an image for every exposure.
    pub deliver_blobs: bool,
    /// Images arrive without any data.
    pub empty_payload: bool,
    /// An image left over from an earlier run arrives as soon as BLOBs are enabled.
    pub stale_on_enable: bool,
    pub without_frame_type: bool,
}

impl Default for SimOptions {
    fn default() -> Self {
        SimOptions {
            missing: vec![],
            never_connects: vec![],
            park_alert: vec![],
            park_stalls: false,
            deliver_blobs: true,
            empty_payload: false,
            stale_on_enable: false,
            without_frame_type: false,
        }
    }
}

#[derive(Default)]
struct SimState {
    devices: MemoryDeviceStore,
    log: Vec<String>,
    busy: HashMap<(String, String), usize>,
    frames: usize,
    disconnected: bool,
}

pub struct SimSession {
    options: SimOptions,
    state: Mutex<SimState>,
    updates: broadcast::Sender<Arc<Update>>,
}

fn def_switch(device: &str, name: &str, values: &[(&str, bool)]) -> Command {
    Command::DefSwitchVector(DefSwitchVector {
        device: device.to_string(),
        name: name.to_string(),
        label: None,
        group: None,
        state: PropertyState::Idle,
        perm: PropertyPerm::RW,
        rule: SwitchRule::OneOfMany,
        timeout: Some(60),
        timestamp: None,
        message: None,
        switches: values
            .iter()
            .map(|(name, on)| DefSwitch {
                name: name.to_string(),
                label: None,
                value: SwitchState::from(*on),
            })
            .collect(),
    })
}

fn def_number(device: &str, name: &str, element: &str, value: f64) -> Command {
    Command::DefNumberVector(DefNumberVector {
        device: device.to_string(),
        name: name.to_string(),
        label: None,
        group: None,
        state: PropertyState::Idle,
        perm: PropertyPerm::RW,
        timeout: Some(60),
        timestamp: None,
        message: None,
        numbers: vec![DefNumber {
            name: element.to_string(),
            label: None,
            format: String::from("%g"),
            min: 0.0,
            max: 3600.0,
            step: 1.0,
            value,
        }],
    })
}

fn def_text(device: &str, name: &str, element: &str, value: &str) -> Command {
    Command::DefTextVector(DefTextVector {
        device: device.to_string(),
        name: name.to_string(),
        label: None,
        group: None,
        state: PropertyState::Idle,
        perm: PropertyPerm::RW,
        timeout: Some(60),
        timestamp: None,
        message: None,
        texts: vec![DefText {
            name: element.to_string(),
            label: None,
            value: value.to_string(),
        }],
    })
}

fn def_blob(device: &str, name: &str) -> Command {
    Command::DefBlobVector(DefBlobVector {
        device: device.to_string(),
        name: name.to_string(),
        label: None,
        group: None,
        state: PropertyState::Idle,
        perm: PropertyPerm::RO,
        timeout: Some(60),
        timestamp: None,
        message: None,
        blobs: vec![DefBlob {
            name: name.to_string(),
            label: None,
        }],
    })
}

fn set_switch(device: &str, name: &str, state: PropertyState, switches: Vec<OneSwitch>) -> Command {
    Command::SetSwitchVector(SetSwitchVector {
        device: device.to_string(),
        name: name.to_string(),
        state: Some(state),
        timeout: None,
        timestamp: None,
        message: None,
        switches,
    })
}

/// One line per command, naming what was switched on or set.
fn describe(command: &Command) -> String {
    match command {
        Command::NewSwitchVector(c) => format!(
            "{}.{} {}",
            c.device,
            c.name,
            c.switches
                .iter()
                .filter(|s| s.value == SwitchState::On)
                .map(|s| s.name.as_str())
                .collect::<Vec<_>>()
                .join(",")
        ),
        Command::NewNumberVector(c) => format!(
            "{}.{} {}",
            c.device,
            c.name,
            c.numbers
                .iter()
                .map(|n| format!("{}={}", n.name, n.value))
                .collect::<Vec<_>>()
                .join(",")
        ),
        Command::NewTextVector(c) => format!(
            "{}.{} {}",
            c.device,
            c.name,
            c.texts
                .iter()
                .map(|t| format!("{}={}", t.name, t.value))
                .collect::<Vec<_>>()
                .join(",")
        ),
        Command::EnableBlob(c) => format!(
            "enableBLOB {}.{} {}",
            c.device,
            c.name.as_deref().unwrap_or(""),
            c.enabled
        ),
        c => format!("{:?}", c),
    }
}

impl SimSession {
    pub fn new(options: SimOptions) -> SimSession {
        let (updates, _) = broadcast::channel(UPDATE_BUFFER);
        let mut defs = vec![
            def_switch(MOUNT, "CONNECTION", &[("CONNECT", false), ("DISCONNECT", true)]),
            def_switch(MOUNT, "TELESCOPE_PARK", &[("PARK", false), ("UNPARK", true)]),
            def_switch(FLAT_CAP, "CONNECTION", &[("CONNECT", false), ("DISCONNECT", true)]),
            def_switch(FLAT_CAP, "CAP_PARK", &[("PARK", false), ("UNPARK", true)]),
            def_switch(
                FLAT_CAP,
                "FLAT_LIGHT_CONTROL",
                &[("FLAT_LIGHT_ON", false), ("FLAT_LIGHT_OFF", true)],
            ),
            def_number(FLAT_CAP, "FLAT_LIGHT_INTENSITY", "FLAT_LIGHT_INTENSITY_VALUE", 0.0),
            def_switch(CAMERA, "CONNECTION", &[("CONNECT", false), ("DISCONNECT", true)]),
            def_number(CAMERA, "CCD_EXPOSURE", "CCD_EXPOSURE_VALUE", 1.0),
            def_text(CAMERA, "ACTIVE_DEVICES", "ACTIVE_TELESCOPE", "Telescope Simulator"),
            def_blob(CAMERA, "CCD1"),
        ];
        if !options.without_frame_type {
            defs.push(def_switch(
                CAMERA,
                "CCD_FRAME_TYPE",
                &[
                    ("FRAME_LIGHT", true),
                    ("FRAME_BIAS", false),
                    ("FRAME_DARK", false),
                    ("FRAME_FLAT", false),
                ],
            ));
        }

        let mut state = SimState::default();
        for def in defs {
            let hidden = def
                .device_name()
                .map(|d| options.missing.contains(d))
                .unwrap_or(false);
            if !hidden {
                let _ = state.devices.update(def);
            }
        }

        SimSession {
            options,
            state: Mutex::new(state),
            updates,
        }
    }

    /// Every command submitted so far, in order.
    pub fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn emit(&self, update: Update) {
        let _ = self.updates.send(Arc::new(update));
    }

    /// Sends an image for `device` straight to subscribers.
    pub fn emit_blob(&self, device: &str, data: &[u8]) {
        self.emit(Update {
            device: device.to_string(),
            name: String::from("CCD1"),
            kind: UpdateKind::Blobs(vec![BlobPayload {
                name: String::from("CCD1"),
                size: data.len() as u64,
                format: String::from(".fits"),
                data: Arc::new(data.to_vec()),
            }]),
        });
    }

    fn apply(&self, state: &mut SimState, command: Command) {
        match state.devices.update(command) {
            Ok(updates) => {
                for update in updates {
                    self.emit(update);
                }
            }
            Err(e) => panic!("Simulated server sent a bad update: {:?}", e),
        }
    }

    fn switch_on(state: &SimState, device: &str, name: &str, element: &str) -> bool {
        state
            .devices
            .get(device)
            .and_then(|d| d.get_parameter(name))
            .map(|p| p.switch(element) == Ok(Some(true)))
            .unwrap_or(false)
    }

    fn new_switch(
        &self,
        state: &mut SimState,
        device: &str,
        name: &str,
        switches: Vec<OneSwitch>,
    ) {
        let refused = match name {
            "CONNECTION" => self.options.never_connects.iter().any(|d| d == device),
            "TELESCOPE_PARK" | "CAP_PARK" => self.options.park_alert.iter().any(|d| d == device),
            "FLAT_LIGHT_CONTROL" => {
                let turning_on = switches
                    .iter()
                    .any(|s| s.name == "FLAT_LIGHT_ON" && s.value == SwitchState::On);
                turning_on && !Self::switch_on(state, device, "CAP_PARK", "PARK")
            }
            _ => false,
        };
        if refused {
            self.apply(state, set_switch(device, name, PropertyState::Alert, vec![]));
            return;
        }

        let parking = matches!(name, "TELESCOPE_PARK" | "CAP_PARK");
        if parking {
            state.busy.insert(
                (device.to_string(), name.to_string()),
                if self.options.park_stalls {
                    usize::MAX
                } else {
                    PARK_BUSY_READS
                },
            );
            self.apply(state, set_switch(device, name, PropertyState::Busy, switches));
        } else {
            self.apply(state, set_switch(device, name, PropertyState::Ok, switches));
        }
    }

    fn expose(&self, state: &mut SimState, device: &str) {
        self.apply(
            state,
            Command::SetNumberVector(SetNumberVector {
                device: device.to_string(),
                name: String::from("CCD_EXPOSURE"),
                state: Some(PropertyState::Busy),
                timeout: None,
                timestamp: None,
                message: None,
                numbers: vec![SetOneNumber {
                    name: String::from("CCD_EXPOSURE_VALUE"),
                    min: None,
                    max: None,
                    step: None,
                    value: 0.0,
                }],
            }),
        );
        if !self.options.deliver_blobs {
            return;
        }
        let data = if self.options.empty_payload {
            vec![]
        } else {
            frame(state.frames)
        };
        state.frames += 1;
        self.send_image(state, device, data);
    }

    fn send_image(&self, state: &mut SimState, device: &str, data: Vec<u8>) {
        self.apply(
            state,
            Command::SetBlobVector(SetBlobVector {
                device: device.to_string(),
                name: String::from("CCD1"),
                state: Some(PropertyState::Ok),
                timeout: None,
                timestamp: None,
                message: None,
                blobs: vec![OneBlob {
                    name: String::from("CCD1"),
                    size: data.len() as u64,
                    enclen: None,
                    format: String::from(".fits"),
                    value: EncodedBlob(data),
                }],
            }),
        );
    }
}

/// Image data for the `index`th exposure.  Each frame is larger than the one before.
pub fn frame(index: usize) -> Vec<u8> {
    format!("frame-{};", index).repeat(index + 1).into_bytes()
}

impl Session for SimSession {
    async fn has_device(&self, name: &str) -> bool {
        self.state.lock().unwrap().devices.contains_key(name)
    }

    async fn parameter(&self, device: &str, name: &str) -> Option<Parameter> {
        let mut state = self.state.lock().unwrap();
        let key = (device.to_string(), name.to_string());
        match state.busy.get(&key).copied() {
            Some(0) => {
                state.busy.remove(&key);
                let switches = state
                    .devices
                    .get(device)
                    .and_then(|d| d.get_parameter(name))
                    .and_then(|p| p.get_values::<HashMap<String, indi::Switch>>().ok())
                    .map(|values| {
                        values
                            .iter()
                            .map(|(name, s)| OneSwitch {
                                name: name.clone(),
                                value: s.value,
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                self.apply(&mut state, set_switch(device, name, PropertyState::Ok, switches));
            }
            Some(usize::MAX) | None => {}
            Some(n) => {
                state.busy.insert(key, n - 1);
            }
        }
        state
            .devices
            .get(device)
            .and_then(|d| d.get_parameter(name))
            .cloned()
    }

    fn submit(&self, command: Command) -> Result<(), ClientError> {
        let mut state = self.state.lock().unwrap();
        if state.disconnected {
            return Err(ClientError::Disconnected);
        }
        state.log.push(describe(&command));

        match command {
            Command::NewSwitchVector(c) => {
                self.new_switch(&mut state, &c.device, &c.name, c.switches)
            }
            Command::NewNumberVector(c) if c.name == "CCD_EXPOSURE" => {
                self.expose(&mut state, &c.device)
            }
            Command::NewNumberVector(c) => {
                let command = Command::SetNumberVector(SetNumberVector {
                    device: c.device,
                    name: c.name,
                    state: Some(PropertyState::Ok),
                    timeout: None,
                    timestamp: None,
                    message: None,
                    numbers: c
                        .numbers
                        .into_iter()
                        .map(|n| SetOneNumber {
                            name: n.name,
                            min: None,
                            max: None,
                            step: None,
                            value: n.value,
                        })
                        .collect(),
                });
                self.apply(&mut state, command);
            }
            Command::NewTextVector(c) => {
                let command = Command::SetTextVector(SetTextVector {
                    device: c.device,
                    name: c.name,
                    state: Some(PropertyState::Ok),
                    timeout: None,
                    timestamp: None,
                    message: None,
                    texts: c.texts,
                });
                self.apply(&mut state, command);
            }
            Command::EnableBlob(c)
                if c.enabled != BlobEnable::Never && self.options.stale_on_enable =>
            {
                self.send_image(&mut state, &c.device, b"stale".to_vec());
            }
            _ => {}
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<Arc<Update>> {
        self.updates.subscribe()
    }

    fn enable_blob(
        &self,
        device: &str,
        name: &str,
        enabled: BlobEnable,
    ) -> Result<(), ClientError> {
        self.submit(Command::EnableBlob(indi::EnableBlob {
            device: device.to_string(),
            name: Some(name.to_string()),
            enabled,
        }))
    }

    async fn disconnect(&mut self) -> Result<(), ClientError> {
        self.state.lock().unwrap().disconnected = true;
        Ok(())
    }
}
