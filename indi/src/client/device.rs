use std::{collections::HashMap, sync::Arc};

use super::{BlobPayload, Update, UpdateKind};
use crate::*;

/// Internal representation of a device.
#[derive(Debug, Clone)]
pub struct Device {
    name: String,
    parameters: HashMap<String, Parameter>,
    names: Vec<String>,
}

impl Device {
    /// Creates a new device named `name` with no parameters.
    pub fn new(name: String) -> Device {
        Device {
            name,
            parameters: HashMap::new(),
            names: vec![],
        }
    }

    pub fn name(&self) -> &String {
        &self.name
    }

    /// Updates the current device based on `command`, returning one [Update] per
    /// parameter that changed.
    pub fn update(&mut self, command: serialization::Command) -> Result<Vec<Update>, UpdateError> {
        match command {
            Command::DefSwitchVector(command) => self.new_param(command),
            Command::SetSwitchVector(command) => self.update_param(command),
            Command::DefNumberVector(command) => self.new_param(command),
            Command::SetNumberVector(command) => self.update_param(command),
            Command::DefTextVector(command) => self.new_param(command),
            Command::SetTextVector(command) => self.update_param(command),
            Command::DefBlobVector(command) => self.new_param(command),
            Command::SetBlobVector(command) => self.update_blobs(command),
            Command::DefLightVector(command) => self.new_param(command),
            Command::SetLightVector(command) => self.update_param(command),
            Command::DelProperty(command) => Ok(self.delete_param(command.name)),
            Command::NewSwitchVector(_)
            | Command::NewNumberVector(_)
            | Command::NewTextVector(_)
            | Command::Message(_)
            | Command::GetProperties(_)
            | Command::EnableBlob(_) => Ok(vec![]),
        }
    }

    /// Returns all currently known parameter names, in definition order.
    pub fn parameter_names(&self) -> &Vec<String> {
        &self.names
    }

    pub fn get_parameters(&self) -> &HashMap<String, Parameter> {
        &self.parameters
    }

    pub fn get_parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.get(name)
    }

    fn new_param<T: CommandtoParam>(&mut self, def: T) -> Result<Vec<Update>, UpdateError> {
        let name = def.get_name().clone();
        let param = def.to_param();

        // A redefinition replaces the parameter but keeps its generation moving forward.
        let param = match self.parameters.get(&name) {
            Some(existing) => {
                let mut param = param;
                *param.gen_mut() = existing.gen() + std::num::Wrapping(1);
                param
            }
            None => {
                self.names.push(name.clone());
                param
            }
        };
        self.parameters.insert(name.clone(), param.clone());

        Ok(vec![Update {
            device: self.name.clone(),
            name,
            kind: UpdateKind::Defined(param),
        }])
    }

    fn update_param<T: CommandToUpdate>(
        &mut self,
        new_command: T,
    ) -> Result<Vec<Update>, UpdateError> {
        let param = self.changed_param(new_command)?;
        Ok(vec![Update {
            device: self.name.clone(),
            name: param.get_name().clone(),
            kind: UpdateKind::Changed(param),
        }])
    }

    fn changed_param<T: CommandToUpdate>(
        &mut self,
        new_command: T,
    ) -> Result<Parameter, UpdateError> {
        match self.parameters.get_mut(new_command.get_name()) {
            Some(param) => {
                *param.gen_mut() += std::num::Wrapping(1);
                new_command.update_param(param)?;
                Ok(param.clone())
            }
            None => Err(UpdateError::ParameterMissing(
                new_command.get_name().clone(),
            )),
        }
    }

    fn update_blobs(&mut self, command: SetBlobVector) -> Result<Vec<Update>, UpdateError> {
        let delivered: Vec<String> = command.blobs.iter().map(|b| b.name.clone()).collect();
        let param = self.changed_param(command)?;

        let values = param
            .get_values::<HashMap<String, Blob>>()
            .map_err(|_| UpdateError::ParameterTypeMismatch(param.get_name().clone()))?;
        let payloads = delivered
            .into_iter()
            .filter_map(|name| {
                let blob = values.get(&name)?;
                Some(BlobPayload {
                    format: blob.format.clone().unwrap_or_default(),
                    size: blob.size.unwrap_or_default(),
                    data: blob.value.clone().unwrap_or_else(|| Arc::new(vec![])),
                    name,
                })
            })
            .collect();

        Ok(vec![Update {
            device: self.name.clone(),
            name: param.get_name().clone(),
            kind: UpdateKind::Blobs(payloads),
        }])
    }

    fn delete_param(&mut self, name: Option<String>) -> Vec<Update> {
        let removed: Vec<String> = match name {
            Some(name) => {
                self.names.retain(|n| *n != name);
                match self.parameters.remove(&name) {
                    Some(_) => vec![name],
                    None => vec![],
                }
            }
            None => {
                self.names.clear();
                self.parameters.drain().map(|(name, _)| name).collect()
            }
        };
        removed
            .into_iter()
            .map(|name| Update {
                device: self.name.clone(),
                name,
                kind: UpdateKind::Deleted,
            })
            .collect()
    }
}

pub type MemoryDeviceStore = HashMap<String, Device>;

pub trait DeviceStore {
    /// Update the state of the appropriate device property for a command that came from an
    /// INDI server.
    fn update(&mut self, command: serialization::Command) -> Result<Vec<Update>, UpdateError>;
}

impl DeviceStore for MemoryDeviceStore {
    fn update(&mut self, command: serialization::Command) -> Result<Vec<Update>, UpdateError> {
        let name = match command.device_name() {
            Some(name) => name.clone(),
            None => return Ok(vec![]),
        };
        let whole_device = matches!(&command, Command::DelProperty(d) if d.name.is_none());
        let defines = matches!(
            &command,
            Command::DefSwitchVector(_)
                | Command::DefNumberVector(_)
                | Command::DefTextVector(_)
                | Command::DefLightVector(_)
                | Command::DefBlobVector(_)
        );
        // Only definitions bring a device into existence.
        let device = if defines {
            self.entry(name.clone())
                .or_insert_with(|| Device::new(name.clone()))
        } else {
            match self.get_mut(&name) {
                Some(device) => device,
                None => return Ok(vec![]),
            }
        };
        let updates = device.update(command)?;
        if whole_device {
            self.remove(&name);
        }
        Ok(updates)
    }
}
