use std::collections::HashMap;
use std::num::Wrapping;
use std::sync::Arc;

use chrono::prelude::*;
use serde::{Deserialize, Serialize};

pub static INDI_PROTOCOL_VERSION: &str = "1.7";

pub mod serialization;
pub use serialization::*;

pub mod client;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize, derive_more::Display)]
pub enum PropertyState {
    Idle,
    Ok,
    Busy,
    Alert,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize, derive_more::Display)]
pub enum SwitchState {
    On,
    Off,
}

impl From<bool> for SwitchState {
    fn from(value: bool) -> Self {
        if value {
            SwitchState::On
        } else {
            SwitchState::Off
        }
    }
}

impl From<SwitchState> for bool {
    fn from(value: SwitchState) -> Self {
        value == SwitchState::On
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum SwitchRule {
    OneOfMany,
    AtMostOne,
    AnyOfMany,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum PropertyPerm {
    #[serde(rename = "ro")]
    RO,
    #[serde(rename = "wo")]
    WO,
    #[serde(rename = "rw")]
    RW,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize, derive_more::Display)]
pub enum BlobEnable {
    Never,
    Also,
    Only,
}

/// The kind of vector a [Parameter] holds.
#[derive(Debug, PartialEq, Eq, Clone, Copy, derive_more::Display)]
pub enum ParameterKind {
    Switch,
    Number,
    Text,
    Light,
    Blob,
}

pub trait FromParamValue {
    fn values_from(w: &Parameter) -> Result<&Self, TypeError>
    where
        Self: Sized;
}

#[derive(Debug, PartialEq, Clone)]
pub struct Switch {
    pub label: Option<String>,
    pub value: SwitchState,
}

#[derive(Debug, PartialEq, Clone)]
pub struct SwitchVector {
    pub gen: Wrapping<usize>,
    pub name: String,
    pub group: Option<String>,
    pub label: Option<String>,
    pub state: PropertyState,
    pub perm: PropertyPerm,
    pub rule: SwitchRule,
    pub timeout: Option<u32>,
    pub timestamp: Option<DateTime<Utc>>,

    pub values: HashMap<String, Switch>,
}

impl FromParamValue for HashMap<String, Switch> {
    fn values_from(p: &Parameter) -> Result<&Self, TypeError> {
        match p {
            Parameter::SwitchVector(p) => Ok(&p.values),
            _ => Err(TypeError::TypeMismatch),
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Number {
    pub label: Option<String>,
    pub format: String,
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub value: f64,
}

#[derive(Debug, PartialEq, Clone)]
pub struct NumberVector {
    pub gen: Wrapping<usize>,
    pub name: String,
    pub group: Option<String>,
    pub label: Option<String>,
    pub state: PropertyState,
    pub perm: PropertyPerm,
    pub timeout: Option<u32>,
    pub timestamp: Option<DateTime<Utc>>,

    pub values: HashMap<String, Number>,
}

impl FromParamValue for HashMap<String, Number> {
    fn values_from(p: &Parameter) -> Result<&Self, TypeError> {
        match p {
            Parameter::NumberVector(p) => Ok(&p.values),
            _ => Err(TypeError::TypeMismatch),
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Light {
    pub label: Option<String>,
    pub value: PropertyState,
}

#[derive(Debug, PartialEq, Clone)]
pub struct LightVector {
    pub gen: Wrapping<usize>,
    pub name: String,
    pub label: Option<String>,
    pub group: Option<String>,
    pub state: PropertyState,
    pub timestamp: Option<DateTime<Utc>>,

    pub values: HashMap<String, Light>,
}

impl FromParamValue for HashMap<String, Light> {
    fn values_from(p: &Parameter) -> Result<&Self, TypeError> {
        match p {
            Parameter::LightVector(p) => Ok(&p.values),
            _ => Err(TypeError::TypeMismatch),
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Text {
    pub label: Option<String>,
    pub value: String,
}

#[derive(Debug, PartialEq, Clone)]
pub struct TextVector {
    pub gen: Wrapping<usize>,
    pub name: String,
    pub group: Option<String>,
    pub label: Option<String>,

    pub state: PropertyState,
    pub perm: PropertyPerm,
    pub timeout: Option<u32>,
    pub timestamp: Option<DateTime<Utc>>,

    pub values: HashMap<String, Text>,
}

impl FromParamValue for HashMap<String, Text> {
    fn values_from(p: &Parameter) -> Result<&Self, TypeError> {
        match p {
            Parameter::TextVector(p) => Ok(&p.values),
            _ => Err(TypeError::TypeMismatch),
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Blob {
    pub label: Option<String>,
    pub format: Option<String>,
    pub size: Option<u64>,
    pub value: Option<Arc<Vec<u8>>>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct BlobVector {
    pub gen: Wrapping<usize>,
    pub name: String,
    pub label: Option<String>,
    pub group: Option<String>,
    pub state: PropertyState,
    pub perm: PropertyPerm,
    pub timeout: Option<u32>,
    pub timestamp: Option<DateTime<Utc>>,

    pub values: HashMap<String, Blob>,
}

impl FromParamValue for HashMap<String, Blob> {
    fn values_from(p: &Parameter) -> Result<&Self, TypeError> {
        match p {
            Parameter::BlobVector(p) => Ok(&p.values),
            _ => Err(TypeError::TypeMismatch),
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum Parameter {
    TextVector(TextVector),
    NumberVector(NumberVector),
    SwitchVector(SwitchVector),
    LightVector(LightVector),
    BlobVector(BlobVector),
}

impl Parameter {
    pub fn kind(&self) -> ParameterKind {
        match self {
            Parameter::TextVector(_) => ParameterKind::Text,
            Parameter::NumberVector(_) => ParameterKind::Number,
            Parameter::SwitchVector(_) => ParameterKind::Switch,
            Parameter::LightVector(_) => ParameterKind::Light,
            Parameter::BlobVector(_) => ParameterKind::Blob,
        }
    }

    pub fn get_group(&self) -> &Option<String> {
        match self {
            Parameter::TextVector(p) => &p.group,
            Parameter::NumberVector(p) => &p.group,
            Parameter::SwitchVector(p) => &p.group,
            Parameter::LightVector(p) => &p.group,
            Parameter::BlobVector(p) => &p.group,
        }
    }

    pub fn get_name(&self) -> &String {
        match self {
            Parameter::TextVector(p) => &p.name,
            Parameter::NumberVector(p) => &p.name,
            Parameter::SwitchVector(p) => &p.name,
            Parameter::LightVector(p) => &p.name,
            Parameter::BlobVector(p) => &p.name,
        }
    }

    pub fn get_state(&self) -> &PropertyState {
        match self {
            Parameter::TextVector(p) => &p.state,
            Parameter::NumberVector(p) => &p.state,
            Parameter::SwitchVector(p) => &p.state,
            Parameter::LightVector(p) => &p.state,
            Parameter::BlobVector(p) => &p.state,
        }
    }

    pub fn get_timeout(&self) -> &Option<u32> {
        match self {
            Parameter::TextVector(p) => &p.timeout,
            Parameter::NumberVector(p) => &p.timeout,
            Parameter::SwitchVector(p) => &p.timeout,
            Parameter::LightVector(_) => &None,
            Parameter::BlobVector(p) => &p.timeout,
        }
    }

    pub fn get_values<T: FromParamValue>(&self) -> Result<&T, TypeError> {
        T::values_from(self)
    }

    /// Generation of this parameter, bumped every time the server sends an update for it.
    pub fn gen(&self) -> Wrapping<usize> {
        match self {
            Parameter::TextVector(p) => p.gen,
            Parameter::NumberVector(p) => p.gen,
            Parameter::SwitchVector(p) => p.gen,
            Parameter::LightVector(p) => p.gen,
            Parameter::BlobVector(p) => p.gen,
        }
    }

    pub fn gen_mut(&mut self) -> &mut Wrapping<usize> {
        match self {
            Parameter::TextVector(p) => &mut p.gen,
            Parameter::NumberVector(p) => &mut p.gen,
            Parameter::SwitchVector(p) => &mut p.gen,
            Parameter::LightVector(p) => &mut p.gen,
            Parameter::BlobVector(p) => &mut p.gen,
        }
    }

    pub fn set_state(&mut self, state: PropertyState) {
        match self {
            Parameter::TextVector(p) => p.state = state,
            Parameter::NumberVector(p) => p.state = state,
            Parameter::SwitchVector(p) => p.state = state,
            Parameter::LightVector(p) => p.state = state,
            Parameter::BlobVector(p) => p.state = state,
        }
    }

    pub fn set_timestamp(&mut self, timestamp: Option<DateTime<Utc>>) {
        match self {
            Parameter::TextVector(p) => p.timestamp = timestamp,
            Parameter::NumberVector(p) => p.timestamp = timestamp,
            Parameter::SwitchVector(p) => p.timestamp = timestamp,
            Parameter::LightVector(p) => p.timestamp = timestamp,
            Parameter::BlobVector(p) => p.timestamp = timestamp,
        }
    }

    /// Returns whether the named switch is on.  `None` if the switch doesn't exist.
    pub fn switch(&self, name: &str) -> Result<Option<bool>, TypeError> {
        Ok(self
            .get_values::<HashMap<String, Switch>>()?
            .get(name)
            .map(|s| s.value.into()))
    }
}

#[derive(Debug, PartialEq)]
pub enum TypeError {
    TypeMismatch,
}

pub trait TryEq<T> {
    fn try_eq(&self, other: &T) -> Result<bool, TypeError>;
}

impl TryEq<Parameter> for Vec<(&str, bool)> {
    fn try_eq(&self, other: &Parameter) -> Result<bool, TypeError> {
        let current_values = other.get_values::<HashMap<String, Switch>>()?;

        Ok(self.iter().all(|(name, value)| {
            Some(SwitchState::from(*value)) == current_values.get(*name).map(|x| x.value)
        }))
    }
}

impl TryEq<Parameter> for Vec<(&str, f64)> {
    fn try_eq(&self, other: &Parameter) -> Result<bool, TypeError> {
        let current_values = other.get_values::<HashMap<String, Number>>()?;

        Ok(self.iter().all(|(name, value)| {
            Some(*value) == current_values.get(*name).map(|x| x.value)
        }))
    }
}

impl TryEq<Parameter> for Vec<(&str, &str)> {
    fn try_eq(&self, other: &Parameter) -> Result<bool, TypeError> {
        let current_values = other.get_values::<HashMap<String, Text>>()?;

        Ok(self.iter().all(|(name, value)| {
            Some(*value) == current_values.get(*name).map(|x| x.value.as_str())
        }))
    }
}
