use std::ops::Deref;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::*;

pub mod blob_vector;
pub mod light_vector;
pub mod number_vector;
pub mod switch_vector;
pub mod text_vector;

pub use blob_vector::EncodedBlob;
pub use switch_vector::select_switch;


#[derive(Debug, PartialEq, Clone, Copy)]
pub struct Timestamp(pub DateTime<Utc>);

impl Serialize for Timestamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        // INDI timestamps are UTC without a zone designator.
        let ts = self.to_rfc3339_opts(SecondsFormat::Millis, true);
        serializer.serialize_str(&ts.as_str()[..ts.len() - 1])
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> Result<Timestamp, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        let s = s.trim();
        let with_zone = if s.ends_with('Z') {
            s.to_string()
        } else {
            format!("{}Z", s)
        };
        DateTime::from_str(&with_zone)
            .map(Timestamp)
            .map_err(serde::de::Error::custom)
    }
}

impl Deref for Timestamp {
    type Target = DateTime<Utc>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Timestamp(value)
    }
}

impl Timestamp {
    pub fn now() -> Timestamp {
        Timestamp(Utc::now())
    }

    pub fn into_inner(self) -> DateTime<Utc> {
        self.0
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub enum Command {
    // Commands from Device to Connections
    #[serde(rename = "defTextVector")]
    DefTextVector(DefTextVector),
    #[serde(rename = "setTextVector")]
    SetTextVector(SetTextVector),
    #[serde(rename = "newTextVector")]
    NewTextVector(NewTextVector),
    #[serde(rename = "defNumberVector")]
    DefNumberVector(DefNumberVector),
    #[serde(rename = "setNumberVector")]
    SetNumberVector(SetNumberVector),
    #[serde(rename = "newNumberVector")]
    NewNumberVector(NewNumberVector),
    #[serde(rename = "defSwitchVector")]
    DefSwitchVector(DefSwitchVector),
    #[serde(rename = "setSwitchVector")]
    SetSwitchVector(SetSwitchVector),
    #[serde(rename = "newSwitchVector")]
    NewSwitchVector(NewSwitchVector),
    #[serde(rename = "defLightVector")]
    DefLightVector(DefLightVector),
    #[serde(rename = "setLightVector")]
    SetLightVector(SetLightVector),
    #[serde(rename = "defBLOBVector")]
    DefBlobVector(DefBlobVector),
    #[serde(rename = "setBLOBVector")]
    SetBlobVector(SetBlobVector),
    #[serde(rename = "message")]
    Message(Message),
    #[serde(rename = "delProperty")]
    DelProperty(DelProperty),

    // Commands from Connection to Device
    #[serde(rename = "enableBLOB")]
    EnableBlob(EnableBlob),
    #[serde(rename = "getProperties")]
    GetProperties(GetProperties),
}

impl Command {
    pub fn device_name(&self) -> Option<&String> {
        match self {
            Command::DefTextVector(c) => Some(&c.device),
            Command::SetTextVector(c) => Some(&c.device),
            Command::NewTextVector(c) => Some(&c.device),
            Command::DefNumberVector(c) => Some(&c.device),
            Command::SetNumberVector(c) => Some(&c.device),
            Command::NewNumberVector(c) => Some(&c.device),
            Command::DefSwitchVector(c) => Some(&c.device),
            Command::SetSwitchVector(c) => Some(&c.device),
            Command::NewSwitchVector(c) => Some(&c.device),
            Command::DefLightVector(c) => Some(&c.device),
            Command::SetLightVector(c) => Some(&c.device),
            Command::DefBlobVector(c) => Some(&c.device),
            Command::SetBlobVector(c) => Some(&c.device),
            Command::Message(c) => c.device.as_ref(),
            Command::DelProperty(c) => Some(&c.device),
            Command::GetProperties(c) => c.device.as_ref(),
            Command::EnableBlob(c) => Some(&c.device),
        }
    }

    /// Name of the parameter this command refers to, if any.
    pub fn param_name(&self) -> Option<&String> {
        match self {
            Command::DefTextVector(c) => Some(&c.name),
            Command::SetTextVector(c) => Some(&c.name),
            Command::NewTextVector(c) => Some(&c.name),
            Command::DefNumberVector(c) => Some(&c.name),
            Command::SetNumberVector(c) => Some(&c.name),
            Command::NewNumberVector(c) => Some(&c.name),
            Command::DefSwitchVector(c) => Some(&c.name),
            Command::SetSwitchVector(c) => Some(&c.name),
            Command::NewSwitchVector(c) => Some(&c.name),
            Command::DefLightVector(c) => Some(&c.name),
            Command::SetLightVector(c) => Some(&c.name),
            Command::DefBlobVector(c) => Some(&c.name),
            Command::SetBlobVector(c) => Some(&c.name),
            Command::Message(_) => None,
            Command::DelProperty(c) => c.name.as_ref(),
            Command::GetProperties(c) => c.name.as_ref(),
            Command::EnableBlob(c) => c.name.as_ref(),
        }
    }
}

pub trait ToCommand {
    fn to_command(self, device_name: String, param_name: String) -> Command;
}

impl ToCommand for Vec<(&str, bool)> {
    fn to_command(self, device_name: String, param_name: String) -> Command {
        Command::NewSwitchVector(NewSwitchVector {
            device: device_name,
            name: param_name,
            timestamp: Some(Timestamp::now()),
            switches: self
                .iter()
                .map(|x| OneSwitch {
                    name: String::from(x.0),
                    value: x.1.into(),
                })
                .collect(),
        })
    }
}

impl ToCommand for Vec<OneSwitch> {
    fn to_command(self, device_name: String, param_name: String) -> Command {
        Command::NewSwitchVector(NewSwitchVector {
            device: device_name,
            name: param_name,
            timestamp: Some(Timestamp::now()),
            switches: self,
        })
    }
}

impl ToCommand for Vec<(&str, f64)> {
    fn to_command(self, device_name: String, param_name: String) -> Command {
        Command::NewNumberVector(NewNumberVector {
            device: device_name,
            name: param_name,
            timestamp: Some(Timestamp::now()),
            numbers: self
                .iter()
                .map(|x| OneNumber {
                    name: String::from(x.0),
                    value: x.1,
                })
                .collect(),
        })
    }
}

impl ToCommand for Vec<(&str, &str)> {
    fn to_command(self, device_name: String, param_name: String) -> Command {
        Command::NewTextVector(NewTextVector {
            device: device_name,
            name: param_name,
            timestamp: Some(Timestamp::now()),
            texts: self
                .iter()
                .map(|x| OneText {
                    name: String::from(x.0),
                    value: String::from(x.1),
                })
                .collect(),
        })
    }
}

#[derive(Debug, PartialEq)]
pub enum UpdateError {
    ParameterMissing(String),
    ParameterTypeMismatch(String),
}

pub trait CommandtoParam {
    fn get_name(&self) -> &String;
    fn to_param(self) -> Parameter;
}

pub trait CommandToUpdate {
    fn get_name(&self) -> &String;
    fn update_param(self, param: &mut Parameter) -> Result<String, UpdateError>;
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename = "defTextVector")]
pub struct DefTextVector {
    #[serde(rename = "@device")]
    pub device: String,
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@label")]
    pub label: Option<String>,
    #[serde(rename = "@group")]
    pub group: Option<String>,
    #[serde(rename = "@state")]
    pub state: PropertyState,
    #[serde(rename = "@perm")]
    pub perm: PropertyPerm,
    #[serde(rename = "@timeout")]
    pub timeout: Option<u32>,
    #[serde(rename = "@timestamp")]
    pub timestamp: Option<Timestamp>,
    #[serde(rename = "@message")]
    pub message: Option<String>,

    #[serde(rename = "defText", default)]
    pub texts: Vec<DefText>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename = "defText")]
pub struct DefText {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@label")]
    pub label: Option<String>,
    #[serde(rename = "$text", default = "String::new")]
    pub value: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename = "setTextVector")]
pub struct SetTextVector {
    #[serde(rename = "@device")]
    pub device: String,
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@state")]
    pub state: Option<PropertyState>,
    #[serde(rename = "@timeout")]
    pub timeout: Option<u32>,
    #[serde(rename = "@timestamp")]
    pub timestamp: Option<Timestamp>,
    #[serde(rename = "@message")]
    pub message: Option<String>,

    #[serde(rename = "oneText", default)]
    pub texts: Vec<OneText>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename = "newTextVector")]
pub struct NewTextVector {
    #[serde(rename = "@device")]
    pub device: String,
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@timestamp")]
    pub timestamp: Option<Timestamp>,

    #[serde(rename = "oneText", default)]
    pub texts: Vec<OneText>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(rename = "oneText")]
pub struct OneText {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "$text", default = "String::new")]
    pub value: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename = "defNumberVector")]
pub struct DefNumberVector {
    #[serde(rename = "@device")]
    pub device: String,
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@label")]
    pub label: Option<String>,
    #[serde(rename = "@group")]
    pub group: Option<String>,
    #[serde(rename = "@state")]
    pub state: PropertyState,
    #[serde(rename = "@perm")]
    pub perm: PropertyPerm,
    #[serde(rename = "@timeout")]
    pub timeout: Option<u32>,
    #[serde(rename = "@timestamp")]
    pub timestamp: Option<Timestamp>,
    #[serde(rename = "@message")]
    pub message: Option<String>,

    #[serde(rename = "defNumber", default)]
    pub numbers: Vec<DefNumber>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename = "defNumber")]
pub struct DefNumber {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@label")]
    pub label: Option<String>,
    #[serde(rename = "@format")]
    pub format: String,
    #[serde(rename = "@min", with = "number_vector::sexagesimal")]
    pub min: f64,
    #[serde(rename = "@max", with = "number_vector::sexagesimal")]
    pub max: f64,
    #[serde(rename = "@step", with = "number_vector::sexagesimal")]
    pub step: f64,
    #[serde(rename = "$text", with = "number_vector::sexagesimal")]
    pub value: f64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename = "setNumberVector")]
pub struct SetNumberVector {
    #[serde(rename = "@device")]
    pub device: String,
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@state")]
    pub state: Option<PropertyState>,
    #[serde(rename = "@timeout")]
    pub timeout: Option<u32>,
    #[serde(rename = "@timestamp")]
    pub timestamp: Option<Timestamp>,
    #[serde(rename = "@message")]
    pub message: Option<String>,

    #[serde(rename = "oneNumber", default)]
    pub numbers: Vec<SetOneNumber>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename = "oneNumber")]
pub struct SetOneNumber {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@min", default, with = "number_vector::optional_sexagesimal")]
    pub min: Option<f64>,
    #[serde(rename = "@max", default, with = "number_vector::optional_sexagesimal")]
    pub max: Option<f64>,
    #[serde(rename = "@step", default, with = "number_vector::optional_sexagesimal")]
    pub step: Option<f64>,
    #[serde(rename = "$text", with = "number_vector::sexagesimal")]
    pub value: f64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename = "newNumberVector")]
pub struct NewNumberVector {
    #[serde(rename = "@device")]
    pub device: String,
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@timestamp")]
    pub timestamp: Option<Timestamp>,

    #[serde(rename = "oneNumber", default)]
    pub numbers: Vec<OneNumber>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(rename = "oneNumber")]
pub struct OneNumber {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "$text", with = "number_vector::sexagesimal")]
    pub value: f64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename = "defSwitchVector")]
pub struct DefSwitchVector {
    #[serde(rename = "@device")]
    pub device: String,
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@label")]
    pub label: Option<String>,
    #[serde(rename = "@group")]
    pub group: Option<String>,
    #[serde(rename = "@state")]
    pub state: PropertyState,
    #[serde(rename = "@perm")]
    pub perm: PropertyPerm,
    #[serde(rename = "@rule")]
    pub rule: SwitchRule,
    #[serde(rename = "@timeout")]
    pub timeout: Option<u32>,
    #[serde(rename = "@timestamp")]
    pub timestamp: Option<Timestamp>,
    #[serde(rename = "@message")]
    pub message: Option<String>,

    #[serde(rename = "defSwitch", default)]
    pub switches: Vec<DefSwitch>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename = "defSwitch")]
pub struct DefSwitch {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@label")]
    pub label: Option<String>,
    #[serde(rename = "$text")]
    pub value: SwitchState,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename = "setSwitchVector")]
pub struct SetSwitchVector {
    #[serde(rename = "@device")]
    pub device: String,
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@state")]
    pub state: Option<PropertyState>,
    #[serde(rename = "@timeout")]
    pub timeout: Option<u32>,
    #[serde(rename = "@timestamp")]
    pub timestamp: Option<Timestamp>,
    #[serde(rename = "@message")]
    pub message: Option<String>,

    #[serde(rename = "oneSwitch", default)]
    pub switches: Vec<OneSwitch>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename = "newSwitchVector")]
pub struct NewSwitchVector {
    #[serde(rename = "@device")]
    pub device: String,
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@timestamp")]
    pub timestamp: Option<Timestamp>,

    #[serde(rename = "oneSwitch", default)]
    pub switches: Vec<OneSwitch>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(rename = "oneSwitch")]
pub struct OneSwitch {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "$text")]
    pub value: SwitchState,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename = "defLightVector")]
pub struct DefLightVector {
    #[serde(rename = "@device")]
    pub device: String,
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@label")]
    pub label: Option<String>,
    #[serde(rename = "@group")]
    pub group: Option<String>,
    #[serde(rename = "@state")]
    pub state: PropertyState,
    #[serde(rename = "@timestamp")]
    pub timestamp: Option<Timestamp>,
    #[serde(rename = "@message")]
    pub message: Option<String>,

    #[serde(rename = "defLight", default)]
    pub lights: Vec<DefLight>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename = "defLight")]
pub struct DefLight {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@label")]
    pub label: Option<String>,
    #[serde(rename = "$text")]
    pub value: PropertyState,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename = "setLightVector")]
pub struct SetLightVector {
    #[serde(rename = "@device")]
    pub device: String,
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@state")]
    pub state: Option<PropertyState>,
    #[serde(rename = "@timestamp")]
    pub timestamp: Option<Timestamp>,
    #[serde(rename = "@message")]
    pub message: Option<String>,

    #[serde(rename = "oneLight", default)]
    pub lights: Vec<OneLight>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename = "oneLight")]
pub struct OneLight {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "$text")]
    pub value: PropertyState,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename = "defBLOBVector")]
pub struct DefBlobVector {
    #[serde(rename = "@device")]
    pub device: String,
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@label")]
    pub label: Option<String>,
    #[serde(rename = "@group")]
    pub group: Option<String>,
    #[serde(rename = "@state")]
    pub state: PropertyState,
    #[serde(rename = "@perm")]
    pub perm: PropertyPerm,
    #[serde(rename = "@timeout")]
    pub timeout: Option<u32>,
    #[serde(rename = "@timestamp")]
    pub timestamp: Option<Timestamp>,
    #[serde(rename = "@message")]
    pub message: Option<String>,

    #[serde(rename = "defBLOB", default)]
    pub blobs: Vec<DefBlob>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename = "defBLOB")]
pub struct DefBlob {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@label")]
    pub label: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename = "setBLOBVector")]
pub struct SetBlobVector {
    #[serde(rename = "@device")]
    pub device: String,
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@state")]
    pub state: Option<PropertyState>,
    #[serde(rename = "@timeout")]
    pub timeout: Option<u32>,
    #[serde(rename = "@timestamp")]
    pub timestamp: Option<Timestamp>,
    #[serde(rename = "@message")]
    pub message: Option<String>,

    #[serde(rename = "oneBLOB", default)]
    pub blobs: Vec<OneBlob>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename = "oneBLOB")]
pub struct OneBlob {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@size")]
    pub size: u64,
    #[serde(rename = "@enclen")]
    pub enclen: Option<u64>,
    #[serde(rename = "@format")]
    pub format: String,
    #[serde(rename = "$text", default)]
    pub value: EncodedBlob,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename = "enableBLOB")]
pub struct EnableBlob {
    #[serde(rename = "@device")]
    pub device: String,
    #[serde(rename = "@name", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "$text")]
    pub enabled: BlobEnable,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(rename = "message")]
pub struct Message {
    #[serde(rename = "@device")]
    pub device: Option<String>,
    #[serde(rename = "@timestamp")]
    pub timestamp: Option<Timestamp>,
    #[serde(rename = "@message")]
    pub message: Option<String>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename = "delProperty")]
pub struct DelProperty {
    #[serde(rename = "@device")]
    pub device: String,
    #[serde(rename = "@name")]
    pub name: Option<String>,
    #[serde(rename = "@timestamp")]
    pub timestamp: Option<Timestamp>,
    #[serde(rename = "@message")]
    pub message: Option<String>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename = "getProperties")]
pub struct GetProperties {
    #[serde(rename = "@version")]
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "@device")]
    pub device: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "@name")]
    pub name: Option<String>,
}

#[derive(Debug)]
pub enum DeError {
    XmlError(quick_xml::Error),
    XmlDeError(quick_xml::DeError),
    IoError(std::io::Error),
    FromUtf8Error(std::string::FromUtf8Error),
    BadAttr(quick_xml::events::attributes::AttrError),
    Base64(base64::DecodeError),
    ParseSexagesimal(String),
}

impl std::fmt::Display for DeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeError::XmlError(e) => write!(f, "malformed xml: {}", e),
            DeError::XmlDeError(e) => write!(f, "unexpected xml: {}", e),
            DeError::IoError(e) => write!(f, "io error: {}", e),
            DeError::FromUtf8Error(e) => write!(f, "invalid utf-8: {}", e),
            DeError::BadAttr(e) => write!(f, "bad attribute: {}", e),
            DeError::Base64(e) => write!(f, "invalid blob encoding: {}", e),
            DeError::ParseSexagesimal(s) => write!(f, "invalid number: {:?}", s),
        }
    }
}

impl std::error::Error for DeError {}

impl From<quick_xml::Error> for DeError {
    fn from(err: quick_xml::Error) -> Self {
        DeError::XmlError(err)
    }
}

impl From<quick_xml::DeError> for DeError {
    fn from(err: quick_xml::DeError) -> Self {
        DeError::XmlDeError(err)
    }
}

impl From<std::io::Error> for DeError {
    fn from(err: std::io::Error) -> Self {
        DeError::IoError(err)
    }
}

impl From<std::string::FromUtf8Error> for DeError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        DeError::FromUtf8Error(err)
    }
}

impl From<quick_xml::events::attributes::AttrError> for DeError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        DeError::BadAttr(err)
    }
}

impl From<base64::DecodeError> for DeError {
    fn from(err: base64::DecodeError) -> Self {
        DeError::Base64(err)
    }
}
