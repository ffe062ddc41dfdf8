use super::super::*;
use super::*;

/// Parses an INDI number, which is either a plain decimal or a sexagesimal
/// value such as `12:30:15`, `-5 30` or `3:15.5`.
pub fn parse_sexagesimal(input: &str) -> Result<f64, DeError> {
    let input = input.trim();
    let bad = || DeError::ParseSexagesimal(input.to_string());

    let mut components = input.split([' ', ':']).filter(|c| !c.is_empty());
    let first = components.next().ok_or_else(bad)?;
    let hour: f64 = first.parse().map_err(|_| bad())?;
    let negative = first.starts_with('-');

    let mut value = hour.abs();
    let mut scale = 1.0;
    for component in components {
        scale /= 60.0;
        let part: f64 = component.parse().map_err(|_| bad())?;
        value += part * scale;
    }

    if !value.is_finite() {
        return Err(bad());
    }
    Ok(if negative { -value } else { value })
}

pub mod sexagesimal {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(*value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        super::parse_sexagesimal(&s).map_err(serde::de::Error::custom)
    }
}

pub mod optional_sexagesimal {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(value) => serializer.serialize_some(value),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: Option<String> = Deserialize::deserialize(deserializer)?;
        s.map(|s| super::parse_sexagesimal(&s))
            .transpose()
            .map_err(serde::de::Error::custom)
    }
}

impl CommandtoParam for DefNumberVector {
    fn get_name(&self) -> &String {
        &self.name
    }

    fn to_param(self) -> Parameter {
        Parameter::NumberVector(NumberVector {
            gen: Wrapping(0),
            name: self.name,
            group: self.group,
            label: self.label,
            state: self.state,
            perm: self.perm,
            timeout: self.timeout,
            timestamp: self.timestamp.map(Timestamp::into_inner),
            values: self
                .numbers
                .into_iter()
                .map(|i| {
                    (
                        i.name,
                        Number {
                            label: i.label,
                            format: i.format,
                            min: i.min,
                            max: i.max,
                            step: i.step,
                            value: i.value,
                        },
                    )
                })
                .collect(),
        })
    }
}

impl CommandToUpdate for SetNumberVector {
    fn get_name(&self) -> &String {
        &self.name
    }

    fn update_param(self, param: &mut Parameter) -> Result<String, UpdateError> {
        match param {
            Parameter::NumberVector(number_vector) => {
                if let Some(state) = self.state {
                    number_vector.state = state;
                }
                number_vector.timestamp = self.timestamp.map(Timestamp::into_inner);
                for number in self.numbers {
                    if let Some(existing) = number_vector.values.get_mut(&number.name) {
                        existing.min = number.min.unwrap_or(existing.min);
                        existing.max = number.max.unwrap_or(existing.max);
                        existing.step = number.step.unwrap_or(existing.step);
                        existing.value = number.value;
                    }
                }
                Ok(self.name)
            }
            _ => Err(UpdateError::ParameterTypeMismatch(self.name.clone())),
        }
    }
}
