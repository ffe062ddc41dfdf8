use super::super::*;
use super::*;

impl CommandtoParam for DefSwitchVector {
    fn get_name(&self) -> &String {
        &self.name
    }

    fn to_param(self) -> Parameter {
        Parameter::SwitchVector(SwitchVector {
            gen: Wrapping(0),
            name: self.name,
            group: self.group,
            label: self.label,
            state: self.state,
            perm: self.perm,
            rule: self.rule,
            timeout: self.timeout,
            timestamp: self.timestamp.map(Timestamp::into_inner),
            values: self
                .switches
                .into_iter()
                .map(|i| {
                    (
                        i.name,
                        Switch {
                            label: i.label,
                            value: i.value,
                        },
                    )
                })
                .collect(),
        })
    }
}

impl CommandToUpdate for SetSwitchVector {
    fn get_name(&self) -> &String {
        &self.name
    }

    fn update_param(self, param: &mut Parameter) -> Result<String, UpdateError> {
        match param {
            Parameter::SwitchVector(switch_vector) => {
                if let Some(state) = self.state {
                    switch_vector.state = state;
                }
                switch_vector.timestamp = self.timestamp.map(Timestamp::into_inner);
                for switch in self.switches {
                    if let Some(existing) = switch_vector.values.get_mut(&switch.name) {
                        existing.value = switch.value;
                    }
                }
                Ok(self.name)
            }
            _ => Err(UpdateError::ParameterTypeMismatch(self.name.clone())),
        }
    }
}

/// Builds the values for selecting `on` in a switch vector, turning every
/// other switch in `param` off.
pub fn select_switch<'a>(
    param: &'a Parameter,
    on: &'a str,
) -> Result<Vec<(&'a str, bool)>, TypeError> {
    let values = param.get_values::<HashMap<String, Switch>>()?;
    let mut selection: Vec<(&str, bool)> = values
        .keys()
        .filter(|name| name.as_str() != on)
        .map(|name| (name.as_str(), false))
        .collect();
    selection.sort();
    selection.insert(0, (on, true));
    Ok(selection)
}
