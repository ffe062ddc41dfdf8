use super::super::*;
use super::*;

impl CommandtoParam for DefLightVector {
    fn get_name(&self) -> &String {
        &self.name
    }

    fn to_param(self) -> Parameter {
        let values = self
            .lights
            .into_iter()
            .map(|DefLight { name, label, value }| (name, Light { label, value }))
            .collect();
        Parameter::LightVector(LightVector {
            gen: Wrapping(0),
            name: self.name,
            label: self.label,
            group: self.group,
            state: self.state,
            timestamp: self.timestamp.map(Timestamp::into_inner),
            values,
        })
    }
}

impl CommandToUpdate for SetLightVector {
    fn get_name(&self) -> &String {
        &self.name
    }

    fn update_param(self, param: &mut Parameter) -> Result<String, UpdateError> {
        let Parameter::LightVector(vector) = param else {
            return Err(UpdateError::ParameterTypeMismatch(self.name));
        };
        if let Some(state) = self.state {
            vector.state = state;
        }
        vector.timestamp = self.timestamp.map(Timestamp::into_inner);
        for OneLight { name, value } in self.lights {
            match vector.values.get_mut(&name) {
                Some(light) => light.value = value,
                None => tracing::debug!("{}.{} has no light {}", self.device, self.name, name),
            }
        }
        Ok(self.name)
    }
}
