use super::super::*;
use super::*;

impl CommandtoParam for DefTextVector {
    fn get_name(&self) -> &String {
        &self.name
    }

    fn to_param(self) -> Parameter {
        let values = self
            .texts
            .into_iter()
            .map(|DefText { name, label, value }| (name, Text { label, value }))
            .collect();
        Parameter::TextVector(TextVector {
            gen: Wrapping(0),
            name: self.name,
            group: self.group,
            label: self.label,
            state: self.state,
            perm: self.perm,
            timeout: self.timeout,
            timestamp: self.timestamp.map(Timestamp::into_inner),
            values,
        })
    }
}

impl CommandToUpdate for SetTextVector {
    fn get_name(&self) -> &String {
        &self.name
    }

    fn update_param(self, param: &mut Parameter) -> Result<String, UpdateError> {
        let Parameter::TextVector(vector) = param else {
            return Err(UpdateError::ParameterTypeMismatch(self.name));
        };
        if let Some(state) = self.state {
            vector.state = state;
        }
        vector.timestamp = self.timestamp.map(Timestamp::into_inner);
        for OneText { name, value } in self.texts {
            match vector.values.get_mut(&name) {
                Some(text) => text.value = value,
                None => tracing::debug!("{}.{} has no text {}", self.device, self.name, name),
            }
        }
        Ok(self.name)
    }
}
