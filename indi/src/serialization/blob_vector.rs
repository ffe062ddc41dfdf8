use base64::Engine;

use super::super::*;
use super::*;

/// Raw bytes of a `oneBLOB` element, base64 encoded on the wire.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EncodedBlob(pub Vec<u8>);

impl Serialize for EncodedBlob {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for EncodedBlob {
    fn deserialize<D>(deserializer: D) -> Result<EncodedBlob, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        decode(&s).map_err(serde::de::Error::custom)
    }
}

/// Decodes base64 blob data, ignoring the line breaks servers insert every 72 characters.
pub fn decode(encoded: &str) -> Result<EncodedBlob, DeError> {
    let compact: Vec<u8> = encoded
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    Ok(EncodedBlob(
        base64::engine::general_purpose::STANDARD.decode(compact)?,
    ))
}

impl CommandtoParam for DefBlobVector {
    fn get_name(&self) -> &String {
        &self.name
    }

    fn to_param(self) -> Parameter {
        Parameter::BlobVector(BlobVector {
            gen: Wrapping(0),
            name: self.name,
            group: self.group,
            label: self.label,
            state: self.state,
            perm: self.perm,
            timeout: self.timeout,
            timestamp: self.timestamp.map(Timestamp::into_inner),
            values: self
                .blobs
                .into_iter()
                .map(|i| {
                    (
                        i.name,
                        Blob {
                            label: i.label,
                            format: None,
                            size: None,
                            value: None,
                        },
                    )
                })
                .collect(),
        })
    }
}

impl CommandToUpdate for SetBlobVector {
    fn get_name(&self) -> &String {
        &self.name
    }

    fn update_param(self, param: &mut Parameter) -> Result<String, UpdateError> {
        match param {
            Parameter::BlobVector(blob_vector) => {
                if let Some(state) = self.state {
                    blob_vector.state = state;
                }
                blob_vector.timestamp = self.timestamp.map(Timestamp::into_inner);
                for blob in self.blobs {
                    let existing = blob_vector.values.entry(blob.name).or_insert(Blob {
                        label: None,
                        format: None,
                        size: None,
                        value: None,
                    });
                    existing.format = Some(blob.format);
                    existing.size = Some(blob.size);
                    existing.value = Some(Arc::new(blob.value.0));
                }
                Ok(self.name)
            }
            _ => Err(UpdateError::ParameterTypeMismatch(self.name.clone())),
        }
    }
}
