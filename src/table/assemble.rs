use serde::de::DeserializeOwned;
use serde_dynamo::from_item;
use std::collections::HashMap;

use crate::error::Error;
use crate::table::types::{Item, Key, KeyIdentity, KeySchema};

/// Places records returned across retry rounds into request-ordered slots
///
/// The provider answers in no particular order, so every record is matched to
/// its slot by key identity. A slot is only ever assigned a fully decoded value.
pub(crate) struct ReadAssembler<'a, T> {
    schema: KeySchema,
    keys: Vec<Key>,
    positions: HashMap<KeyIdentity, usize>,
    placed: Vec<bool>,
    slots: &'a mut [Option<T>],
}

impl<'a, T> ReadAssembler<'a, T>
where
    T: DeserializeOwned,
{
    pub(crate) fn new(
        schema: KeySchema,
        keys: &[Key],
        slots: &'a mut [Option<T>],
    ) -> Result<Self, Error> {
        if keys.len() != slots.len() {
            return Err(Error::SlotMismatch {
                keys: keys.len(),
                slots: slots.len(),
            });
        }

        let mut positions = HashMap::with_capacity(keys.len());
        for (index, key) in keys.iter().enumerate() {
            let identity = schema.identity(key).map_err(|source| Error::InvalidKey {
                source,
                unprocessed: keys.to_vec(),
            })?;
            let _ = positions.insert(identity, index);
        }

        Ok(Self {
            schema,
            keys: keys.to_vec(),
            positions,
            placed: vec![false; keys.len()],
            slots,
        })
    }

    /// Decode one round of returned records into their slots
    ///
    /// On failure the error lists every requested key whose slot was not
    /// filled, which includes the keys the provider left unprocessed.
    pub(crate) fn place(&mut self, records: Vec<Item>) -> Result<(), Error> {
        for record in records {
            let identity = match self.schema.identity(&record) {
                Ok(identity) => identity,
                Err(source) => {
                    return Err(Error::InvalidKey {
                        source,
                        unprocessed: self.pending(),
                    });
                }
            };
            let Some(&index) = self.positions.get(&identity) else {
                tracing::warn!(?identity, "provider returned a record that was not requested");
                continue;
            };

            let key = self.schema.project_lossy(&record);
            match from_item(record) {
                Ok(value) => {
                    self.slots[index] = Some(value);
                    self.placed[index] = true;
                }
                Err(source) => {
                    return Err(Error::DecodeFailed {
                        key,
                        source,
                        unprocessed: self.pending(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Requested keys not yet placed, in request order
    fn pending(&self) -> Vec<Key> {
        self.keys
            .iter()
            .zip(&self.placed)
            .filter(|(_, placed)| !**placed)
            .map(|(key, _)| key.clone())
            .collect()
    }
}
