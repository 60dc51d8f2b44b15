use crate::schema::{FieldValue, ObjectSchema};
use crate::state::DirtyMask;

use super::wire::{PayloadError, WireReader, WireWriter};

/// Every field in schema order.
pub fn write_full(schema: &ObjectSchema, values: &[FieldValue]) -> Vec<u8> {
    debug_assert_eq!(values.len(), schema.field_count());
    let mut writer = WireWriter::with_capacity(values.len() * 4);
    for value in values {
        value.encode(&mut writer);
    }
    writer.into_bytes()
}

pub fn read_full(schema: &ObjectSchema, bytes: &[u8]) -> Result<Vec<FieldValue>, PayloadError> {
    let mut reader = WireReader::new(bytes);
    let values = schema
        .fields()
        .iter()
        .map(|field| FieldValue::decode(field.kind, &mut reader))
        .collect::<Result<Vec<_>, _>>()?;
    reader.finish()?;
    Ok(values)
}

/// Mask bytes followed by the fields whose bit is set, ascending.
pub fn write_delta(schema: &ObjectSchema, mask: &DirtyMask, values: &[FieldValue]) -> Vec<u8> {
    debug_assert_eq!(mask.bytes().len(), schema.mask_len());
    let mut writer = WireWriter::with_capacity(mask.bytes().len() + mask.count() * 4);
    writer.write_bytes(mask.bytes());
    for index in mask.iter() {
        if let Some(value) = values.get(index) {
            value.encode(&mut writer);
        }
    }
    writer.into_bytes()
}

pub fn read_delta(
    schema: &ObjectSchema,
    bytes: &[u8],
) -> Result<(DirtyMask, Vec<(usize, FieldValue)>), PayloadError> {
    let mut reader = DeltaReader::new(schema, bytes)?;
    let updates = reader.by_ref().collect::<Result<Vec<_>, _>>()?;
    Ok((reader.mask().clone(), updates))
}

/// Decodes a delta one field at a time so callers can apply what decoded
/// cleanly before a malformed field.
pub struct DeltaReader<'a> {
    schema: &'a ObjectSchema,
    reader: WireReader<'a>,
    mask: DirtyMask,
    next_bit: usize,
    done: bool,
}

impl<'a> DeltaReader<'a> {
    pub fn new(schema: &'a ObjectSchema, bytes: &'a [u8]) -> Result<Self, PayloadError> {
        let mut reader = WireReader::new(bytes);
        let mask_bytes = reader.read_bytes(schema.mask_len())?;
        Ok(Self {
            schema,
            reader,
            mask: DirtyMask::from_bytes(mask_bytes, schema.field_count()),
            next_bit: 0,
            done: false,
        })
    }

    pub fn mask(&self) -> &DirtyMask {
        &self.mask
    }

    fn next_field(&mut self) -> Option<Result<(usize, FieldValue), PayloadError>> {
        let total_bits = self.mask.bytes().len() * 8;
        while self.next_bit < total_bits {
            let index = self.next_bit;
            self.next_bit += 1;
            if !self.mask.is_dirty(index) {
                continue;
            }
            let Some(field) = self.schema.field(index) else {
                return Some(Err(PayloadError::FieldOutOfRange {
                    index,
                    field_count: self.schema.field_count(),
                }));
            };
            return Some(FieldValue::decode(field.kind, &mut self.reader).map(|v| (index, v)));
        }
        match self.reader.finish() {
            Ok(()) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

impl Iterator for DeltaReader<'_> {
    type Item = Result<(usize, FieldValue), PayloadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = self.next_field();
        if !matches!(item, Some(Ok(_))) {
            self.done = true;
        }
        item
    }
}
