use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;

use super::value::{FieldKind, FieldValue};

pub const MAX_FIELDS: usize = 255;
pub const MAX_METHODS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SchemaId(pub u32);

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "schema#{}", self.0)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FieldFlags: u8 {
        const INTERPOLATED = 1 << 0;
        /// Establishes identity; stays at its default until first synchronized.
        const IDENTITY = 1 << 1;
        const OWNER = 1 << 2;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
    pub flags: FieldFlags,
    pub lerp: f32,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            flags: FieldFlags::empty(),
            lerp: 0.0,
        }
    }

    pub fn interpolated(mut self, lerp: f32) -> Self {
        self.flags |= FieldFlags::INTERPOLATED;
        self.lerp = lerp.clamp(0.0, 1.0);
        self
    }

    pub fn identity(mut self) -> Self {
        self.flags |= FieldFlags::IDENTITY;
        self
    }

    pub fn owner(mut self) -> Self {
        self.flags |= FieldFlags::OWNER | FieldFlags::IDENTITY;
        self
    }

    /// A zero lerp factor disables smoothing even when the flag is set.
    pub fn smoothing_enabled(&self) -> bool {
        self.flags.contains(FieldFlags::INTERPOLATED) && self.lerp > 0.0
    }

    pub fn is_identity(&self) -> bool {
        self.flags.intersects(FieldFlags::IDENTITY | FieldFlags::OWNER)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RpcMethod {
    pub name: String,
    pub params: Vec<FieldKind>,
}

impl RpcMethod {
    pub fn new(name: impl Into<String>, params: &[FieldKind]) -> Self {
        Self {
            name: name.into(),
            params: params.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("schema {schema} declares field `{field}` twice")]
    DuplicateField { schema: String, field: String },
    #[error("schema {schema} declares rpc `{method}` twice")]
    DuplicateMethod { schema: String, method: String },
    #[error("schema {schema} has more than one owner field")]
    MultipleOwnerFields { schema: String },
    #[error("owner field `{field}` must be u32, found {found}")]
    OwnerFieldKind { field: String, found: FieldKind },
    #[error("schema {schema} exceeds {max} fields")]
    TooManyFields { schema: String, max: usize },
    #[error("schema {schema} exceeds {max} rpc methods")]
    TooManyMethods { schema: String, max: usize },
    #[error("{0} is already registered")]
    AlreadyRegistered(SchemaId),
}

/// Ordered field and RPC layout of one replicated type.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSchema {
    id: SchemaId,
    name: String,
    fields: Vec<FieldDescriptor>,
    methods: Vec<RpcMethod>,
    owner_field: Option<usize>,
}

impl ObjectSchema {
    pub fn builder(id: SchemaId, name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            id,
            name: name.into(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn id(&self) -> SchemaId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> Option<&FieldDescriptor> {
        self.fields.get(index)
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn owner_field(&self) -> Option<usize> {
        self.owner_field
    }

    pub fn methods(&self) -> &[RpcMethod] {
        &self.methods
    }

    pub fn method(&self, id: u8) -> Option<&RpcMethod> {
        self.methods.get(id as usize)
    }

    pub fn method_id(&self, name: &str) -> Option<u8> {
        self.methods
            .iter()
            .position(|m| m.name == name)
            .map(|i| i as u8)
    }

    /// Bytes needed for the dirty mask.
    pub fn mask_len(&self) -> usize {
        self.fields.len().div_ceil(8)
    }

    pub fn default_values(&self) -> Vec<FieldValue> {
        self.fields.iter().map(|f| f.kind.default_value()).collect()
    }
}

pub struct SchemaBuilder {
    id: SchemaId,
    name: String,
    fields: Vec<FieldDescriptor>,
    methods: Vec<RpcMethod>,
}

impl SchemaBuilder {
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn rpc(mut self, method: RpcMethod) -> Self {
        self.methods.push(method);
        self
    }

    pub fn build(self) -> Result<ObjectSchema, SchemaError> {
        if self.fields.len() > MAX_FIELDS {
            return Err(SchemaError::TooManyFields {
                schema: self.name,
                max: MAX_FIELDS,
            });
        }
        if self.methods.len() > MAX_METHODS {
            return Err(SchemaError::TooManyMethods {
                schema: self.name,
                max: MAX_METHODS,
            });
        }

        let mut owner_field = None;
        for (index, field) in self.fields.iter().enumerate() {
            if self.fields[..index].iter().any(|f| f.name == field.name) {
                return Err(SchemaError::DuplicateField {
                    schema: self.name.clone(),
                    field: field.name.clone(),
                });
            }
            if field.flags.contains(FieldFlags::OWNER) {
                if field.kind != FieldKind::U32 {
                    return Err(SchemaError::OwnerFieldKind {
                        field: field.name.clone(),
                        found: field.kind,
                    });
                }
                if owner_field.replace(index).is_some() {
                    return Err(SchemaError::MultipleOwnerFields {
                        schema: self.name.clone(),
                    });
                }
            }
        }

        for (index, method) in self.methods.iter().enumerate() {
            if self.methods[..index].iter().any(|m| m.name == method.name) {
                return Err(SchemaError::DuplicateMethod {
                    schema: self.name.clone(),
                    method: method.name.clone(),
                });
            }
        }

        Ok(ObjectSchema {
            id: self.id,
            name: self.name,
            fields: self.fields,
            methods: self.methods,
            owner_field,
        })
    }
}

/// Schemas every participant agrees on, keyed by type identity.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<SchemaId, Arc<ObjectSchema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, schema: ObjectSchema) -> Result<Arc<ObjectSchema>, SchemaError> {
        let id = schema.id();
        if self.schemas.contains_key(&id) {
            return Err(SchemaError::AlreadyRegistered(id));
        }
        let schema = Arc::new(schema);
        self.schemas.insert(id, Arc::clone(&schema));
        Ok(schema)
    }

    pub fn get(&self, id: SchemaId) -> Option<&Arc<ObjectSchema>> {
        self.schemas.get(&id)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
