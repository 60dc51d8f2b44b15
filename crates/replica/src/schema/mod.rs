mod descriptor;
mod value;

pub use descriptor::{
    FieldDescriptor, FieldFlags, MAX_FIELDS, MAX_METHODS, ObjectSchema, RpcMethod,
    SchemaBuilder, SchemaError, SchemaId, SchemaRegistry,
};
pub use value::{FieldKind, FieldValue};
