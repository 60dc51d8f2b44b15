use std::fmt;

use glam::{Quat, Vec2, Vec3};

use crate::codec::{PayloadError, WireReader, WireWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FieldKind {
    Bool = 0,
    U8 = 1,
    U16 = 2,
    U32 = 3,
    U64 = 4,
    I32 = 5,
    I64 = 6,
    F32 = 7,
    F64 = 8,
    Vec2 = 9,
    Vec3 = 10,
    Quat = 11,
    Text = 12,
}

impl FieldKind {
    /// Encoded width in bytes, `None` for the length-prefixed `Text` kind.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            Self::Bool | Self::U8 => Some(1),
            Self::U16 => Some(2),
            Self::U32 | Self::I32 | Self::F32 => Some(4),
            Self::U64 | Self::I64 | Self::F64 | Self::Vec2 => Some(8),
            Self::Vec3 => Some(12),
            Self::Quat => Some(16),
            Self::Text => None,
        }
    }

    pub fn is_blendable(self) -> bool {
        matches!(
            self,
            Self::F32 | Self::F64 | Self::Vec2 | Self::Vec3 | Self::Quat
        )
    }

    pub fn default_value(self) -> FieldValue {
        match self {
            Self::Bool => FieldValue::Bool(false),
            Self::U8 => FieldValue::U8(0),
            Self::U16 => FieldValue::U16(0),
            Self::U32 => FieldValue::U32(0),
            Self::U64 => FieldValue::U64(0),
            Self::I32 => FieldValue::I32(0),
            Self::I64 => FieldValue::I64(0),
            Self::F32 => FieldValue::F32(0.0),
            Self::F64 => FieldValue::F64(0.0),
            Self::Vec2 => FieldValue::Vec2(Vec2::ZERO),
            Self::Vec3 => FieldValue::Vec3(Vec3::ZERO),
            Self::Quat => FieldValue::Quat(Quat::IDENTITY),
            Self::Text => FieldValue::Text(String::new()),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Vec2 => "vec2",
            Self::Vec3 => "vec3",
            Self::Quat => "quat",
            Self::Text => "text",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Vec2(Vec2),
    Vec3(Vec3),
    Quat(Quat),
    Text(String),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            Self::Bool(_) => FieldKind::Bool,
            Self::U8(_) => FieldKind::U8,
            Self::U16(_) => FieldKind::U16,
            Self::U32(_) => FieldKind::U32,
            Self::U64(_) => FieldKind::U64,
            Self::I32(_) => FieldKind::I32,
            Self::I64(_) => FieldKind::I64,
            Self::F32(_) => FieldKind::F32,
            Self::F64(_) => FieldKind::F64,
            Self::Vec2(_) => FieldKind::Vec2,
            Self::Vec3(_) => FieldKind::Vec3,
            Self::Quat(_) => FieldKind::Quat,
            Self::Text(_) => FieldKind::Text,
        }
    }

    pub fn is_default(&self) -> bool {
        *self == self.kind().default_value()
    }

    /// False for text longer than its u32 length prefix can describe.
    pub fn fits_wire(&self) -> bool {
        match self {
            Self::Text(s) => text_len_prefix(s.len()).is_some(),
            _ => true,
        }
    }

    pub fn encode(&self, writer: &mut WireWriter) {
        match self {
            Self::Bool(v) => writer.write_u8(u8::from(*v)),
            Self::U8(v) => writer.write_u8(*v),
            Self::U16(v) => writer.write_u16(*v),
            Self::U32(v) => writer.write_u32(*v),
            Self::U64(v) => writer.write_u64(*v),
            Self::I32(v) => writer.write_i32(*v),
            Self::I64(v) => writer.write_i64(*v),
            Self::F32(v) => writer.write_f32(*v),
            Self::F64(v) => writer.write_f64(*v),
            Self::Vec2(v) => {
                writer.write_f32(v.x);
                writer.write_f32(v.y);
            }
            Self::Vec3(v) => {
                writer.write_f32(v.x);
                writer.write_f32(v.y);
                writer.write_f32(v.z);
            }
            Self::Quat(q) => {
                writer.write_f32(q.x);
                writer.write_f32(q.y);
                writer.write_f32(q.z);
                writer.write_f32(q.w);
            }
            Self::Text(s) => {
                // Writers refuse over-long text up front; clamping keeps the frame intact.
                let len = text_len_prefix(s.len()).unwrap_or(u32::MAX);
                writer.write_u32(len);
                writer.write_bytes(&s.as_bytes()[..len as usize]);
            }
        }
    }

    pub fn decode(kind: FieldKind, reader: &mut WireReader<'_>) -> Result<Self, PayloadError> {
        let value = match kind {
            FieldKind::Bool => match reader.read_u8()? {
                0 => Self::Bool(false),
                1 => Self::Bool(true),
                _ => return Err(PayloadError::InvalidValue { kind }),
            },
            FieldKind::U8 => Self::U8(reader.read_u8()?),
            FieldKind::U16 => Self::U16(reader.read_u16()?),
            FieldKind::U32 => Self::U32(reader.read_u32()?),
            FieldKind::U64 => Self::U64(reader.read_u64()?),
            FieldKind::I32 => Self::I32(reader.read_i32()?),
            FieldKind::I64 => Self::I64(reader.read_i64()?),
            FieldKind::F32 => Self::F32(reader.read_f32()?),
            FieldKind::F64 => Self::F64(reader.read_f64()?),
            FieldKind::Vec2 => Self::Vec2(Vec2::new(reader.read_f32()?, reader.read_f32()?)),
            FieldKind::Vec3 => Self::Vec3(Vec3::new(
                reader.read_f32()?,
                reader.read_f32()?,
                reader.read_f32()?,
            )),
            FieldKind::Quat => Self::Quat(Quat::from_xyzw(
                reader.read_f32()?,
                reader.read_f32()?,
                reader.read_f32()?,
                reader.read_f32()?,
            )),
            FieldKind::Text => {
                let len = reader.read_u32()? as usize;
                let bytes = reader.read_bytes(len)?;
                let text = std::str::from_utf8(bytes)
                    .map_err(|_| PayloadError::InvalidValue { kind })?;
                Self::Text(text.to_owned())
            }
        };
        Ok(value)
    }

    /// Distance used by the interpolation snap test.
    pub fn distance(&self, other: &FieldValue) -> f32 {
        match (self, other) {
            (Self::U8(a), Self::U8(b)) => (*a as f32 - *b as f32).abs(),
            (Self::U16(a), Self::U16(b)) => (*a as f32 - *b as f32).abs(),
            (Self::U32(a), Self::U32(b)) => (*a as f64 - *b as f64).abs() as f32,
            (Self::U64(a), Self::U64(b)) => (*a as f64 - *b as f64).abs() as f32,
            (Self::I32(a), Self::I32(b)) => (*a as f64 - *b as f64).abs() as f32,
            (Self::I64(a), Self::I64(b)) => (*a as f64 - *b as f64).abs() as f32,
            (Self::F32(a), Self::F32(b)) => (a - b).abs(),
            (Self::F64(a), Self::F64(b)) => (a - b).abs() as f32,
            (Self::Vec2(a), Self::Vec2(b)) => a.distance(*b),
            (Self::Vec3(a), Self::Vec3(b)) => a.distance(*b),
            (Self::Quat(a), Self::Quat(b)) => {
                let (a, b) = (glam::Vec4::from(*a), glam::Vec4::from(*b));
                a.distance(b).min(a.distance(-b))
            }
            (a, b) if a == b => 0.0,
            _ => f32::INFINITY,
        }
    }

    /// One fixed blend step from `self` toward `target`. Kinds that cannot be
    /// blended return the target unchanged.
    pub fn blend(&self, target: &FieldValue, t: f32) -> FieldValue {
        match (self, target) {
            (Self::F32(a), Self::F32(b)) => Self::F32(a + (b - a) * t),
            (Self::F64(a), Self::F64(b)) => Self::F64(a + (b - a) * t as f64),
            (Self::Vec2(a), Self::Vec2(b)) => Self::Vec2(a.lerp(*b, t)),
            (Self::Vec3(a), Self::Vec3(b)) => Self::Vec3(a.lerp(*b, t)),
            (Self::Quat(a), Self::Quat(b)) => Self::Quat(a.slerp(*b, t)),
            _ => target.clone(),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Self::U32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::I32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Self::F32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_vec3(&self) -> Option<Vec3> {
        match self {
            Self::Vec3(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_quat(&self) -> Option<Quat> {
        match self {
            Self::Quat(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }
}

macro_rules! impl_from_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(value: $ty) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

impl_from_value!(
    bool => Bool,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    i32 => I32,
    i64 => I64,
    f32 => F32,
    f64 => F64,
    Vec2 => Vec2,
    Vec3 => Vec3,
    Quat => Quat,
    String => Text,
);

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

fn text_len_prefix(len: usize) -> Option<u32> {
    u32::try_from(len).ok()
}
