use crate::codec::{PayloadError, WireReader, WireWriter};
use crate::error::ReplicationError;
use crate::lifecycle::InstanceId;
use crate::schema::{FieldValue, RpcMethod};
use crate::state::ParticipantId;

/// Body of an RPC message: instance id (u64 LE), method id (u8), then the
/// arguments in declared order.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcCall {
    pub instance: InstanceId,
    pub method: u8,
    pub args: Vec<FieldValue>,
}

impl RpcCall {
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = WireWriter::with_capacity(9 + self.args.len() * 4);
        writer.write_u64(self.instance.0);
        writer.write_u8(self.method);
        for arg in &self.args {
            arg.encode(&mut writer);
        }
        writer.into_bytes()
    }

    /// Reads the target without touching the arguments.
    pub fn peek(bytes: &[u8]) -> Result<(InstanceId, u8), PayloadError> {
        let mut reader = WireReader::new(bytes);
        let instance = InstanceId(reader.read_u64()?);
        let method = reader.read_u8()?;
        Ok((instance, method))
    }

    pub fn decode(bytes: &[u8], declaration: &RpcMethod) -> Result<Self, ReplicationError> {
        let invalid = |err: PayloadError| ReplicationError::InvalidRpcArguments {
            method: declaration.name.clone(),
            reason: err.to_string(),
        };
        let mut reader = WireReader::new(bytes);
        let instance = InstanceId(reader.read_u64().map_err(invalid)?);
        let method = reader.read_u8().map_err(invalid)?;
        let args = declaration
            .params
            .iter()
            .map(|kind| FieldValue::decode(*kind, &mut reader))
            .collect::<Result<Vec<_>, _>>()
            .map_err(invalid)?;
        reader.finish().map_err(invalid)?;
        Ok(Self {
            instance,
            method,
            args,
        })
    }
}

pub fn validate_args(declaration: &RpcMethod, args: &[FieldValue]) -> Result<(), ReplicationError> {
    if args.len() != declaration.params.len() {
        return Err(ReplicationError::InvalidRpcArguments {
            method: declaration.name.clone(),
            reason: format!(
                "expected {} arguments, got {}",
                declaration.params.len(),
                args.len()
            ),
        });
    }
    for (position, (arg, kind)) in args.iter().zip(&declaration.params).enumerate() {
        if arg.kind() != *kind {
            return Err(ReplicationError::InvalidRpcArguments {
                method: declaration.name.clone(),
                reason: format!("argument {position} is {}, expected {kind}", arg.kind()),
            });
        }
        if !arg.fits_wire() {
            return Err(ReplicationError::InvalidRpcArguments {
                method: declaration.name.clone(),
                reason: format!("argument {position} is too long to encode"),
            });
        }
    }
    Ok(())
}

/// A call as seen by a bound handler.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcInvocation {
    pub instance: InstanceId,
    pub method: u8,
    pub name: String,
    pub args: Vec<FieldValue>,
    pub sender: ParticipantId,
    pub tick: u32,
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::schema::FieldKind;

    fn fire() -> RpcMethod {
        RpcMethod::new("create_projectile", &[FieldKind::Vec3, FieldKind::Vec3])
    }

    #[test]
    fn body_layout() {
        let call = RpcCall {
            instance: InstanceId(0x0000_0002_0000_0001),
            method: 3,
            args: vec![FieldValue::U8(9)],
        };
        let bytes = call.encode();
        assert_eq!(bytes, vec![1, 0, 0, 0, 2, 0, 0, 0, 3, 9]);
        assert_eq!(
            RpcCall::peek(&bytes).unwrap(),
            (InstanceId(0x0000_0002_0000_0001), 3)
        );
    }

    #[test]
    fn decodes_declared_arguments() {
        let call = RpcCall {
            instance: InstanceId(7),
            method: 0,
            args: vec![Vec3::ONE.into(), Vec3::Z.into()],
        };
        assert_eq!(RpcCall::decode(&call.encode(), &fire()).unwrap(), call);
    }

    #[test]
    fn leftover_bytes_are_invalid() {
        let call = RpcCall {
            instance: InstanceId(7),
            method: 0,
            args: vec![Vec3::ONE.into(), Vec3::Z.into(), FieldValue::U8(1)],
        };
        assert!(matches!(
            RpcCall::decode(&call.encode(), &fire()),
            Err(ReplicationError::InvalidRpcArguments { .. })
        ));
    }

    #[test]
    fn missing_bytes_are_invalid() {
        let call = RpcCall {
            instance: InstanceId(7),
            method: 0,
            args: vec![Vec3::ONE.into()],
        };
        assert!(matches!(
            RpcCall::decode(&call.encode(), &fire()),
            Err(ReplicationError::InvalidRpcArguments { .. })
        ));
    }

    #[test]
    fn validation_checks_count_and_kind() {
        let method = fire();
        assert!(validate_args(&method, &[Vec3::ONE.into(), Vec3::ONE.into()]).is_ok());
        assert!(validate_args(&method, &[Vec3::ONE.into()]).is_err());
        assert!(validate_args(&method, &[Vec3::ONE.into(), FieldValue::F32(1.0)]).is_err());
    }
}
