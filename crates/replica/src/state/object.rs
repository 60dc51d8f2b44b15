use std::sync::Arc;

use crate::error::ReplicationError;
use crate::lifecycle::InstanceId;
use crate::schema::{FieldValue, ObjectSchema};

use super::authority::{Authority, ParticipantId};
use super::dirty::DirtyMask;
use super::interpolation::InterpolationBuffer;
use super::observer::{Observers, SubscriptionId};

/// Reported for each field applied from a received update.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub instance: InstanceId,
    pub index: usize,
    pub name: String,
    pub value: FieldValue,
    pub tick: u32,
}

/// One participant's copy of a replicated instance.
#[derive(Debug)]
pub struct ReplicatedObject {
    id: InstanceId,
    schema: Arc<ObjectSchema>,
    creator: ParticipantId,
    local: ParticipantId,
    values: Vec<FieldValue>,
    dirty: DirtyMask,
    interpolation: InterpolationBuffer,
    observers: Observers<FieldChange>,
    announced: bool,
}

impl ReplicatedObject {
    pub fn new(
        id: InstanceId,
        schema: Arc<ObjectSchema>,
        creator: ParticipantId,
        local: ParticipantId,
        values: Vec<FieldValue>,
    ) -> Self {
        let dirty = DirtyMask::new(schema.field_count());
        let interpolation = InterpolationBuffer::new(&schema, &values);
        Self {
            id,
            schema,
            creator,
            local,
            values,
            dirty,
            interpolation,
            observers: Observers::new(),
            announced: false,
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn schema(&self) -> &Arc<ObjectSchema> {
        &self.schema
    }

    pub fn creator(&self) -> ParticipantId {
        self.creator
    }

    pub fn authority(&self) -> Authority {
        let owner = self
            .schema
            .owner_field()
            .and_then(|i| self.values[i].as_u32());
        Authority::resolve(owner, self.creator, self.local)
    }

    pub fn owner(&self) -> ParticipantId {
        self.authority().owner
    }

    pub fn is_local_authority(&self) -> bool {
        self.authority().is_local()
    }

    /// True once every identity and owner field holds a non-default value.
    pub fn is_initialized(&self) -> bool {
        self.schema
            .fields()
            .iter()
            .zip(&self.values)
            .filter(|(field, _)| field.is_identity())
            .all(|(_, value)| !value.is_default())
    }

    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }

    pub fn value(&self, index: usize) -> Option<&FieldValue> {
        self.values.get(index)
    }

    pub fn get(&self, name: &str) -> Result<&FieldValue, ReplicationError> {
        let index = self.index_of(name)?;
        Ok(&self.values[index])
    }

    /// Authoritative write. Returns whether the value changed; equal values
    /// leave the dirty mask untouched.
    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) -> Result<bool, ReplicationError> {
        let index = self.index_of(name)?;
        self.set_index(index, value.into())
    }

    pub fn set_index(&mut self, index: usize, value: FieldValue) -> Result<bool, ReplicationError> {
        let field = self.field_at(index)?;
        if value.kind() != field.kind {
            return Err(ReplicationError::KindMismatch {
                field: field.name.clone(),
                expected: field.kind,
                found: value.kind(),
            });
        }
        if !value.fits_wire() {
            return Err(ReplicationError::TextTooLong {
                field: field.name.clone(),
                len: value.as_text().map_or(0, str::len),
            });
        }
        self.ensure_authority()?;
        if self.values[index] == value {
            return Ok(false);
        }
        self.interpolation.reset(index, &value);
        self.values[index] = value;
        self.dirty.mark(index);
        Ok(true)
    }

    /// Forces a field into the next delta without changing it.
    pub fn set_dirty(&mut self, name: &str) -> Result<(), ReplicationError> {
        let index = self.index_of(name)?;
        self.ensure_authority()?;
        self.dirty.mark(index);
        Ok(())
    }

    /// What a late joiner should see: targets for interpolated fields,
    /// current values elsewhere.
    pub fn authoritative_values(&self) -> Vec<FieldValue> {
        self.values
            .iter()
            .enumerate()
            .map(|(index, value)| match self.interpolation.state(index) {
                Some(state) => state.target.clone(),
                None => value.clone(),
            })
            .collect()
    }

    /// Queues every field for the next delta. Only the authority may resend.
    pub fn mark_all_dirty(&mut self) -> Result<(), ReplicationError> {
        self.ensure_authority()?;
        self.dirty.mark_all();
        Ok(())
    }

    pub fn is_dirty(&self, name: &str) -> Result<bool, ReplicationError> {
        let index = self.index_of(name)?;
        Ok(self.dirty.is_dirty(index))
    }

    pub fn dirty(&self) -> &DirtyMask {
        &self.dirty
    }

    pub(crate) fn take_dirty(&mut self) -> Option<DirtyMask> {
        if self.dirty.is_empty() {
            None
        } else {
            Some(self.dirty.snapshot_and_clear())
        }
    }

    pub(crate) fn clear_dirty(&mut self) {
        self.dirty.clear();
    }

    pub fn interpolation(&self) -> &InterpolationBuffer {
        &self.interpolation
    }

    /// Affects subsequent receives and steps only; a blend in flight is left
    /// where it is.
    pub fn set_interpolation(&mut self, name: &str, enabled: bool) -> Result<bool, ReplicationError> {
        let index = self.index_of(name)?;
        Ok(self.interpolation.set_enabled(index, enabled))
    }

    pub fn set_lerp(&mut self, name: &str, lerp: f32) -> Result<bool, ReplicationError> {
        let index = self.index_of(name)?;
        Ok(self.interpolation.set_lerp(index, lerp))
    }

    pub fn snap_interpolations(&mut self) {
        for (index, value) in self.interpolation.snap_all() {
            self.values[index] = value;
        }
    }

    pub(crate) fn step_interpolation(&mut self, epsilon: f32) -> usize {
        let moved = self.interpolation.step(epsilon);
        let count = moved.len();
        for (index, value) in moved {
            self.values[index] = value;
        }
        count
    }

    /// Applies one received field and notifies observers. Returns whether the
    /// owner changed.
    pub(crate) fn apply_remote(&mut self, index: usize, value: FieldValue, tick: u32) -> bool {
        let Some(field) = self.schema.field(index) else {
            return false;
        };
        let name = field.name.clone();
        let owner_changed = self.schema.owner_field() == Some(index) && self.values[index] != value;

        if let Some(visible) = self.interpolation.receive(index, value.clone(), tick) {
            self.values[index] = visible;
        }

        self.observers.notify(&FieldChange {
            instance: self.id,
            index,
            name,
            value,
            tick,
        });
        owner_changed
    }

    pub fn subscribe(
        &mut self,
        callback: impl FnMut(&FieldChange) + Send + 'static,
    ) -> SubscriptionId {
        self.observers.subscribe(callback)
    }

    pub fn subscribe_field(
        &mut self,
        name: &str,
        mut callback: impl FnMut(&FieldChange) + Send + 'static,
    ) -> Result<SubscriptionId, ReplicationError> {
        let index = self.index_of(name)?;
        Ok(self.observers.subscribe(move |change: &FieldChange| {
            if change.index == index {
                callback(change);
            }
        }))
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    pub fn is_announced(&self) -> bool {
        self.announced
    }

    pub(crate) fn mark_announced(&mut self) {
        self.announced = true;
    }

    fn ensure_authority(&self) -> Result<(), ReplicationError> {
        let authority = self.authority();
        if authority.is_local() {
            Ok(())
        } else {
            Err(ReplicationError::NotAuthority {
                instance: self.id,
                owner: authority.owner,
                local: self.local,
            })
        }
    }

    fn index_of(&self, name: &str) -> Result<usize, ReplicationError> {
        self.schema
            .field_index(name)
            .ok_or_else(|| ReplicationError::UnknownField {
                schema: self.schema.name().to_owned(),
                field: name.to_owned(),
            })
    }

    fn field_at(&self, index: usize) -> Result<&crate::schema::FieldDescriptor, ReplicationError> {
        self.schema
            .field(index)
            .ok_or_else(|| ReplicationError::UnknownField {
                schema: self.schema.name().to_owned(),
                field: format!("#{index}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use glam::{Quat, Vec3};

    use super::*;
    use crate::schema::{FieldDescriptor, FieldKind, SchemaId};

    fn cube_schema() -> Arc<ObjectSchema> {
        Arc::new(
            ObjectSchema::builder(SchemaId(4), "Cube")
                .field(FieldDescriptor::new("position", FieldKind::Vec3).interpolated(0.15))
                .field(FieldDescriptor::new("rotation", FieldKind::Quat).interpolated(0.15))
                .field(FieldDescriptor::new("ownerId", FieldKind::U32).owner())
                .field(FieldDescriptor::new("colorId", FieldKind::I32).identity())
                .build()
                .unwrap(),
        )
    }

    fn cube(owner: u32, local: u32) -> ReplicatedObject {
        let schema = cube_schema();
        let mut values = schema.default_values();
        values[2] = FieldValue::U32(owner);
        ReplicatedObject::new(
            InstanceId::new(ParticipantId(1), 1),
            schema,
            ParticipantId(1),
            ParticipantId(local),
            values,
        )
    }

    #[test]
    fn equal_write_is_not_dirty() {
        let mut object = cube(1, 1);
        assert!(object.set("colorId", 2i32).unwrap());
        object.clear_dirty();
        assert!(!object.set("colorId", 2i32).unwrap());
        assert!(!object.is_dirty("colorId").unwrap());
    }

    #[test]
    fn explicit_set_dirty_forces_bit() {
        let mut object = cube(1, 1);
        object.set_dirty("rotation").unwrap();
        assert_eq!(object.dirty().bytes(), &[0b0000_0010]);
    }

    #[test]
    fn non_owner_cannot_write() {
        let mut object = cube(2, 1);
        assert!(matches!(
            object.set("position", Vec3::ONE),
            Err(ReplicationError::NotAuthority { .. })
        ));
        assert!(object.dirty().is_empty());
    }

    #[test]
    fn non_owner_cannot_mark_all_dirty() {
        let mut object = cube(2, 1);
        assert!(matches!(
            object.mark_all_dirty(),
            Err(ReplicationError::NotAuthority { .. })
        ));
        assert!(object.dirty().is_empty());

        let mut owned = cube(1, 1);
        owned.mark_all_dirty().unwrap();
        assert_eq!(owned.dirty().bytes(), &[0b0000_1111]);
    }

    #[test]
    fn wrong_kind_is_rejected() {
        let mut object = cube(1, 1);
        assert!(matches!(
            object.set("colorId", 2u32),
            Err(ReplicationError::KindMismatch { .. })
        ));
        assert!(matches!(
            object.get("velocity"),
            Err(ReplicationError::UnknownField { .. })
        ));
    }

    #[test]
    fn initialized_after_identity_fields_set() {
        let mut object = cube(1, 1);
        assert!(!object.is_initialized());
        object.set("colorId", 3i32).unwrap();
        assert!(object.is_initialized());
    }

    #[test]
    fn remote_fields_notify_with_target() {
        let mut object = cube(2, 1);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        object.subscribe(move |change| sink.lock().unwrap().push(change.name.clone()));

        let target = Vec3::new(5.0, 0.0, 0.0);
        object.apply_remote(0, target.into(), 3);
        object.apply_remote(1, Quat::from_rotation_z(0.4).into(), 3);

        assert_eq!(*seen.lock().unwrap(), vec!["position", "rotation"]);
        assert_eq!(object.get("position").unwrap(), &FieldValue::Vec3(Vec3::ZERO));
        assert_eq!(
            object.interpolation().state(0).unwrap().target,
            FieldValue::Vec3(target)
        );
    }

    #[test]
    fn field_subscription_filters() {
        let mut object = cube(2, 1);
        let seen = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&seen);
        object
            .subscribe_field("colorId", move |_| *sink.lock().unwrap() += 1)
            .unwrap();

        object.apply_remote(0, Vec3::ONE.into(), 1);
        object.apply_remote(3, FieldValue::I32(1), 1);
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[test]
    fn owner_change_reported_once() {
        let mut object = cube(2, 1);
        assert!(object.apply_remote(2, FieldValue::U32(1), 1));
        assert!(!object.apply_remote(2, FieldValue::U32(1), 2));
        assert!(object.is_local_authority());
    }

    #[test]
    fn local_write_settles_interpolation() {
        let mut object = cube(1, 1);
        object.set("position", Vec3::X).unwrap();
        assert!(object.interpolation().state(0).unwrap().is_settled());
        assert_eq!(object.step_interpolation(0.0015), 0);
    }
}
