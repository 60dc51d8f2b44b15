use crate::schema::{FieldValue, ObjectSchema};

pub const DEFAULT_EPSILON: f32 = 0.0015;

#[derive(Debug, Clone, PartialEq)]
pub struct InterpolationState {
    pub current: FieldValue,
    pub target: FieldValue,
    pub last_timestep: u32,
    pub enabled: bool,
    pub lerp: f32,
}

impl InterpolationState {
    pub fn new(initial: FieldValue, enabled: bool, lerp: f32) -> Self {
        Self {
            current: initial.clone(),
            target: initial,
            last_timestep: 0,
            enabled,
            lerp,
        }
    }

    pub fn smoothing(&self) -> bool {
        self.enabled && self.lerp > 0.0
    }

    pub fn is_settled(&self) -> bool {
        self.current == self.target
    }

    /// Advances `current` one fixed blend toward `target`. Returns whether it moved.
    pub fn step(&mut self, epsilon: f32) -> bool {
        if !self.smoothing() || self.is_settled() {
            return false;
        }
        if self.current.distance(&self.target) < epsilon {
            self.current = self.target.clone();
        } else {
            self.current = self.current.blend(&self.target, self.lerp);
        }
        true
    }
}

/// Interpolation slots for the fields of one object. Fields declared without
/// `INTERPOLATED` have no slot and take received values directly.
#[derive(Debug, Clone, Default)]
pub struct InterpolationBuffer {
    slots: Vec<Option<InterpolationState>>,
}

impl InterpolationBuffer {
    pub fn new(schema: &ObjectSchema, initial: &[FieldValue]) -> Self {
        let slots = schema
            .fields()
            .iter()
            .zip(initial)
            .map(|(field, value)| {
                field
                    .flags
                    .contains(crate::schema::FieldFlags::INTERPOLATED)
                    .then(|| InterpolationState::new(value.clone(), field.lerp > 0.0, field.lerp))
            })
            .collect();
        Self { slots }
    }

    pub fn state(&self, index: usize) -> Option<&InterpolationState> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn is_interpolated(&self, index: usize) -> bool {
        self.state(index).is_some_and(InterpolationState::smoothing)
    }

    /// Records an authoritative value. Returns the value the field should show
    /// right now when smoothing is off for it.
    pub fn receive(&mut self, index: usize, value: FieldValue, tick: u32) -> Option<FieldValue> {
        let Some(Some(state)) = self.slots.get_mut(index) else {
            return Some(value);
        };
        state.last_timestep = tick;
        if state.smoothing() {
            state.target = value;
            None
        } else {
            state.current = value.clone();
            state.target = value.clone();
            Some(value)
        }
    }

    /// Local authoritative write: no blending toward anything.
    pub fn reset(&mut self, index: usize, value: &FieldValue) {
        if let Some(Some(state)) = self.slots.get_mut(index) {
            state.current = value.clone();
            state.target = value.clone();
        }
    }

    /// Steps every slot once and returns the fields whose `current` moved.
    pub fn step(&mut self, epsilon: f32) -> Vec<(usize, FieldValue)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| {
                let state = slot.as_mut()?;
                state.step(epsilon).then(|| (index, state.current.clone()))
            })
            .collect()
    }

    /// Sets `current = target` everywhere and returns the fields that jumped.
    pub fn snap_all(&mut self) -> Vec<(usize, FieldValue)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| {
                let state = slot.as_mut()?;
                if state.is_settled() {
                    return None;
                }
                state.current = state.target.clone();
                Some((index, state.current.clone()))
            })
            .collect()
    }

    /// Returns false for fields without a slot.
    pub fn set_enabled(&mut self, index: usize, enabled: bool) -> bool {
        match self.slots.get_mut(index) {
            Some(Some(state)) => {
                state.enabled = enabled;
                true
            }
            _ => false,
        }
    }

    pub fn set_lerp(&mut self, index: usize, lerp: f32) -> bool {
        match self.slots.get_mut(index) {
            Some(Some(state)) => {
                state.lerp = lerp.clamp(0.0, 1.0);
                true
            }
            _ => false,
        }
    }
}
