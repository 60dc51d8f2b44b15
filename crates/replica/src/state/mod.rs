mod authority;
mod dirty;
mod interpolation;
mod object;
mod observer;

pub use authority::{Authority, ParticipantId, Role};
pub use dirty::DirtyMask;
pub use interpolation::{DEFAULT_EPSILON, InterpolationBuffer, InterpolationState};
pub use object::{FieldChange, ReplicatedObject};
pub use observer::{Observers, SubscriptionId};
