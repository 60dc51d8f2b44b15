//! Bit-exact little-endian encoding of field snapshots and deltas.

mod payload;
mod wire;

pub use payload::{DeltaReader, read_delta, read_full, write_delta, write_full};
pub use wire::{PayloadError, WireReader, WireWriter};
