//! Reliable remote invocation of schema-declared methods.

mod call;
mod dispatcher;
mod receivers;

pub use call::{RpcCall, RpcInvocation, validate_args};
pub use dispatcher::{BufferedCall, RpcDispatcher};
pub use receivers::{ReceiverSet, UnknownReceiverSet};
