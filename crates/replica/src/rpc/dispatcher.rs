use std::collections::{HashMap, VecDeque};

use log::{debug, warn};

use crate::lifecycle::InstanceId;
use crate::schema::SchemaId;
use crate::state::ParticipantId;

use super::call::RpcInvocation;
use super::receivers::ReceiverSet;

type Handler = Box<dyn FnMut(&RpcInvocation) + Send>;

/// A buffered call kept by the server for participants that join later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedCall {
    pub instance: InstanceId,
    pub receivers: ReceiverSet,
    pub origin: ParticipantId,
    pub body: Vec<u8>,
}

pub struct RpcDispatcher {
    handlers: HashMap<(SchemaId, u8), Handler>,
    deferred: VecDeque<(SchemaId, RpcInvocation)>,
    buffered: VecDeque<BufferedCall>,
    buffered_limit: usize,
}

impl RpcDispatcher {
    pub fn new(buffered_limit: usize) -> Self {
        Self {
            handlers: HashMap::new(),
            deferred: VecDeque::new(),
            buffered: VecDeque::new(),
            buffered_limit,
        }
    }

    /// Replaces any handler already bound to the method.
    pub fn bind(
        &mut self,
        schema: SchemaId,
        method: u8,
        handler: impl FnMut(&RpcInvocation) + Send + 'static,
    ) {
        self.handlers.insert((schema, method), Box::new(handler));
    }

    pub fn unbind(&mut self, schema: SchemaId, method: u8) -> bool {
        self.handlers.remove(&(schema, method)).is_some()
    }

    /// Runs the bound handler. Returns false when nothing is bound.
    pub fn invoke(&mut self, schema: SchemaId, invocation: &RpcInvocation) -> bool {
        match self.handlers.get_mut(&(schema, invocation.method)) {
            Some(handler) => {
                handler(invocation);
                true
            }
            None => {
                debug!(
                    "No handler bound for rpc `{}` on {} ({})",
                    invocation.name, invocation.instance, schema
                );
                false
            }
        }
    }

    /// Queues a call made by this participant for the next drain.
    pub fn defer(&mut self, schema: SchemaId, invocation: RpcInvocation) {
        self.deferred.push_back((schema, invocation));
    }

    pub fn take_deferred(&mut self) -> VecDeque<(SchemaId, RpcInvocation)> {
        std::mem::take(&mut self.deferred)
    }

    pub fn buffer(&mut self, call: BufferedCall) {
        if self.buffered.len() >= self.buffered_limit {
            if let Some(dropped) = self.buffered.pop_front() {
                warn!(
                    "Buffered rpc limit {} reached, dropping oldest call on {}",
                    self.buffered_limit, dropped.instance
                );
            }
        }
        self.buffered.push_back(call);
    }

    pub fn buffered(&self) -> impl Iterator<Item = &BufferedCall> {
        self.buffered.iter()
    }

    pub fn buffered_len(&self) -> usize {
        self.buffered.len()
    }

    pub fn forget_instance(&mut self, instance: InstanceId) {
        self.buffered.retain(|call| call.instance != instance);
        self.deferred.retain(|(_, call)| call.instance != instance);
    }
}

impl std::fmt::Debug for RpcDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcDispatcher")
            .field("handlers", &self.handlers.len())
            .field("deferred", &self.deferred.len())
            .field("buffered", &self.buffered.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::schema::FieldValue;

    fn invocation(instance: u64, method: u8) -> RpcInvocation {
        RpcInvocation {
            instance: InstanceId(instance),
            method,
            name: "game_time".into(),
            args: vec![FieldValue::I32(30)],
            sender: ParticipantId(1),
            tick: 0,
        }
    }

    #[test]
    fn invokes_bound_handler_only() {
        let calls = Arc::new(Mutex::new(0));
        let mut dispatcher = RpcDispatcher::new(8);
        let sink = Arc::clone(&calls);
        dispatcher.bind(SchemaId(1), 0, move |_| *sink.lock().unwrap() += 1);

        assert!(dispatcher.invoke(SchemaId(1), &invocation(1, 0)));
        assert!(!dispatcher.invoke(SchemaId(1), &invocation(1, 1)));
        assert!(!dispatcher.invoke(SchemaId(2), &invocation(1, 0)));
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[test]
    fn buffer_evicts_oldest_past_limit() {
        let mut dispatcher = RpcDispatcher::new(2);
        for instance in 1..=3 {
            dispatcher.buffer(BufferedCall {
                instance: InstanceId(instance),
                receivers: ReceiverSet::AllBuffered,
                origin: ParticipantId(1),
                body: Vec::new(),
            });
        }
        let kept: Vec<_> = dispatcher.buffered().map(|c| c.instance.0).collect();
        assert_eq!(kept, vec![2, 3]);
    }

    #[test]
    fn forgetting_instance_drops_its_calls() {
        let mut dispatcher = RpcDispatcher::new(8);
        dispatcher.buffer(BufferedCall {
            instance: InstanceId(1),
            receivers: ReceiverSet::OthersBuffered,
            origin: ParticipantId(1),
            body: Vec::new(),
        });
        dispatcher.defer(SchemaId(1), invocation(1, 0));
        dispatcher.defer(SchemaId(1), invocation(2, 0));
        dispatcher.forget_instance(InstanceId(1));
        assert_eq!(dispatcher.buffered_len(), 0);
        assert_eq!(dispatcher.take_deferred().len(), 1);
    }
}
