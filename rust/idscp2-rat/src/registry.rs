use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;

use crate::driver::{DriverContext, DriverFn, DriverHandle};
use crate::error::RatError;

/// A registration table of named driver implementations for one side of the
/// attestation exchange (`Prover` or `Verifier`), shared across every
/// connection in the process. Matches the "concurrency-safe mapping with
/// coarse-grained locking" shape used elsewhere for process-wide tables.
pub struct DriverRegistry<Kind> {
    factories: Arc<RwLock<HashMap<String, Arc<DriverFn>>>>,
    next_generation: Arc<AtomicU64>,
    _kind: PhantomData<Kind>,
}

impl<Kind> Clone for DriverRegistry<Kind> {
    fn clone(&self) -> Self {
        Self {
            factories: self.factories.clone(),
            next_generation: self.next_generation.clone(),
            _kind: PhantomData,
        }
    }
}

impl<Kind> Default for DriverRegistry<Kind> {
    fn default() -> Self {
        Self {
            factories: Arc::new(RwLock::new(HashMap::new())),
            next_generation: Arc::new(AtomicU64::new(1)),
            _kind: PhantomData,
        }
    }
}

impl<Kind> DriverRegistry<Kind> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: impl Into<String>, factory: Arc<DriverFn>) -> Result<(), RatError> {
        let id = id.into();
        let mut factories = self.factories.write().expect("driver registry lock poisoned");
        if factories.contains_key(&id) {
            return Err(RatError::AlreadyRegistered(id));
        }
        factories.insert(id, factory);
        Ok(())
    }

    pub fn unregister(&self, id: &str) -> Result<(), RatError> {
        let mut factories = self.factories.write().expect("driver registry lock poisoned");
        factories
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| RatError::UnknownDriver(id.to_string()))
    }

    pub fn ids(&self) -> Vec<String> {
        self.factories
            .read()
            .expect("driver registry lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.factories
            .read()
            .expect("driver registry lock poisoned")
            .contains_key(id)
    }

    /// Spawns the driver registered under `id`, returning a handle stamped
    /// with a fresh, process-wide-unique generation.
    pub fn start(&self, id: &str, ctx: DriverContext) -> Result<DriverHandle, RatError> {
        let factory = {
            let factories = self.factories.read().expect("driver registry lock poisoned");
            factories
                .get(id)
                .cloned()
                .ok_or_else(|| RatError::UnknownDriver(id.to_string()))?
        };
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let join = factory(ctx, inbound_rx);
        Ok(DriverHandle {
            generation,
            inbound: inbound_tx,
            join,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{DriverEvent, Prover};
    use crate::dummy::dummy_driver_factory;

    #[tokio::test]
    async fn register_and_start_roundtrip() {
        let registry: DriverRegistry<Prover> = DriverRegistry::new();
        registry
            .register("dummy", Arc::new(dummy_driver_factory))
            .unwrap();
        assert!(registry.contains("dummy"));

        let (tx, mut rx) = mpsc::unbounded_channel::<DriverEvent>();
        let handle = registry
            .start(
                "dummy",
                DriverContext {
                    local_cert_hash: vec![1],
                    peer_cert_hash: vec![2],
                    outbound: tx,
                },
            )
            .unwrap();
        assert_eq!(handle.generation(), 1);

        match rx.recv().await.unwrap() {
            DriverEvent::Message(_) => {}
            other => panic!("expected Message, got {other:?}"),
        }
        handle.deliver(b"peer-ack".to_vec()).unwrap();
        match rx.recv().await.unwrap() {
            DriverEvent::Ok => {}
            other => panic!("expected Ok, got {other:?}"),
        }
        handle.stop().await;
    }

    #[test]
    fn unknown_driver_is_rejected() {
        let registry: DriverRegistry<Prover> = DriverRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = registry.start(
            "missing",
            DriverContext {
                local_cert_hash: vec![],
                peer_cert_hash: vec![],
                outbound: tx,
            },
        );
        assert!(matches!(err, Err(RatError::UnknownDriver(_))));
    }
}
