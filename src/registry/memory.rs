//! In-process coordination service used by the registrar and supervisor tests.

use super::client::{CoordinationClient, CoordinationError};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

/// A call observed by [`MemoryClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Connect,
    Get(String),
    Create(String, Vec<u8>),
    Delete(String),
    Close,
}

#[derive(Debug, Default)]
struct Inner {
    nodes: HashMap<String, Vec<u8>>,
    ephemeral: HashSet<String>,
    ops: Vec<Op>,
    generation: u64,
    failures: VecDeque<CoordinationError>,
    fail_connect: bool,
}

/// Shared handle: clones observe and steer the same service
#[derive(Debug, Clone, Default)]
pub struct MemoryClient {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    pub fn node(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().nodes.get(path).cloned()
    }

    /// Seed a persistent node
    pub fn put(&self, path: &str, data: &[u8]) {
        self.lock().nodes.insert(path.to_string(), data.to_vec());
    }

    pub fn ops(&self) -> Vec<Op> {
        self.lock().ops.clone()
    }

    pub fn clear_ops(&self) {
        self.lock().ops.clear();
    }

    /// Number of recorded creates and deletes
    pub fn mutations(&self) -> usize {
        self.lock()
            .ops
            .iter()
            .filter(|op| matches!(op, Op::Create(..) | Op::Delete(_)))
            .count()
    }

    pub fn creates(&self) -> usize {
        self.lock()
            .ops
            .iter()
            .filter(|op| matches!(op, Op::Create(..)))
            .count()
    }

    pub fn deletes(&self) -> usize {
        self.lock()
            .ops
            .iter()
            .filter(|op| matches!(op, Op::Delete(_)))
            .count()
    }

    /// Make the next `times` node operations fail with `error`
    pub fn fail_next(&self, error: CoordinationError, times: usize) {
        let mut inner = self.lock();
        for _ in 0..times {
            inner.failures.push_back(error.clone());
        }
    }

    pub fn fail_connect(&self, fail: bool) {
        self.lock().fail_connect = fail;
    }

    fn record(&self, op: Op) -> Result<(), CoordinationError> {
        let mut inner = self.lock();
        inner.ops.push(op);
        match inner.failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CoordinationClient for MemoryClient {
    async fn connect(&mut self) -> Result<(), CoordinationError> {
        let mut inner = self.lock();
        inner.ops.push(Op::Connect);
        if inner.fail_connect {
            return Err(CoordinationError::Transient("connection refused".to_string()));
        }
        inner.generation += 1;
        Ok(())
    }

    async fn get_data(&self, path: &str) -> Result<Vec<u8>, CoordinationError> {
        self.record(Op::Get(path.to_string()))?;
        self.node(path).ok_or(CoordinationError::NoNode)
    }

    async fn create_ephemeral(&self, path: &str, data: &[u8]) -> Result<(), CoordinationError> {
        self.record(Op::Create(path.to_string(), data.to_vec()))?;
        let mut inner = self.lock();
        if inner.nodes.contains_key(path) {
            return Err(CoordinationError::NodeExists);
        }
        inner.nodes.insert(path.to_string(), data.to_vec());
        inner.ephemeral.insert(path.to_string());
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), CoordinationError> {
        self.record(Op::Delete(path.to_string()))?;
        let mut inner = self.lock();
        inner.ephemeral.remove(path);
        inner
            .nodes
            .remove(path)
            .map(|_| ())
            .ok_or(CoordinationError::NoNode)
    }

    async fn close(&mut self) {
        let mut inner = self.lock();
        inner.ops.push(Op::Close);
        let ephemeral: Vec<String> = inner.ephemeral.drain().collect();
        for path in ephemeral {
            inner.nodes.remove(&path);
        }
    }

    fn generation(&self) -> u64 {
        self.lock().generation
    }
}
