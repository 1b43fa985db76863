//! In-memory scripted connection for tests.
//!
//! **Warning**: nothing is persisted and no query is interpreted. Only use
//! for testing: responses are dequeued in the order they were scripted,
//! and every executed query is recorded for assertion.

use super::{Connection, RawResult, Transaction};
use crate::error::{MapperError, Result};
use crate::query::Params;
use std::collections::VecDeque;

/// Scripted connection double that records executed queries.
#[derive(Debug, Default)]
pub struct RecordingConnection {
    scripted: VecDeque<std::result::Result<RawResult, String>>,
    executed: Vec<(String, Params)>,
    commits: usize,
    rollbacks: usize,
}

impl RecordingConnection {
    /// Create a connection with an empty script; unscripted queries
    /// return empty results.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a scripted result for the next executed query.
    pub fn enqueue(&mut self, result: RawResult) {
        self.scripted.push_back(Ok(result));
    }

    /// Enqueue a scripted failure for the next executed query.
    pub fn enqueue_error(&mut self, message: impl Into<String>) {
        self.scripted.push_back(Err(message.into()));
    }

    /// Every query executed so far, with its parameters, in order.
    pub fn executed(&self) -> &[(String, Params)] {
        &self.executed
    }

    /// Number of committed transactions.
    pub fn commits(&self) -> usize {
        self.commits
    }

    /// Number of rolled-back transactions.
    pub fn rollbacks(&self) -> usize {
        self.rollbacks
    }

    fn execute(&mut self, query: &str, params: &Params) -> Result<RawResult> {
        self.executed.push((query.to_string(), params.clone()));

        match self.scripted.pop_front() {
            Some(Ok(result)) => Ok(result),
            Some(Err(message)) => Err(MapperError::connection(message, None::<std::io::Error>)),
            None => Ok(RawResult::default()),
        }
    }
}

impl Connection for RecordingConnection {
    fn run(&mut self, query: &str, params: &Params) -> Result<RawResult> {
        self.execute(query, params)
    }

    fn begin(&mut self) -> Result<Box<dyn Transaction + '_>> {
        Ok(Box::new(RecordingTransaction { conn: self }))
    }
}

struct RecordingTransaction<'a> {
    conn: &'a mut RecordingConnection,
}

impl Transaction for RecordingTransaction<'_> {
    fn run(&mut self, query: &str, params: &Params) -> Result<RawResult> {
        self.conn.execute(query, params)
    }

    fn commit(self: Box<Self>) -> Result<()> {
        self.conn.commits += 1;
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<()> {
        self.conn.rollbacks += 1;
        Ok(())
    }
}
