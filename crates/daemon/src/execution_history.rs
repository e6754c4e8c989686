// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory record of recent script executions, backing the HTTP
//! surface's "fetch execution history" route. Bounded: the oldest record
//! is evicted once the cap is reached. History here is a read-only
//! convenience, not a durability guarantee — it does not survive a
//! restart.

use std::collections::VecDeque;

use parking_lot::Mutex;
use relay_sandbox::{ExecutionResult, ScriptRequest};
use serde::Serialize;

const DEFAULT_CAPACITY: usize = 200;

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRecord {
    pub id: String,
    pub request: ScriptRequest,
    pub response: ExecutionResult,
}

pub struct ExecutionHistory {
    capacity: usize,
    records: Mutex<VecDeque<ExecutionRecord>>,
}

impl ExecutionHistory {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { capacity, records: Mutex::new(VecDeque::with_capacity(capacity)) }
    }

    pub fn record(&self, request: ScriptRequest, response: ExecutionResult) -> ExecutionRecord {
        let record = ExecutionRecord { id: uuid::Uuid::new_v4().to_string(), request, response };
        let mut records = self.records.lock();
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record.clone());
        record
    }

    /// Most recent executions first.
    pub fn recent(&self) -> Vec<ExecutionRecord> {
        self.records.lock().iter().rev().cloned().collect()
    }
}

impl Default for ExecutionHistory {
    fn default() -> Self {
        Self::new()
    }
}
