use crate::{RequestData, ResponseData};
use std::sync::Mutex;

/// The (expected request, canned response) pair a contract test registers
/// before driving traffic at the mock provider. Either half may be unset,
/// which the dispatcher resolves to a synthetic 500.
#[derive(Debug, Clone, Default)]
pub struct Expectation {
    pub request: Option<RequestData>,
    pub response: Option<ResponseData>,
}

/// Single-slot holder of the current expectation. Contract verification runs
/// one transaction at a time, so there is exactly one live expectation; `set`
/// swaps the whole pair under one lock and `get` snapshots it under the same
/// lock, so a concurrent dispatch never observes a half-written pair.
#[derive(Debug, Default)]
pub struct ExpectationStore {
    current: Mutex<Expectation>,
}

impl ExpectationStore {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(Expectation::default()),
        }
    }

    pub fn set(&self, request: Option<RequestData>, response: Option<ResponseData>) {
        *self.current.lock().unwrap() = Expectation { request, response };
    }

    pub fn get(&self) -> Expectation {
        self.current.lock().unwrap().clone()
    }

    /// Clears both halves. Safe to call before any `set`.
    pub fn reset(&self) {
        *self.current.lock().unwrap() = Expectation::default();
    }
}
