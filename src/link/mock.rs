//! A scripted instrument link for testing.
//!
//! [`ScriptedLink`] answers queries from a table of canned responses and
//! records every exchange with enter/leave timestamps, so tests can assert
//! that no two transactions ever overlapped on the link. Construction
//! returns a [`ScriptHandle`] that shares the same state, because the link
//! itself is consumed by the access gate.
//!
//! Timestamps use `tokio::time::Instant`, so tests running with a paused
//! clock get deterministic timing.

use crate::error::{PsuError, PsuResult};
use crate::link::InstrumentLink;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// One recorded wire exchange.
#[derive(Debug, Clone)]
pub struct Exchange {
    /// The command string as sent.
    pub command: String,
    /// Offset from link creation when the exchange started.
    pub entered: Duration,
    /// Offset from link creation when the exchange finished.
    pub left: Duration,
}

#[derive(Default)]
struct Script {
    /// One-shot responses, consumed front to back per command.
    queued: HashMap<String, VecDeque<String>>,
    /// Fallback responses returned any number of times.
    sticky: HashMap<String, String>,
}

impl Script {
    fn respond(&mut self, command: &str) -> Option<String> {
        if let Some(queue) = self.queued.get_mut(command) {
            if let Some(response) = queue.pop_front() {
                return Some(response);
            }
        }
        self.sticky.get(command).cloned()
    }
}

struct Inner {
    script: Mutex<Script>,
    log: Mutex<Vec<Exchange>>,
    latency: Mutex<Duration>,
    fail_next: AtomicBool,
    fail_on: Mutex<HashSet<String>>,
    started: tokio::time::Instant,
}

/// Scripted stand-in for a physical instrument link.
pub struct ScriptedLink {
    inner: Arc<Inner>,
}

/// Test-side handle to a [`ScriptedLink`]'s script and exchange log.
#[derive(Clone)]
pub struct ScriptHandle {
    inner: Arc<Inner>,
}

/// Create a scripted link and its controlling handle.
pub fn scripted_link() -> (ScriptedLink, ScriptHandle) {
    let inner = Arc::new(Inner {
        script: Mutex::new(Script::default()),
        log: Mutex::new(Vec::new()),
        latency: Mutex::new(Duration::ZERO),
        fail_next: AtomicBool::new(false),
        fail_on: Mutex::new(HashSet::new()),
        started: tokio::time::Instant::now(),
    });
    (
        ScriptedLink {
            inner: inner.clone(),
        },
        ScriptHandle { inner },
    )
}

impl ScriptedLink {
    async fn exchange(&self, command: &str, expects_response: bool) -> PsuResult<Option<String>> {
        let entered = self.inner.started.elapsed();
        let latency = *self.inner.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let injected_fault = self.inner.fail_next.swap(false, Ordering::SeqCst)
            || self.inner.fail_on.lock().remove(command);

        let result = if injected_fault {
            Err(PsuError::Communication(format!(
                "scripted fault on '{}'",
                command
            )))
        } else if expects_response {
            match self.inner.script.lock().respond(command) {
                Some(response) => Ok(Some(response)),
                None => Err(PsuError::Communication(format!(
                    "no scripted response for '{}'",
                    command
                ))),
            }
        } else {
            Ok(None)
        };

        self.inner.log.lock().push(Exchange {
            command: command.to_string(),
            entered,
            left: self.inner.started.elapsed(),
        });
        result
    }
}

#[async_trait]
impl InstrumentLink for ScriptedLink {
    async fn send(&mut self, command: &str) -> PsuResult<()> {
        self.exchange(command, false).await.map(|_| ())
    }

    async fn query(&mut self, command: &str) -> PsuResult<String> {
        let response = self.exchange(command, true).await?;
        // exchange() always yields a response when one was requested
        response.ok_or_else(|| PsuError::Communication("scripted link returned nothing".into()))
    }
}

impl ScriptHandle {
    /// Queue a one-shot response for `command`; consumed before any sticky
    /// response for the same command.
    pub fn enqueue_response(&self, command: &str, response: &str) {
        self.inner
            .script
            .lock()
            .queued
            .entry(command.to_string())
            .or_default()
            .push_back(response.to_string());
    }

    /// Set a response returned every time `command` is queried.
    pub fn set_response(&self, command: &str, response: &str) {
        self.inner
            .script
            .lock()
            .sticky
            .insert(command.to_string(), response.to_string());
    }

    /// Simulated wire latency per exchange.
    pub fn set_latency(&self, latency: Duration) {
        *self.inner.latency.lock() = latency;
    }

    /// Fail the next exchange, whatever it is.
    pub fn fail_next(&self) {
        self.inner.fail_next.store(true, Ordering::SeqCst);
    }

    /// Fail the next exchange carrying exactly this command.
    pub fn fail_on(&self, command: &str) {
        self.inner.fail_on.lock().insert(command.to_string());
    }

    /// Copy of the exchange log.
    pub fn exchanges(&self) -> Vec<Exchange> {
        self.inner.log.lock().clone()
    }

    /// Commands seen so far, in completion order.
    pub fn commands(&self) -> Vec<String> {
        self.inner
            .log
            .lock()
            .iter()
            .map(|e| e.command.clone())
            .collect()
    }

    /// Clear the exchange log.
    pub fn clear_log(&self) {
        self.inner.log.lock().clear();
    }
}
