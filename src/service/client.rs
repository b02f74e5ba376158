//! Remote tables over TCP.
//!
//! [`ReplayClient`] implements [`ExperienceTable`] and [`VariableTable`], so
//! agents and the learner run unchanged in a separate process. Transport
//! failures drop the connection, wait `backoff` and reconnect; after
//! `max_attempts` failed attempts the request fails with
//! [`Error::ConnectionLost`], which callers treat as fatal.
//!
//! Commits are delivered at most once: once a `Commit` frame is fully
//! written, a lost answer is reported as [`Error::Unconfirmed`] instead of
//! being resent, because the server may already have stored it.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::net::TcpStream;
use std::path::PathBuf;
use std::time::Duration;

use super::protocol::{read_frame, write_frame, Request, Response};
use crate::core::tables::{ExperienceTable, VariableTable, EXPERIENCE_TABLE, VARIABLES_TABLE};
use crate::core::transition::Transition;
use crate::core::variable_channel::Pull;
use crate::error::{Error, Result};

/// Reconnect budget of a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts per request, the first one included.
    pub max_attempts: usize,
    /// Pause between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// Create a policy.
    pub fn new(max_attempts: usize, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }
}

/// Client side of the replay service.
pub struct ReplayClient {
    address: String,
    policy: RetryPolicy,
    conn: Mutex<Option<TcpStream>>,
}

impl ReplayClient {
    /// Connect to `address` (e.g. `"localhost:8000"`).
    pub fn connect(address: impl Into<String>, policy: RetryPolicy) -> Result<Self> {
        let client = Self {
            address: address.into(),
            policy,
            conn: Mutex::new(None),
        };
        {
            let mut conn = client.conn.lock();
            client.with_retry(&mut conn, |_| Ok(()))?;
        }
        tracing::info!(address = %client.address, "connected to replay service");
        Ok(client)
    }

    /// Server address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Send one request and wait for its response.
    ///
    /// `Response::Error` is returned as [`Error::Remote`] without retrying.
    pub fn request(&self, request: &Request) -> Result<Response> {
        let resend = request.is_idempotent();
        let mut conn = self.conn.lock();
        let response = self.with_retry(&mut conn, |stream| {
            write_frame(stream, request)?;
            match read_frame(stream) {
                Err(Error::Io(e)) if !resend => Err(Error::Unconfirmed {
                    address: self.address.clone(),
                    request: request.kind(),
                    reason: e.to_string(),
                }),
                result => result,
            }
        })?;
        match response {
            Response::Error(message) => Err(Error::Remote(message)),
            response => Ok(response),
        }
    }

    /// Run `exchange` on a live connection, reconnecting on transport errors.
    fn with_retry<T>(
        &self,
        conn: &mut Option<TcpStream>,
        mut exchange: impl FnMut(&mut TcpStream) -> Result<T>,
    ) -> Result<T> {
        for attempt in 1..=self.policy.max_attempts {
            if conn.is_none() {
                match self.open() {
                    Ok(stream) => *conn = Some(stream),
                    Err(e) => {
                        tracing::warn!(address = %self.address, attempt, error = %e, "connect failed");
                        std::thread::sleep(self.policy.backoff);
                        continue;
                    }
                }
            }
            let Some(stream) = conn.as_mut() else {
                continue;
            };
            match exchange(stream) {
                Ok(value) => return Ok(value),
                Err(Error::Io(e)) => {
                    tracing::warn!(address = %self.address, attempt, error = %e, "request failed");
                    *conn = None;
                    std::thread::sleep(self.policy.backoff);
                }
                Err(e @ Error::Unconfirmed { .. }) => {
                    tracing::warn!(address = %self.address, error = %e, "not resending");
                    *conn = None;
                    return Err(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::ConnectionLost {
            address: self.address.clone(),
            attempts: self.policy.max_attempts,
        })
    }

    fn open(&self) -> Result<TcpStream> {
        let stream = TcpStream::connect(&self.address)?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

fn unexpected(response: Response) -> Error {
    Error::Remote(format!("unexpected response {response:?}"))
}

impl ExperienceTable for ReplayClient {
    fn commit(&self, transition: Transition, priority: f64) -> Result<()> {
        let request = Request::Commit {
            table: EXPERIENCE_TABLE.to_string(),
            transition,
            priority,
        };
        match self.request(&request)? {
            Response::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    fn sample(&self, batch_size: usize) -> Result<Option<Vec<Transition>>> {
        let request = Request::Sample {
            table: EXPERIENCE_TABLE.to_string(),
            batch_size,
        };
        match self.request(&request)? {
            Response::Batch(batch) => Ok(batch),
            other => Err(unexpected(other)),
        }
    }

    fn len(&self) -> Result<usize> {
        let request = Request::Len {
            table: EXPERIENCE_TABLE.to_string(),
        };
        match self.request(&request)? {
            Response::Len(len) => Ok(len),
            other => Err(unexpected(other)),
        }
    }

    fn checkpoint(&self) -> Result<Option<PathBuf>> {
        let request = Request::Checkpoint {
            table: EXPERIENCE_TABLE.to_string(),
        };
        match self.request(&request)? {
            Response::Checkpoint(path) => Ok(path),
            other => Err(unexpected(other)),
        }
    }
}

impl VariableTable for ReplayClient {
    fn push(&self, actor: Vec<u8>, train_step: u64) -> Result<()> {
        let request = Request::Push {
            table: VARIABLES_TABLE.to_string(),
            actor,
            train_step,
        };
        match self.request(&request)? {
            Response::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    fn pull(&self) -> Result<Pull> {
        let request = Request::Pull {
            table: VARIABLES_TABLE.to_string(),
        };
        match self.request(&request)? {
            Response::Snapshot(Some(snapshot)) => Ok(Pull::Ready(snapshot)),
            Response::Snapshot(None) => Ok(Pull::Unavailable),
            other => Err(unexpected(other)),
        }
    }

    fn set_stop(&self) -> Result<()> {
        let request = Request::SetStop {
            table: VARIABLES_TABLE.to_string(),
        };
        match self.request(&request)? {
            Response::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    fn is_stopped(&self) -> Result<bool> {
        let request = Request::IsStopped {
            table: VARIABLES_TABLE.to_string(),
        };
        match self.request(&request)? {
            Response::Stopped(stopped) => Ok(stopped),
            other => Err(unexpected(other)),
        }
    }
}
