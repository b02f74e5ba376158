//! TCP front end for the experience and variables tables.
//!
//! One accept thread plus one handler thread per connection. Handlers own
//! nothing but their socket: every request is dispatched to the shared
//! tables, so the consistency guarantees are those of the in-process
//! [`ExperienceStore`] and [`VariableChannel`].
//!
//! [`ExperienceStore`]: crate::core::experience_store::ExperienceStore
//! [`VariableChannel`]: crate::core::variable_channel::VariableChannel

use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use super::protocol::{read_frame, write_frame, Request, Response};
use crate::core::tables::{ExperienceTable, VariableTable, EXPERIENCE_TABLE, VARIABLES_TABLE};
use crate::core::variable_channel::Pull;
use crate::error::{Error, Result};

/// Poll interval of the non-blocking accept loop.
const ACCEPT_POLL: Duration = Duration::from_millis(10);

/// Open connections by id. Each handler removes its own entry on exit, the
/// shutdown path closes whatever is left.
type Connections = Arc<Mutex<HashMap<u64, TcpStream>>>;

struct Tables<E, V> {
    experience: E,
    variables: V,
}

impl<E: ExperienceTable, V: VariableTable> Tables<E, V> {
    fn handle(&self, request: Request) -> Response {
        let kind = request.kind();
        match self.dispatch(request) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(request = kind, error = %e, "request failed");
                Response::Error(e.to_string())
            }
        }
    }

    fn dispatch(&self, request: Request) -> Result<Response> {
        let table = request.table();
        let expected = match &request {
            Request::Commit { .. }
            | Request::Sample { .. }
            | Request::Len { .. }
            | Request::Checkpoint { .. } => EXPERIENCE_TABLE,
            _ => VARIABLES_TABLE,
        };
        if table != expected {
            return Err(Error::UnknownTable(table.to_string()));
        }

        Ok(match request {
            Request::Commit {
                transition,
                priority,
                ..
            } => {
                self.experience.commit(transition, priority)?;
                Response::Ok
            }
            Request::Sample { batch_size, .. } => {
                Response::Batch(self.experience.sample(batch_size)?)
            }
            Request::Len { .. } => Response::Len(self.experience.len()?),
            Request::Checkpoint { .. } => Response::Checkpoint(self.experience.checkpoint()?),
            Request::Push {
                actor, train_step, ..
            } => {
                self.variables.push(actor, train_step)?;
                Response::Ok
            }
            Request::Pull { .. } => match self.variables.pull()? {
                Pull::Ready(snapshot) => Response::Snapshot(Some(snapshot)),
                Pull::Unavailable => Response::Snapshot(None),
            },
            Request::SetStop { .. } => {
                self.variables.set_stop()?;
                Response::Ok
            }
            Request::IsStopped { .. } => Response::Stopped(self.variables.is_stopped()?),
        })
    }
}

// ============================================================================
// Server
// ============================================================================

/// Replay service bound to a TCP address.
pub struct ReplayServer;

impl ReplayServer {
    /// Bind `addr` and start serving `experience` and `variables`.
    pub fn bind<A, E, V>(addr: A, experience: E, variables: V) -> Result<ServerHandle>
    where
        A: ToSocketAddrs,
        E: ExperienceTable + 'static,
        V: VariableTable + 'static,
    {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let tables = Arc::new(Tables {
            experience,
            variables,
        });
        let stop = Arc::new(AtomicBool::new(false));
        let connections: Connections = Arc::new(Mutex::new(HashMap::new()));

        let accept = {
            let stop = stop.clone();
            let connections = connections.clone();
            std::thread::Builder::new()
                .name("replay-accept".to_string())
                .spawn(move || accept_loop(listener, tables, stop, connections))?
        };

        tracing::info!(%local_addr, "replay service listening");
        Ok(ServerHandle {
            local_addr,
            stop,
            connections,
            accept: Some(accept),
        })
    }
}

fn accept_loop<E, V>(
    listener: TcpListener,
    tables: Arc<Tables<E, V>>,
    stop: Arc<AtomicBool>,
    connections: Connections,
) where
    E: ExperienceTable + 'static,
    V: VariableTable + 'static,
{
    let mut next_id = 0u64;
    while !stop.load(Ordering::Acquire) {
        let (stream, peer) = match listener.accept() {
            Ok(conn) => conn,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL);
                continue;
            }
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                std::thread::sleep(ACCEPT_POLL);
                continue;
            }
        };

        let registered = stream
            .set_nonblocking(false)
            .and_then(|_| stream.set_nodelay(true))
            .and_then(|_| stream.try_clone());
        let id = next_id;
        next_id += 1;
        match registered {
            Ok(clone) => {
                connections.lock().insert(id, clone);
            }
            Err(e) => {
                tracing::warn!(%peer, error = %e, "dropping connection");
                continue;
            }
        }

        let tables = tables.clone();
        let handler_connections = connections.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("replay-conn-{id}"))
            .spawn(move || {
                serve_connection(stream, peer, tables);
                handler_connections.lock().remove(&id);
            });
        if let Err(e) = spawned {
            tracing::error!(%peer, error = %e, "failed to spawn connection handler");
            connections.lock().remove(&id);
        }
    }
    tracing::debug!("accept loop exited");
}

fn serve_connection<E: ExperienceTable, V: VariableTable>(
    mut stream: TcpStream,
    peer: SocketAddr,
    tables: Arc<Tables<E, V>>,
) {
    tracing::debug!(%peer, "client connected");
    loop {
        let request: Request = match read_frame(&mut stream) {
            Ok(request) => request,
            Err(Error::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => {
                tracing::debug!(%peer, error = %e, "connection closed");
                break;
            }
        };
        let response = tables.handle(request);
        if let Err(e) = write_frame(&mut stream, &response) {
            tracing::debug!(%peer, error = %e, "failed to answer");
            break;
        }
    }
    tracing::debug!(%peer, "client disconnected");
}

/// Running server. Dropping the handle shuts the server down.
pub struct ServerHandle {
    local_addr: SocketAddr,
    stop: Arc<AtomicBool>,
    connections: Connections,
    accept: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// Address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of client connections currently being served.
    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Stop accepting, close every open connection and join the accept thread.
    pub fn shutdown(mut self) {
        self.stop_now();
    }

    fn stop_now(&mut self) {
        self.stop.store(true, Ordering::Release);
        let Some(accept) = self.accept.take() else {
            return;
        };
        if accept.join().is_err() {
            tracing::error!("accept thread panicked");
        }
        // no new connections after the accept thread has exited
        for (id, conn) in self.connections.lock().drain() {
            if let Err(e) = conn.shutdown(Shutdown::Both) {
                tracing::debug!(connection = id, error = %e, "closing connection failed");
            }
        }
        tracing::info!(local_addr = %self.local_addr, "replay service stopped");
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.stop_now();
    }
}
