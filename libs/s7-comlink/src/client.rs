//! Serialized S7 client
//!
//! One worker thread owns the transport and executes connect, disconnect,
//! read and write jobs strictly in submission order. Callers never block:
//! read/write are validated synchronously (address + size gate) and their
//! results arrive through a completion callback or an awaitable wrapper.
//!
//! ```text
//! caller ──parse/size gate──▶ job queue (mpsc, FIFO) ──▶ worker thread ──▶ S7Transport
//!    ▲                                                       │
//!    └──────────────── completion(value, status) ────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::address::{self, AddressDescriptor};
use crate::error::{ClientError, Result};
use crate::transport::{status, S7Transport, StatusCode};
use crate::value::S7Value;

const WORKER_THREAD_NAME: &str = "s7-client-worker";

/// Client behaviour switches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    /// Complete read/write jobs with `TCP_NOT_CONNECTED` instead of calling
    /// the transport while no connection is established
    pub guard_disconnected: bool,
    /// Disconnect a still connected transport when the worker shuts down
    pub disconnect_on_drop: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            guard_disconnected: true,
            disconnect_on_drop: true,
        }
    }
}

type StatusCompletion = Box<dyn FnOnce(StatusCode) + Send>;
type ReadCompletion = Box<dyn FnOnce(&[u8], StatusCode) + Send>;

enum Job {
    Connect {
        address: String,
        rack: u16,
        slot: u16,
        completion: StatusCompletion,
    },
    Disconnect {
        completion: StatusCompletion,
    },
    Read {
        address: AddressDescriptor,
        completion: ReadCompletion,
    },
    Write {
        address: AddressDescriptor,
        payload: Vec<u8>,
        completion: StatusCompletion,
    },
}

impl Job {
    fn kind(&self) -> &'static str {
        match self {
            Job::Connect { .. } => "connect",
            Job::Disconnect { .. } => "disconnect",
            Job::Read { .. } => "read",
            Job::Write { .. } => "write",
        }
    }

    /// Complete the job with `code` without touching the transport
    fn fail(self, code: StatusCode) {
        let kind = self.kind();
        match self {
            Job::Connect { completion, .. }
            | Job::Disconnect { completion }
            | Job::Write { completion, .. } => deliver(kind, || completion(code)),
            Job::Read {
                address,
                completion,
            } => {
                let buffer = vec![0u8; address.size()];
                deliver(kind, || completion(&buffer, code));
            },
        }
    }
}

// ============================================================================
// Worker
// ============================================================================

/// Transport owned by the worker thread
///
/// Dropping the session releases the connection, whichever way the worker
/// exits.
struct Session<T: S7Transport> {
    transport: T,
    connected: Arc<AtomicBool>,
    options: ClientOptions,
}

impl<T: S7Transport> Session<T> {
    fn run(mut self, mut jobs: mpsc::UnboundedReceiver<Job>) {
        debug!("S7 worker started");
        while let Some(job) = jobs.blocking_recv() {
            self.execute(job);
        }
        debug!("S7 worker queue closed");
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    fn blocked(&self) -> bool {
        self.options.guard_disconnected && !self.is_connected()
    }

    /// Run one transport call; a panicking transport yields `TRANSPORT_FAULT`
    fn guarded(&mut self, kind: &str, call: impl FnOnce(&mut T) -> StatusCode) -> StatusCode {
        let transport = &mut self.transport;
        match catch_unwind(AssertUnwindSafe(|| call(transport))) {
            Ok(code) => code,
            Err(_) => {
                error!("S7 transport panicked during {}", kind);
                status::TRANSPORT_FAULT
            },
        }
    }

    fn execute(&mut self, job: Job) {
        let kind = job.kind();
        match job {
            Job::Connect {
                address,
                rack,
                slot,
                completion,
            } => {
                let code = self.guarded(kind, |t| t.connect_to(&address, rack, slot));
                if status::is_ok(code) {
                    self.set_connected(true);
                    info!("S7 connected: {} rack={} slot={}", address, rack, slot);
                } else {
                    // A failed reconnect keeps the state of the previous link
                    warn!(
                        "S7 connect failed: {} - {} ({:#x})",
                        address,
                        status::describe(code),
                        code
                    );
                }
                deliver(kind, || completion(code));
            },
            Job::Disconnect { completion } => {
                let code = self.guarded(kind, |t| t.disconnect());
                self.set_connected(false);
                info!("S7 disconnected ({:#x})", code);
                deliver(kind, || completion(code));
            },
            Job::Read {
                address,
                completion,
            } => {
                let mut buffer = vec![0u8; address.size()];
                let code = if self.blocked() {
                    debug!("S7 read skipped, not connected: {}", address);
                    status::TCP_NOT_CONNECTED
                } else {
                    self.guarded(kind, |t| {
                        t.read_area(
                            address.area().code(),
                            address.db_number(),
                            address.effective_offset(),
                            address.amount(),
                            address.length().code(),
                            &mut buffer,
                        )
                    })
                };
                if !status::is_ok(code) {
                    buffer.fill(0);
                }
                debug!("S7 read: {} -> {:02X?} ({:#x})", address, buffer, code);
                deliver(kind, || completion(&buffer, code));
            },
            Job::Write {
                address,
                payload,
                completion,
            } => {
                let code = if self.blocked() {
                    debug!("S7 write skipped, not connected: {}", address);
                    status::TCP_NOT_CONNECTED
                } else {
                    self.guarded(kind, |t| {
                        t.write_area(
                            address.area().code(),
                            address.db_number(),
                            address.effective_offset(),
                            address.amount(),
                            address.length().code(),
                            &payload,
                        )
                    })
                };
                debug!("S7 write: {} <- {:02X?} ({:#x})", address, payload, code);
                deliver(kind, || completion(code));
            },
        }
    }
}

impl<T: S7Transport> Drop for Session<T> {
    fn drop(&mut self) {
        if self.options.disconnect_on_drop && self.is_connected() {
            let code = self.guarded("release", |t| t.disconnect());
            self.set_connected(false);
            info!("S7 session released ({:#x})", code);
        }
    }
}

/// Accept signal of the callback API: only validation failures reject
fn accepted(kind: &str, result: Result<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) if e.is_rejection() => {
            debug!("S7 {} rejected: {}", kind, e);
            false
        },
        // Completion already delivered with a failure status
        Err(_) => true,
    }
}

/// Run a completion; a panicking callback must not take the queue down
fn deliver(kind: &str, completion: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(completion)).is_err() {
        error!("S7 {} completion panicked", kind);
    }
}

// ============================================================================
// Client
// ============================================================================

/// S7 client with a single serialized worker
pub struct S7Client {
    jobs: Option<mpsc::UnboundedSender<Job>>,
    connected: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    options: ClientOptions,
}

impl S7Client {
    /// Take ownership of `transport` and start the worker
    pub fn new<T: S7Transport>(transport: T) -> Result<Self> {
        Self::with_options(transport, ClientOptions::default())
    }

    pub fn with_options<T: S7Transport>(transport: T, options: ClientOptions) -> Result<Self> {
        let (jobs, receiver) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));
        let session = Session {
            transport,
            connected: Arc::clone(&connected),
            options: options.clone(),
        };

        let worker = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || session.run(receiver))?;

        Ok(Self {
            jobs: Some(jobs),
            connected,
            worker: Some(worker),
            options,
        })
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Connection state as last observed by the worker
    ///
    /// Set by a successful connect, cleared by any disconnect. A failed
    /// connect leaves it unchanged.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Queue a job; if the worker is gone the job completes with `CLIENT_STOPPED`
    fn submit(&self, job: Job) -> Result<()> {
        let rejected = match &self.jobs {
            Some(jobs) => match jobs.send(job) {
                Ok(()) => return Ok(()),
                Err(rejected) => rejected.0,
            },
            None => job,
        };
        error!("S7 worker gone, failing {} job", rejected.kind());
        rejected.fail(status::CLIENT_STOPPED);
        Err(ClientError::WorkerStopped)
    }

    /// Parse `text` and check it addresses exactly `T::SIZE` bytes
    fn validate<T: S7Value>(text: &str) -> Result<AddressDescriptor> {
        let address = address::parse(text)?;
        if address.size() != T::SIZE {
            return Err(ClientError::size_mismatch(
                text,
                address.size(),
                T::SIZE,
                T::TYPE_NAME,
            ));
        }
        Ok(address)
    }

    // ========== Callback API ==========

    /// Queue a connect; `completion` receives the transport status
    ///
    /// Completes with `status::CLIENT_STOPPED` when the worker is gone.
    pub fn connect(
        &self,
        address: &str,
        rack: u16,
        slot: u16,
        completion: impl FnOnce(StatusCode) + Send + 'static,
    ) {
        let _ = self.submit(Job::Connect {
            address: address.to_string(),
            rack,
            slot,
            completion: Box::new(completion),
        });
    }

    /// Queue a disconnect; harmless when not connected
    ///
    /// Completes with `status::CLIENT_STOPPED` when the worker is gone.
    pub fn disconnect(&self, completion: impl FnOnce(StatusCode) + Send + 'static) {
        let _ = self.submit(Job::Disconnect {
            completion: Box::new(completion),
        });
    }

    /// Queue a read of `T` at `address`
    ///
    /// Returns `false` without touching the transport when the address does
    /// not parse or its size differs from `T`. Every accepted job completes,
    /// with `status::CLIENT_STOPPED` if the worker is gone.
    pub fn read<T: S7Value>(
        &self,
        address: &str,
        completion: impl FnOnce(T, StatusCode) + Send + 'static,
    ) -> bool {
        accepted("read", self.try_read(address, completion))
    }

    /// Queue a write of `value` at `address`, same gate as [`S7Client::read`]
    pub fn write<T: S7Value>(
        &self,
        address: &str,
        value: T,
        completion: impl FnOnce(StatusCode) + Send + 'static,
    ) -> bool {
        accepted("write", self.try_write(address, value, completion))
    }

    /// [`S7Client::read`] reporting why a job was rejected
    pub fn try_read<T: S7Value>(
        &self,
        address: &str,
        completion: impl FnOnce(T, StatusCode) + Send + 'static,
    ) -> Result<()> {
        let address = Self::validate::<T>(address)?;
        self.submit(Job::Read {
            address,
            completion: Box::new(move |buffer: &[u8], code: StatusCode| {
                completion(T::from_wire(buffer), code)
            }),
        })
    }

    /// [`S7Client::write`] reporting why a job was rejected
    pub fn try_write<T: S7Value>(
        &self,
        address: &str,
        value: T,
        completion: impl FnOnce(StatusCode) + Send + 'static,
    ) -> Result<()> {
        let address = Self::validate::<T>(address)?;
        self.submit(Job::Write {
            address,
            payload: value.to_wire_vec(),
            completion: Box::new(completion),
        })
    }

    // ========== Async API ==========

    pub async fn connect_async(&self, address: &str, rack: u16, slot: u16) -> Result<StatusCode> {
        let (tx, rx) = oneshot::channel();
        self.submit(Job::Connect {
            address: address.to_string(),
            rack,
            slot,
            completion: Box::new(move |code| {
                let _ = tx.send(code);
            }),
        })?;
        rx.await.map_err(|_| ClientError::WorkerStopped)
    }

    pub async fn disconnect_async(&self) -> Result<StatusCode> {
        let (tx, rx) = oneshot::channel();
        self.submit(Job::Disconnect {
            completion: Box::new(move |code| {
                let _ = tx.send(code);
            }),
        })?;
        rx.await.map_err(|_| ClientError::WorkerStopped)
    }

    pub async fn read_async<T: S7Value>(&self, address: &str) -> Result<(T, StatusCode)> {
        let (tx, rx) = oneshot::channel();
        self.try_read(address, move |value: T, code| {
            let _ = tx.send((value, code));
        })?;
        rx.await.map_err(|_| ClientError::WorkerStopped)
    }

    pub async fn write_async<T: S7Value>(&self, address: &str, value: T) -> Result<StatusCode> {
        let (tx, rx) = oneshot::channel();
        self.try_write(address, value, move |code| {
            let _ = tx.send(code);
        })?;
        rx.await.map_err(|_| ClientError::WorkerStopped)
    }

    /// Close the queue, wait for accepted jobs to finish and release the transport
    ///
    /// Blocks the calling thread until the worker exits.
    pub fn shutdown(mut self) -> Result<()> {
        self.jobs.take();
        match self.worker.take() {
            Some(worker) => worker.join().map_err(|_| ClientError::WorkerPanicked),
            None => Ok(()),
        }
    }
}

impl Drop for S7Client {
    fn drop(&mut self) {
        // Closing the queue is enough: the worker drains and releases on its own
        self.jobs.take();
    }
}

impl std::fmt::Debug for S7Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S7Client")
            .field("connected", &self.is_connected())
            .field("options", &self.options)
            .finish()
    }
}
