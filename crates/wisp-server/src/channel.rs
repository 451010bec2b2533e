#![forbid(unsafe_code)]

//! Event channel between client tasks and the server task.
//!
//! Two primitives:
//!
//! - [`ServerHandle::post`] enqueues a request and returns immediately.
//! - [`ServerHandle::send`] enqueues a request and blocks on a [`Completion`]
//!   until the server has processed it, returning the server's verdict.
//!
//! Both go through one FIFO queue, so requests from a single sender are
//! processed in the order they were issued. The server drains the queue on a
//! single thread, which serialises concurrent senders.
//!
//! # Event records
//!
//! Every queued request holds a permit from a fixed-size [`EventPool`], the
//! analogue of a statically sized event memory pool on a small device. When
//! the pool is exhausted the call fails at once with
//! [`ChannelError::OutOfMemory`]; nothing has been sent, so the registry is
//! untouched. Shutdown and client unregistration are control messages: they
//! take no record, so a full pool can neither wedge [`Server`] teardown nor
//! leave a departed client's windows on screen.
//!
//! [`Server`]: crate::server::Server
//!
//! # Deadlock guard
//!
//! The server thread marks itself with a thread-local flag. A blocking
//! [`ServerHandle::send`] issued from that thread could never complete, so it
//! panics instead of hanging.

use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError, mpsc};
use std::time::{Duration, Instant};

use wisp_core::event::{ClientEvent, ClientId, InputEvent, WindowId};

use crate::protocol::{Request, RequestError};

thread_local! {
    static IN_SERVER: Cell<bool> = const { Cell::new(false) };
}

/// Mark the current thread as the server task.
pub(crate) fn enter_server_context() {
    IN_SERVER.with(|flag| flag.set(true));
}

/// True when called from the server task.
pub fn in_server_context() -> bool {
    IN_SERVER.with(Cell::get)
}

/// Transport-level failures, plus the server's own rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    /// No event record available.
    OutOfMemory,
    /// The server task has exited.
    Disconnected,
    /// A bounded wait expired before the server answered.
    TimedOut,
    /// The server processed the request and refused it.
    Rejected(RequestError),
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory => write!(f, "no event record available"),
            Self::Disconnected => write!(f, "server task is gone"),
            Self::TimedOut => write!(f, "timed out waiting for the server"),
            Self::Rejected(err) => write!(f, "server rejected request: {err}"),
        }
    }
}

impl std::error::Error for ChannelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Rejected(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RequestError> for ChannelError {
    fn from(err: RequestError) -> Self {
        Self::Rejected(err)
    }
}

/// Fixed budget of in-flight event records.
#[derive(Debug)]
pub struct EventPool {
    capacity: usize,
    in_flight: AtomicUsize,
}

impl EventPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Claim a record, or `None` if the pool is exhausted.
    pub fn try_acquire(self: &Arc<Self>) -> Option<EventPermit> {
        self.in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                (used < self.capacity).then_some(used + 1)
            })
            .ok()
            .map(|_| EventPermit {
                pool: Arc::clone(self),
            })
    }

    /// Records currently queued or being processed.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// A claimed event record; returned to the pool on drop.
#[derive(Debug)]
pub struct EventPermit {
    pool: Arc<EventPool>,
}

impl Drop for EventPermit {
    fn drop(&mut self) {
        self.pool.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// One-shot completion signal for a send-and-wait request.
#[derive(Debug, Clone)]
pub struct Completion {
    inner: Arc<(Mutex<Option<Result<(), ChannelError>>>, Condvar)>,
}

impl Completion {
    pub fn new() -> Self {
        Self {
            inner: Arc::new((Mutex::new(None), Condvar::new())),
        }
    }

    /// Record the server's verdict and wake the waiter.
    pub fn done(&self, result: Result<(), RequestError>) {
        self.finish(result.map_err(ChannelError::Rejected));
    }

    /// Wake the waiter without processing: the server is shutting down.
    pub fn abandon(&self) {
        self.finish(Err(ChannelError::Disconnected));
    }

    fn finish(&self, result: Result<(), ChannelError>) {
        let (lock, cvar) = &*self.inner;
        let mut slot = lock.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(result);
        cvar.notify_all();
    }

    pub fn is_done(&self) -> bool {
        let (lock, _) = &*self.inner;
        lock.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Block until [`done`](Self::done) is called.
    ///
    /// `None` waits forever. Handles spurious wakeups by looping until the
    /// verdict arrives or the deadline passes.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<(), ChannelError> {
        let (lock, cvar) = &*self.inner;
        let mut slot = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            if let Some(result) = slot.take() {
                return result;
            }
            match deadline {
                None => {
                    slot = cvar.wait(slot).unwrap_or_else(PoisonError::into_inner);
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(ChannelError::TimedOut);
                    }
                    let (guard, _) = cvar
                        .wait_timeout(slot, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner);
                    slot = guard;
                }
            }
        }
    }
}

impl Default for Completion {
    fn default() -> Self {
        Self::new()
    }
}

/// A request on its way to the server.
#[derive(Debug)]
pub struct Envelope {
    pub request: Request,
    pub completion: Option<Completion>,
    /// `None` for control messages.
    pub(crate) permit: Option<EventPermit>,
}

#[derive(Debug)]
struct IdAllocator {
    next_window: AtomicU64,
    next_client: AtomicU64,
}

/// Cloneable sending side of the server queue.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    tx: mpsc::Sender<Envelope>,
    pool: Arc<EventPool>,
    ids: Arc<IdAllocator>,
}

impl ServerHandle {
    /// A handle plus the receiving end of its queue.
    pub(crate) fn channel(event_pool: usize) -> (Self, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel();
        let handle = Self {
            tx,
            pool: Arc::new(EventPool::new(event_pool)),
            ids: Arc::new(IdAllocator {
                next_window: AtomicU64::new(1),
                next_client: AtomicU64::new(1),
            }),
        };
        (handle, rx)
    }

    /// Fresh window identifier, unique for this server.
    pub fn next_window_id(&self) -> WindowId {
        let raw = self.ids.next_window.fetch_add(1, Ordering::Relaxed);
        WindowId::new(raw).unwrap_or_else(|| unreachable!("window ids start at 1"))
    }

    fn next_client_id(&self) -> ClientId {
        let raw = self.ids.next_client.fetch_add(1, Ordering::Relaxed);
        ClientId::new(raw).unwrap_or_else(|| unreachable!("client ids start at 1"))
    }

    /// The event-record pool shared by every handle.
    pub fn pool(&self) -> &EventPool {
        &self.pool
    }

    fn enqueue(&self, request: Request, completion: Option<Completion>) -> Result<(), ChannelError> {
        let Some(permit) = self.pool.try_acquire() else {
            tracing::warn!(request = request.name(), "event pool exhausted");
            return Err(ChannelError::OutOfMemory);
        };
        self.tx
            .send(Envelope {
                request,
                completion,
                permit: Some(permit),
            })
            .map_err(|_| ChannelError::Disconnected)
    }

    /// Queue a control message without claiming an event record.
    fn enqueue_control(&self, request: Request) -> Result<(), ChannelError> {
        tracing::trace!(request = request.name(), "control");
        self.tx
            .send(Envelope {
                request,
                completion: None,
                permit: None,
            })
            .map_err(|_| ChannelError::Disconnected)
    }

    /// Fire-and-forget.
    pub fn post(&self, request: Request) -> Result<(), ChannelError> {
        tracing::trace!(request = request.name(), window = ?request.window(), "post");
        self.enqueue(request, None)
    }

    /// Send and block until the server answers. Waits forever.
    pub fn send(&self, request: Request) -> Result<(), ChannelError> {
        self.send_timeout(request, None)
    }

    /// Send and block for at most `timeout` (`None` waits forever).
    ///
    /// A timed-out request stays queued and is still processed; only the wait
    /// is abandoned.
    ///
    /// # Panics
    ///
    /// When called on the server thread, which would deadlock.
    pub fn send_timeout(
        &self,
        request: Request,
        timeout: Option<Duration>,
    ) -> Result<(), ChannelError> {
        assert!(
            !in_server_context(),
            "send-and-wait of {} issued from the server task",
            request.name()
        );
        let name = request.name();
        let window = request.window();
        let completion = Completion::new();
        self.enqueue(request, Some(completion.clone()))?;
        let result = completion.wait(timeout);
        tracing::debug!(request = name, window = ?window, ok = result.is_ok(), "send completed");
        result
    }

    /// Register a new client and return its mailbox.
    ///
    /// Registration is posted, so it is ordered before every later request on
    /// the same handle.
    pub fn connect(&self, name: impl Into<String>) -> Result<Connection, ChannelError> {
        let client = self.next_client_id();
        let (mailbox, events) = mpsc::channel();
        self.post(Request::Register {
            client,
            name: name.into(),
            mailbox,
        })?;
        Ok(Connection {
            client,
            events,
            server: self.clone(),
        })
    }

    /// Feed driver input to the server.
    pub fn inject(&self, input: InputEvent) -> Result<(), ChannelError> {
        self.post(Request::Input(input))
    }

    /// Ask the owner of `window` to close it.
    pub fn request_close(&self, window: WindowId) -> Result<(), ChannelError> {
        self.post(Request::Close { window })
    }

    /// Stop the server task after the requests already queued.
    ///
    /// Never fails for lack of event records.
    pub fn shutdown(&self) -> Result<(), ChannelError> {
        self.enqueue_control(Request::Shutdown)
    }
}

/// A registered client: its id, its inbound events, and a server handle.
///
/// Dropping the connection unregisters the client.
#[derive(Debug)]
pub struct Connection {
    client: ClientId,
    events: mpsc::Receiver<ClientEvent>,
    server: ServerHandle,
}

impl Connection {
    pub fn client(&self) -> ClientId {
        self.client
    }

    pub fn server(&self) -> &ServerHandle {
        &self.server
    }

    /// Block until the next event arrives.
    pub fn recv(&self) -> Result<ClientEvent, ChannelError> {
        self.events.recv().map_err(|_| ChannelError::Disconnected)
    }

    /// Block for at most `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<ClientEvent, ChannelError> {
        self.events.recv_timeout(timeout).map_err(|err| match err {
            mpsc::RecvTimeoutError::Timeout => ChannelError::TimedOut,
            mpsc::RecvTimeoutError::Disconnected => ChannelError::Disconnected,
        })
    }

    /// Next event if one is already queued.
    pub fn try_recv(&self) -> Option<ClientEvent> {
        self.events.try_recv().ok()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let client = self.client;
        if let Err(err) = self.server.enqueue_control(Request::Unregister { client }) {
            tracing::debug!(%client, %err, "unregister not delivered");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    use wisp_core::event::{KeyCode, KeyEvent};

    fn some_window() -> WindowId {
        WindowId::new(1).unwrap()
    }

    #[test]
    fn pool_refuses_past_capacity_and_recovers() {
        let pool = Arc::new(EventPool::new(2));
        let a = pool.try_acquire().unwrap();
        let _b = pool.try_acquire().unwrap();
        assert!(pool.try_acquire().is_none());
        assert_eq!(pool.in_flight(), 2);
        drop(a);
        assert!(pool.try_acquire().is_some());
    }

    #[test]
    fn post_fails_with_out_of_memory_when_pool_exhausted() {
        let (handle, rx) = ServerHandle::channel(1);
        handle.post(Request::Show { window: some_window() }).unwrap();
        assert_eq!(
            handle.post(Request::Hide { window: some_window() }),
            Err(ChannelError::OutOfMemory)
        );
        // Only the first request was queued.
        let first = rx.recv().unwrap();
        assert_eq!(first.request.name(), "SHOW");
        assert!(rx.try_recv().is_err());
        drop(first);
        assert!(handle.post(Request::Hide { window: some_window() }).is_ok());
    }

    #[test]
    fn control_messages_bypass_exhausted_pool() {
        let (handle, rx) = ServerHandle::channel(2);
        let conn = handle.connect("full").unwrap();
        handle.post(Request::Show { window: some_window() }).unwrap();
        assert_eq!(handle.pool().in_flight(), 2);
        let key = InputEvent::Key(KeyEvent::new(KeyCode::Enter));
        assert_eq!(handle.inject(key), Err(ChannelError::OutOfMemory));

        drop(conn);
        assert_eq!(handle.shutdown(), Ok(()));
        let names: Vec<_> = rx.try_iter().map(|e| e.request.name()).collect();
        assert_eq!(names, ["REGISTER", "SHOW", "UNREGISTER", "SHUTDOWN"]);
        assert_eq!(handle.pool().in_flight(), 0);
    }

    #[test]
    fn send_times_out_when_nobody_answers() {
        let (handle, _rx) = ServerHandle::channel(4);
        let result = handle.send_timeout(
            Request::Show { window: some_window() },
            Some(Duration::from_millis(20)),
        );
        assert_eq!(result, Err(ChannelError::TimedOut));
    }

    #[test]
    fn send_reports_disconnected_server() {
        let (handle, rx) = ServerHandle::channel(4);
        drop(rx);
        assert_eq!(
            handle.send(Request::Show { window: some_window() }),
            Err(ChannelError::Disconnected)
        );
    }

    #[test]
    fn send_returns_server_verdict() {
        let (handle, rx) = ServerHandle::channel(4);
        let server = thread::spawn(move || {
            let envelope = rx.recv().unwrap();
            let id = envelope.request.window().unwrap();
            envelope
                .completion
                .unwrap()
                .done(Err(RequestError::NotShown(id)));
        });
        let result = handle.send(Request::Activate { window: some_window() });
        server.join().unwrap();
        assert_eq!(
            result,
            Err(ChannelError::Rejected(RequestError::NotShown(some_window())))
        );
    }

    #[test]
    fn completion_wakes_waiter() {
        let completion = Completion::new();
        let signaller = completion.clone();
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            signaller.done(Ok(()));
        });
        assert_eq!(completion.wait(None), Ok(()));
        t.join().unwrap();
    }

    #[test]
    fn abandoned_completion_reports_disconnected() {
        let completion = Completion::new();
        completion.abandon();
        assert!(completion.is_done());
        assert_eq!(completion.wait(None), Err(ChannelError::Disconnected));
    }

    #[test]
    #[should_panic(expected = "issued from the server task")]
    fn send_from_server_context_panics() {
        let (handle, _rx) = ServerHandle::channel(4);
        enter_server_context();
        let _ = handle.send(Request::Show { window: some_window() });
    }

    #[test]
    fn connect_posts_registration_first() {
        let (handle, rx) = ServerHandle::channel(4);
        let conn = handle.connect("app").unwrap();
        let envelope = rx.recv().unwrap();
        match envelope.request {
            Request::Register { client, name, .. } => {
                assert_eq!(client, conn.client());
                assert_eq!(name, "app");
            }
            other => panic!("unexpected {other:?}"),
        }
        drop(conn);
        assert_eq!(rx.recv().unwrap().request.name(), "UNREGISTER");
    }

    #[test]
    fn window_ids_are_unique_across_clones() {
        let (handle, _rx) = ServerHandle::channel(1);
        let other = handle.clone();
        let a = handle.next_window_id();
        let b = other.next_window_id();
        assert_ne!(a, b);
    }
}
