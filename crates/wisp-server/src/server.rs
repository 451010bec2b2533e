#![forbid(unsafe_code)]

//! The server task.
//!
//! [`Server::spawn`] starts one thread that owns the screen and the
//! [`TopWinRegistry`]. It drains the request queue strictly in arrival order,
//! delivers the resulting events to client mailboxes, then completes the
//! request's [`Completion`](crate::channel::Completion) if the sender is
//! waiting. Events therefore reach a client before its blocking call returns.

use std::collections::BTreeMap;
use std::io;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use wisp_core::event::{ClientEvent, ClientId};

use crate::channel::{Envelope, ServerHandle, enter_server_context};
use crate::config::ServerConfig;
use crate::protocol::{Request, RequestError};
use crate::topwin::{Outbox, TopWinRegistry};

/// Counters reported when the server task exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub processed: u64,
    pub rejected: u64,
    /// Events addressed to a client that had already gone.
    pub undelivered: u64,
}

/// A running server task.
///
/// Dropping it shuts the task down after the requests already queued.
#[derive(Debug)]
pub struct Server {
    handle: ServerHandle,
    thread: Option<JoinHandle<ServerStats>>,
}

impl Server {
    /// Start the server thread.
    ///
    /// Fails with [`io::ErrorKind::InvalidInput`] for an empty event pool,
    /// which could never queue a request.
    pub fn spawn(config: ServerConfig) -> io::Result<Self> {
        if config.event_pool == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "event pool capacity must be at least 1",
            ));
        }
        let (handle, rx) = ServerHandle::channel(config.event_pool);
        tracing::info!(
            screen = ?config.screen,
            event_pool = config.event_pool,
            "starting wisp server"
        );
        let thread = thread::Builder::new()
            .name("wisp-server".into())
            .spawn(move || {
                enter_server_context();
                ServerState::new(&config).run(&rx)
            })?;
        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }

    /// A new handle for clients and input drivers.
    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    /// Shut down and wait for the task, returning its counters.
    ///
    /// Returns `None` if the server thread panicked.
    pub fn join(mut self) -> Option<ServerStats> {
        self.stop()
    }

    fn stop(&mut self) -> Option<ServerStats> {
        let thread = self.thread.take()?;
        if let Err(err) = self.handle.shutdown() {
            // Only possible once the thread has already exited.
            tracing::debug!(%err, "shutdown not queued");
        }
        thread.join().ok()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Debug)]
struct ClientSlot {
    name: String,
    mailbox: mpsc::Sender<ClientEvent>,
}

/// State owned by the server thread.
#[derive(Debug)]
struct ServerState {
    registry: TopWinRegistry,
    clients: BTreeMap<ClientId, ClientSlot>,
    stats: ServerStats,
}

impl ServerState {
    fn new(config: &ServerConfig) -> Self {
        Self {
            registry: TopWinRegistry::new(config.screen)
                .with_activate_on_show(config.activate_on_show),
            clients: BTreeMap::new(),
            stats: ServerStats::default(),
        }
    }

    fn run(mut self, rx: &mpsc::Receiver<Envelope>) -> ServerStats {
        while let Ok(Envelope {
            request,
            completion,
            permit,
        }) = rx.recv()
        {
            drop(permit);
            if matches!(request, Request::Shutdown) {
                if let Some(completion) = completion {
                    completion.done(Ok(()));
                }
                break;
            }

            let name = request.name();
            let window = request.window();
            let verdict = match self.dispatch(request) {
                Ok(outbox) => {
                    self.deliver(outbox);
                    Ok(())
                }
                Err(err) => {
                    self.stats.rejected += 1;
                    Err(err)
                }
            };
            self.stats.processed += 1;

            match completion {
                Some(completion) => completion.done(verdict),
                None => {
                    if let Err(err) = verdict {
                        tracing::warn!(request = name, ?window, %err, "posted request rejected");
                    }
                }
            }
        }

        // Wake anyone still waiting behind the shutdown.
        while let Ok(envelope) = rx.try_recv() {
            if let Some(completion) = envelope.completion {
                completion.abandon();
            }
        }
        tracing::info!(
            processed = self.stats.processed,
            rejected = self.stats.rejected,
            clients = self.clients.len(),
            "wisp server stopped"
        );
        self.stats
    }

    fn dispatch(&mut self, request: Request) -> Result<Outbox, RequestError> {
        tracing::debug!(request = request.name(), window = ?request.window(), "dispatch");
        match request {
            Request::Register {
                client,
                name,
                mailbox,
            } => {
                if self.clients.contains_key(&client) {
                    return Err(RequestError::AlreadyRegistered);
                }
                tracing::info!(%client, %name, "client connected");
                self.clients.insert(client, ClientSlot { name, mailbox });
                Ok(Outbox::new())
            }
            Request::Unregister { client } => {
                let Some(slot) = self.clients.remove(&client) else {
                    return Err(RequestError::UnknownClient(client));
                };
                tracing::info!(%client, name = %slot.name, "client disconnected");
                self.registry.remove_client(client)
            }
            Request::Create {
                window,
                client,
                parent,
                style,
                outer_extent,
            } => {
                if !self.clients.contains_key(&client) {
                    return Err(RequestError::UnknownClient(client));
                }
                self.registry
                    .create(window, client, parent, style, outer_extent)
            }
            Request::Show { window } => self.registry.show(window),
            Request::Hide { window } => self.registry.hide(window),
            Request::Move { window, x, y } => self.registry.move_to(window, x, y),
            Request::Resize {
                window,
                outer_extent,
            } => self.registry.resize(window, outer_extent),
            Request::Activate { window } => self.registry.activate(window),
            Request::ModalEnter { window } => self.registry.modal_enter(window),
            Request::Close { window } => self.registry.close(window),
            Request::Destroy { window } => self.registry.destroy(window),
            Request::Input(input) => self.registry.route_input(input),
            Request::Shutdown => Ok(Outbox::new()),
        }
    }

    fn deliver(&mut self, outbox: Outbox) {
        for (client, event) in outbox {
            tracing::trace!(%client, window = %event.window, event = event.event.name(), "deliver");
            let delivered = self
                .clients
                .get(&client)
                .is_some_and(|slot| slot.mailbox.send(event).is_ok());
            if !delivered {
                self.stats.undelivered += 1;
                tracing::debug!(%client, "client mailbox gone; event dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use wisp_core::event::{WindowEvent, WindowId};
    use wisp_core::geometry::Rect;

    use crate::channel::ChannelError;
    use crate::protocol::ServerStyle;

    const WAIT: Duration = Duration::from_secs(5);

    fn create(handle: &ServerHandle, client: ClientId, rect: Rect) -> WindowId {
        let window = handle.next_window_id();
        handle
            .send(Request::Create {
                window,
                client,
                parent: None,
                style: ServerStyle::empty(),
                outer_extent: rect,
            })
            .unwrap();
        window
    }

    #[test]
    fn show_delivers_events_before_returning() {
        let server = Server::spawn(ServerConfig::default()).unwrap();
        let handle = server.handle();
        let conn = handle.connect("test").unwrap();
        let window = create(&handle, conn.client(), Rect::new(0, 0, 50, 50));
        handle.send(Request::Show { window }).unwrap();

        let first = conn.try_recv().unwrap();
        assert_eq!(first.window, window);
        assert!(matches!(first.event, WindowEvent::ClipInfo { .. }));
        drop(conn);
        let stats = server.join().unwrap();
        assert_eq!(stats.rejected, 0);
    }

    #[test]
    fn create_for_unknown_client_is_rejected() {
        let server = Server::spawn(ServerConfig::default()).unwrap();
        let handle = server.handle();
        let stray = ClientId::new(999).unwrap();
        let window = handle.next_window_id();
        let result = handle.send(Request::Create {
            window,
            client: stray,
            parent: None,
            style: ServerStyle::empty(),
            outer_extent: Rect::new(0, 0, 1, 1),
        });
        assert_eq!(
            result,
            Err(ChannelError::Rejected(RequestError::UnknownClient(stray)))
        );
    }

    #[test]
    fn requests_after_shutdown_are_disconnected() {
        let server = Server::spawn(ServerConfig::default()).unwrap();
        let handle = server.handle();
        let stats = server.join().unwrap();
        assert_eq!(stats.processed, 0);
        assert_eq!(
            handle.send(Request::Shutdown),
            Err(ChannelError::Disconnected)
        );
    }

    #[test]
    fn empty_event_pool_is_refused() {
        let config = ServerConfig {
            event_pool: 0,
            ..ServerConfig::default()
        };
        let err = Server::spawn(config).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn close_request_reaches_owner() {
        let server = Server::spawn(ServerConfig::default()).unwrap();
        let handle = server.handle();
        let conn = handle.connect("closer").unwrap();
        let window = create(&handle, conn.client(), Rect::new(0, 0, 10, 10));
        handle.request_close(window).unwrap();
        let event = conn.recv_timeout(WAIT).unwrap();
        assert_eq!(event, ClientEvent::new(window, WindowEvent::Close));
    }
}
