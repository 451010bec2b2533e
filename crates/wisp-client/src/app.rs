#![forbid(unsafe_code)]

//! Client application object.
//!
//! An [`App`] owns the client's [`Connection`] and every [`Window`] it has
//! created, and runs the event loop that feeds server events to them.
//!
//! # Nested loops
//!
//! [`App::run`] may be re-entered: a modal window runs the loop again from
//! inside an event handler. Each call bumps the nesting counter and returns
//! once [`App::exit`] has brought the counter below the level it started at.
//! The counter never goes below zero.
//!
//! The application is single-threaded (`!Send`); one app lives on one client
//! thread, and other clients run their own loops on their own threads.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use wisp_core::event::{ClientEvent, ClientId, WindowId};
use wisp_server::{ChannelError, Connection, Request, ServerHandle};

use crate::error::WinError;
use crate::title::Chrome;
use crate::window::{Window, WindowCell};

/// Application settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Name reported to the server.
    pub name: String,
    /// Keep running after the last window closes.
    pub keep_alive: bool,
    /// Upper bound on every send-and-wait. `None` waits forever.
    pub request_timeout: Option<Duration>,
    pub chrome: Chrome,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "wisp-app".to_owned(),
            keep_alive: false,
            request_timeout: None,
            chrome: Chrome::default(),
        }
    }
}

impl AppConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_chrome(mut self, chrome: Chrome) -> Self {
        self.chrome = chrome;
        self
    }
}

pub(crate) struct AppInner {
    config: AppConfig,
    conn: Connection,
    /// Nested run-loop depth.
    ref_cnt: AtomicU32,
    /// Windows created and not yet closed.
    win_cnt: Cell<u32>,
    exit_code: Cell<i32>,
    main_win: Cell<Option<WindowId>>,
    windows: RefCell<BTreeMap<WindowId, Rc<WindowCell>>>,
}

/// Handle to a client application. Clones share the same application.
#[derive(Clone)]
pub struct App {
    inner: Rc<AppInner>,
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("name", &self.inner.config.name)
            .field("client", &self.inner.conn.client())
            .field("depth", &self.depth())
            .field("windows", &self.inner.win_cnt.get())
            .finish()
    }
}

impl App {
    /// Connect to the server.
    pub fn new(server: &ServerHandle, config: AppConfig) -> Result<Self, WinError> {
        let conn = server.connect(config.name.clone())?;
        tracing::debug!(name = %config.name, client = %conn.client(), "app connected");
        Ok(Self {
            inner: Rc::new(AppInner {
                config,
                conn,
                ref_cnt: AtomicU32::new(0),
                win_cnt: Cell::new(0),
                exit_code: Cell::new(0),
                main_win: Cell::new(None),
                windows: RefCell::new(BTreeMap::new()),
            }),
        })
    }

    pub(crate) fn from_inner(inner: Rc<AppInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> std::rc::Weak<AppInner> {
        Rc::downgrade(&self.inner)
    }

    pub fn client(&self) -> ClientId {
        self.inner.conn.client()
    }

    pub fn server(&self) -> &ServerHandle {
        self.inner.conn.server()
    }

    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    /// Current run-loop nesting depth.
    pub fn depth(&self) -> u32 {
        self.inner.ref_cnt.load(Ordering::Acquire)
    }

    /// Windows created and not yet closed.
    pub fn window_count(&self) -> u32 {
        self.inner.win_cnt.get()
    }

    pub fn main_window(&self) -> Option<Window> {
        self.inner.main_win.get().and_then(|id| self.window(id))
    }

    pub fn window(&self, id: WindowId) -> Option<Window> {
        self.inner
            .windows
            .borrow()
            .get(&id)
            .cloned()
            .map(Window::from_cell)
    }

    /// Run the event loop until a matching [`exit`](Self::exit).
    ///
    /// Returns the code passed to the `exit` that ended this level.
    pub fn run(&self) -> Result<i32, WinError> {
        let level = self.inner.ref_cnt.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::debug!(level, "run loop entered");
        while self.depth() >= level {
            match self.inner.conn.recv() {
                Ok(event) => self.dispatch(event),
                Err(err) => {
                    tracing::warn!(level, %err, "run loop lost the server");
                    self.exit(-1);
                    return Err(err.into());
                }
            }
        }
        let code = self.inner.exit_code.get();
        tracing::debug!(level, code, "run loop left");
        Ok(code)
    }

    /// Leave the innermost run loop with `code`.
    pub fn exit(&self, code: i32) {
        self.inner.exit_code.set(code);
        let _ = self
            .inner
            .ref_cnt
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    /// Route one event to its window.
    pub fn dispatch(&self, event: ClientEvent) {
        let target = self.inner.windows.borrow().get(&event.window).cloned();
        match target {
            Some(cell) => Window::from_cell(cell).handle_event(event.event),
            None => {
                tracing::debug!(window = %event.window, event = event.event.name(), "event for unknown window");
            }
        }
    }

    /// Dispatch every event already queued. Returns how many were handled.
    pub fn dispatch_pending(&self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.inner.conn.try_recv() {
            self.dispatch(event);
            handled += 1;
        }
        handled
    }

    /// Wait up to `timeout` for one event and dispatch it.
    pub fn dispatch_next(&self, timeout: Duration) -> Result<bool, WinError> {
        match self.inner.conn.recv_timeout(timeout) {
            Ok(event) => {
                self.dispatch(event);
                Ok(true)
            }
            Err(ChannelError::TimedOut) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    // ── Window bookkeeping ──────────────────────────────────────────────

    pub(crate) fn send(&self, request: Request) -> Result<(), WinError> {
        self.server()
            .send_timeout(request, self.inner.config.request_timeout)
            .map_err(WinError::from)
    }

    pub(crate) fn post(&self, request: Request) -> Result<(), WinError> {
        self.server().post(request).map_err(WinError::from)
    }

    pub(crate) fn adopt(&self, cell: Rc<WindowCell>) {
        let id = cell.id();
        self.inner.windows.borrow_mut().insert(id, cell);
        self.inner.win_cnt.set(self.inner.win_cnt.get() + 1);
    }

    pub(crate) fn release(&self, id: WindowId) {
        self.inner.windows.borrow_mut().remove(&id);
        if self.inner.main_win.get() == Some(id) {
            self.inner.main_win.set(None);
        }
    }

    pub(crate) fn claim_main(&self, id: WindowId) {
        if self.inner.main_win.get().is_none() {
            self.inner.main_win.set(Some(id));
        }
    }

    /// A window closed. The app exits with its last window unless kept alive.
    pub(crate) fn window_closed(&self) {
        let remaining = self.inner.win_cnt.get().saturating_sub(1);
        self.inner.win_cnt.set(remaining);
        if remaining == 0 && !self.inner.config.keep_alive {
            tracing::debug!("last window closed");
            self.exit(0);
        }
    }

    /// Every live window except `id`.
    pub(crate) fn windows_except(&self, id: WindowId) -> Vec<Window> {
        self.inner
            .windows
            .borrow()
            .iter()
            .filter(|(other, _)| **other != id)
            .map(|(_, cell)| Window::from_cell(Rc::clone(cell)))
            .collect()
    }
}
