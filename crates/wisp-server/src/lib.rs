#![forbid(unsafe_code)]

//! Server side of wisp: the server task, its top-window registry, and the
//! channel clients use to reach it.
//!
//! # Role in wisp
//! One [`Server`] owns the screen. Clients obtain a [`ServerHandle`], call
//! [`ServerHandle::connect`] to get a [`Connection`], and then issue
//! [`Request`]s with `post` (fire-and-forget) or `send` (blocking until the
//! server has applied the request).
//!
//! ```no_run
//! use wisp_server::{Request, Server, ServerConfig, ServerStyle};
//! use wisp_core::Rect;
//!
//! let server = Server::spawn(ServerConfig::default())?;
//! let handle = server.handle();
//! let conn = handle.connect("demo").expect("connect");
//! let window = handle.next_window_id();
//! handle
//!     .send(Request::Create {
//!         window,
//!         client: conn.client(),
//!         parent: None,
//!         style: ServerStyle::empty(),
//!         outer_extent: Rect::new(10, 10, 100, 60),
//!     })
//!     .expect("create");
//! handle.send(Request::Show { window }).expect("show");
//! # Ok::<(), std::io::Error>(())
//! ```

pub mod channel;
pub mod config;
pub mod protocol;
pub mod server;
pub mod topwin;

pub use channel::{
    ChannelError, Completion, Connection, EventPool, ServerHandle, in_server_context,
};
pub use config::ServerConfig;
pub use protocol::{Request, RequestError, ServerStyle};
pub use server::{Server, ServerStats};
pub use topwin::{Outbox, TopWin, TopWinFlags, TopWinRegistry};
