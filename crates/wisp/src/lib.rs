#![forbid(unsafe_code)]

//! wisp public facade crate.
//!
//! Re-exports the geometry and region types, the server task, and the client
//! window API from the internal crates, plus a prelude for applications.
//!
//! ```no_run
//! use wisp::prelude::*;
//!
//! let server = Server::spawn(ServerConfig::from_env()).expect("spawn");
//! let app = App::new(&server.handle(), AppConfig::new("demo")).expect("connect");
//! let main = Window::new(&app, None, Rect::new(10, 10, 100, 50), WinStyle::DECORATED);
//! main.show().expect("show");
//! let code = app.run().expect("run");
//! # let _ = code;
//! ```

// --- Core re-exports -------------------------------------------------------

pub use wisp_core::event::{
    ClientEvent, ClientId, InputEvent, KeyCode, KeyEvent, KeyEventKind, Modifiers, MouseButtons,
    MouseEvent, MouseEventKind, WindowEvent, WindowId,
};
pub use wisp_core::geometry::{Point, Rect, Sides};
pub use wisp_core::region::{Containment, Region, RegionError};

// --- Server re-exports -----------------------------------------------------

pub use wisp_server::{
    ChannelError, Connection, RequestError, Server, ServerConfig, ServerHandle, ServerStats,
    ServerStyle,
};

// --- Client re-exports -----------------------------------------------------

pub use wisp_client::{
    App, AppConfig, Chrome, ClientDc, Color, GraphicDriver, ModalCode, Panel, WinError, WinFlags,
    WinStyle, Widget, WidgetRef, Window, widget_ref,
};

// --- Logging ---------------------------------------------------------------

#[cfg(feature = "logging")]
pub mod logging;

// --- Prelude ---------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        App, AppConfig, InputEvent, KeyCode, KeyEvent, ModalCode, MouseEvent, Rect, Region,
        Server, ServerConfig, WinError, WinStyle, Window, WindowEvent,
    };

    pub use crate::{client, core, server};
}

pub use wisp_client as client;
pub use wisp_core as core;
pub use wisp_server as server;
