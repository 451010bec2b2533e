#![forbid(unsafe_code)]

//! Client side of wisp: applications, windows, and clipped drawing.
//!
//! # Role in wisp
//! A client thread builds an [`App`] on a server handle, creates [`Window`]s,
//! and calls [`App::run`]. Window transitions (show, hide, move, modal entry)
//! block until the server has applied them; clip and input events flow back
//! through the app's event loop.
//!
//! ```no_run
//! use wisp_client::{App, AppConfig, Window, WinStyle};
//! use wisp_core::Rect;
//! use wisp_server::{Server, ServerConfig};
//!
//! let server = Server::spawn(ServerConfig::default()).expect("spawn");
//! let app = App::new(&server.handle(), AppConfig::new("hello")).expect("connect");
//! let window = Window::new(&app, None, Rect::new(10, 10, 100, 50), WinStyle::DECORATED);
//! window.on_close(|_| true);
//! window.show().expect("show");
//! let code = app.run().expect("run");
//! # let _ = code;
//! ```

pub mod app;
pub mod dc;
pub mod error;
pub mod title;
pub mod widget;
pub mod window;

pub use app::{App, AppConfig};
pub use dc::{ClientDc, Color, GraphicDriver};
pub use error::WinError;
pub use title::{Chrome, Title};
pub use widget::{Panel, Widget, WidgetRef, widget_ref};
pub use window::{MODAL_UNWIND_LIMIT, ModalCode, WinFlags, WinStyle, Window};
