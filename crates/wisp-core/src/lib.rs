#![forbid(unsafe_code)]

//! Core: geometry, clip-region algebra, and the client/server event taxonomy.
//!
//! # Role in wisp
//! `wisp-core` has no I/O and no threads. The server crate builds its
//! top-window registry on [`region::Region`]; the client crate uses the same
//! type for window and widget clips.

pub mod event;
pub mod geometry;
pub mod region;

pub use event::{
    ClientEvent, ClientId, InputEvent, KeyCode, KeyEvent, KeyEventKind, Modifiers, MouseButtons,
    MouseEvent, MouseEventKind, WindowEvent, WindowId,
};
pub use geometry::{Point, Rect, Sides};
pub use region::{Containment, Region, RegionError};
