#![forbid(unsafe_code)]

//! Canonical identifiers and event types shared by the server and clients.
//!
//! # Design Notes
//!
//! - Events flowing *into* the server from the input driver are
//!   [`InputEvent`]s; the server routes them to a window and forwards them
//!   inside a [`ClientEvent`].
//! - Everything a client receives is a [`ClientEvent`]: a target window plus a
//!   [`WindowEvent`] payload.
//! - Mouse coordinates are absolute screen coordinates.

use std::fmt;
use std::num::NonZeroU64;

use bitflags::bitflags;

use crate::geometry::Rect;
use crate::region::Region;

/// Stable identifier of a top-level window.
///
/// `0` is reserved so identifiers are always non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WindowId(NonZeroU64);

impl WindowId {
    /// Wrap a raw identifier, rejecting 0.
    pub const fn new(raw: u64) -> Option<Self> {
        match NonZeroU64::new(raw) {
            Some(raw) => Some(Self(raw)),
            None => None,
        }
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "win#{}", self.0)
    }
}

/// Stable identifier of a connected client application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(NonZeroU64);

impl ClientId {
    pub const fn new(raw: u64) -> Option<Self> {
        match NonZeroU64::new(raw) {
            Some(raw) => Some(Self(raw)),
            None => None,
        }
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client#{}", self.0)
    }
}

bitflags! {
    /// Mouse buttons held or changed by a [`MouseEvent`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MouseButtons: u8 {
        const LEFT   = 0b0001;
        const RIGHT  = 0b0010;
        const MIDDLE = 0b0100;
    }
}

bitflags! {
    /// Modifier keys held during a key event.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u8 {
        const NONE  = 0b0000;
        const SHIFT = 0b0001;
        const ALT   = 0b0010;
        const CTRL  = 0b0100;
    }
}

/// What happened to the pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseEventKind {
    Down,
    Up,
    Moved,
}

/// A pointer event in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MouseEvent {
    pub kind: MouseEventKind,
    pub buttons: MouseButtons,
    pub x: i32,
    pub y: i32,
}

impl MouseEvent {
    pub const fn down(x: i32, y: i32) -> Self {
        Self {
            kind: MouseEventKind::Down,
            buttons: MouseButtons::LEFT,
            x,
            y,
        }
    }

    pub const fn up(x: i32, y: i32) -> Self {
        Self {
            kind: MouseEventKind::Up,
            buttons: MouseButtons::LEFT,
            x,
            y,
        }
    }

    pub const fn moved(x: i32, y: i32) -> Self {
        Self {
            kind: MouseEventKind::Moved,
            buttons: MouseButtons::empty(),
            x,
            y,
        }
    }

    #[inline]
    pub const fn is_button(&self) -> bool {
        !matches!(self.kind, MouseEventKind::Moved)
    }
}

/// Key codes for keyboard events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    Char(char),
    Enter,
    Escape,
    Backspace,
    Tab,
    Up,
    Down,
    Left,
    Right,
    /// Raw scancode the driver could not map.
    Raw(u16),
}

/// Press or release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeyEventKind {
    #[default]
    Press,
    Release,
}

/// A keyboard event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyEvent {
    pub code: KeyCode,
    pub modifiers: Modifiers,
    pub kind: KeyEventKind,
}

impl KeyEvent {
    /// Create a key press with no modifiers.
    #[must_use]
    pub const fn new(code: KeyCode) -> Self {
        Self {
            code,
            modifiers: Modifiers::NONE,
            kind: KeyEventKind::Press,
        }
    }

    #[must_use]
    pub const fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    #[must_use]
    pub const fn with_kind(mut self, kind: KeyEventKind) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub fn is_char(&self, c: char) -> bool {
        matches!(self.code, KeyCode::Char(ch) if ch == c)
    }
}

/// Raw input produced by the input driver and routed by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Mouse(MouseEvent),
    Key(KeyEvent),
}

/// Payload of an event delivered to a window's owning client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowEvent {
    /// Run the local close sequence.
    Close,
    /// The window became the active window.
    Activate,
    /// The window stopped being the active window.
    Deactivate,
    /// The server recomputed the window's visible area (including decoration).
    ClipInfo { outer_clip: Region },
    /// Part of the window needs redrawing.
    Paint { dirty: Rect },
    /// Pointer input.
    Mouse(MouseEvent),
    /// Keyboard input.
    Key(KeyEvent),
}

impl WindowEvent {
    /// True for pointer and keyboard events.
    pub const fn is_input(&self) -> bool {
        matches!(self, Self::Mouse(_) | Self::Key(_))
    }

    /// Short name for logging.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Close => "CLOSE",
            Self::Activate => "ACTIVATE",
            Self::Deactivate => "DEACTIVATE",
            Self::ClipInfo { .. } => "CLIP_INFO",
            Self::Paint { .. } => "PAINT",
            Self::Mouse(m) if m.is_button() => "MOUSE_BUTTON",
            Self::Mouse(_) => "MOUSE_MOTION",
            Self::Key(_) => "KBD",
        }
    }
}

/// An event addressed to one window of a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientEvent {
    pub window: WindowId,
    pub event: WindowEvent,
}

impl ClientEvent {
    pub const fn new(window: WindowId, event: WindowEvent) -> Self {
        Self { window, event }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_reject_zero() {
        assert_eq!(WindowId::new(0), None);
        assert_eq!(WindowId::new(7).map(WindowId::get), Some(7));
        assert_eq!(ClientId::new(0), None);
    }

    #[test]
    fn optional_ids_cost_nothing() {
        assert_eq!(size_of::<Option<WindowId>>(), size_of::<u64>());
        assert_eq!(size_of::<Option<ClientId>>(), size_of::<u64>());
    }

    #[test]
    fn ids_display() {
        let id = WindowId::new(3).unwrap();
        assert_eq!(id.to_string(), "win#3");
        assert_eq!(ClientId::new(9).unwrap().to_string(), "client#9");
    }

    #[test]
    fn event_names_distinguish_mouse_kinds() {
        assert_eq!(
            WindowEvent::Mouse(MouseEvent::down(0, 0)).name(),
            "MOUSE_BUTTON"
        );
        assert_eq!(
            WindowEvent::Mouse(MouseEvent::moved(0, 0)).name(),
            "MOUSE_MOTION"
        );
        assert_eq!(
            WindowEvent::ClipInfo {
                outer_clip: Region::new()
            }
            .name(),
            "CLIP_INFO"
        );
    }

    #[test]
    fn input_classification() {
        assert!(WindowEvent::Key(KeyEvent::new(KeyCode::Enter)).is_input());
        assert!(!WindowEvent::Activate.is_input());
    }

    #[test]
    fn key_event_builders() {
        let key = KeyEvent::new(KeyCode::Char('q'))
            .with_modifiers(Modifiers::CTRL)
            .with_kind(KeyEventKind::Release);
        assert!(key.is_char('q'));
        assert!(key.modifiers.contains(Modifiers::CTRL));
        assert_eq!(key.kind, KeyEventKind::Release);
    }
}
