#![forbid(unsafe_code)]

//! Requests accepted by the server task and the errors it answers with.

use std::fmt;
use std::sync::mpsc;

use bitflags::bitflags;
use wisp_core::event::{ClientEvent, ClientId, InputEvent, WindowId};
use wisp_core::geometry::Rect;

bitflags! {
    /// Stacking hints carried by `CREATE`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ServerStyle: u8 {
        /// Always stacked above ordinary windows.
        const ON_TOP      = 0b0001;
        /// Always stacked below ordinary windows and never raised.
        const ON_BOTTOM   = 0b0010;
        /// Not activated when shown.
        const NO_ACTIVATE = 0b0100;
    }
}

/// A message for the server task.
#[derive(Debug)]
pub enum Request {
    /// Attach a client mailbox.
    Register {
        client: ClientId,
        name: String,
        mailbox: mpsc::Sender<ClientEvent>,
    },
    /// Detach a client and destroy every window it still owns.
    Unregister { client: ClientId },
    /// Register a window (hidden) with its initial outer extent.
    Create {
        window: WindowId,
        client: ClientId,
        parent: Option<WindowId>,
        style: ServerStyle,
        outer_extent: Rect,
    },
    Show { window: WindowId },
    Hide { window: WindowId },
    /// Move the window's outer origin to `(x, y)`.
    Move { window: WindowId, x: i32, y: i32 },
    /// Replace the window's outer extent.
    Resize { window: WindowId, outer_extent: Rect },
    Activate { window: WindowId },
    ModalEnter { window: WindowId },
    /// Ask the owner to run its close sequence.
    Close { window: WindowId },
    Destroy { window: WindowId },
    /// Raw input from the driver.
    Input(InputEvent),
    Shutdown,
}

impl Request {
    /// Protocol name for logging.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Register { .. } => "REGISTER",
            Self::Unregister { .. } => "UNREGISTER",
            Self::Create { .. } => "CREATE",
            Self::Show { .. } => "SHOW",
            Self::Hide { .. } => "HIDE",
            Self::Move { .. } => "MOVE",
            Self::Resize { .. } => "RESIZE",
            Self::Activate { .. } => "ACTIVATE",
            Self::ModalEnter { .. } => "MODAL_ENTER",
            Self::Close { .. } => "CLOSE",
            Self::Destroy { .. } => "DESTROY",
            Self::Input(_) => "INPUT",
            Self::Shutdown => "SHUTDOWN",
        }
    }

    /// The window the request targets, if any.
    pub const fn window(&self) -> Option<WindowId> {
        match self {
            Self::Create { window, .. }
            | Self::Show { window }
            | Self::Hide { window }
            | Self::Move { window, .. }
            | Self::Resize { window, .. }
            | Self::Activate { window }
            | Self::ModalEnter { window }
            | Self::Close { window }
            | Self::Destroy { window } => Some(*window),
            Self::Register { .. } | Self::Unregister { .. } | Self::Input(_) | Self::Shutdown => {
                None
            }
        }
    }
}

/// Reasons the server rejects a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestError {
    UnknownWindow(WindowId),
    UnknownClient(ClientId),
    AlreadyRegistered,
    /// A window cannot be shown while its parent is hidden.
    ParentHidden { parent: WindowId },
    /// The operation needs a visible window.
    NotShown(WindowId),
    /// Clip storage could not be grown; the registry is unchanged.
    OutOfMemory,
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownWindow(id) => write!(f, "{id} is not registered"),
            Self::UnknownClient(id) => write!(f, "{id} is not connected"),
            Self::AlreadyRegistered => write!(f, "identifier already registered"),
            Self::ParentHidden { parent } => {
                write!(f, "cannot show a window while its parent {parent} is hidden")
            }
            Self::NotShown(id) => write!(f, "{id} is not shown"),
            Self::OutOfMemory => write!(f, "server clip storage exhausted"),
        }
    }
}

impl std::error::Error for RequestError {}
