#![forbid(unsafe_code)]

use std::fmt;

use wisp_core::region::RegionError;
use wisp_server::{ChannelError, RequestError};

/// Errors returned by window and application operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WinError {
    /// The request never reached the server, or no answer came back.
    Channel(ChannelError),
    /// The server refused the request.
    Rejected(RequestError),
    /// A clip could not be rebuilt.
    Region(RegionError),
    /// The window has been destroyed.
    Destroyed,
    /// The owning application is gone.
    AppGone,
    /// The window is closed.
    Closed,
}

impl fmt::Display for WinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Channel(err) => write!(f, "channel error: {err}"),
            Self::Rejected(err) => write!(f, "request rejected: {err}"),
            Self::Region(err) => write!(f, "clip error: {err}"),
            Self::Destroyed => write!(f, "window destroyed"),
            Self::AppGone => write!(f, "application dropped"),
            Self::Closed => write!(f, "window closed"),
        }
    }
}

impl std::error::Error for WinError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Channel(err) => Some(err),
            Self::Rejected(err) => Some(err),
            Self::Region(err) => Some(err),
            Self::Destroyed | Self::AppGone | Self::Closed => None,
        }
    }
}

impl From<ChannelError> for WinError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::Rejected(err) => Self::Rejected(err),
            other => Self::Channel(other),
        }
    }
}

impl From<RegionError> for WinError {
    fn from(err: RegionError) -> Self {
        Self::Region(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn server_rejection_is_unwrapped() {
        let err: WinError = ChannelError::Rejected(RequestError::AlreadyRegistered).into();
        assert_eq!(err, WinError::Rejected(RequestError::AlreadyRegistered));
        assert!(err.source().is_some());
        let err: WinError = ChannelError::TimedOut.into();
        assert_eq!(err, WinError::Channel(ChannelError::TimedOut));
    }
}
