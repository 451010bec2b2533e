#![forbid(unsafe_code)]

//! Server configuration.

use std::env;

use wisp_core::geometry::Rect;

/// Default screen size when neither the caller nor the environment sets one.
pub const DEFAULT_SCREEN: Rect = Rect::from_size(320, 240);

/// Default number of requests that may be queued at once.
pub const DEFAULT_EVENT_POOL: usize = 64;

/// Configuration for [`Server::spawn`](crate::server::Server::spawn).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Screen surface owned by the server.
    pub screen: Rect,
    /// Capacity of the event record pool. A post beyond it fails with
    /// out-of-memory.
    pub event_pool: usize,
    /// Activate windows when they are shown.
    pub activate_on_show: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            screen: DEFAULT_SCREEN,
            event_pool: DEFAULT_EVENT_POOL,
            activate_on_show: true,
        }
    }
}

impl ServerConfig {
    /// Defaults, overridden by `WISP_SCREEN=WxH` and `WISP_EVENT_POOL=N`.
    ///
    /// Malformed values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = env::var("WISP_SCREEN") {
            match parse_screen(&raw) {
                Some(screen) => config.screen = screen,
                None => tracing::warn!(value = %raw, "ignoring malformed WISP_SCREEN"),
            }
        }
        if let Ok(raw) = env::var("WISP_EVENT_POOL") {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.event_pool = n,
                _ => tracing::warn!(value = %raw, "ignoring malformed WISP_EVENT_POOL"),
            }
        }
        config
    }

    #[must_use]
    pub fn with_screen(mut self, screen: Rect) -> Self {
        self.screen = screen;
        self
    }

    /// Set the event pool capacity. `0` is ignored with a warning.
    #[must_use]
    pub fn with_event_pool(mut self, capacity: usize) -> Self {
        if capacity == 0 {
            tracing::warn!("ignoring empty event pool capacity");
        } else {
            self.event_pool = capacity;
        }
        self
    }

    #[must_use]
    pub fn with_activate_on_show(mut self, enabled: bool) -> Self {
        self.activate_on_show = enabled;
        self
    }
}

fn parse_screen(raw: &str) -> Option<Rect> {
    let (w, h) = raw.trim().split_once(['x', 'X'])?;
    let width = w.trim().parse::<u16>().ok()?;
    let height = h.trim().parse::<u16>().ok()?;
    (width > 0 && height > 0).then(|| Rect::from_size(width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.screen, Rect::new(0, 0, 320, 240));
        assert_eq!(config.event_pool, 64);
        assert!(config.activate_on_show);
    }

    #[test]
    fn builders_override() {
        let config = ServerConfig::default()
            .with_screen(Rect::from_size(640, 480))
            .with_event_pool(8)
            .with_activate_on_show(false);
        assert_eq!(config.screen.width, 640);
        assert_eq!(config.event_pool, 8);
        assert!(!config.activate_on_show);
    }

    #[test]
    fn empty_event_pool_is_ignored() {
        let config = ServerConfig::default().with_event_pool(8).with_event_pool(0);
        assert_eq!(config.event_pool, 8);
    }

    #[test]
    fn screen_parsing() {
        assert_eq!(parse_screen("800x600"), Some(Rect::from_size(800, 600)));
        assert_eq!(parse_screen(" 128X64 "), Some(Rect::from_size(128, 64)));
        assert_eq!(parse_screen("0x10"), None);
        assert_eq!(parse_screen("wide"), None);
        assert_eq!(parse_screen("10x"), None);
    }
}
