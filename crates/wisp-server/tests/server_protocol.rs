//! End-to-end protocol tests against a real server thread.

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use wisp_core::event::{ClientEvent, MouseEvent, WindowEvent, WindowId};
use wisp_core::{InputEvent, Rect};
use wisp_server::{
    ChannelError, Connection, Request, RequestError, Server, ServerConfig, ServerHandle,
    ServerStyle,
};

const WAIT: Duration = Duration::from_secs(5);

fn create(conn: &Connection, parent: Option<WindowId>, rect: Rect) -> Result<WindowId, ChannelError> {
    let window = conn.server().next_window_id();
    conn.server().send(Request::Create {
        window,
        client: conn.client(),
        parent,
        style: ServerStyle::empty(),
        outer_extent: rect,
    })?;
    Ok(window)
}

fn drain(conn: &Connection) -> Vec<ClientEvent> {
    std::iter::from_fn(|| conn.try_recv()).collect()
}

fn names(events: &[ClientEvent], window: WindowId) -> Vec<&'static str> {
    events
        .iter()
        .filter(|e| e.window == window)
        .map(|e| e.event.name())
        .collect()
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::prelude::*;
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::from_env("WISP_LOG"))
        .try_init();
}

// ═════════════════════════════════════════════════════════════════════════
// Ordering
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn posted_create_is_visible_to_following_show() {
    init_tracing();
    let server = Server::spawn(ServerConfig::default()).unwrap();
    let conn = server.handle().connect("poster").unwrap();
    let handle = conn.server().clone();

    // Everything posted; only the last call waits.
    let window = handle.next_window_id();
    handle
        .post(Request::Create {
            window,
            client: conn.client(),
            parent: None,
            style: ServerStyle::empty(),
            outer_extent: Rect::new(0, 0, 40, 40),
        })
        .unwrap();
    handle.post(Request::Move { window, x: 5, y: 5 }).unwrap();
    handle.send(Request::Show { window }).unwrap();

    let events = drain(&conn);
    let clip = events
        .iter()
        .find_map(|e| match &e.event {
            WindowEvent::ClipInfo { outer_clip } => Some(outer_clip.extents()),
            _ => None,
        })
        .unwrap();
    assert_eq!(clip, Rect::new(5, 5, 40, 40));
}

#[test]
fn concurrent_clients_are_serialised() {
    let server = Server::spawn(ServerConfig::default().with_event_pool(256)).unwrap();
    let handle = server.handle();
    let barrier = Arc::new(Barrier::new(4));

    let workers: Vec<_> = (0..4)
        .map(|i| {
            let handle: ServerHandle = handle.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let conn = handle.connect(format!("worker-{i}")).unwrap();
                barrier.wait();
                let mut windows = Vec::new();
                for j in 0..8 {
                    let rect = Rect::new(i * 60 + j, j * 20, 50, 30);
                    let window = create(&conn, None, rect).unwrap();
                    conn.server().send(Request::Show { window }).unwrap();
                    windows.push(window);
                }
                for window in &windows {
                    conn.server().send(Request::Hide { window: *window }).unwrap();
                }
                windows.len()
            })
        })
        .collect();

    let total: usize = workers.into_iter().map(|w| w.join().unwrap()).sum();
    assert_eq!(total, 32);
    let stats = server.join().unwrap();
    assert_eq!(stats.rejected, 0);
    assert!(stats.processed >= 4 * (8 * 3 + 1));
}

// ═════════════════════════════════════════════════════════════════════════
// Rejection
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn showing_child_of_hidden_parent_fails() {
    let server = Server::spawn(ServerConfig::default()).unwrap();
    let conn = server.handle().connect("app").unwrap();
    let parent = create(&conn, None, Rect::new(0, 0, 100, 100)).unwrap();
    let child = create(&conn, Some(parent), Rect::new(10, 10, 20, 20)).unwrap();

    assert_eq!(
        conn.server().send(Request::Show { window: child }),
        Err(ChannelError::Rejected(RequestError::ParentHidden { parent }))
    );
    assert!(drain(&conn).is_empty());

    conn.server().send(Request::Show { window: parent }).unwrap();
    conn.server().send(Request::Show { window: child }).unwrap();
    let events = drain(&conn);
    assert_eq!(names(&events, child), ["CLIP_INFO", "PAINT", "ACTIVATE"]);
}

#[test]
fn unknown_window_is_rejected() {
    let server = Server::spawn(ServerConfig::default()).unwrap();
    let handle = server.handle();
    let ghost = handle.next_window_id();
    assert_eq!(
        handle.send(Request::Hide { window: ghost }),
        Err(ChannelError::Rejected(RequestError::UnknownWindow(ghost)))
    );
}

// ═════════════════════════════════════════════════════════════════════════
// Input and clients
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn input_is_routed_to_the_window_under_the_pointer() {
    let server = Server::spawn(ServerConfig::default()).unwrap();
    let left = server.handle().connect("left").unwrap();
    let right = server.handle().connect("right").unwrap();
    let a = create(&left, None, Rect::new(0, 0, 100, 100)).unwrap();
    let b = create(&right, None, Rect::new(150, 0, 100, 100)).unwrap();
    left.server().send(Request::Show { window: a }).unwrap();
    right.server().send(Request::Show { window: b }).unwrap();
    drain(&left);
    drain(&right);

    let handle = server.handle();
    handle
        .inject(InputEvent::Mouse(MouseEvent::down(20, 20)))
        .unwrap();
    let event = left.recv_timeout(WAIT).unwrap();
    assert_eq!(event, ClientEvent::new(a, WindowEvent::Activate));
    let event = left.recv_timeout(WAIT).unwrap();
    assert_eq!(event.event.name(), "MOUSE_BUTTON");
    assert_eq!(
        right.recv_timeout(WAIT).unwrap(),
        ClientEvent::new(b, WindowEvent::Deactivate)
    );
}

#[test]
fn disconnect_releases_screen_area() {
    let server = Server::spawn(ServerConfig::default()).unwrap();
    let below = server.handle().connect("below").unwrap();
    let above = server.handle().connect("above").unwrap();
    let a = create(&below, None, Rect::new(0, 0, 100, 100)).unwrap();
    let b = create(&above, None, Rect::new(0, 0, 100, 100)).unwrap();
    below.server().send(Request::Show { window: a }).unwrap();
    above.server().send(Request::Show { window: b }).unwrap();
    drain(&below);

    drop(above);
    let mut regained = false;
    while let Ok(event) = below.recv_timeout(WAIT) {
        if let WindowEvent::ClipInfo { outer_clip } = &event.event {
            regained = outer_clip.area() == 100 * 100;
            break;
        }
    }
    assert!(regained);
}
