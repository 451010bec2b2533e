//! Modal loops: blocking, nesting, and unwinding.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use wisp_client::{App, AppConfig, ModalCode, Panel, WinFlags, WinStyle, Window};
use wisp_core::Rect;
use wisp_core::event::{InputEvent, KeyCode, KeyEvent, MouseEvent};
use wisp_server::{Server, ServerConfig};

const LEVELS: usize = 16;

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::prelude::*;
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::from_env("WISP_LOG"))
        .try_init();
}

fn start(name: &str) -> (Server, App) {
    init_tracing();
    let server = Server::spawn(ServerConfig::default()).unwrap();
    let app = App::new(&server.handle(), AppConfig::new(name)).unwrap();
    (server, app)
}

/// Main window with a content-filling panel that counts pointer events.
fn main_window(app: &App) -> (Window, Rc<Cell<u32>>) {
    let window = Window::new(app, None, Rect::new(10, 10, 100, 50), WinStyle::DECORATED);
    let clicks = Rc::new(Cell::new(0));
    let seen = Rc::clone(&clicks);
    let panel = Panel::new(Rect::new(10, 10, 100, 50)).with_handler(move |_| {
        seen.set(seen.get() + 1);
        true
    });
    window.add_child(Rc::new(RefCell::new(panel))).unwrap();
    window.show().unwrap();
    app.dispatch_pending();
    (window, clicks)
}

fn dialog(app: &App, style: WinStyle) -> Window {
    Window::new(app, None, Rect::new(150, 100, 80, 40), WinStyle::DECORATED | style)
}

#[test]
fn modal_dialog_blocks_main_window_until_ended() {
    let (server, app) = start("modal");
    let (main, clicks) = main_window(&app);
    assert!(main.is_active());

    let dialog = dialog(&app, WinStyle::empty());
    let blocked_seen = Rc::new(Cell::new(false));
    let main_active_at_key = Rc::new(Cell::new(true));
    {
        let (main, seen, handle) = (main.clone(), Rc::clone(&blocked_seen), server.handle());
        dialog.on_activate(move |_| {
            seen.set(main.flags().contains(WinFlags::IN_MODAL));
            // A click on the blocked window, then a key for the dialog.
            handle
                .inject(InputEvent::Mouse(MouseEvent::down(50, 40)))
                .unwrap();
            handle
                .inject(InputEvent::Mouse(MouseEvent::up(50, 40)))
                .unwrap();
            handle
                .inject(InputEvent::Key(KeyEvent::new(KeyCode::Enter)))
                .unwrap();
        });
    }
    {
        let (main, active) = (main.clone(), Rc::clone(&main_active_at_key));
        dialog.on_key(move |this, key| {
            if key.code != KeyCode::Enter {
                return false;
            }
            active.set(main.is_active());
            this.end_modal(ModalCode::Ok);
            true
        });
    }

    dialog.show().unwrap();
    assert_eq!(dialog.enter_modal(), Ok(ModalCode::Ok));

    assert_eq!(app.depth(), 0);
    assert!(blocked_seen.get());
    assert!(!main_active_at_key.get());
    assert_eq!(clicks.get(), 0);
    assert!(!dialog.is_shown());
    assert!(!dialog.is_modal());
    assert!(!main.flags().contains(WinFlags::IN_MODAL));

    // Focus returns to the main window once the dialog is gone.
    app.dispatch_pending();
    assert!(main.is_active());
}

#[test]
fn modal_style_runs_loop_inside_show() {
    let (server, app) = start("modal-style");
    let (main, _) = main_window(&app);
    let dialog = dialog(&app, WinStyle::MODAL);
    let handle = server.handle();
    dialog.on_activate(move |_| {
        handle
            .inject(InputEvent::Key(KeyEvent::new(KeyCode::Escape)))
            .unwrap();
    });
    dialog.on_key(|this, _| {
        this.end_modal(ModalCode::Cancel);
        true
    });

    dialog.show().unwrap();
    assert_eq!(app.depth(), 0);
    assert!(!dialog.is_shown());
    assert!(!main.flags().contains(WinFlags::IN_MODAL));
}

#[test]
fn closing_modal_dialog_cancels_it() {
    let (server, app) = start("modal-close");
    let (main, _) = main_window(&app);
    let dialog = dialog(&app, WinStyle::empty());
    let handle = server.handle();
    dialog.on_activate(move |this| {
        handle.request_close(this.id()).unwrap();
    });

    dialog.show().unwrap();
    assert_eq!(dialog.enter_modal(), Ok(ModalCode::Cancel));
    assert!(dialog.is_closed());
    assert_eq!(app.depth(), 0);
    assert_eq!(app.window_count(), 1);
    assert!(main.is_shown());
}

#[test]
fn destroying_running_dialog_defers_release() {
    let (server, app) = start("modal-destroy");
    let (_main, _) = main_window(&app);
    let dialog = dialog(&app, WinStyle::empty());
    let id = dialog.id();
    let handle = server.handle();
    dialog.on_activate(move |_| {
        handle
            .inject(InputEvent::Key(KeyEvent::new(KeyCode::Char('d'))))
            .unwrap();
    });
    dialog.on_key(|this, _| {
        this.destroy().unwrap();
        // Still referenced by the modal loop below us.
        assert!(this.flags().contains(WinFlags::DESTROY_PENDING));
        assert!(!this.flags().contains(WinFlags::DESTROYED));
        true
    });

    dialog.show().unwrap();
    assert_eq!(dialog.enter_modal(), Ok(ModalCode::Cancel));
    assert!(dialog.flags().contains(WinFlags::DESTROYED));
    assert_eq!(app.window(id), None);
    assert_eq!(app.depth(), 0);
}

fn open_level(
    app: &App,
    level: usize,
    dialogs: &Rc<RefCell<Vec<Window>>>,
    codes: &Rc<RefCell<Vec<ModalCode>>>,
) -> Window {
    let offset = 10 + i32::try_from(level).unwrap() * 4;
    let dialog = Window::new(
        app,
        None,
        Rect::new(offset, offset + 20, 60, 30),
        WinStyle::DECORATED,
    );
    dialogs.borrow_mut().push(dialog.clone());

    let (app, dialogs, codes) = (app.clone(), Rc::clone(dialogs), Rc::clone(codes));
    let opened = Cell::new(false);
    dialog.on_activate(move |_| {
        if opened.replace(true) {
            return;
        }
        if level + 1 < LEVELS {
            let next = open_level(&app, level + 1, &dialogs, &codes);
            next.show().unwrap();
            let code = next.enter_modal().unwrap();
            codes.borrow_mut().push(code);
        } else {
            assert_eq!(app.depth(), u32::try_from(LEVELS).unwrap());
            let outermost = dialogs.borrow()[0].clone();
            outermost.end_modal(ModalCode::Cancel);
            assert_eq!(app.depth(), 0);
        }
    });
    dialog
}

#[test]
fn outermost_end_modal_unwinds_every_level() {
    let (_server, app) = start("nested");
    let (main, _) = main_window(&app);
    let dialogs = Rc::new(RefCell::new(Vec::new()));
    let codes = Rc::new(RefCell::new(Vec::new()));

    let first = open_level(&app, 0, &dialogs, &codes);
    first.show().unwrap();
    assert_eq!(first.enter_modal(), Ok(ModalCode::Cancel));

    assert_eq!(app.depth(), 0);
    assert_eq!(dialogs.borrow().len(), LEVELS);
    assert_eq!(codes.borrow().len(), LEVELS - 1);
    for dialog in dialogs.borrow().iter() {
        assert!(!dialog.is_shown());
        assert!(!dialog.is_modal());
        assert!(!dialog.flags().contains(WinFlags::IN_MODAL));
    }
    assert!(!main.flags().contains(WinFlags::IN_MODAL));

    app.dispatch_pending();
    assert!(main.is_active());
}
