#![forbid(unsafe_code)]

//! Top-level windows and their state machine.
//!
//! # Lifecycle
//!
//! ```text
//! new ──connect──▶ CONNECTED ──show──▶ SHOWN ⇄ ACTIVATE
//!                                        │
//!                                      close
//!                                        ▼
//!                                     CLOSED ──destroy──▶ DESTROYED
//! ```
//!
//! `MODAL` is orthogonal and only set while shown. Every transition that
//! touches server state is a blocking request, so local flags never run ahead
//! of the registry. `ACTIVATE` is only set when the server says so.
//!
//! # Re-entrancy
//!
//! Hooks may call back into the window, open modal windows, or close the
//! window they were called for. State borrows are therefore released before
//! any hook, widget, or nested run loop is invoked.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};

use bitflags::bitflags;
use smallvec::SmallVec;
use wisp_core::event::{KeyEvent, MouseEvent, MouseEventKind, WindowEvent, WindowId};
use wisp_core::geometry::Rect;
use wisp_core::region::Region;
use wisp_server::{ChannelError, Request, ServerStyle};

use crate::app::{App, AppInner};
use crate::dc::{ClientDc, GraphicDriver};
use crate::error::WinError;
use crate::title::Title;
use crate::widget::WidgetRef;

/// Upper bound on nested loops a single `end_modal` may unwind.
///
/// Reaching it means the nesting counter is corrupt.
pub const MODAL_UNWIND_LIMIT: u32 = 1000;

bitflags! {
    /// Window state.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct WinFlags: u16 {
        /// Registered with the server.
        const CONNECTED       = 1 << 0;
        const SHOWN           = 1 << 1;
        /// The server made this the active window.
        const ACTIVATE        = 1 << 2;
        const CLOSED          = 1 << 3;
        /// Running a modal loop.
        const MODAL           = 1 << 4;
        /// Blocked by another window's modal loop.
        const IN_MODAL        = 1 << 5;
        /// Mouse went down on the close box.
        const CB_PRESSED      = 1 << 6;
        /// A key event is being dispatched.
        const HANDLE_KEY      = 1 << 7;
        /// Destroy once the modal loop has unwound.
        const DESTROY_PENDING = 1 << 8;
        const DESTROYED       = 1 << 9;
    }
}

bitflags! {
    /// Window style.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct WinStyle: u16 {
        const BORDER           = 1 << 0;
        const TITLE            = 1 << 1;
        const CLOSEBOX         = 1 << 2;
        const DESTROY_ON_CLOSE = 1 << 3;
        /// Enter a modal loop when shown.
        const MODAL            = 1 << 4;
        const ON_TOP           = 1 << 5;
        const ON_BOTTOM        = 1 << 6;
        const NO_ACTIVATE      = 1 << 7;
    }
}

impl WinStyle {
    /// Bordered, titled, closable.
    pub const DECORATED: WinStyle = WinStyle::BORDER
        .union(WinStyle::TITLE)
        .union(WinStyle::CLOSEBOX);

    fn server_style(self) -> ServerStyle {
        let mut style = ServerStyle::empty();
        style.set(ServerStyle::ON_TOP, self.contains(WinStyle::ON_TOP));
        style.set(ServerStyle::ON_BOTTOM, self.contains(WinStyle::ON_BOTTOM));
        style.set(ServerStyle::NO_ACTIVATE, self.contains(WinStyle::NO_ACTIVATE));
        style
    }
}

/// Result of a modal loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModalCode {
    Ok = 0,
    Cancel = 1,
}

impl ModalCode {
    pub const fn code(self) -> i32 {
        self as i32
    }

    pub const fn from_code(code: i32) -> Self {
        if code == 0 { Self::Ok } else { Self::Cancel }
    }
}

type Hook = Rc<dyn Fn(&Window)>;
type CloseHook = Rc<dyn Fn(&Window) -> bool>;
type KeyHook = Rc<dyn Fn(&Window, &KeyEvent) -> bool>;
type PaintHook = Rc<dyn Fn(&Window, Rect)>;

#[derive(Default)]
struct Hooks {
    on_activate: Option<Hook>,
    on_deactivate: Option<Hook>,
    on_close: Option<CloseHook>,
    on_key: Option<KeyHook>,
    on_paint: Option<PaintHook>,
}

enum Focus {
    Window,
    Child(WidgetRef),
}

struct WindowState {
    flags: WinFlags,
    style: WinStyle,
    parent: Option<WindowId>,
    caption: String,
    extent: Rect,
    outer_extent: Rect,
    clip: Region,
    outer_clip: Region,
    title: Option<Title>,
    children: Vec<WidgetRef>,
    focus: Option<Focus>,
    last_mouse: Option<WidgetRef>,
    /// Loop level recorded by `enter_modal`; 0 when no modal loop is running.
    modal_level: u32,
    /// Windows this modal loop marked `IN_MODAL`.
    blocked: SmallVec<[WindowId; 4]>,
    hooks: Hooks,
}

impl WindowState {
    fn translate(&mut self, dx: i32, dy: i32) {
        self.extent = self.extent.translate(dx, dy);
        self.outer_extent = self.outer_extent.translate(dx, dy);
        if let Some(title) = self.title.as_mut() {
            title.translate(dx, dy);
        }
        for child in &self.children {
            child.borrow_mut().translate(dx, dy);
        }
    }
}

pub(crate) struct WindowCell {
    id: WindowId,
    app: Weak<AppInner>,
    state: RefCell<WindowState>,
}

impl WindowCell {
    pub(crate) fn id(&self) -> WindowId {
        self.id
    }
}

/// Handle to a top-level window. Clones refer to the same window.
#[derive(Clone)]
pub struct Window {
    cell: Rc<WindowCell>,
}

impl fmt::Debug for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("Window")
            .field("id", &self.cell.id)
            .field("flags", &state.flags)
            .field("extent", &state.extent)
            .finish()
    }
}

impl PartialEq for Window {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }
}

impl Eq for Window {}

fn child_at(children: &[WidgetRef], x: i32, y: i32) -> Option<WidgetRef> {
    children
        .iter()
        .rev()
        .find(|child| child.borrow().clip().contains_point(x, y).is_some())
        .cloned()
}

/// True if `window`'s parent chain reaches `ancestor`.
fn descends_from(app: &App, window: &Window, ancestor: WindowId) -> bool {
    // Parents exist before their children, so the chain is acyclic.
    let mut cursor = window.parent();
    while let Some(id) = cursor {
        if id == ancestor {
            return true;
        }
        cursor = app.window(id).and_then(|w| w.parent());
    }
    false
}

impl Window {
    /// Create a detached window for `extent` (content area, screen coordinates).
    ///
    /// Nothing is sent to the server until [`connect`](Self::connect) or
    /// [`show`](Self::show).
    pub fn new(app: &App, parent: Option<&Window>, extent: Rect, style: WinStyle) -> Self {
        let chrome = app.config().chrome;
        let bordered = style.contains(WinStyle::BORDER);
        let titled = style.contains(WinStyle::TITLE);
        let outer_extent = chrome.outer_extent(extent, bordered, titled);
        let title = if titled {
            Some(Title::new(chrome, outer_extent, style.contains(WinStyle::CLOSEBOX)))
        } else {
            bordered.then(|| Title::framed(chrome, outer_extent))
        };
        let id = app.server().next_window_id();

        let cell = Rc::new(WindowCell {
            id,
            app: app.downgrade(),
            state: RefCell::new(WindowState {
                flags: WinFlags::empty(),
                style,
                parent: parent.map(Window::id),
                caption: app.config().name.clone(),
                extent,
                outer_extent,
                clip: Region::new(),
                outer_clip: Region::new(),
                title,
                children: Vec::new(),
                focus: None,
                last_mouse: None,
                modal_level: 0,
                blocked: SmallVec::new(),
                hooks: Hooks::default(),
            }),
        });
        app.adopt(Rc::clone(&cell));
        tracing::debug!(window = %id, ?extent, ?outer_extent, ?style, "window created");
        Self { cell }
    }

    pub(crate) fn from_cell(cell: Rc<WindowCell>) -> Self {
        Self { cell }
    }

    fn app(&self) -> Result<App, WinError> {
        self.cell
            .app
            .upgrade()
            .map(App::from_inner)
            .ok_or(WinError::AppGone)
    }

    fn state(&self) -> Ref<'_, WindowState> {
        self.cell.state.borrow()
    }

    fn state_mut(&self) -> RefMut<'_, WindowState> {
        self.cell.state.borrow_mut()
    }

    fn set_flags(&self, flags: WinFlags, on: bool) {
        self.state_mut().flags.set(flags, on);
    }

    fn ensure_live(&self) -> Result<(), WinError> {
        if self.flags().contains(WinFlags::DESTROYED) {
            Err(WinError::Destroyed)
        } else {
            Ok(())
        }
    }

    // ── Accessors ───────────────────────────────────────────────────────

    pub fn id(&self) -> WindowId {
        self.cell.id
    }

    pub fn flags(&self) -> WinFlags {
        self.state().flags
    }

    pub fn style(&self) -> WinStyle {
        self.state().style
    }

    pub fn parent(&self) -> Option<WindowId> {
        self.state().parent
    }

    /// Content rectangle.
    pub fn extent(&self) -> Rect {
        self.state().extent
    }

    /// Content plus decoration.
    pub fn outer_extent(&self) -> Rect {
        self.state().outer_extent
    }

    /// Visible part of the content.
    pub fn clip(&self) -> Region {
        self.state().clip.clone()
    }

    /// Visible part of the outer extent, as last reported by the server.
    pub fn outer_clip(&self) -> Region {
        self.state().outer_clip.clone()
    }

    /// Visible part of the decoration.
    pub fn title_clip(&self) -> Option<Region> {
        self.state().title.as_ref().map(|t| t.clip().clone())
    }

    pub fn title_needs_repaint(&self) -> bool {
        self.state().title.as_ref().is_some_and(Title::needs_repaint)
    }

    pub fn is_connected(&self) -> bool {
        self.flags().contains(WinFlags::CONNECTED)
    }

    pub fn is_shown(&self) -> bool {
        self.flags().contains(WinFlags::SHOWN)
    }

    pub fn is_active(&self) -> bool {
        self.flags().contains(WinFlags::ACTIVATE)
    }

    pub fn is_closed(&self) -> bool {
        self.flags().contains(WinFlags::CLOSED)
    }

    pub fn is_modal(&self) -> bool {
        self.flags().contains(WinFlags::MODAL)
    }

    pub fn title(&self) -> String {
        self.state().caption.clone()
    }

    pub fn set_title(&self, caption: impl Into<String>) {
        let mut state = self.state_mut();
        state.caption = caption.into();
        if let Some(title) = state.title.as_mut() {
            title.invalidate();
        }
    }

    // ── Hooks ───────────────────────────────────────────────────────────

    pub fn on_activate(&self, hook: impl Fn(&Window) + 'static) {
        self.state_mut().hooks.on_activate = Some(Rc::new(hook));
    }

    pub fn on_deactivate(&self, hook: impl Fn(&Window) + 'static) {
        self.state_mut().hooks.on_deactivate = Some(Rc::new(hook));
    }

    /// Close veto: return `false` to refuse a non-forced close.
    pub fn on_close(&self, hook: impl Fn(&Window) -> bool + 'static) {
        self.state_mut().hooks.on_close = Some(Rc::new(hook));
    }

    /// Keys not consumed by the focused child.
    pub fn on_key(&self, hook: impl Fn(&Window, &KeyEvent) -> bool + 'static) {
        self.state_mut().hooks.on_key = Some(Rc::new(hook));
    }

    pub fn on_paint(&self, hook: impl Fn(&Window, Rect) + 'static) {
        self.state_mut().hooks.on_paint = Some(Rc::new(hook));
    }

    // ── Children ────────────────────────────────────────────────────────

    /// Attach a child widget and clip it to the window.
    pub fn add_child(&self, widget: WidgetRef) -> Result<(), WinError> {
        self.ensure_live()?;
        let clip = self.state().clip.clone();
        widget.borrow_mut().update_clip(&clip)?;
        self.state_mut().children.push(widget);
        Ok(())
    }

    /// Give keyboard focus to `widget`, or to the window itself.
    pub fn set_focus(&self, widget: Option<WidgetRef>) {
        self.state_mut().focus = Some(match widget {
            Some(w) => Focus::Child(w),
            None => Focus::Window,
        });
    }

    // ── Transitions ─────────────────────────────────────────────────────

    /// Register with the server. The parent is connected first.
    pub fn connect(&self) -> Result<(), WinError> {
        self.ensure_live()?;
        if self.is_connected() {
            return Ok(());
        }
        let app = self.app()?;
        let (parent, style, outer_extent) = {
            let state = self.state();
            (state.parent, state.style, state.outer_extent)
        };
        if let Some(parent) = parent.and_then(|id| app.window(id)) {
            parent.connect()?;
        }
        app.send(Request::Create {
            window: self.id(),
            client: app.client(),
            parent,
            style: style.server_style(),
            outer_extent,
        })?;
        self.set_flags(WinFlags::CONNECTED, true);
        tracing::debug!(window = %self.id(), "window connected");
        Ok(())
    }

    /// Show the window, connecting it first if needed.
    ///
    /// A modal-styled window then runs its modal loop before this returns.
    pub fn show(&self) -> Result<(), WinError> {
        self.ensure_live()?;
        if self.is_closed() {
            return Err(WinError::Closed);
        }
        if self.is_shown() {
            return Ok(());
        }
        let app = self.app()?;
        self.connect()?;

        self.set_flags(WinFlags::SHOWN, true);
        if let Err(err) = app.send(Request::Show { window: self.id() }) {
            self.set_flags(WinFlags::SHOWN, false);
            tracing::error!(window = %self.id(), %err, "show failed");
            return Err(err);
        }
        let modal = {
            let mut state = self.state_mut();
            state.focus.get_or_insert(Focus::Window);
            state.style.contains(WinStyle::MODAL)
        };
        app.claim_main(self.id());
        tracing::debug!(window = %self.id(), "window shown");

        if modal {
            self.enter_modal()?;
        }
        Ok(())
    }

    pub fn hide(&self) -> Result<(), WinError> {
        self.ensure_live()?;
        let flags = self.flags();
        if !flags.contains(WinFlags::SHOWN | WinFlags::CONNECTED) {
            return Ok(());
        }
        self.app()?.send(Request::Hide { window: self.id() })?;
        let mut state = self.state_mut();
        state.flags.remove(WinFlags::SHOWN | WinFlags::ACTIVATE);
        if let Some(title) = state.title.as_mut() {
            title.set_active(false);
        }
        Ok(())
    }

    /// Ask the server to make this the active window.
    pub fn activate(&self) -> Result<(), WinError> {
        self.ensure_live()?;
        self.app()?.send(Request::Activate { window: self.id() })
    }

    /// Close the window.
    ///
    /// The close hook runs first; if it refuses and `force` is false the
    /// window stays open and `Ok(false)` is returned.
    pub fn close(&self, force: bool) -> Result<bool, WinError> {
        self.ensure_live()?;
        if self.is_closed() {
            return Ok(true);
        }
        let app = self.app()?;
        let veto = self.state().hooks.on_close.clone();
        if let Some(veto) = veto
            && !veto(self)
            && !force
        {
            tracing::debug!(window = %self.id(), "close refused");
            return Ok(false);
        }

        if let Err(err) = self.hide() {
            if !force {
                return Err(err);
            }
            tracing::warn!(window = %self.id(), %err, "hide failed; closing anyway");
            let mut state = self.state_mut();
            state.flags.remove(WinFlags::SHOWN | WinFlags::ACTIVATE);
            if let Some(title) = state.title.as_mut() {
                title.set_active(false);
            }
        }
        let (modal, destroy) = {
            let mut state = self.state_mut();
            state.flags.insert(WinFlags::CLOSED);
            state.flags.remove(WinFlags::CB_PRESSED);
            (
                state.flags.contains(WinFlags::MODAL),
                state.style.contains(WinStyle::DESTROY_ON_CLOSE),
            )
        };
        tracing::debug!(window = %self.id(), modal, "window closed");
        if modal {
            self.end_modal(ModalCode::Cancel);
        }
        app.window_closed();
        if destroy {
            self.destroy()?;
        }
        Ok(true)
    }

    /// Close (forced) and release the window.
    ///
    /// If the window's modal loop is still on the stack, the release is
    /// deferred until it unwinds.
    pub fn destroy(&self) -> Result<(), WinError> {
        if self.flags().contains(WinFlags::DESTROYED) {
            return Ok(());
        }
        if !self.is_closed() {
            self.close(true)?;
            if self.flags().contains(WinFlags::DESTROYED) {
                return Ok(());
            }
        }
        if self.state().modal_level > 0 {
            self.set_flags(WinFlags::DESTROY_PENDING, true);
            self.end_modal(ModalCode::Cancel);
            return Ok(());
        }
        self.free()
    }

    fn free(&self) -> Result<(), WinError> {
        {
            let state = self.state();
            assert!(
                !state.flags.contains(WinFlags::MODAL) && state.modal_level == 0,
                "{} freed while its modal loop is running",
                self.id()
            );
        }
        let app = self.app();
        let result = match &app {
            Ok(app) if self.is_connected() => {
                match app.send(Request::Destroy { window: self.id() }) {
                    // The registry went with the server.
                    Err(WinError::Channel(ChannelError::Disconnected)) => {
                        tracing::debug!(window = %self.id(), "server gone; nothing to release");
                        Ok(())
                    }
                    other => other,
                }
            }
            _ => Ok(()),
        };
        {
            let mut state = self.state_mut();
            state.flags = (state.flags & WinFlags::CLOSED) | WinFlags::DESTROYED;
            state.children.clear();
            state.focus = None;
            state.last_mouse = None;
            state.hooks = Hooks::default();
        }
        if let Ok(app) = app {
            app.release(self.id());
        }
        tracing::debug!(window = %self.id(), "window destroyed");
        result
    }

    /// Move so that the decoration (or the content, if undecorated) starts
    /// at `(x, y)`.
    ///
    /// The window is treated as hidden while the server applies the move.
    /// The clip is not rebuilt here; it follows when the server reports the
    /// new clip.
    pub fn move_to(&self, x: i32, y: i32) -> Result<(), WinError> {
        self.ensure_live()?;
        if self.is_closed() {
            return Err(WinError::Closed);
        }
        let app = self.app()?;
        let (dx, dy, was_shown, connected, outer) = {
            let mut state = self.state_mut();
            let anchor = state
                .title
                .as_ref()
                .map_or(state.extent.origin(), |t| t.extent().origin());
            let (dx, dy) = (x - anchor.x, y - anchor.y);
            state.translate(dx, dy);
            let was_shown = state.flags.contains(WinFlags::SHOWN);
            state.flags.remove(WinFlags::SHOWN);
            (
                dx,
                dy,
                was_shown,
                state.flags.contains(WinFlags::CONNECTED),
                state.outer_extent,
            )
        };

        let result = if connected {
            app.send(Request::Move {
                window: self.id(),
                x: outer.x,
                y: outer.y,
            })
        } else {
            Ok(())
        };

        let mut state = self.state_mut();
        if result.is_err() {
            state.translate(-dx, -dy);
        }
        state.flags.set(WinFlags::SHOWN, was_shown);
        result
    }

    /// Replace the content rectangle. The server is told without waiting.
    pub fn set_rect(&self, extent: Rect) -> Result<(), WinError> {
        self.ensure_live()?;
        let app = self.app()?;
        let chrome = app.config().chrome;
        let (outer_extent, connected) = {
            let mut state = self.state_mut();
            let outer = chrome.outer_extent(
                extent,
                state.style.contains(WinStyle::BORDER),
                state.style.contains(WinStyle::TITLE),
            );
            state.extent = extent;
            state.outer_extent = outer;
            if let Some(title) = state.title.as_mut() {
                title.set_extent(outer);
            }
            (outer, state.flags.contains(WinFlags::CONNECTED))
        };
        if connected {
            app.post(Request::Resize {
                window: self.id(),
                outer_extent,
            })?;
        }
        Ok(())
    }

    // ── Modal loop ──────────────────────────────────────────────────────

    /// Run a nested event loop until [`end_modal`](Self::end_modal).
    ///
    /// The application's other windows, except this window's descendants,
    /// ignore input until the loop ends. The window is hidden afterwards.
    ///
    /// # Panics
    ///
    /// If this window's modal loop is already running.
    pub fn enter_modal(&self) -> Result<ModalCode, WinError> {
        self.ensure_live()?;
        assert!(
            self.state().modal_level == 0,
            "{} is already running a modal loop",
            self.id()
        );
        let app = self.app()?;
        let id = self.id();
        app.send(Request::ModalEnter { window: id })?;

        let level = app.depth() + 1;
        let blocked: SmallVec<[WindowId; 4]> = app
            .windows_except(id)
            .into_iter()
            .filter(|w| !w.flags().contains(WinFlags::IN_MODAL) && !descends_from(&app, w, id))
            .map(|w| {
                w.set_flags(WinFlags::IN_MODAL, true);
                w.id()
            })
            .collect();
        {
            let mut state = self.state_mut();
            state.modal_level = level;
            state.blocked = blocked;
            state.flags.insert(WinFlags::MODAL);
        }
        tracing::debug!(window = %id, level, "modal loop entered");

        let outcome = app.run();

        let (blocked, destroy_pending) = {
            let mut state = self.state_mut();
            state.flags.remove(WinFlags::MODAL);
            state.modal_level = 0;
            (
                std::mem::take(&mut state.blocked),
                state.flags.contains(WinFlags::DESTROY_PENDING),
            )
        };
        for other in blocked.iter().filter_map(|id| app.window(*id)) {
            other.set_flags(WinFlags::IN_MODAL, false);
        }
        tracing::debug!(window = %id, level, ok = outcome.is_ok(), "modal loop left");

        let hidden = self.hide();
        if destroy_pending {
            self.free()?;
        }
        let code = outcome?;
        hidden?;
        Ok(ModalCode::from_code(code))
    }

    /// Unwind this window's modal loop with `code`. No-op unless modal.
    ///
    /// # Panics
    ///
    /// If more than [`MODAL_UNWIND_LIMIT`] nested loops sit above the modal
    /// loop.
    pub fn end_modal(&self, code: ModalCode) {
        let (modal, level) = {
            let state = self.state();
            (state.flags.contains(WinFlags::MODAL), state.modal_level)
        };
        if !modal {
            return;
        }
        if let Ok(app) = self.app() {
            let mut unwound = 0;
            while app.depth() > level {
                unwound += 1;
                assert!(
                    unwound <= MODAL_UNWIND_LIMIT,
                    "modal unwind of {} exceeded {MODAL_UNWIND_LIMIT} levels",
                    self.id()
                );
                app.exit(0);
            }
            if app.depth() == level {
                app.exit(code.code());
            }
            tracing::debug!(window = %self.id(), level, unwound, ?code, "modal loop ending");
        }
        self.set_flags(WinFlags::MODAL, false);
    }

    // ── Clipping and drawing ────────────────────────────────────────────

    /// Rebuild the content and decoration clips from the outer clip, then
    /// every child's clip from the content clip.
    pub fn update_clip(&self) -> Result<(), WinError> {
        self.ensure_live()?;
        let (children, clip) = {
            let mut state = self.state_mut();
            if state.flags.contains(WinFlags::CLOSED) {
                return Ok(());
            }
            let outer = state.outer_clip.clone();
            let extent = state.extent;
            if let Some(title) = state.title.as_mut() {
                title.update_clip(&outer, extent)?;
            }
            let mut clip = outer;
            clip.intersect_rect(&extent)?;
            state.clip = clip.clone();
            (state.children.clone(), clip)
        };
        for child in children {
            child.borrow_mut().update_clip(&clip)?;
        }
        Ok(())
    }

    /// Draw into the content area. Coordinates are relative to the content
    /// origin.
    pub fn with_dc<D, R>(&self, driver: &mut D, draw: impl FnOnce(&mut ClientDc<'_, D>) -> R) -> R
    where
        D: GraphicDriver + ?Sized,
    {
        let (origin, clip) = {
            let state = self.state();
            (state.extent.origin(), state.clip.clone())
        };
        let mut dc = ClientDc::new(driver, origin, clip);
        draw(&mut dc)
    }

    /// Repaint the decoration if it is marked. Returns whether it drew.
    pub fn paint_title<D: GraphicDriver + ?Sized>(&self, driver: &mut D) -> bool {
        self.state_mut()
            .title
            .as_mut()
            .is_some_and(|title| title.paint(driver))
    }

    // ── Event handling ──────────────────────────────────────────────────

    pub(crate) fn handle_event(&self, event: WindowEvent) {
        if self.flags().contains(WinFlags::DESTROYED) {
            return;
        }
        match event {
            WindowEvent::Close => {
                if let Err(err) = self.close(false) {
                    tracing::warn!(window = %self.id(), %err, "close failed");
                }
            }
            WindowEvent::Activate => self.handle_activate(),
            WindowEvent::Deactivate => self.handle_deactivate(),
            WindowEvent::ClipInfo { outer_clip } => {
                self.state_mut().outer_clip = outer_clip;
                if let Err(err) = self.update_clip() {
                    tracing::warn!(window = %self.id(), %err, "clip update failed");
                }
            }
            WindowEvent::Paint { dirty } => self.handle_paint(dirty),
            WindowEvent::Mouse(mouse) => self.handle_mouse(mouse),
            WindowEvent::Key(key) => self.handle_key(key),
        }
    }

    fn handle_activate(&self) {
        let hook = {
            let mut state = self.state_mut();
            let ignored = state.flags.intersects(WinFlags::IN_MODAL | WinFlags::CLOSED)
                || !state.flags.contains(WinFlags::SHOWN);
            if ignored {
                tracing::debug!(window = %self.id(), flags = ?state.flags, "activate ignored");
                return;
            }
            state.flags.insert(WinFlags::ACTIVATE);
            if let Some(title) = state.title.as_mut() {
                title.set_active(true);
            }
            state.hooks.on_activate.clone()
        };
        if let Some(hook) = hook {
            hook(self);
        }
    }

    fn handle_deactivate(&self) {
        let hook = {
            let mut state = self.state_mut();
            if state.flags.contains(WinFlags::CLOSED) {
                return;
            }
            state.flags.remove(WinFlags::ACTIVATE);
            // No paint is guaranteed to follow, so schedule the title here.
            if let Some(title) = state.title.as_mut() {
                title.set_active(false);
            }
            state.hooks.on_deactivate.clone()
        };
        if let Some(hook) = hook {
            hook(self);
        }
    }

    fn handle_paint(&self, dirty: Rect) {
        let (children, hook) = {
            let mut state = self.state_mut();
            if let Some(title) = state.title.as_mut()
                && title.extent().intersects(&dirty)
            {
                title.invalidate();
            }
            (state.children.clone(), state.hooks.on_paint.clone())
        };
        let paint = WindowEvent::Paint { dirty };
        for child in children {
            let touches = child.borrow().extent().intersects(&dirty);
            if touches {
                child.borrow_mut().handle_event(&paint);
            }
        }
        if let Some(hook) = hook {
            hook(self, dirty);
        }
    }

    fn handle_mouse(&self, mouse: MouseEvent) {
        let (x, y) = (mouse.x, mouse.y);
        let mut state = self.state_mut();
        if state.flags.intersects(WinFlags::IN_MODAL | WinFlags::CLOSED) {
            tracing::debug!(window = %self.id(), "mouse dropped");
            return;
        }

        if state.extent.contains(x, y) {
            let target = match mouse.kind {
                MouseEventKind::Up => state
                    .last_mouse
                    .take()
                    .or_else(|| child_at(&state.children, x, y)),
                MouseEventKind::Down => {
                    let target = child_at(&state.children, x, y);
                    state.last_mouse.clone_from(&target);
                    target
                }
                MouseEventKind::Moved => child_at(&state.children, x, y),
            };
            drop(state);
            if let Some(target) = target {
                target.borrow_mut().handle_event(&WindowEvent::Mouse(mouse));
            }
            return;
        }

        let on_close_box = state
            .title
            .as_ref()
            .is_some_and(|title| title.hit_close_box(x, y));
        match mouse.kind {
            MouseEventKind::Down if on_close_box => {
                state.flags.insert(WinFlags::CB_PRESSED);
            }
            MouseEventKind::Up => {
                let pressed = state.flags.contains(WinFlags::CB_PRESSED);
                state.flags.remove(WinFlags::CB_PRESSED);
                drop(state);
                if pressed
                    && on_close_box
                    && let Err(err) = self.close(false)
                {
                    tracing::warn!(window = %self.id(), %err, "close box failed");
                }
            }
            _ => {}
        }
    }

    fn handle_key(&self, key: KeyEvent) {
        let (focused, hook) = {
            let mut state = self.state_mut();
            let blocked = state
                .flags
                .intersects(WinFlags::IN_MODAL | WinFlags::CLOSED | WinFlags::HANDLE_KEY);
            if blocked {
                tracing::debug!(window = %self.id(), "key dropped");
                return;
            }
            state.flags.insert(WinFlags::HANDLE_KEY);
            let focused = match &state.focus {
                Some(Focus::Child(widget)) => Some(Rc::clone(widget)),
                Some(Focus::Window) | None => None,
            };
            (focused, state.hooks.on_key.clone())
        };

        let consumed = focused.is_some_and(|widget| widget.borrow_mut().handle_event(&WindowEvent::Key(key)));
        if !consumed && let Some(hook) = hook {
            hook(self, &key);
        }
        self.set_flags(WinFlags::HANDLE_KEY, false);
    }
}
