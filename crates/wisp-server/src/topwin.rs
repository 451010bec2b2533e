#![forbid(unsafe_code)]

//! Server-side registry of top-level windows.
//!
//! Every connected window has a [`TopWin`] record: its owner, its parent, its
//! outer extent, the outer clip last sent to the owner, and a *monitor list*
//! (outer extents of visible windows stacked above it that overlap it).
//!
//! # Invariants
//!
//! 1. `order` holds exactly the shown windows, topmost first, grouped in
//!    layers: `ON_TOP`, ordinary, `ON_BOTTOM`.
//! 2. A shown window's clip is its extent, cut to the screen, minus its
//!    monitors. Hidden windows have an empty clip.
//! 3. At most one window carries `ACTIVATE`, and it is shown.
//! 4. A window is `MODALED` iff its client's modal stack is non-empty and the
//!    window is neither the top of that stack nor one of its descendants.
//!
//! # Failure Modes
//!
//! Requests that restack windows or recompute clips run as a transaction over
//! a snapshot. If clip storage runs out part-way, the snapshot is restored, no
//! event is emitted, and the request fails with [`RequestError::OutOfMemory`].
//! Input that only needs forwarding is routed without a snapshot.

use std::collections::BTreeMap;

use bitflags::bitflags;
use wisp_core::event::{
    ClientEvent, ClientId, InputEvent, MouseEventKind, WindowEvent, WindowId,
};
use wisp_core::geometry::Rect;
use wisp_core::region::Region;

use crate::protocol::{RequestError, ServerStyle};

/// Events produced by one request, in delivery order.
pub type Outbox = Vec<(ClientId, ClientEvent)>;

bitflags! {
    /// Server-side window state.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TopWinFlags: u16 {
        const ACTIVATE    = 0x0001;
        const SHOWN       = 0x0004;
        /// Input is suspended by a modal window of the same client.
        const MODALED     = 0x0008;
        /// This window is running a modal scope.
        const MODALING    = 0x0100;
        const ON_TOP      = 0x0200;
        const ON_BOTTOM   = 0x0400;
        const NO_ACTIVATE = 0x0800;
    }
}

impl From<ServerStyle> for TopWinFlags {
    fn from(style: ServerStyle) -> Self {
        let mut flags = TopWinFlags::empty();
        flags.set(TopWinFlags::ON_TOP, style.contains(ServerStyle::ON_TOP));
        flags.set(TopWinFlags::ON_BOTTOM, style.contains(ServerStyle::ON_BOTTOM));
        flags.set(TopWinFlags::NO_ACTIVATE, style.contains(ServerStyle::NO_ACTIVATE));
        flags
    }
}

/// Server mirror of one window.
#[derive(Debug, Clone)]
pub struct TopWin {
    pub id: WindowId,
    pub client: ClientId,
    pub parent: Option<WindowId>,
    pub flags: TopWinFlags,
    /// Outer extent (content plus decoration).
    pub extent: Rect,
    /// Visible part of `extent`, as last sent to the owner.
    pub clip: Region,
    /// Extents of shown windows above this one that overlap it.
    pub monitors: Vec<Rect>,
}

impl TopWin {
    #[inline]
    pub fn is_shown(&self) -> bool {
        self.flags.contains(TopWinFlags::SHOWN)
    }

    fn layer(&self) -> u8 {
        if self.flags.contains(TopWinFlags::ON_TOP) {
            0
        } else if self.flags.contains(TopWinFlags::ON_BOTTOM) {
            2
        } else {
            1
        }
    }
}

/// Paint-ordered registry of every connected window.
#[derive(Debug, Clone)]
pub struct TopWinRegistry {
    screen: Rect,
    activate_on_show: bool,
    windows: BTreeMap<WindowId, TopWin>,
    order: Vec<WindowId>,
    active: Option<WindowId>,
    modal: BTreeMap<ClientId, Vec<WindowId>>,
}

struct Staged {
    id: WindowId,
    clip: Region,
    monitors: Vec<Rect>,
    paint: Option<Rect>,
}

impl TopWinRegistry {
    pub fn new(screen: Rect) -> Self {
        Self {
            screen,
            activate_on_show: true,
            windows: BTreeMap::new(),
            order: Vec::new(),
            active: None,
            modal: BTreeMap::new(),
        }
    }

    /// Whether `show` also activates the window.
    pub fn with_activate_on_show(mut self, enabled: bool) -> Self {
        self.activate_on_show = enabled;
        self
    }

    // ── Queries ─────────────────────────────────────────────────────────

    pub fn screen(&self) -> Rect {
        self.screen
    }

    pub fn get(&self, id: WindowId) -> Option<&TopWin> {
        self.windows.get(&id)
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Shown windows, topmost first.
    pub fn paint_order(&self) -> &[WindowId] {
        &self.order
    }

    pub fn active(&self) -> Option<WindowId> {
        self.active
    }

    /// Topmost shown window whose clip contains the point.
    pub fn window_at(&self, x: i32, y: i32) -> Option<WindowId> {
        self.order
            .iter()
            .copied()
            .find(|id| self.windows[id].clip.contains_point(x, y).is_some())
    }

    // ── Requests ────────────────────────────────────────────────────────

    pub fn create(
        &mut self,
        window: WindowId,
        client: ClientId,
        parent: Option<WindowId>,
        style: ServerStyle,
        outer_extent: Rect,
    ) -> Result<Outbox, RequestError> {
        if self.windows.contains_key(&window) {
            return Err(RequestError::AlreadyRegistered);
        }
        if let Some(parent) = parent
            && !self.windows.contains_key(&parent)
        {
            return Err(RequestError::UnknownWindow(parent));
        }
        self.windows.insert(
            window,
            TopWin {
                id: window,
                client,
                parent,
                flags: style.into(),
                extent: outer_extent,
                clip: Region::new(),
                monitors: Vec::new(),
            },
        );
        self.refresh_modal(client);
        tracing::debug!(%window, %client, ?parent, ?outer_extent, "topwin created");
        Ok(Outbox::new())
    }

    pub fn show(&mut self, window: WindowId) -> Result<Outbox, RequestError> {
        self.transact(|reg, out| reg.show_inner(window, out))
    }

    pub fn hide(&mut self, window: WindowId) -> Result<Outbox, RequestError> {
        self.transact(|reg, out| reg.hide_inner(window, out))
    }

    pub fn move_to(&mut self, window: WindowId, x: i32, y: i32) -> Result<Outbox, RequestError> {
        self.transact(|reg, out| {
            let extent = reg.lookup(window)?.extent.move_to(x, y);
            reg.place(window, extent, out)
        })
    }

    pub fn resize(&mut self, window: WindowId, outer_extent: Rect) -> Result<Outbox, RequestError> {
        self.transact(|reg, out| reg.place(window, outer_extent, out))
    }

    pub fn activate(&mut self, window: WindowId) -> Result<Outbox, RequestError> {
        self.transact(|reg, out| reg.activate_inner(window, out))
    }

    pub fn modal_enter(&mut self, window: WindowId) -> Result<Outbox, RequestError> {
        self.transact(|reg, out| {
            let win = reg.lookup(window)?;
            if !win.is_shown() {
                return Err(RequestError::NotShown(window));
            }
            let client = win.client;
            let stack = reg.modal.entry(client).or_default();
            stack.retain(|id| *id != window);
            stack.push(window);
            reg.lookup_mut(window)?.flags.insert(TopWinFlags::MODALING);
            reg.refresh_modal(client);
            tracing::debug!(%window, %client, "modal scope entered");
            if reg.active != Some(window) {
                reg.activate_inner(window, out)?;
            }
            Ok(())
        })
    }

    /// Forward a close request to the window's owner.
    pub fn close(&mut self, window: WindowId) -> Result<Outbox, RequestError> {
        let client = self.lookup(window)?.client;
        Ok(vec![(client, ClientEvent::new(window, WindowEvent::Close))])
    }

    pub fn destroy(&mut self, window: WindowId) -> Result<Outbox, RequestError> {
        self.transact(|reg, out| reg.destroy_inner(window, out))
    }

    /// Destroy every window owned by `client`.
    pub fn remove_client(&mut self, client: ClientId) -> Result<Outbox, RequestError> {
        self.transact(|reg, out| {
            let owned: Vec<WindowId> = reg
                .windows
                .values()
                .filter(|w| w.client == client)
                .map(|w| w.id)
                .collect();
            for id in owned {
                reg.destroy_inner(id, out)?;
            }
            reg.modal.remove(&client);
            // The client is gone; drop what was addressed to it.
            out.retain(|(to, _)| *to != client);
            Ok(())
        })
    }

    /// Route driver input to a window.
    ///
    /// Only a press that changes activation touches the registry; that part
    /// runs as an [`activate`](Self::activate) request.
    pub fn route_input(&mut self, input: InputEvent) -> Result<Outbox, RequestError> {
        match input {
            InputEvent::Mouse(mouse) => {
                let Some(target) = self.window_at(mouse.x, mouse.y) else {
                    tracing::trace!(x = mouse.x, y = mouse.y, "mouse outside every window");
                    return Ok(Outbox::new());
                };
                let win = self.lookup(target)?;
                let press = mouse.kind == MouseEventKind::Down;
                if win.flags.contains(TopWinFlags::MODALED) {
                    tracing::debug!(window = %target, "input dropped: window is modaled");
                    // Bring the blocking dialog forward instead.
                    return if press { self.activate(target) } else { Ok(Outbox::new()) };
                }
                let client = win.client;
                let raise = press
                    && !win.flags.contains(TopWinFlags::NO_ACTIVATE)
                    && self.active != Some(target);
                let mut out = if raise { self.activate(target)? } else { Outbox::new() };
                out.push((client, ClientEvent::new(target, WindowEvent::Mouse(mouse))));
                Ok(out)
            }
            InputEvent::Key(key) => {
                let Some(target) = self.active else {
                    return Ok(Outbox::new());
                };
                let win = self.lookup(target)?;
                if win.flags.contains(TopWinFlags::MODALED) {
                    tracing::debug!(window = %target, "key dropped: window is modaled");
                    return Ok(Outbox::new());
                }
                Ok(vec![(win.client, ClientEvent::new(target, WindowEvent::Key(key)))])
            }
        }
    }

    // ── Internals ───────────────────────────────────────────────────────

    fn transact(
        &mut self,
        op: impl FnOnce(&mut Self, &mut Outbox) -> Result<(), RequestError>,
    ) -> Result<Outbox, RequestError> {
        let snapshot = self.clone();
        let mut outbox = Outbox::new();
        match op(self, &mut outbox) {
            Ok(()) => Ok(outbox),
            Err(err) => {
                *self = snapshot;
                Err(err)
            }
        }
    }

    fn lookup(&self, id: WindowId) -> Result<&TopWin, RequestError> {
        self.windows.get(&id).ok_or(RequestError::UnknownWindow(id))
    }

    fn lookup_mut(&mut self, id: WindowId) -> Result<&mut TopWin, RequestError> {
        self.windows
            .get_mut(&id)
            .ok_or(RequestError::UnknownWindow(id))
    }

    fn is_descendant(&self, id: WindowId, ancestor: WindowId) -> bool {
        let mut cursor = self.windows.get(&id).and_then(|w| w.parent);
        // Parent links come from CREATE, which only accepts existing parents,
        // so the chain is acyclic.
        while let Some(parent) = cursor {
            if parent == ancestor {
                return true;
            }
            cursor = self.windows.get(&parent).and_then(|w| w.parent);
        }
        false
    }

    /// Shown descendants of `id`, in paint order.
    fn shown_descendants(&self, id: WindowId) -> Vec<WindowId> {
        self.order
            .iter()
            .copied()
            .filter(|w| self.is_descendant(*w, id))
            .collect()
    }

    /// Index at which a window of `layer` goes to the top of its layer.
    fn layer_top(&self, layer: u8) -> usize {
        self.order
            .iter()
            .position(|id| self.windows[id].layer() >= layer)
            .unwrap_or(self.order.len())
    }

    fn show_inner(&mut self, window: WindowId, out: &mut Outbox) -> Result<(), RequestError> {
        let win = self.lookup(window)?;
        if let Some(parent) = win.parent
            && self.windows.get(&parent).is_some_and(|p| !p.is_shown())
        {
            return Err(RequestError::ParentHidden { parent });
        }
        let wants_focus = self.activate_on_show
            && !win
                .flags
                .intersects(TopWinFlags::NO_ACTIVATE | TopWinFlags::ON_BOTTOM);
        if win.is_shown() {
            if wants_focus {
                self.activate_inner(window, out)?;
            }
            return Ok(());
        }

        let extent = win.extent;
        let layer = win.layer();
        let at = self.layer_top(layer);
        self.order.insert(at, window);
        self.lookup_mut(window)?.flags.insert(TopWinFlags::SHOWN);
        self.recompute(extent, None, out)?;
        tracing::debug!(%window, position = at, "topwin shown");

        if wants_focus {
            self.activate_inner(window, out)?;
        }
        Ok(())
    }

    fn hide_inner(&mut self, window: WindowId, out: &mut Outbox) -> Result<(), RequestError> {
        if !self.lookup(window)?.is_shown() {
            return Ok(());
        }
        let mut group = self.shown_descendants(window);
        group.push(window);

        let mut dirty = Rect::default();
        let mut clients = Vec::new();
        let mut lost_focus = false;
        for id in &group {
            let is_active = self.active == Some(*id);
            let win = self.lookup_mut(*id)?;
            dirty = dirty.union(&win.extent);
            win.flags
                .remove(TopWinFlags::SHOWN | TopWinFlags::ACTIVATE | TopWinFlags::MODALING);
            if !clients.contains(&win.client) {
                clients.push(win.client);
            }
            if is_active {
                lost_focus = true;
                // The requester clears its own flag; cascaded children are told.
                if *id != window {
                    out.push((win.client, ClientEvent::new(*id, WindowEvent::Deactivate)));
                }
            }
        }
        self.order.retain(|id| !group.contains(id));
        for stack in self.modal.values_mut() {
            stack.retain(|id| !group.contains(id));
        }
        for client in clients {
            self.refresh_modal(client);
        }
        if lost_focus {
            self.active = None;
        }
        tracing::debug!(%window, hidden = group.len(), "topwin hidden");

        self.recompute(dirty, None, out)?;
        if lost_focus {
            self.activate_next(out)?;
        }
        Ok(())
    }

    fn destroy_inner(&mut self, window: WindowId, out: &mut Outbox) -> Result<(), RequestError> {
        self.hide_inner(window, out)?;
        let Some(win) = self.windows.remove(&window) else {
            return Err(RequestError::UnknownWindow(window));
        };
        for other in self.windows.values_mut() {
            if other.parent == Some(window) {
                other.parent = None;
            }
        }
        for stack in self.modal.values_mut() {
            stack.retain(|id| *id != window);
        }
        self.refresh_modal(win.client);
        tracing::debug!(%window, client = %win.client, "topwin destroyed");
        Ok(())
    }

    fn place(&mut self, window: WindowId, extent: Rect, out: &mut Outbox) -> Result<(), RequestError> {
        let win = self.lookup_mut(window)?;
        let old = std::mem::replace(&mut win.extent, extent);
        if win.is_shown() {
            self.recompute(old.union(&extent), Some(window), out)?;
        }
        Ok(())
    }

    /// The window that should take focus when `window` is asked to.
    fn focus_target(&self, window: WindowId) -> WindowId {
        let Some(win) = self.windows.get(&window) else {
            return window;
        };
        if !win.flags.contains(TopWinFlags::MODALED) {
            return window;
        }
        self.modal
            .get(&win.client)
            .and_then(|stack| stack.last().copied())
            .filter(|top| self.windows.get(top).is_some_and(TopWin::is_shown))
            .unwrap_or(window)
    }

    fn activate_inner(&mut self, window: WindowId, out: &mut Outbox) -> Result<(), RequestError> {
        let target = self.focus_target(window);
        let win = self.lookup(target)?;
        if !win.is_shown() {
            return Err(RequestError::NotShown(target));
        }
        let client = win.client;
        let previous = self.active;

        if let Some(prev) = previous.filter(|p| *p != target)
            && let Some(prev_win) = self.windows.get_mut(&prev)
        {
            prev_win.flags.remove(TopWinFlags::ACTIVATE);
            out.push((prev_win.client, ClientEvent::new(prev, WindowEvent::Deactivate)));
        }

        self.raise(target, out)?;

        self.lookup_mut(target)?.flags.insert(TopWinFlags::ACTIVATE);
        self.active = Some(target);
        if previous != Some(target) {
            out.push((client, ClientEvent::new(target, WindowEvent::Activate)));
            tracing::debug!(window = %target, ?previous, "topwin activated");
        }
        Ok(())
    }

    /// Give focus to the topmost window willing to take it.
    fn activate_next(&mut self, out: &mut Outbox) -> Result<(), RequestError> {
        let next = self.order.iter().copied().find(|id| {
            !self.windows[id]
                .flags
                .intersects(TopWinFlags::NO_ACTIVATE | TopWinFlags::ON_BOTTOM)
        });
        match next {
            Some(id) => self.activate_inner(id, out),
            None => Ok(()),
        }
    }

    /// Move `window` and its shown descendants to the top of its layer.
    fn raise(&mut self, window: WindowId, out: &mut Outbox) -> Result<(), RequestError> {
        let win = self.lookup(window)?;
        if win.flags.contains(TopWinFlags::ON_BOTTOM) {
            return Ok(());
        }
        let layer = win.layer();
        let mut group: Vec<WindowId> = self
            .shown_descendants(window)
            .into_iter()
            .filter(|id| self.windows[id].layer() == layer)
            .collect();
        group.push(window);

        let before = self.order.clone();
        self.order.retain(|id| !group.contains(id));
        let at = self.layer_top(layer);
        for (offset, id) in group.iter().enumerate() {
            self.order.insert(at + offset, *id);
        }
        if self.order == before {
            return Ok(());
        }
        let dirty = group
            .iter()
            .fold(Rect::default(), |acc, id| acc.union(&self.windows[id].extent));
        self.recompute(dirty, None, out)
    }

    /// Recompute `MODALED` for every window of `client`.
    fn refresh_modal(&mut self, client: ClientId) {
        let top = self
            .modal
            .get(&client)
            .and_then(|stack| stack.last().copied());
        let blocked: Vec<(WindowId, bool)> = self
            .windows
            .values()
            .filter(|w| w.client == client)
            .map(|w| {
                let blocked = top.is_some_and(|t| t != w.id && !self.is_descendant(w.id, t));
                (w.id, blocked)
            })
            .collect();
        for (id, blocked) in blocked {
            if let Some(win) = self.windows.get_mut(&id) {
                win.flags.set(TopWinFlags::MODALED, blocked);
            }
        }
    }

    /// Rebuild clips after a change inside `dirty`.
    ///
    /// Windows that do not touch `dirty` and whose monitor list is unchanged
    /// keep their clip. `force_paint` gets a full repaint even if its visible
    /// area did not grow (its content moved).
    fn recompute(
        &mut self,
        dirty: Rect,
        force_paint: Option<WindowId>,
        out: &mut Outbox,
    ) -> Result<(), RequestError> {
        let mut staged = Vec::new();
        let mut above: Vec<Rect> = Vec::new();

        for id in &self.order {
            let win = &self.windows[id];
            let monitors: Vec<Rect> = above
                .iter()
                .filter(|r| r.intersects(&win.extent))
                .copied()
                .collect();
            above.push(win.extent);

            let forced = force_paint == Some(*id);
            if !forced && !win.extent.intersects(&dirty) && monitors == win.monitors {
                continue;
            }

            let mut clip = Region::from_rect(win.extent.intersection(&self.screen));
            for monitor in &monitors {
                clip.subtract_rect(monitor)
                    .map_err(|_| RequestError::OutOfMemory)?;
            }
            let paint = if forced {
                (!clip.is_empty()).then(|| clip.extents())
            } else {
                let gained = clip
                    .subtract(&win.clip)
                    .map_err(|_| RequestError::OutOfMemory)?;
                (!gained.is_empty()).then(|| gained.extents())
            };
            staged.push(Staged {
                id: *id,
                clip,
                monitors,
                paint,
            });
        }

        for win in self.windows.values() {
            if !win.is_shown() && !win.clip.is_empty() {
                staged.push(Staged {
                    id: win.id,
                    clip: Region::new(),
                    monitors: Vec::new(),
                    paint: None,
                });
            }
        }

        for Staged {
            id,
            clip,
            monitors,
            paint,
        } in staged
        {
            let Some(win) = self.windows.get_mut(&id) else {
                continue;
            };
            win.monitors = monitors;
            if win.clip != clip {
                tracing::trace!(window = %id, rects = clip.len(), "outer clip changed");
                win.clip = clip.clone();
                out.push((
                    win.client,
                    ClientEvent::new(id, WindowEvent::ClipInfo { outer_clip: clip }),
                ));
            }
            if let Some(dirty) = paint {
                out.push((win.client, ClientEvent::new(id, WindowEvent::Paint { dirty })));
            }
        }
        Ok(())
    }
}
