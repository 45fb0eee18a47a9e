//! Lifecycle-bound message delivery.
//!
//! # Overview
//! A `LifecycleMailbox` is the single place where results from worker
//! threads meet the component that asked for them. Workers hold a
//! cloneable `MailboxHandle` and enqueue `Message`s; the owning context
//! drains them with `pump` and delivers them, in enqueue order, only while
//! the owner is alive.
//!
//! # Design
//! - Three life-states: `Active <-> Suspended -> Exited`. `Exited` is a sink;
//!   reaching it drops handlers, buffered and queued messages, and the owner
//!   resolver.
//! - While not `Active` (or while the parent mailbox is not `Active`),
//!   dispatched messages are buffered if pending mode is on and replayed
//!   synchronously by `awake`.
//! - The owner is never held strongly. A resolver returns `Some(owner)` while
//!   the owner exists; `None` is treated exactly like `Exited`.
//! - Parents are referenced through a `Liveness`, a weak read-only view of
//!   another mailbox's state. A dropped parent does not block delivery.
//! - Life-state, pending mode and the pending buffer sit behind one mutex per
//!   mailbox. The lock is never held while user code runs.
//! - Handlers are keyed by an `i32` tag. `WILDCARD_TAG` is reserved and only
//!   installed through `register_any`.

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::MailboxError;

/// Reserved tag matched by every message. Outside the range of tags an
/// application registers explicitly.
pub const WILDCARD_TAG: i32 = i32::MIN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifeState {
    Active,
    Suspended,
    Exited,
}

static NEXT_RUNNABLE_ID: AtomicU64 = AtomicU64::new(1);

/// A unit of work to run on the owning context.
///
/// Clones share the same id; `LifecycleMailbox::remove_callbacks` purges
/// every queued message carrying it.
#[derive(Clone)]
pub struct Runnable {
    id: u64,
    action: Arc<dyn Fn() + Send + Sync>,
}

impl Runnable {
    pub fn new(action: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            id: NEXT_RUNNABLE_ID.fetch_add(1, Ordering::Relaxed),
            action: Arc::new(action),
        }
    }

    /// Wrap a one-shot closure. Runs at most once however often the
    /// runnable is delivered.
    pub fn once(action: impl FnOnce() + Send + 'static) -> Self {
        let slot: Mutex<Option<Box<dyn FnOnce() + Send>>> = Mutex::new(Some(Box::new(action)));
        Self::new(move || {
            let action = slot.lock().take();
            if let Some(action) = action {
                action();
            }
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn run(&self) {
        (self.action)();
    }
}

impl fmt::Debug for Runnable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runnable").field("id", &self.id).finish()
    }
}

/// A tagged message with an optional payload and an optional primary
/// action.
#[derive(Clone, Default)]
pub struct Message {
    pub tag: i32,
    pub arg1: i64,
    pub arg2: i64,
    payload: Option<Arc<dyn Any + Send + Sync>>,
    callback: Option<Runnable>,
}

impl Message {
    pub fn new(tag: i32) -> Self {
        Self {
            tag,
            ..Self::default()
        }
    }

    pub fn with_args(mut self, arg1: i64, arg2: i64) -> Self {
        self.arg1 = arg1;
        self.arg2 = arg2;
        self
    }

    pub fn with_payload<T: Any + Send + Sync>(mut self, payload: T) -> Self {
        self.payload = Some(Arc::new(payload));
        self
    }

    pub fn with_callback(mut self, callback: Runnable) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.payload.as_deref()?.downcast_ref::<T>()
    }

    pub fn callback(&self) -> Option<&Runnable> {
        self.callback.as_ref()
    }

    fn callback_id(&self) -> Option<u64> {
        self.callback.as_ref().map(Runnable::id)
    }
}

impl From<Runnable> for Message {
    fn from(callback: Runnable) -> Self {
        Message::default().with_callback(callback)
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("tag", &self.tag)
            .field("arg1", &self.arg1)
            .field("arg2", &self.arg2)
            .field("has_payload", &self.payload.is_some())
            .field("callback", &self.callback)
            .finish()
    }
}

/// Handler invoked for every delivered message whose tag it matches.
pub type HandlerFn = Arc<dyn Fn(&Message) + Send + Sync>;

type Resolver<O> = Box<dyn Fn() -> Option<Arc<O>> + Send + Sync>;

struct Core {
    state: LifeState,
    pending_mode: bool,
    pending: Vec<Message>,
}

struct Shared {
    core: Mutex<Core>,
}

impl Shared {
    fn state(&self) -> LifeState {
        self.core.lock().state
    }
}

/// Weak, read-only view of a mailbox's life-state, used for parent checks.
#[derive(Clone)]
pub struct Liveness(Weak<Shared>);

impl Liveness {
    /// `None` once the mailbox behind it has been dropped.
    pub fn is_alive(&self) -> Option<bool> {
        self.0.upgrade().map(|shared| shared.state() == LifeState::Active)
    }
}

impl fmt::Debug for Liveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Liveness").field(&self.is_alive()).finish()
    }
}

struct Scheduled {
    due: Option<Instant>,
    message: Message,
}

impl Scheduled {
    fn is_due(&self, now: Instant) -> bool {
        self.due.map_or(true, |due| due <= now)
    }
}

/// Cloneable, `Send` entry point for worker threads.
#[derive(Clone)]
pub struct MailboxHandle {
    tx: mpsc::UnboundedSender<Scheduled>,
    shared: Arc<Shared>,
}

impl MailboxHandle {
    /// Enqueue `message` for the owning context. Returns `false` once the
    /// mailbox has exited; the message is dropped.
    pub fn send(&self, message: Message) -> bool {
        self.enqueue(None, message)
    }

    /// Enqueue `message` to run after `delay`. A delay past the clock's
    /// range is rejected and returns `false`.
    pub fn send_delayed(&self, message: Message, delay: Duration) -> bool {
        let Some(due) = Instant::now().checked_add(delay) else {
            warn!(tag = message.tag, ?delay, "delay out of range, dropping message");
            return false;
        };
        self.enqueue(Some(due), message)
    }

    pub fn post(&self, runnable: Runnable) -> bool {
        self.send(runnable.into())
    }

    pub fn post_delayed(&self, runnable: Runnable, delay: Duration) -> bool {
        self.send_delayed(runnable.into(), delay)
    }

    /// Run a one-shot closure on the owning context.
    pub fn post_once(&self, action: impl FnOnce() + Send + 'static) -> bool {
        self.post(Runnable::once(action))
    }

    pub fn is_exited(&self) -> bool {
        self.shared.state() == LifeState::Exited
    }

    fn enqueue(&self, due: Option<Instant>, message: Message) -> bool {
        if self.is_exited() {
            debug!(tag = message.tag, "mailbox exited, dropping message");
            return false;
        }
        self.tx.send(Scheduled { due, message }).is_ok()
    }
}

impl fmt::Debug for MailboxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailboxHandle")
            .field("state", &self.shared.state())
            .finish()
    }
}

#[derive(Default)]
struct HandlerTable {
    entries: Vec<(i32, HandlerFn)>,
    occupied: HashMap<i32, usize>,
}

impl HandlerTable {
    fn push(&mut self, tag: i32, handler: HandlerFn) {
        self.entries.push((tag, handler));
        *self.occupied.entry(tag).or_default() += 1;
    }

    fn contains(&self, tag: i32) -> bool {
        self.occupied.contains_key(&tag)
    }

    fn remove(&mut self, tags: &[i32]) {
        self.entries.retain(|(tag, _)| !tags.contains(tag));
        for tag in tags {
            self.occupied.remove(tag);
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.occupied.clear();
    }
}

fn check_tag(tag: i32) -> Result<(), MailboxError> {
    if tag == WILDCARD_TAG {
        return Err(MailboxError::ReservedTag(tag));
    }
    Ok(())
}

/// Per-component delivery target. Lives on, and is only touched from, the
/// owning context.
pub struct LifecycleMailbox<O> {
    shared: Arc<Shared>,
    owner: Option<Resolver<O>>,
    parent: Option<Liveness>,
    handlers: HandlerTable,
    tx: mpsc::UnboundedSender<Scheduled>,
    rx: mpsc::UnboundedReceiver<Scheduled>,
    queue: VecDeque<Scheduled>,
}

impl<O: Send + Sync + 'static> LifecycleMailbox<O> {
    /// Bind a mailbox to `owner` without keeping it alive.
    pub fn new(owner: &Arc<O>) -> Self {
        let weak = Arc::downgrade(owner);
        Self::with_resolver(move || weak.upgrade())
    }

    pub fn with_resolver(resolver: impl Fn() -> Option<Arc<O>> + Send + Sync + 'static) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared {
                core: Mutex::new(Core {
                    state: LifeState::Active,
                    pending_mode: true,
                    pending: Vec::new(),
                }),
            }),
            owner: Some(Box::new(resolver)),
            parent: None,
            handlers: HandlerTable::default(),
            tx,
            rx,
            queue: VecDeque::new(),
        }
    }

    /// Defer to `parent`: deliver only while the parent is `Active` or gone.
    pub fn with_parent(mut self, parent: Liveness) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn handle(&self) -> MailboxHandle {
        MailboxHandle {
            tx: self.tx.clone(),
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn liveness(&self) -> Liveness {
        Liveness(Arc::downgrade(&self.shared))
    }

    pub fn owner(&self) -> Option<Arc<O>> {
        self.owner.as_ref().and_then(|resolve| resolve())
    }

    pub fn state(&self) -> LifeState {
        self.shared.state()
    }

    pub fn is_alive(&self) -> bool {
        self.state() == LifeState::Active
    }

    pub fn pending_len(&self) -> usize {
        self.shared.core.lock().pending.len()
    }

    /// Toggle pending mode. Turning it off drops the buffer.
    pub fn set_pending(&self, enabled: bool) {
        let mut core = self.shared.core.lock();
        core.pending_mode = enabled;
        if !enabled {
            core.pending.clear();
        }
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Deliver now if the owner can take it, otherwise buffer it (pending
    /// mode) and purge queued copies of its callback.
    pub fn dispatch(&mut self, message: Message) {
        if self.owner().is_none() {
            debug!(tag = message.tag, "owner gone, dropping message");
            return;
        }
        if self.gate_open() {
            self.deliver(message);
            return;
        }

        let callback_id = message.callback_id();
        {
            let mut core = self.shared.core.lock();
            if core.state == LifeState::Exited {
                return;
            }
            if core.pending_mode {
                core.pending.push(message);
            }
        }
        if let Some(id) = callback_id {
            self.remove_callbacks(id);
        }
    }

    /// Run the primary action and every matching handler, if the owner is
    /// still alive. Messages that fail the check are dropped.
    pub fn deliver(&mut self, message: Message) {
        if !self.gate_open() || self.owner().is_none() {
            debug!(tag = message.tag, "owner not alive, dropping message");
            return;
        }
        if let Some(callback) = &message.callback {
            callback.run();
        }
        for (tag, handler) in &self.handlers.entries {
            if *tag == WILDCARD_TAG || *tag == message.tag {
                handler(&message);
            }
        }
    }

    fn gate_open(&self) -> bool {
        if self.state() != LifeState::Active {
            return false;
        }
        match &self.parent {
            None => true,
            Some(parent) => parent.is_alive().unwrap_or(true),
        }
    }

    /// Dispatch every queued message that is due, in enqueue order. Messages
    /// sent while pumping may be dispatched by the same call, since buffering
    /// a message drains the channel. Returns the number of messages
    /// dispatched.
    pub fn pump(&mut self) -> usize {
        self.drain_channel();
        let now = Instant::now();
        let mut dispatched = 0;
        while let Some(pos) = self.queue.iter().position(|s| s.is_due(now)) {
            if let Some(scheduled) = self.queue.remove(pos) {
                self.dispatch(scheduled.message);
                dispatched += 1;
            }
        }
        dispatched
    }

    /// Wait for the next message from a worker, then pump. Returns `false`
    /// once the mailbox has exited.
    pub async fn pump_next(&mut self) -> bool {
        if self.state() == LifeState::Exited {
            return false;
        }
        match self.rx.recv().await {
            Some(scheduled) => {
                self.queue.push_back(scheduled);
                self.pump();
                true
            }
            None => false,
        }
    }

    /// Drop every queued message whose callback has id `id`. Returns how
    /// many were removed.
    pub fn remove_callbacks(&mut self, id: u64) -> usize {
        self.drain_channel();
        let before = self.queue.len();
        self.queue.retain(|s| s.message.callback_id() != Some(id));
        before - self.queue.len()
    }

    fn drain_channel(&mut self) {
        while let Ok(scheduled) = self.rx.try_recv() {
            self.queue.push_back(scheduled);
        }
    }

    // -----------------------------------------------------------------------
    // Handler registration
    // -----------------------------------------------------------------------

    pub fn register_handler(
        &mut self,
        tag: i32,
        handler: impl Fn(&Message) + Send + Sync + 'static,
    ) -> Result<(), MailboxError> {
        check_tag(tag)?;
        self.handlers.push(tag, Arc::new(handler));
        Ok(())
    }

    /// Register `handler` for `tag`, failing if `tag` is already bound.
    pub fn register_single(
        &mut self,
        tag: i32,
        handler: impl Fn(&Message) + Send + Sync + 'static,
    ) -> Result<(), MailboxError> {
        check_tag(tag)?;
        if self.handlers.contains(tag) {
            return Err(MailboxError::DuplicateTag(tag));
        }
        self.handlers.push(tag, Arc::new(handler));
        Ok(())
    }

    /// Replace whatever is bound to `tag` with `handler`.
    pub fn register_override(
        &mut self,
        tag: i32,
        handler: impl Fn(&Message) + Send + Sync + 'static,
    ) -> Result<(), MailboxError> {
        check_tag(tag)?;
        self.handlers.remove(&[tag]);
        self.handlers.push(tag, Arc::new(handler));
        Ok(())
    }

    /// Bind one handler to several tags. Nothing is registered on error.
    pub fn register_multi(
        &mut self,
        handler: impl Fn(&Message) + Send + Sync + 'static,
        tags: &[i32],
    ) -> Result<(), MailboxError> {
        let mut seen = std::collections::HashSet::with_capacity(tags.len());
        for &tag in tags {
            check_tag(tag)?;
            if !seen.insert(tag) {
                return Err(MailboxError::DuplicateTags);
            }
        }
        let handler: HandlerFn = Arc::new(handler);
        for &tag in tags {
            self.handlers.push(tag, Arc::clone(&handler));
        }
        Ok(())
    }

    /// Register a handler that sees every delivered message.
    pub fn register_any(&mut self, handler: impl Fn(&Message) + Send + Sync + 'static) {
        self.handlers.push(WILDCARD_TAG, Arc::new(handler));
    }

    pub fn unregister(&mut self, tags: &[i32]) {
        self.handlers.remove(tags);
    }

    pub fn clear_handlers(&mut self) {
        self.handlers.clear();
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    pub fn suspend(&self) {
        let mut core = self.shared.core.lock();
        if core.state != LifeState::Exited {
            core.state = LifeState::Suspended;
            debug!("mailbox suspended");
        }
    }

    /// Reactivate and replay buffered messages in arrival order before
    /// returning. Replay goes through `dispatch`, so messages still held back
    /// by a suspended parent are buffered again. The buffer is emptied when
    /// the owner is gone.
    pub fn awake(&mut self) -> bool {
        let owner_present = self.owner().is_some();
        let replay = {
            let mut core = self.shared.core.lock();
            if owner_present && core.state != LifeState::Exited {
                core.state = LifeState::Active;
            }
            std::mem::take(&mut core.pending)
        };

        if owner_present && !replay.is_empty() {
            debug!(count = replay.len(), "replaying pending messages");
            for message in replay {
                self.dispatch(message);
            }
        }
        self.is_alive()
    }

    /// Terminal. Safe to call more than once.
    pub fn exit(&mut self) {
        {
            let mut core = self.shared.core.lock();
            if core.state == LifeState::Exited {
                return;
            }
            core.state = LifeState::Exited;
            core.pending.clear();
        }
        self.handlers.clear();
        self.rx.close();
        self.drain_channel();
        self.queue.clear();
        self.owner = None;
        debug!("mailbox exited");
    }
}

impl<O> fmt::Debug for LifecycleMailbox<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.shared.core.lock();
        f.debug_struct("LifecycleMailbox")
            .field("state", &core.state)
            .field("pending_mode", &core.pending_mode)
            .field("pending", &core.pending.len())
            .field("handlers", &self.handlers.entries.len())
            .field("queued", &self.queue.len())
            .finish()
    }
}
