//! Deferred, re-resolvable references between objects.
//!
//! An [`Attachment`] lets an object point at another object by [`Key`]
//! before the target exists.  It is always in exactly one of two states:
//!
//! ```text
//!            set(key) / target destroyed
//!        ┌───────────────────────────────────┐
//!        ▼                                   │
//!   Unresolved(Option<Key>) ──resolve()──▶ Resolved(Key, ObjectHandle)
//!                               (attach hook)      (detach hook on clear)
//! ```
//!
//! The attach hook tells the target that the owner now observes it; the
//! detach hook undoes that.  Resolution is idempotent and a lookup miss is
//! not an error: the attachment simply stays unresolved and the owner
//! retries on a later tick.
//!
//! When a target is destroyed the registry calls
//! [`Attachment::unresolve_any`] on every live attachment, which drops the
//! handle but keeps the key, so the attachment re-binds if an object with
//! the same key is registered later.  That broadcast only reaches objects
//! held by the registry, so attachments are only constructed inside the
//! crate, by registered owners.
//!
//! An attachment may be restricted to one [`ObjectClass`]; a target of any
//! other class is never bound and never sees the owner's hooks.

use log::{debug, warn};

use crate::identity::{Key, KeyString, ObjectClass};
use crate::objects::{Object, ObjectCast};
use crate::registry::{ObjectHandle, Registry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Link {
    Unresolved(Option<Key>),
    Resolved(Key, ObjectHandle),
}

/// Anything an attachment can be pointed at.
#[derive(Debug, Clone, Copy)]
pub enum AttachTarget<'a> {
    /// Clear the attachment.
    Nothing,
    Key(Key),
    /// A name or a persisted `#xxxxxxxx` key string.
    Name(&'a str),
    /// A live object in the registry.
    Handle(ObjectHandle),
    /// Whatever another attachment points at.
    Attachment(&'a Attachment),
}

impl From<Key> for AttachTarget<'_> {
    fn from(key: Key) -> Self {
        Self::Key(key)
    }
}

impl<'a> From<&'a str> for AttachTarget<'a> {
    fn from(name: &'a str) -> Self {
        Self::Name(name)
    }
}

impl From<ObjectHandle> for AttachTarget<'_> {
    fn from(handle: ObjectHandle) -> Self {
        Self::Handle(handle)
    }
}

impl<'a> From<&'a Attachment> for AttachTarget<'a> {
    fn from(other: &'a Attachment) -> Self {
        Self::Attachment(other)
    }
}

/// A reference from an owner object to a target object, by key.
#[derive(Debug, Clone)]
pub struct Attachment {
    /// Key of the owning object; `None` for owners outside the registry
    /// (activation handles), which get no hooks.
    owner: Option<Key>,
    /// Only targets of this class bind.
    class: Option<ObjectClass>,
    link: Link,
    /// Name the attachment was set by, kept for persistence.
    name: Option<KeyString>,
}

impl Attachment {
    /// An unset attachment owned by `owner`.
    pub(crate) const fn new(owner: Option<Key>) -> Self {
        Self {
            owner,
            class: None,
            link: Link::Unresolved(None),
            name: None,
        }
    }

    /// Restrict binding to targets of `class`.
    pub(crate) fn accepting(mut self, class: ObjectClass) -> Self {
        self.class = Some(class);
        self
    }

    /// An unresolved attachment restored from a persisted key string.
    /// An empty string yields an unset attachment.
    pub(crate) fn from_key_string(owner: Option<Key>, s: &str) -> Self {
        let mut attachment = Self::new(owner);
        if !s.is_empty() {
            attachment.link = Link::Unresolved(Some(Key::parse(s)));
            attachment.name = name_of(s);
        }
        attachment
    }

    // ── Mutation ──────────────────────────────────────────────

    /// Point the attachment at `target`.
    ///
    /// If the target differs from the current one, the old target is
    /// detached, the new one stored, and resolution attempted immediately.
    /// Returns `true` if anything changed (so the owner can mark its
    /// configuration dirty).
    pub fn set<'a>(&mut self, target: impl Into<AttachTarget<'a>>, registry: &mut Registry) -> bool {
        let (key, handle, name) = match target.into() {
            AttachTarget::Nothing => (None, None, None),
            AttachTarget::Key(key) => (Some(key), None, None),
            AttachTarget::Name(s) if s.is_empty() => (None, None, None),
            AttachTarget::Name(s) => (Some(Key::parse(s)), None, name_of(s)),
            AttachTarget::Handle(handle) => match registry.key_of(handle) {
                Some(key) => (Some(key), Some(handle), None),
                None => {
                    warn!("Attachment: ignoring stale handle {:?}", handle);
                    return false;
                }
            },
            AttachTarget::Attachment(other) => (other.key(), other.handle(), other.name.clone()),
        };

        if key == self.key() {
            if name.is_some() {
                self.name = name;
            }
            return false;
        }

        self.detach(registry);
        self.name = name;
        self.link = Link::Unresolved(key);

        if let Some(handle) = handle.filter(|h| registry.is_live(*h)) {
            if let Some(key) = key {
                self.try_bind(key, handle, registry);
            }
        } else {
            self.resolve(registry);
        }
        true
    }

    /// Clear the attachment, detaching the current target.
    pub fn clear(&mut self, registry: &mut Registry) -> bool {
        self.set(AttachTarget::Nothing, registry)
    }

    /// Try to bind to the target.  Returns whether a live target is held.
    ///
    /// Idempotent: an already resolved attachment returns `true` without
    /// firing the attach hook again.
    pub fn resolve(&mut self, registry: &mut Registry) -> bool {
        match self.link {
            Link::Resolved(_, handle) if registry.is_live(handle) => true,
            Link::Resolved(key, _) | Link::Unresolved(Some(key)) => {
                self.link = Link::Unresolved(Some(key));
                match registry.lookup(key) {
                    Some(handle) => self.try_bind(key, handle, registry),
                    None => false,
                }
            }
            Link::Unresolved(None) => false,
        }
    }

    /// Drop the resolved target (firing the detach hook) but keep the key.
    pub fn detach(&mut self, registry: &mut Registry) {
        if let Link::Resolved(key, handle) = self.link {
            if let (Some(owner), Some(target)) = (self.owner, registry.get_mut(handle)) {
                target.on_detached(owner);
            }
            self.link = Link::Unresolved(Some(key));
        }
    }

    /// The target under `key` is being destroyed.  Returns `true` if this
    /// attachment was resolved to it.
    pub fn unresolve_any(&mut self, key: Key) -> bool {
        match self.link {
            Link::Resolved(k, _) if k == key => {
                self.link = Link::Unresolved(Some(key));
                true
            }
            _ => false,
        }
    }

    /// Point at `key` without resolving.  Only for owners outside the
    /// registry, whose attachments never fire hooks.
    pub(crate) fn set_unresolved(&mut self, key: Key) {
        debug_assert!(!self.is_resolved(), "set_unresolved() skips detach hooks");
        self.link = Link::Unresolved(Some(key));
        self.name = None;
    }

    /// Drop the target without hooks.  Same restriction as `set_unresolved`.
    pub(crate) fn forget(&mut self) {
        debug_assert!(self.owner.is_none(), "forget() skips detach hooks");
        self.link = Link::Unresolved(None);
        self.name = None;
    }

    // ── Access ────────────────────────────────────────────────

    pub fn get<'r>(&self, registry: &'r Registry) -> Option<&'r Object> {
        registry.get(self.handle()?)
    }

    pub fn get_mut<'r>(&self, registry: &'r mut Registry) -> Option<&'r mut Object> {
        registry.get_mut(self.handle()?)
    }

    /// Resolved target down-cast to the capability the caller needs.
    pub fn get_as<'r, T: ObjectCast>(&self, registry: &'r Registry) -> Option<&'r T> {
        self.get(registry).and_then(T::cast)
    }

    // ── Introspection ─────────────────────────────────────────

    pub fn owner(&self) -> Option<Key> {
        self.owner
    }

    /// Whether a target (resolved or pending) is set.
    pub fn is_set(&self) -> bool {
        !matches!(self.link, Link::Unresolved(None))
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.link, Link::Resolved(..))
    }

    pub fn key(&self) -> Option<Key> {
        match self.link {
            Link::Unresolved(key) => key,
            Link::Resolved(key, _) => Some(key),
        }
    }

    pub fn handle(&self) -> Option<ObjectHandle> {
        match self.link {
            Link::Resolved(_, handle) => Some(handle),
            Link::Unresolved(_) => None,
        }
    }

    /// Printable form for persistence: the name if known, else the hex
    /// key, else empty.
    pub fn key_string(&self) -> KeyString {
        match (&self.name, self.key()) {
            (Some(name), _) => name.clone(),
            (None, Some(key)) => key.to_key_string(),
            (None, None) => KeyString::new(),
        }
    }

    // ── Internal ──────────────────────────────────────────────

    /// Bind unless the target is of a class this attachment refuses.
    fn try_bind(&mut self, key: Key, handle: ObjectHandle, registry: &mut Registry) -> bool {
        if let Some(class) = self.class {
            let found = registry.get(handle).map(|t| t.identity().kind.class());
            if found != Some(class) {
                debug!("Attachment: {} is not a {:?}, leaving unresolved", key, class);
                return false;
            }
        }
        self.bind(key, handle, registry);
        true
    }

    fn bind(&mut self, key: Key, handle: ObjectHandle, registry: &mut Registry) {
        self.link = Link::Resolved(key, handle);
        if let (Some(owner), Some(target)) = (self.owner, registry.get_mut(handle)) {
            target.on_attached(owner);
        }
    }
}

/// Names are kept only if they fit; hex key strings carry no name.
fn name_of(s: &str) -> Option<KeyString> {
    if s.starts_with('#') {
        return None;
    }
    let mut name = KeyString::new();
    name.push_str(s).ok()?;
    Some(name)
}
