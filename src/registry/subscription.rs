//! Listener handles and subscription records
//!
//! A listener keeps a [`ListenerHandle`]; the registry holds only a weak
//! token. Dropping the handle invalidates every subscription made with it,
//! and the registry prunes those lazily on its next pass.

use std::rc::{Rc, Weak};

use crate::identity::{ListenerId, ReplicatorId};
use crate::protocol::SessionId;

/// Callback invoked when a subscribed sender becomes available or changes.
/// The session id is the most recent one known for that sender, if any.
pub type AvailabilityCallback = Box<dyn FnMut(ReplicatorId, Option<SessionId>)>;

/// A listener's identity plus its liveness token.
pub struct ListenerHandle {
    id: ListenerId,
    alive: Rc<()>,
}

impl Default for ListenerHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerHandle {
    pub fn new() -> Self {
        Self {
            id: ListenerId::next(),
            alive: Rc::new(()),
        }
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub(crate) fn liveness(&self) -> Weak<()> {
        Rc::downgrade(&self.alive)
    }
}

/// One registered interest in a sender, with its last known delivery state.
pub(crate) struct Subscription {
    pub listener: ListenerId,
    pub alive: Weak<()>,
    pub callback: AvailabilityCallback,
    pub last_replicator: Option<ReplicatorId>,
    pub last_session: Option<SessionId>,
}

impl Subscription {
    pub fn is_live(&self) -> bool {
        self.alive.strong_count() > 0
    }
}
