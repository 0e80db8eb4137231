//! Session registry and pub/sub
//!
//! Decouples "a stream component exists and is sending" from "someone wants
//! to know who to listen to". Components register by stable id (push), and
//! the registry also mirrors participant lifecycle events so components
//! missed by push registration self-heal (pull). Listeners subscribe by
//! session id or by owning participant; stale listeners and dead sender
//! references are pruned lazily on the next pass, never by a background
//! sweep.
//!
//! One registry per logical session space; construct and drop it with that
//! space.

pub mod subscription;

use std::collections::{BTreeMap, HashMap};
use std::rc::Weak;

use crate::identity::{ControllerId, ListenerId, ParticipantId, ReplicatorId};
use crate::protocol::SessionId;

pub use subscription::{AvailabilityCallback, ListenerHandle};
use subscription::Subscription;

type LifecycleCallback = (Weak<()>, Box<dyn FnMut(ReplicatorId)>);

/// Where a component sits in its ownership chain at registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attachment {
    /// Owned directly by a participant.
    Participant(ParticipantId),
    /// Owned by a controller; the owning participant is resolved through the
    /// controller's controlling identity, when known.
    Controller(ControllerId),
    /// No resolvable owner. The association stays nullable.
    Detached,
}

/// Mirror of one participant, fed by lifecycle events.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParticipantInfo {
    pub locally_controlled: bool,
    /// Component attached directly to the participant, if any.
    pub replicator: Option<ReplicatorId>,
}

/// Mirror of one controller, fed by lifecycle events.
#[derive(Debug, Clone, Copy, Default)]
pub struct ControllerInfo {
    pub locally_controlled: bool,
    pub participant: Option<ParticipantId>,
    /// Component on the controlled body, if any.
    pub body_replicator: Option<ReplicatorId>,
    /// Component on the controller itself, if any.
    pub own_replicator: Option<ReplicatorId>,
}

/// Process-wide (per session space) directory of stream components.
pub struct SessionRegistry {
    /// Registered components and their owning participant. Presence in this
    /// table is the liveness relation for every other reference.
    owners: BTreeMap<ReplicatorId, Option<ParticipantId>>,
    participants: BTreeMap<ParticipantId, ParticipantInfo>,
    controllers: BTreeMap<ControllerId, ControllerInfo>,
    /// Most recent component to complete a send for each session.
    last_session_senders: HashMap<SessionId, ReplicatorId>,
    channel_subscriptions: HashMap<SessionId, Vec<Subscription>>,
    participant_subscriptions: BTreeMap<ParticipantId, Vec<Subscription>>,
    added_callbacks: Vec<LifecycleCallback>,
    removed_callbacks: Vec<LifecycleCallback>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            owners: BTreeMap::new(),
            participants: BTreeMap::new(),
            controllers: BTreeMap::new(),
            last_session_senders: HashMap::new(),
            channel_subscriptions: HashMap::new(),
            participant_subscriptions: BTreeMap::new(),
            added_callbacks: Vec::new(),
            removed_callbacks: Vec::new(),
        }
    }

    // == push registration ==

    /// Register a component, resolving its owning participant by walking up
    /// the attachment chain. Registering twice is a no-op.
    pub fn register_replicator(&mut self, replicator: ReplicatorId, attachment: Attachment) {
        self.cleanup_expired_session_senders();
        self.cleanup_expired_subscriptions();

        if self.owners.contains_key(&replicator) {
            return;
        }

        let owner = match attachment {
            Attachment::Participant(p) => Some(p),
            Attachment::Controller(c) => {
                self.controllers.get(&c).and_then(|info| info.participant)
            }
            Attachment::Detached => None,
        };
        self.owners.insert(replicator, owner);
        tracing::info!(replicator = %replicator, owner = ?owner, "replicator registered");

        Self::fire_lifecycle(&mut self.added_callbacks, replicator);

        if let Some(participant) = owner {
            self.notify_participant_subscribers(participant, replicator, None);
        }
    }

    /// Remove a component on destruction; drops its last-sender references.
    pub fn unregister_replicator(&mut self, replicator: ReplicatorId) {
        if self.owners.remove(&replicator).is_some() {
            self.last_session_senders.retain(|_, id| *id != replicator);
            tracing::info!(replicator = %replicator, "replicator unregistered");
            Self::fire_lifecycle(&mut self.removed_callbacks, replicator);
        }
    }

    // == pull registration (lifecycle mirror) ==

    /// A participant appeared or its owned entities changed. Any component
    /// found on it is registered eagerly, healing missed push registrations.
    pub fn handle_participant_joined(&mut self, participant: ParticipantId, info: ParticipantInfo) {
        self.participants.insert(participant, info);
        if let Some(replicator) = info.replicator {
            self.register_replicator(replicator, Attachment::Participant(participant));
        }
    }

    /// A participant left: its component and subscriptions go with it.
    pub fn handle_participant_left(&mut self, participant: ParticipantId) {
        if let Some(replicator) = self.find_replicator_for_participant(participant) {
            self.unregister_replicator(replicator);
        }
        if let Some(info) = self.participants.remove(&participant) {
            if let Some(replicator) = info.replicator {
                self.unregister_replicator(replicator);
            }
        }
        self.participant_subscriptions.remove(&participant);
    }

    pub fn handle_controller_spawned(&mut self, controller: ControllerId, info: ControllerInfo) {
        self.controllers.insert(controller, info);
    }

    pub fn handle_controller_despawned(&mut self, controller: ControllerId) {
        self.controllers.remove(&controller);
    }

    // == sender activity ==

    /// Record that `replicator` completed a send for `session` and notify
    /// every interested subscriber.
    pub fn notify_session_activity(&mut self, session: SessionId, replicator: ReplicatorId) {
        self.last_session_senders.insert(session, replicator);
        self.notify_channel_subscribers(session, replicator);

        if let Some(Some(participant)) = self.owners.get(&replicator).copied() {
            self.notify_participant_subscribers(participant, replicator, Some(session));
        }
    }

    /// Most recent live sender for a session, pruning dead references first.
    pub fn last_sender_for_session(&mut self, session: SessionId) -> Option<ReplicatorId> {
        self.cleanup_expired_session_senders();
        self.last_session_senders.get(&session).copied()
    }

    // == subscriptions ==

    /// Subscribe to sender activity on one session. If that session already
    /// has a recorded sender, the callback fires before this returns.
    pub fn subscribe_session(
        &mut self,
        session: SessionId,
        listener: &ListenerHandle,
        callback: impl FnMut(ReplicatorId, Option<SessionId>) + 'static,
    ) {
        let existing = self.last_sender_for_session(session);
        let mut sub = Subscription {
            listener: listener.id(),
            alive: listener.liveness(),
            callback: Box::new(callback),
            last_replicator: None,
            last_session: Some(session),
        };
        if let Some(replicator) = existing {
            sub.last_replicator = Some(replicator);
            (sub.callback)(replicator, Some(session));
        }
        self.channel_subscriptions.entry(session).or_default().push(sub);
    }

    /// Subscribe to one participant's stream component. If a component for
    /// that participant is already known, the callback fires before this
    /// returns, with the most recent session known for it (if any).
    pub fn subscribe_participant(
        &mut self,
        participant: ParticipantId,
        listener: &ListenerHandle,
        callback: impl FnMut(ReplicatorId, Option<SessionId>) + 'static,
    ) {
        let existing = self.find_replicator_for_participant(participant);
        let mut sub = Subscription {
            listener: listener.id(),
            alive: listener.liveness(),
            callback: Box::new(callback),
            last_replicator: None,
            last_session: None,
        };
        if let Some(replicator) = existing {
            sub.last_replicator = Some(replicator);
            (sub.callback)(replicator, None);
        }
        self.participant_subscriptions
            .entry(participant)
            .or_default()
            .push(sub);
    }

    /// Remove a listener's subscriptions for one session (dead entries under
    /// the same key are swept opportunistically).
    pub fn unsubscribe_session(&mut self, session: SessionId, listener: ListenerId) {
        if let Some(list) = self.channel_subscriptions.get_mut(&session) {
            list.retain(|sub| sub.is_live() && sub.listener != listener);
            if list.is_empty() {
                self.channel_subscriptions.remove(&session);
            }
        }
    }

    /// Remove every subscription a listener holds, of both kinds.
    pub fn unsubscribe_all(&mut self, listener: ListenerId) {
        self.channel_subscriptions.retain(|_, list| {
            list.retain(|sub| sub.is_live() && sub.listener != listener);
            !list.is_empty()
        });
        self.participant_subscriptions.retain(|_, list| {
            list.retain(|sub| sub.is_live() && sub.listener != listener);
            !list.is_empty()
        });
    }

    // == lifecycle events ==

    /// Observe component registrations.
    pub fn on_replicator_added(
        &mut self,
        listener: &ListenerHandle,
        callback: impl FnMut(ReplicatorId) + 'static,
    ) {
        self.added_callbacks
            .push((listener.liveness(), Box::new(callback)));
    }

    /// Observe component removals.
    pub fn on_replicator_removed(
        &mut self,
        listener: &ListenerHandle,
        callback: impl FnMut(ReplicatorId) + 'static,
    ) {
        self.removed_callbacks
            .push((listener.liveness(), Box::new(callback)));
    }

    // == resolution ==

    /// Registered component owned by `participant`, if any.
    pub fn find_replicator_for_participant(
        &self,
        participant: ParticipantId,
    ) -> Option<ReplicatorId> {
        self.owners
            .iter()
            .find(|(_, owner)| **owner == Some(participant))
            .map(|(id, _)| *id)
    }

    /// Resolve the local sender. Search order prefers the most canonical
    /// attachment point: the local controller's participant (registered
    /// association first, direct attachment second), then the controlled
    /// body's component, then the controller's own component, and finally a
    /// full scan for any registered component with a locally controlled
    /// owner.
    pub fn local_replicator(&self) -> Option<ReplicatorId> {
        for info in self.controllers.values() {
            if !info.locally_controlled {
                continue;
            }

            if let Some(participant) = info.participant {
                if let Some(replicator) = self.find_replicator_for_participant(participant) {
                    return Some(replicator);
                }
                if let Some(replicator) =
                    self.participants.get(&participant).and_then(|p| p.replicator)
                {
                    return Some(replicator);
                }
            }

            if let Some(replicator) = info.body_replicator {
                return Some(replicator);
            }
            if let Some(replicator) = info.own_replicator {
                return Some(replicator);
            }
        }

        for (replicator, owner) in &self.owners {
            if let Some(participant) = owner {
                let local = self
                    .participants
                    .get(participant)
                    .map_or(false, |p| p.locally_controlled);
                if local {
                    return Some(*replicator);
                }
            }
        }

        None
    }

    /// Registered component count (live entries only).
    pub fn registered_count(&self) -> usize {
        self.owners.len()
    }

    // == lazy cleanup ==

    fn notify_channel_subscribers(&mut self, session: SessionId, replicator: ReplicatorId) {
        if let Some(list) = self.channel_subscriptions.get_mut(&session) {
            list.retain_mut(|sub| {
                if !sub.is_live() {
                    return false;
                }
                if sub.last_replicator.is_some() && sub.last_replicator != Some(replicator) {
                    tracing::debug!(listener = %sub.listener, new = %replicator, "session sender changed");
                }
                sub.last_replicator = Some(replicator);
                sub.last_session = Some(session);
                (sub.callback)(replicator, Some(session));
                true
            });
            if list.is_empty() {
                self.channel_subscriptions.remove(&session);
            }
        }
    }

    fn notify_participant_subscribers(
        &mut self,
        participant: ParticipantId,
        replicator: ReplicatorId,
        session: Option<SessionId>,
    ) {
        if let Some(list) = self.participant_subscriptions.get_mut(&participant) {
            list.retain_mut(|sub| {
                if !sub.is_live() {
                    return false;
                }
                sub.last_replicator = Some(replicator);
                if session.is_some() {
                    sub.last_session = session;
                }
                (sub.callback)(replicator, sub.last_session);
                true
            });
            if list.is_empty() {
                self.participant_subscriptions.remove(&participant);
            }
        }
    }

    fn fire_lifecycle(callbacks: &mut Vec<LifecycleCallback>, replicator: ReplicatorId) {
        callbacks.retain_mut(|(alive, callback)| {
            if alive.strong_count() == 0 {
                return false;
            }
            callback(replicator);
            true
        });
    }

    fn cleanup_expired_subscriptions(&mut self) {
        self.channel_subscriptions.retain(|_, list| {
            list.retain(Subscription::is_live);
            !list.is_empty()
        });
        self.participant_subscriptions.retain(|_, list| {
            list.retain(Subscription::is_live);
            !list.is_empty()
        });
    }

    fn cleanup_expired_session_senders(&mut self) {
        let owners = &self.owners;
        self.last_session_senders
            .retain(|_, replicator| owners.contains_key(replicator));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use uuid::Uuid;

    fn rep() -> ReplicatorId {
        ReplicatorId::next()
    }

    type Seen = Rc<RefCell<Vec<(ReplicatorId, Option<SessionId>)>>>;

    fn recorder() -> (Seen, impl FnMut(ReplicatorId, Option<SessionId>)) {
        let seen: Seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |r, s| sink.borrow_mut().push((r, s)))
    }

    #[test]
    fn activity_notifies_channel_subscribers() {
        let mut registry = SessionRegistry::new();
        let listener = ListenerHandle::new();
        let session = Uuid::new_v4();
        let sender = rep();
        registry.register_replicator(sender, Attachment::Detached);

        let (seen, cb) = recorder();
        registry.subscribe_session(session, &listener, cb);
        assert!(seen.borrow().is_empty());

        registry.notify_session_activity(session, sender);
        assert_eq!(seen.borrow().as_slice(), &[(sender, Some(session))]);
    }

    #[test]
    fn subscribe_fires_immediately_when_sender_known() {
        let mut registry = SessionRegistry::new();
        let listener = ListenerHandle::new();
        let session = Uuid::new_v4();
        let sender = rep();
        registry.register_replicator(sender, Attachment::Detached);
        registry.notify_session_activity(session, sender);

        let (seen, cb) = recorder();
        registry.subscribe_session(session, &listener, cb);
        assert_eq!(seen.borrow().as_slice(), &[(sender, Some(session))]);

        let sub = &registry.channel_subscriptions.get(&session).unwrap()[0];
        assert_eq!(sub.last_replicator, Some(sender));
        assert_eq!(sub.last_session, Some(session));
    }

    #[test]
    fn unregistered_sender_is_pruned_before_immediate_fire() {
        let mut registry = SessionRegistry::new();
        let listener = ListenerHandle::new();
        let session = Uuid::new_v4();
        let sender = rep();
        registry.register_replicator(sender, Attachment::Detached);
        registry.notify_session_activity(session, sender);
        registry.unregister_replicator(sender);

        let (seen, cb) = recorder();
        registry.subscribe_session(session, &listener, cb);
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn participant_subscription_fires_on_registration_then_activity() {
        let mut registry = SessionRegistry::new();
        let listener = ListenerHandle::new();
        let participant = ParticipantId::new(9);
        let sender = rep();

        let (seen, cb) = recorder();
        registry.subscribe_participant(participant, &listener, cb);
        assert!(seen.borrow().is_empty());

        registry.register_replicator(sender, Attachment::Participant(participant));
        assert_eq!(seen.borrow().as_slice(), &[(sender, None)]);

        let session = Uuid::new_v4();
        registry.notify_session_activity(session, sender);
        assert_eq!(seen.borrow().len(), 2);
        assert_eq!(seen.borrow()[1], (sender, Some(session)));
    }

    #[test]
    fn participant_subscribe_fires_immediately_when_component_known() {
        let mut registry = SessionRegistry::new();
        let listener = ListenerHandle::new();
        let participant = ParticipantId::new(4);
        let sender = rep();
        registry.register_replicator(sender, Attachment::Participant(participant));

        let (seen, cb) = recorder();
        registry.subscribe_participant(participant, &listener, cb);
        assert_eq!(seen.borrow().as_slice(), &[(sender, None)]);
    }

    #[test]
    fn dropped_listener_is_pruned_without_firing() {
        let mut registry = SessionRegistry::new();
        let session = Uuid::new_v4();
        let sender = rep();
        registry.register_replicator(sender, Attachment::Detached);

        let listener = ListenerHandle::new();
        let (seen, cb) = recorder();
        registry.subscribe_session(session, &listener, cb);
        drop(listener);

        registry.notify_session_activity(session, sender);
        assert!(seen.borrow().is_empty());
        assert!(registry.channel_subscriptions.is_empty());
    }

    #[test]
    fn unsubscribe_all_removes_both_kinds() {
        let mut registry = SessionRegistry::new();
        let listener = ListenerHandle::new();
        let session = Uuid::new_v4();
        let participant = ParticipantId::new(2);

        registry.subscribe_session(session, &listener, |_, _| {});
        registry.subscribe_participant(participant, &listener, |_, _| {});
        registry.unsubscribe_all(listener.id());

        assert!(registry.channel_subscriptions.is_empty());
        assert!(registry.participant_subscriptions.is_empty());
    }

    #[test]
    fn unsubscribe_session_leaves_other_listeners() {
        let mut registry = SessionRegistry::new();
        let first = ListenerHandle::new();
        let second = ListenerHandle::new();
        let session = Uuid::new_v4();

        registry.subscribe_session(session, &first, |_, _| {});
        registry.subscribe_session(session, &second, |_, _| {});
        registry.unsubscribe_session(session, first.id());

        let list = registry.channel_subscriptions.get(&session).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].listener, second.id());
    }

    #[test]
    fn pull_path_self_heals_missed_registration() {
        let mut registry = SessionRegistry::new();
        let participant = ParticipantId::new(7);
        let component = rep();

        // component never push-registered; discovered via lifecycle event
        registry.handle_participant_joined(
            participant,
            ParticipantInfo {
                locally_controlled: false,
                replicator: Some(component),
            },
        );

        assert_eq!(
            registry.find_replicator_for_participant(participant),
            Some(component)
        );
    }

    #[test]
    fn participant_left_drops_component_and_subscriptions() {
        let mut registry = SessionRegistry::new();
        let participant = ParticipantId::new(3);
        let component = rep();
        let listener = ListenerHandle::new();

        registry.handle_participant_joined(
            participant,
            ParticipantInfo {
                locally_controlled: false,
                replicator: Some(component),
            },
        );
        registry.subscribe_participant(participant, &listener, |_, _| {});
        registry.handle_participant_left(participant);

        assert_eq!(registry.registered_count(), 0);
        assert!(registry.participant_subscriptions.is_empty());
    }

    #[test]
    fn lifecycle_callbacks_fire() {
        let mut registry = SessionRegistry::new();
        let listener = ListenerHandle::new();
        let added: Rc<RefCell<Vec<ReplicatorId>>> = Rc::new(RefCell::new(Vec::new()));
        let removed: Rc<RefCell<Vec<ReplicatorId>>> = Rc::new(RefCell::new(Vec::new()));

        let sink = added.clone();
        registry.on_replicator_added(&listener, move |r| sink.borrow_mut().push(r));
        let sink = removed.clone();
        registry.on_replicator_removed(&listener, move |r| sink.borrow_mut().push(r));

        let component = rep();
        registry.register_replicator(component, Attachment::Detached);
        registry.unregister_replicator(component);

        assert_eq!(added.borrow().as_slice(), &[component]);
        assert_eq!(removed.borrow().as_slice(), &[component]);
    }

    #[test]
    fn local_resolution_prefers_participant_attachment() {
        let mut registry = SessionRegistry::new();
        let participant = ParticipantId::new(1);
        let registered = rep();
        let body = rep();
        let own = rep();

        registry.register_replicator(registered, Attachment::Participant(participant));
        registry.handle_controller_spawned(
            ControllerId::new(1),
            ControllerInfo {
                locally_controlled: true,
                participant: Some(participant),
                body_replicator: Some(body),
                own_replicator: Some(own),
            },
        );

        assert_eq!(registry.local_replicator(), Some(registered));
    }

    #[test]
    fn local_resolution_falls_through_to_body_then_controller() {
        let mut registry = SessionRegistry::new();
        let body = rep();
        let own = rep();

        registry.handle_controller_spawned(
            ControllerId::new(1),
            ControllerInfo {
                locally_controlled: true,
                participant: None,
                body_replicator: Some(body),
                own_replicator: Some(own),
            },
        );
        assert_eq!(registry.local_replicator(), Some(body));

        registry.handle_controller_spawned(
            ControllerId::new(1),
            ControllerInfo {
                locally_controlled: true,
                participant: None,
                body_replicator: None,
                own_replicator: Some(own),
            },
        );
        assert_eq!(registry.local_replicator(), Some(own));
    }

    #[test]
    fn local_resolution_uses_direct_lookup_when_not_registered() {
        let mut registry = SessionRegistry::new();
        let participant = ParticipantId::new(5);
        let attached = rep();

        registry.participants.insert(
            participant,
            ParticipantInfo {
                locally_controlled: true,
                replicator: Some(attached),
            },
        );
        registry.handle_controller_spawned(
            ControllerId::new(1),
            ControllerInfo {
                locally_controlled: true,
                participant: Some(participant),
                body_replicator: None,
                own_replicator: None,
            },
        );

        assert_eq!(registry.local_replicator(), Some(attached));
    }

    #[test]
    fn local_resolution_falls_back_to_owner_scan() {
        let mut registry = SessionRegistry::new();
        let participant = ParticipantId::new(8);
        let component = rep();

        registry.handle_participant_joined(
            participant,
            ParticipantInfo {
                locally_controlled: true,
                replicator: None,
            },
        );
        registry.register_replicator(component, Attachment::Participant(participant));

        // no controllers at all
        assert_eq!(registry.local_replicator(), Some(component));
    }

    #[test]
    fn remote_controllers_are_ignored() {
        let mut registry = SessionRegistry::new();
        let body = rep();
        registry.handle_controller_spawned(
            ControllerId::new(1),
            ControllerInfo {
                locally_controlled: false,
                participant: None,
                body_replicator: Some(body),
                own_replicator: None,
            },
        );
        assert_eq!(registry.local_replicator(), None);
    }

    #[test]
    fn controller_attachment_resolves_owner_through_mirror() {
        let mut registry = SessionRegistry::new();
        let participant = ParticipantId::new(6);
        let controller = ControllerId::new(2);
        let component = rep();

        registry.handle_controller_spawned(
            controller,
            ControllerInfo {
                locally_controlled: false,
                participant: Some(participant),
                ..Default::default()
            },
        );
        registry.register_replicator(component, Attachment::Controller(controller));

        assert_eq!(
            registry.find_replicator_for_participant(participant),
            Some(component)
        );
    }
}
