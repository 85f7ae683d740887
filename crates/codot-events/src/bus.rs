//! Subscription table and the shared bounded event queue.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Weak};

use codot_core::ids::ConnectionId;
use codot_core::time::unix_timestamp;
use metrics::counter;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace};

use crate::errors::EventBusError;
use crate::event_type::EventType;
use crate::filter::EventFilter;

/// A published event.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Event {
    /// Publish sequence number, strictly increasing per bus.
    pub seq: u64,
    /// Event type.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Unix seconds at publish time.
    pub timestamp: f64,
    /// Type-specific payload.
    pub data: Value,
}

/// Immediate delivery target for push subscriptions.
///
/// Installed by the transport. `deliver` must not block; returning `false`
/// means the connection is gone or its queue is full.
pub trait EventSink: Send + Sync {
    /// Write `event` to `connection`.
    fn deliver(&self, connection: ConnectionId, event: &Event) -> bool;
}

/// Per-subscribe options beyond the filter.
#[derive(Clone, Copy, Debug, Default)]
pub struct SubscribeOptions {
    /// Connection that created the subscription.
    pub connection: Option<ConnectionId>,
    /// Deliver matching events to `connection` as they are published.
    pub push: bool,
}

#[derive(Debug)]
struct Subscription {
    filter: EventFilter,
    created_at: f64,
    delivered: u64,
    pushed: u64,
    connection: Option<ConnectionId>,
    push: bool,
}

/// Read view of one subscription.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SubscriptionInfo {
    /// Subscribed event type.
    pub event_type: EventType,
    /// Active filter.
    pub filter: EventFilter,
    /// Unix seconds when the subscription was created or last replaced.
    pub created_at: f64,
    /// Events returned to this subscription by polling.
    pub delivered: u64,
    /// Events pushed to the owning connection.
    pub pushed: u64,
    /// Whether push delivery is enabled.
    pub push: bool,
}

/// Aggregate bus statistics.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SubscriptionStats {
    /// Clients with at least one subscription.
    pub total_clients: usize,
    /// Total subscriptions across clients.
    pub total_subscriptions: usize,
    /// Subscription count per event type.
    pub by_event_type: BTreeMap<EventType, usize>,
    /// Events currently queued.
    pub queue_length: usize,
    /// Queue capacity.
    pub queue_capacity: usize,
    /// Events published since creation.
    pub total_published: u64,
    /// Events evicted by capacity pressure.
    pub total_evicted: u64,
}

#[derive(Debug, Default)]
struct BusState {
    subscriptions: HashMap<String, HashMap<EventType, Subscription>>,
    queue: VecDeque<Event>,
    next_seq: u64,
    evicted: u64,
}

/// Event pub/sub with a single bounded FIFO shared by all subscribers.
///
/// All state sits behind one mutex that is never held across an await, so
/// every operation is atomic with respect to the others.
pub struct EventBus {
    capacity: usize,
    state: Mutex<BusState>,
    sink: RwLock<Option<Weak<dyn EventSink>>>,
}

impl EventBus {
    /// Create a bus whose queue holds at most `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(BusState::default()),
            sink: RwLock::new(None),
        }
    }

    /// Install the push delivery sink.
    ///
    /// Only a weak reference is kept: the sink usually owns hooks that hold
    /// this bus. Once the sink is dropped, push delivery stops.
    pub fn set_sink<S: EventSink + 'static>(&self, sink: &Arc<S>) {
        let weak: Weak<dyn EventSink> = Arc::downgrade(sink) as Weak<dyn EventSink>;
        *self.sink.write() = Some(weak);
    }

    /// Queue capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Subscribe `client_id` to `event_type`, replacing any existing filter.
    ///
    /// Returns `true` when an existing subscription was replaced.
    pub fn subscribe(
        &self,
        client_id: &str,
        event_type: &str,
        filter: EventFilter,
        options: SubscribeOptions,
    ) -> Result<bool, EventBusError> {
        let event_type: EventType = event_type.parse()?;
        let subscription = Subscription {
            filter,
            created_at: unix_timestamp(),
            delivered: 0,
            pushed: 0,
            connection: options.connection,
            push: options.push && options.connection.is_some(),
        };
        let replaced = self
            .state
            .lock()
            .subscriptions
            .entry(client_id.to_owned())
            .or_default()
            .insert(event_type, subscription)
            .is_some();
        debug!(client_id, %event_type, replaced, push = options.push, "subscribed");
        Ok(replaced)
    }

    /// Remove the (client, type) subscription. The client entry is pruned
    /// when its last subscription goes.
    pub fn unsubscribe(&self, client_id: &str, event_type: &str) -> Result<(), EventBusError> {
        let event_type: EventType = event_type.parse()?;
        let mut state = self.state.lock();
        let not_subscribed = || EventBusError::NotSubscribed {
            client_id: client_id.to_owned(),
            event_type: event_type.as_str().to_owned(),
        };
        let subs = state.subscriptions.get_mut(client_id).ok_or_else(not_subscribed)?;
        let _ = subs.remove(&event_type).ok_or_else(not_subscribed)?;
        if subs.is_empty() {
            let _ = state.subscriptions.remove(client_id);
        }
        debug!(client_id, %event_type, "unsubscribed");
        Ok(())
    }

    /// Append an event to the shared queue, evicting the oldest entry when
    /// full, then push it to matching push subscriptions.
    pub fn publish(&self, event_type: EventType, data: Value) -> Event {
        let (event, targets) = {
            let mut state = self.state.lock();
            state.next_seq += 1;
            let event = Event {
                seq: state.next_seq,
                event_type,
                timestamp: unix_timestamp(),
                data,
            };
            while state.queue.len() >= self.capacity {
                if let Some(dropped) = state.queue.pop_front() {
                    state.evicted += 1;
                    counter!("events_evicted_total").increment(1);
                    trace!(seq = dropped.seq, "evicted oldest event");
                }
            }
            state.queue.push_back(event.clone());

            let mut targets = Vec::new();
            for sub in state.subscriptions.values_mut() {
                if let Some(sub) = sub.get_mut(&event_type) {
                    if let (true, Some(conn)) = (sub.push, sub.connection) {
                        if sub.filter.matches(&event.data) {
                            sub.pushed += 1;
                            targets.push(conn);
                        }
                    }
                }
            }
            (event, targets)
        };

        counter!("events_published_total", "event_type" => event_type.as_str()).increment(1);
        debug!(seq = event.seq, %event_type, push_targets = targets.len(), "event published");

        if !targets.is_empty() {
            let sink = self.sink.read().as_ref().and_then(Weak::upgrade);
            if let Some(sink) = sink {
                for conn in targets {
                    if !sink.deliver(conn, &event) {
                        debug!(conn_id = %conn, seq = event.seq, "push delivery failed");
                    }
                }
            }
        }
        event
    }

    /// Return up to `max` queued events matching `client_id`'s subscriptions,
    /// oldest first. With `clear`, the returned events are removed from the
    /// shared queue for every subscriber.
    pub fn poll(&self, client_id: &str, max: usize, clear: bool) -> Vec<Event> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let Some(subs) = state.subscriptions.get_mut(client_id) else {
            return Vec::new();
        };

        let mut out = Vec::new();
        for event in &state.queue {
            if out.len() >= max {
                break;
            }
            if let Some(sub) = subs.get_mut(&event.event_type) {
                if sub.filter.matches(&event.data) {
                    sub.delivered += 1;
                    out.push(event.clone());
                }
            }
        }

        if clear && !out.is_empty() {
            let taken: HashSet<u64> = out.iter().map(|e| e.seq).collect();
            state.queue.retain(|e| !taken.contains(&e.seq));
        }
        trace!(client_id, returned = out.len(), clear, "poll");
        out
    }

    /// Subscriptions held by `client_id`, ordered by event type.
    pub fn get_subscriptions(&self, client_id: &str) -> Vec<SubscriptionInfo> {
        let state = self.state.lock();
        let mut infos: Vec<SubscriptionInfo> = state
            .subscriptions
            .get(client_id)
            .map(|subs| {
                subs.iter()
                    .map(|(event_type, sub)| SubscriptionInfo {
                        event_type: *event_type,
                        filter: sub.filter.clone(),
                        created_at: sub.created_at,
                        delivered: sub.delivered,
                        pushed: sub.pushed,
                        push: sub.push,
                    })
                    .collect()
            })
            .unwrap_or_default();
        infos.sort_by_key(|i| i.event_type);
        infos
    }

    /// Aggregate counts over all clients.
    pub fn get_subscription_stats(&self) -> SubscriptionStats {
        let state = self.state.lock();
        let mut by_event_type = BTreeMap::new();
        let mut total_subscriptions = 0;
        for subs in state.subscriptions.values() {
            total_subscriptions += subs.len();
            for event_type in subs.keys() {
                *by_event_type.entry(*event_type).or_insert(0) += 1;
            }
        }
        SubscriptionStats {
            total_clients: state.subscriptions.len(),
            total_subscriptions,
            by_event_type,
            queue_length: state.queue.len(),
            queue_capacity: self.capacity,
            total_published: state.next_seq,
            total_evicted: state.evicted,
        }
    }

    /// Drop every subscription held by `client_id`. Returns how many went.
    pub fn remove_client(&self, client_id: &str) -> usize {
        self.state
            .lock()
            .subscriptions
            .remove(client_id)
            .map_or(0, |subs| subs.len())
    }

    /// Drop every subscription created over `connection`.
    pub fn remove_owned_by(&self, connection: ConnectionId) -> usize {
        let mut state = self.state.lock();
        let mut removed = 0;
        state.subscriptions.retain(|_, subs| {
            let before = subs.len();
            subs.retain(|_, sub| sub.connection != Some(connection));
            removed += before - subs.len();
            !subs.is_empty()
        });
        if removed > 0 {
            debug!(conn_id = %connection, removed, "dropped subscriptions for closed connection");
        }
        removed
    }

    /// Empty the shared queue. Returns the number of events discarded.
    pub fn clear_queue(&self) -> usize {
        let mut state = self.state.lock();
        let n = state.queue.len();
        state.queue.clear();
        n
    }

    /// Events currently queued.
    pub fn queue_len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Whether `client_id` holds any subscription.
    pub fn has_client(&self, client_id: &str) -> bool {
        self.state.lock().subscriptions.contains_key(client_id)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::DEFAULT_QUEUE_CAPACITY)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
