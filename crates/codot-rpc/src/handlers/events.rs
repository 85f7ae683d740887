//! Event bus handlers: subscribe, unsubscribe, poll_events, get_subscriptions,
//! get_subscription_stats, publish_event, get_event_types.

use async_trait::async_trait;
use codot_events::{EventFilter, EventType, SubscribeOptions};
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::context::RpcContext;
use crate::errors::RpcError;
use crate::handlers::{client_id_param, opt_bool_param, opt_count_param, require_string_param};
use crate::registry::MethodHandler;

/// Default `max` for `poll_events`.
const DEFAULT_POLL_MAX: usize = 100;

/// Subscribe a client to an event type (upsert).
pub struct SubscribeHandler;

#[async_trait]
impl MethodHandler for SubscribeHandler {
    #[instrument(skip(self, ctx), fields(method = "subscribe"))]
    async fn handle(&self, params: Value, ctx: &RpcContext) -> Result<Value, RpcError> {
        let event_type = require_string_param(&params, "event_type")?;
        let client_id = client_id_param(&params, ctx)?;
        let filter = EventFilter::from_param(params.get("filter"))?;
        let push = opt_bool_param(&params, "push", false)?;
        if push && ctx.connection_id.is_none() {
            return Err(RpcError::invalid("'push' requires a live connection"));
        }

        let replaced = ctx.bus.subscribe(
            &client_id,
            &event_type,
            filter.clone(),
            SubscribeOptions {
                connection: ctx.connection_id,
                push,
            },
        )?;
        Ok(json!({
            "subscribed": true,
            "client_id": client_id,
            "event_type": event_type,
            "filter": filter,
            "push": push,
            "replaced": replaced,
        }))
    }
}

/// Remove a subscription.
pub struct UnsubscribeHandler;

#[async_trait]
impl MethodHandler for UnsubscribeHandler {
    #[instrument(skip(self, ctx), fields(method = "unsubscribe"))]
    async fn handle(&self, params: Value, ctx: &RpcContext) -> Result<Value, RpcError> {
        let event_type = require_string_param(&params, "event_type")?;
        let client_id = client_id_param(&params, ctx)?;
        ctx.bus.unsubscribe(&client_id, &event_type)?;
        Ok(json!({
            "unsubscribed": true,
            "client_id": client_id,
            "event_type": event_type,
        }))
    }
}

/// Return queued events matching the client's subscriptions.
pub struct PollEventsHandler;

#[async_trait]
impl MethodHandler for PollEventsHandler {
    #[instrument(skip(self, ctx), fields(method = "poll_events"))]
    async fn handle(&self, params: Value, ctx: &RpcContext) -> Result<Value, RpcError> {
        let client_id = client_id_param(&params, ctx)?;
        let max = opt_count_param(&params, "max", DEFAULT_POLL_MAX)?;
        let clear = opt_bool_param(&params, "clear", true)?;

        let events = ctx.bus.poll(&client_id, max, clear);
        Ok(json!({
            "client_id": client_id,
            "count": events.len(),
            "events": events,
            "queue_length": ctx.bus.queue_len(),
        }))
    }
}

/// List a client's subscriptions.
pub struct GetSubscriptionsHandler;

#[async_trait]
impl MethodHandler for GetSubscriptionsHandler {
    #[instrument(skip(self, ctx), fields(method = "get_subscriptions"))]
    async fn handle(&self, params: Value, ctx: &RpcContext) -> Result<Value, RpcError> {
        let client_id = client_id_param(&params, ctx)?;
        let subscriptions = ctx.bus.get_subscriptions(&client_id);
        Ok(json!({
            "client_id": client_id,
            "count": subscriptions.len(),
            "subscriptions": subscriptions,
        }))
    }
}

/// Aggregate subscription and queue statistics.
pub struct GetSubscriptionStatsHandler;

#[async_trait]
impl MethodHandler for GetSubscriptionStatsHandler {
    #[instrument(skip(self, ctx), fields(method = "get_subscription_stats"))]
    async fn handle(&self, _params: Value, ctx: &RpcContext) -> Result<Value, RpcError> {
        serde_json::to_value(ctx.bus.get_subscription_stats()).map_err(|e| RpcError::Internal {
            message: e.to_string(),
        })
    }
}

/// Publish an event through the protocol.
pub struct PublishEventHandler;

#[async_trait]
impl MethodHandler for PublishEventHandler {
    #[instrument(skip(self, ctx), fields(method = "publish_event"))]
    async fn handle(&self, params: Value, ctx: &RpcContext) -> Result<Value, RpcError> {
        let event_type: EventType = require_string_param(&params, "event_type")?.parse()?;
        let data = match params.get("data") {
            None | Some(Value::Null) => json!({}),
            Some(data @ Value::Object(_)) => data.clone(),
            Some(_) => return Err(RpcError::invalid("Parameter 'data' must be an object")),
        };

        let event = ctx.bus.publish(event_type, data);
        debug!(seq = event.seq, %event_type, "event published by command");
        Ok(json!({
            "published": true,
            "seq": event.seq,
            "event_type": event_type,
            "timestamp": event.timestamp,
        }))
    }
}

/// List recognized event types with their documented payload keys.
pub struct GetEventTypesHandler;

#[async_trait]
impl MethodHandler for GetEventTypesHandler {
    #[instrument(skip(self, _ctx), fields(method = "get_event_types"))]
    async fn handle(&self, _params: Value, _ctx: &RpcContext) -> Result<Value, RpcError> {
        let types: Vec<Value> = EventType::ALL
            .iter()
            .map(|t| json!({"type": t.as_str(), "payload": t.payload_fields()}))
            .collect();
        Ok(json!({
            "count": types.len(),
            "event_types": types,
        }))
    }
}
