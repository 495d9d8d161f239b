//! Order book — the registry of every order and the only place order status
//! changes.
//!
//! The book manages:
//! - id assignment and order storage (alive and terminal)
//! - the lifecycle transition table, one notification per transition
//! - OCO groups (a terminal member cancels its alive siblings)
//! - bracket children, dormant until the entry completes
//! - queues of submitted orders and cancel requests, drained by the venue
//!
//! It never prices anything. Fill prices and acceptance decisions belong to
//! the execution venue.

use crate::domain::{
    BracketIds, BracketRequest, Fill, IdGen, Notification, NotificationKind, OcoGroupId, Order,
    OrderId, OrderKind, OrderRequest, OrderStatus, Price, StreamId, TimeInForce, Timestamp,
};
use crate::error::OrderBookError;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    orders: BTreeMap<OrderId, Order>,
    ids: IdGen,
    /// Bracket entry → children waiting for it to complete.
    dormant: BTreeMap<OrderId, Vec<OrderId>>,
    oco_groups: BTreeMap<OcoGroupId, Vec<OrderId>>,
    /// Submitted orders the venue has not yet accepted or rejected.
    awaiting: Vec<OrderId>,
    cancel_requests: Vec<OrderId>,
    notifications: Vec<Notification>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Queries ────────────────────────────────────────────────────────

    pub fn get(&self, id: OrderId) -> Option<&Order> {
        self.orders.get(&id)
    }

    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    /// Alive orders in submission order.
    pub fn alive(&self) -> impl Iterator<Item = &Order> {
        self.orders.values().filter(|o| o.is_alive())
    }

    /// Accepted or partially filled orders, in submission order.
    pub fn working(&self) -> impl Iterator<Item = &Order> {
        self.orders.values().filter(|o| o.status.is_working())
    }

    /// Ids of working orders on `stream`, in submission order.
    pub fn working_ids_for(&self, stream: StreamId) -> Vec<OrderId> {
        self.working()
            .filter(|o| o.stream == stream)
            .map(|o| o.id)
            .collect()
    }

    pub fn oco_group(&self, group: OcoGroupId) -> Option<&[OrderId]> {
        self.oco_groups.get(&group).map(Vec::as_slice)
    }

    /// Dormant children of a bracket entry, if any.
    pub fn dormant_children(&self, entry: OrderId) -> &[OrderId] {
        self.dormant.get(&entry).map(Vec::as_slice).unwrap_or(&[])
    }

    // ── Creation ───────────────────────────────────────────────────────

    fn create(&mut self, request: OrderRequest, now: Timestamp) -> OrderId {
        let id = self.ids.next_order_id();
        self.orders.insert(id, Order::from_request(id, request, now));
        id
    }

    /// Created → Submitted. Queues the order for the venue's acceptance pass.
    fn submit(&mut self, id: OrderId, now: Timestamp) -> Result<(), OrderBookError> {
        self.transition(id, OrderStatus::Submitted, now, NotificationKind::Submitted)?;
        self.awaiting.push(id);
        Ok(())
    }

    /// Create and submit a standalone order.
    pub fn submit_order(&mut self, request: OrderRequest, now: Timestamp) -> OrderId {
        let id = self.create(request, now);
        // a freshly created order can always be submitted
        let _ = self.submit(id, now);
        id
    }

    /// Create and submit a group of orders where the first to reach a
    /// terminal state cancels the rest.
    pub fn submit_oco(&mut self, requests: Vec<OrderRequest>, now: Timestamp) -> Vec<OrderId> {
        let group = self.ids.next_oco_group_id();
        let ids: Vec<OrderId> = requests
            .into_iter()
            .map(|request| self.create(request, now))
            .collect();
        for id in &ids {
            if let Some(order) = self.orders.get_mut(id) {
                order.oco_group = Some(group);
            }
        }
        self.oco_groups.insert(group, ids.clone());
        for id in &ids {
            let _ = self.submit(*id, now);
        }
        ids
    }

    /// Submit the entry now; the stop (and optional target) wait dormant,
    /// on the opposite side, until the entry completes.
    pub fn submit_bracket(&mut self, bracket: BracketRequest, now: Timestamp) -> BracketIds {
        let entry = bracket.entry;
        let exit_side = entry.side.opposite();
        let child = |kind: OrderKind| OrderRequest {
            stream: entry.stream,
            side: exit_side,
            size: entry.size,
            kind,
            time_in_force: TimeInForce::GoodTillCanceled,
        };
        let stop_request = child(OrderKind::Stop {
            stop: bracket.stop_price,
        });
        let target_request = bracket
            .target_price
            .map(|limit| child(OrderKind::Limit { limit }));

        let entry_id = self.create(entry, now);
        let stop_id = self.create(stop_request, now);
        let target_id = target_request.map(|request| self.create(request, now));

        let group = self.ids.next_oco_group_id();
        let mut children = vec![stop_id];
        children.extend(target_id);
        for id in &children {
            if let Some(order) = self.orders.get_mut(id) {
                order.parent = Some(entry_id);
                order.oco_group = Some(group);
            }
        }
        self.oco_groups.insert(group, children.clone());
        self.dormant.insert(entry_id, children);

        let _ = self.submit(entry_id, now);
        BracketIds {
            entry: entry_id,
            stop: stop_id,
            target: target_id,
        }
    }

    /// Queue a cancel request; the venue processes it at the next cancellation pass.
    pub fn request_cancel(&mut self, id: OrderId) {
        self.cancel_requests.push(id);
    }

    pub fn take_awaiting(&mut self) -> Vec<OrderId> {
        std::mem::take(&mut self.awaiting)
    }

    pub fn take_cancel_requests(&mut self) -> Vec<OrderId> {
        std::mem::take(&mut self.cancel_requests)
    }

    // ── Transitions ────────────────────────────────────────────────────

    /// Submitted → Accepted at master tick `tick`.
    pub fn accept(&mut self, id: OrderId, now: Timestamp, tick: u64) -> Result<(), OrderBookError> {
        self.transition(id, OrderStatus::Accepted, now, NotificationKind::Accepted)?;
        if let Some(order) = self.orders.get_mut(&id) {
            order.accepted_at = Some(now);
            order.accepted_tick = Some(tick);
        }
        Ok(())
    }

    pub fn reject(
        &mut self,
        id: OrderId,
        now: Timestamp,
        reason: impl Into<String>,
    ) -> Result<(), OrderBookError> {
        let reason = reason.into();
        self.transition(id, OrderStatus::Rejected, now, NotificationKind::Rejected { reason })?;
        self.after_terminal(id, now);
        Ok(())
    }

    /// Submitted or working → MarginRejected.
    pub fn margin_reject(
        &mut self,
        id: OrderId,
        now: Timestamp,
        reason: impl Into<String>,
    ) -> Result<(), OrderBookError> {
        let reason = reason.into();
        self.transition(
            id,
            OrderStatus::MarginRejected,
            now,
            NotificationKind::MarginRejected { reason },
        )?;
        self.after_terminal(id, now);
        Ok(())
    }

    /// Cancel an alive order. Returns `Ok(false)` without a notification when
    /// the order is already terminal.
    pub fn cancel(
        &mut self,
        id: OrderId,
        now: Timestamp,
        reason: impl Into<String>,
    ) -> Result<bool, OrderBookError> {
        let order = self.orders.get(&id).ok_or(OrderBookError::NotFound(id))?;
        if order.status.is_terminal() {
            return Ok(false);
        }
        let reason = reason.into();
        self.transition(id, OrderStatus::Canceled, now, NotificationKind::Canceled { reason })?;
        self.awaiting.retain(|queued| *queued != id);
        if let Some(parent) = self.orders.get(&id).and_then(|o| o.parent) {
            if let Some(children) = self.dormant.get_mut(&parent) {
                children.retain(|child| *child != id);
            }
        }
        self.after_terminal(id, now);
        Ok(true)
    }

    /// Time-in-force elapsed.
    pub fn expire(&mut self, id: OrderId, now: Timestamp) -> Result<(), OrderBookError> {
        self.transition(id, OrderStatus::Expired, now, NotificationKind::Expired)?;
        self.after_terminal(id, now);
        Ok(())
    }

    /// Record a confirmed fill. Returns the resulting status.
    pub fn record_fill(&mut self, fill: Fill) -> Result<OrderStatus, OrderBookError> {
        let id = fill.order_id;
        let order = self.orders.get(&id).ok_or(OrderBookError::NotFound(id))?;
        if fill.size <= Decimal::ZERO {
            return Err(OrderBookError::NonPositiveFill {
                id,
                fill: fill.size,
            });
        }
        if fill.size > order.remaining() {
            return Err(OrderBookError::OverFill {
                id,
                fill: fill.size,
                remaining: order.remaining(),
            });
        }
        let completes = fill.size == order.remaining();
        let (next, kind) = if completes {
            (OrderStatus::Completed, NotificationKind::Completed { fill: fill.clone() })
        } else {
            (
                OrderStatus::PartiallyFilled,
                NotificationKind::PartiallyFilled { fill: fill.clone() },
            )
        };
        let now = fill.timestamp;
        self.transition(id, next, now, kind)?;

        if let Some(order) = self.orders.get_mut(&id) {
            let filled_before = order.filled;
            order.filled += fill.size;
            order.avg_fill_price =
                (order.avg_fill_price * filled_before + fill.price * fill.size) / order.filled;
            order.commission += fill.commission;
        }

        if completes {
            self.activate_children(id, now);
            self.after_terminal(id, now);
        }
        Ok(next)
    }

    /// Stop-limit whose stop fired.
    pub fn mark_triggered(&mut self, id: OrderId) -> Result<(), OrderBookError> {
        let order = self.orders.get_mut(&id).ok_or(OrderBookError::NotFound(id))?;
        order.triggered = true;
        Ok(())
    }

    pub fn set_trail_stop(&mut self, id: OrderId, stop: Price) -> Result<(), OrderBookError> {
        let order = self.orders.get_mut(&id).ok_or(OrderBookError::NotFound(id))?;
        order.trail_stop = Some(stop);
        Ok(())
    }

    /// Surface a venue error on an order without changing its state.
    pub fn notify_venue_error(&mut self, id: OrderId, now: Timestamp, message: impl Into<String>) {
        let status = self
            .orders
            .get(&id)
            .map(|o| o.status)
            .unwrap_or(OrderStatus::Submitted);
        self.notifications.push(Notification {
            order_id: id,
            timestamp: now,
            status,
            kind: NotificationKind::VenueError {
                message: message.into(),
            },
        });
    }

    /// Everything that happened since the last drain, in transition order.
    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    // ── Internals ──────────────────────────────────────────────────────

    fn transition(
        &mut self,
        id: OrderId,
        to: OrderStatus,
        now: Timestamp,
        kind: NotificationKind,
    ) -> Result<(), OrderBookError> {
        let order = self.orders.get_mut(&id).ok_or(OrderBookError::NotFound(id))?;
        let from = order.status;
        if !from.can_transition_to(to) {
            return Err(OrderBookError::InvalidTransition { id, from, to });
        }
        order.status = to;
        debug!(order = %id, %from, %to, "order transition");
        self.notifications.push(Notification {
            order_id: id,
            timestamp: now,
            status: to,
            kind,
        });
        Ok(())
    }

    /// Wake the dormant children of a completed bracket entry.
    fn activate_children(&mut self, entry: OrderId, now: Timestamp) {
        if let Some(children) = self.dormant.remove(&entry) {
            for child in children {
                let _ = self.submit(child, now);
            }
        }
    }

    /// Cascade after `id` went terminal: cancel its dormant bracket children
    /// and every alive OCO sibling.
    fn after_terminal(&mut self, id: OrderId, now: Timestamp) {
        let Some(order) = self.orders.get(&id) else {
            return;
        };
        let status = order.status;
        let group = order.oco_group;

        if let Some(children) = self.dormant.remove(&id) {
            for child in children {
                let _ = self.cancel(child, now, format!("bracket entry {id} {status}"));
            }
        }

        let Some(group) = group else {
            return;
        };
        let siblings: Vec<OrderId> = self
            .oco_groups
            .get(&group)
            .map(|ids| ids.iter().copied().filter(|s| *s != id).collect())
            .unwrap_or_default();
        for sibling in siblings {
            let _ = self.cancel(sibling, now, format!("oco sibling {id} {status}"));
        }
    }
}
