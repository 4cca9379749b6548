//! Order aggregate implementation.

use chrono::{DateTime, NaiveDate, Utc};
use common::{CustomerId, OrderId, PhoneNumber, StaffId, VehicleId};
use serde::{Deserialize, Serialize};

use super::{
    OrderError, OrderItem, OrderNumber, OrderStatus, ReturnReport, ReturnedLine, UnmetPrecondition,
};

/// Timestamps recorded as the order passes its lifecycle milestones.
///
/// Along any order's history these are monotonically non-decreasing and
/// only ever set by the matching transition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTimestamps {
    pub approved_at: Option<DateTime<Utc>>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub returned_at: Option<DateTime<Utc>>,
}

/// Order aggregate root.
///
/// Owns its line items and is the only place status transitions are
/// validated. The transition methods mutate the loaded copy in place; the
/// store then commits the whole row conditionally on the status it was
/// loaded with, so a stale copy can never overwrite a newer one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Unique order identifier.
    pub id: OrderId,

    /// Human-readable unique order number.
    pub order_number: OrderNumber,

    /// Customer the order belongs to.
    pub customer: CustomerId,

    /// Name of the event the goods are for.
    pub event_name: String,

    /// Date of the event.
    pub event_date: NaiveDate,

    /// Current lifecycle status.
    pub status: OrderStatus,

    /// Staff member assigned to carry out the delivery.
    pub assigned_staff: Option<StaffId>,

    /// Vehicle assigned to carry out the delivery.
    pub assigned_vehicle: Option<VehicleId>,

    /// Phone that receives approval and delivery credentials.
    pub supervisor_phone: PhoneNumber,

    /// Name of the person who received the goods, set at delivery.
    pub recipient_name: Option<String>,

    /// Line items; the aggregate owns these exclusively.
    pub items: Vec<OrderItem>,

    /// Damaged/missing notes captured when goods come back.
    pub return_report: Option<ReturnReport>,

    /// Reason supplied at cancellation.
    pub cancel_reason: Option<String>,

    /// Creation time.
    pub created_at: DateTime<Utc>,

    /// Last mutation time; refreshed by every committed transition.
    pub updated_at: DateTime<Utc>,

    /// Milestone timestamps.
    pub timestamps: StatusTimestamps,
}

impl Order {
    /// Creates a new pending order.
    ///
    /// Rejects empty item lists, zero quantities and duplicate products.
    pub fn create(
        order_number: OrderNumber,
        customer: CustomerId,
        event_name: impl Into<String>,
        event_date: NaiveDate,
        supervisor_phone: PhoneNumber,
        items: Vec<OrderItem>,
        now: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        if items.is_empty() {
            return Err(OrderError::NoItems);
        }
        for (i, item) in items.iter().enumerate() {
            if item.quantity_requested == 0 {
                return Err(OrderError::InvalidQuantity {
                    product_id: item.product_id.clone(),
                    quantity: 0,
                });
            }
            if items[..i].iter().any(|p| p.product_id == item.product_id) {
                return Err(OrderError::DuplicateItem {
                    product_id: item.product_id.clone(),
                });
            }
        }

        Ok(Self {
            id: OrderId::new(),
            order_number,
            customer,
            event_name: event_name.into(),
            event_date,
            status: OrderStatus::Pending,
            assigned_staff: None,
            assigned_vehicle: None,
            supervisor_phone,
            recipient_name: None,
            items,
            return_report: None,
            cancel_reason: None,
            created_at: now,
            updated_at: now,
            timestamps: StatusTimestamps::default(),
        })
    }

    /// Returns the item for a product, if present.
    pub fn item(&self, product_id: &common::ProductId) -> Option<&OrderItem> {
        self.items.iter().find(|i| &i.product_id == product_id)
    }

    /// Returns true if the order is in a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn guard(&self, allowed: bool, requested: OrderStatus) -> Result<(), OrderError> {
        if allowed {
            Ok(())
        } else {
            Err(OrderError::InvalidTransition {
                current: self.status,
                requested,
            })
        }
    }

    /// Approves the order (`pending -> approved`).
    ///
    /// Whether a credential was required is the engine's concern; the
    /// aggregate only validates the state change.
    pub fn approve(&mut self, at: DateTime<Utc>) -> Result<(), OrderError> {
        self.guard(self.status.can_approve(), OrderStatus::Approved)?;
        self.status = OrderStatus::Approved;
        self.timestamps.approved_at = Some(at);
        self.updated_at = at;
        Ok(())
    }

    /// Starts preparation (`approved -> preparing`).
    pub fn start_preparing(&mut self, at: DateTime<Utc>) -> Result<(), OrderError> {
        self.guard(self.status.can_start_preparing(), OrderStatus::Preparing)?;
        self.status = OrderStatus::Preparing;
        self.updated_at = at;
        Ok(())
    }

    /// Marks the order packed and ready (`preparing -> ready`).
    pub fn mark_ready(&mut self, at: DateTime<Utc>) -> Result<(), OrderError> {
        self.guard(self.status.can_mark_ready(), OrderStatus::Ready)?;
        self.status = OrderStatus::Ready;
        self.updated_at = at;
        Ok(())
    }

    /// Dispatches the order (`ready -> dispatched`).
    ///
    /// Requires both a staff and a vehicle assignment, and marks every
    /// line fully dispatched. Inventory deduction happens in the engine
    /// before this state change is committed.
    pub fn dispatch(&mut self, at: DateTime<Utc>) -> Result<(), OrderError> {
        self.guard(self.status.can_dispatch(), OrderStatus::Dispatched)?;

        let staff_missing = self.assigned_staff.is_none();
        let vehicle_missing = self.assigned_vehicle.is_none();
        if staff_missing || vehicle_missing {
            return Err(OrderError::PreconditionUnmet(
                UnmetPrecondition::MissingAssignments {
                    staff: staff_missing,
                    vehicle: vehicle_missing,
                },
            ));
        }

        for item in &mut self.items {
            item.quantity_dispatched = item.quantity_requested;
        }
        self.status = OrderStatus::Dispatched;
        self.timestamps.dispatched_at = Some(at);
        self.updated_at = at;
        Ok(())
    }

    /// Confirms delivery (`dispatched -> delivered`).
    ///
    /// The recipient's name is mandatory; credential verification happens
    /// in the engine before this state change is committed.
    pub fn deliver(
        &mut self,
        recipient_name: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        self.guard(self.status.can_deliver(), OrderStatus::Delivered)?;

        let recipient_name = recipient_name.into();
        if recipient_name.trim().is_empty() {
            return Err(OrderError::PreconditionUnmet(
                UnmetPrecondition::MissingRecipientName,
            ));
        }

        self.recipient_name = Some(recipient_name);
        self.status = OrderStatus::Delivered;
        self.timestamps.delivered_at = Some(at);
        self.updated_at = at;
        Ok(())
    }

    /// Records a return (`delivered -> returned`).
    ///
    /// Every returned line must reference a dispatched product and stay
    /// within its dispatched quantity. Stock is not restored.
    pub fn mark_returned(
        &mut self,
        lines: &[ReturnedLine],
        report: ReturnReport,
        at: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        self.guard(self.status.can_mark_returned(), OrderStatus::Returned)?;

        for line in lines {
            let item = self
                .items
                .iter()
                .find(|i| i.product_id == line.product_id)
                .ok_or_else(|| OrderError::UnknownReturnItem {
                    product_id: line.product_id.clone(),
                })?;
            if line.quantity > item.quantity_dispatched {
                return Err(OrderError::ReturnExceedsDispatched {
                    product_id: line.product_id.clone(),
                    returned: line.quantity,
                    dispatched: item.quantity_dispatched,
                });
            }
        }

        for line in lines {
            if let Some(item) = self
                .items
                .iter_mut()
                .find(|i| i.product_id == line.product_id)
            {
                item.quantity_returned = line.quantity;
            }
        }
        self.return_report = Some(report);
        self.status = OrderStatus::Returned;
        self.timestamps.returned_at = Some(at);
        self.updated_at = at;
        Ok(())
    }

    /// Cancels the order from any pre-dispatch status.
    pub fn cancel(
        &mut self,
        reason: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        self.guard(self.status.can_cancel(), OrderStatus::Cancelled)?;
        self.cancel_reason = Some(reason.into());
        self.status = OrderStatus::Cancelled;
        self.updated_at = at;
        Ok(())
    }

    /// Updates staff and/or vehicle assignments.
    ///
    /// Allowed in any status before dispatch; passing `None` leaves the
    /// existing assignment untouched.
    pub fn assign(
        &mut self,
        staff: Option<StaffId>,
        vehicle: Option<VehicleId>,
        at: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        if !self.status.can_assign() {
            return Err(OrderError::AssignmentLocked {
                current: self.status,
            });
        }
        if let Some(staff) = staff {
            self.assigned_staff = Some(staff);
        }
        if let Some(vehicle) = vehicle {
            self.assigned_vehicle = Some(vehicle);
        }
        self.updated_at = at;
        Ok(())
    }
}
