//! Order lifecycle engine: validates, gates and commits every transition.

use chrono::{NaiveDate, Utc};
use common::{CustomerId, OrderId, PhoneNumber, StaffId, VehicleId};
use domain::{
    ConfirmationPhase, ConfirmationRecord, CredentialPurpose, EvidencePhase, EvidencePhoto, Order,
    OrderError, OrderItem, OrderNumber, OrderStatus, ReturnReport, ReturnedLine,
};
use store::{InventoryLine, StockDemand, StoreError, SupplyStore};

use crate::credentials::{CredentialService, IssuedCode};
use crate::error::{EngineError, Result};
use crate::notification::NotificationGateway;

/// Input for creating an order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    /// Unique human-readable number; generation policy belongs to the
    /// caller.
    pub order_number: OrderNumber,
    /// Customer the order belongs to.
    pub customer: CustomerId,
    /// Name of the event.
    pub event_name: String,
    /// Date of the event.
    pub event_date: NaiveDate,
    /// Phone receiving approval and delivery codes.
    pub supervisor_phone: PhoneNumber,
    /// Requested line items.
    pub items: Vec<OrderItem>,
}

/// Input for approving an order.
///
/// Staff approve without a code; customers self-approve with one, which
/// produces the approval confirmation record.
#[derive(Debug, Clone)]
pub struct ApproveOrder {
    /// Opaque reference to the approving actor.
    pub approved_by: String,
    /// Display name for the confirmation record; falls back to
    /// `approved_by`.
    pub approver_name: Option<String>,
    /// Verification code for customer self-approval.
    pub code: Option<String>,
}

/// Input for confirming a delivery.
#[derive(Debug, Clone)]
pub struct DeliverOrder {
    /// The delivery confirmation code sent to the supervisor phone.
    pub code: String,
    /// Who physically received the goods.
    pub recipient_name: String,
    /// Opaque reference to the confirming actor.
    pub confirmed_by: String,
}

/// Input for recording a return.
#[derive(Debug, Clone)]
pub struct ReturnOrder {
    /// Per-product returned quantities.
    pub lines: Vec<ReturnedLine>,
    /// Damaged/missing notes.
    pub report: ReturnReport,
}

/// Input for cancelling an order.
#[derive(Debug, Clone)]
pub struct CancelOrder {
    /// Why the order was cancelled.
    pub reason: String,
}

/// Drives the order state machine.
///
/// Every transition is validated by the aggregate, gated by a claimed
/// credential where the table requires one, and committed through the
/// store's conditional updates so concurrent callers cannot both win.
pub struct OrderLifecycleEngine<S, N> {
    store: S,
    credentials: CredentialService<S, N>,
    gateway: N,
}

impl<S, N> OrderLifecycleEngine<S, N>
where
    S: SupplyStore + Clone,
    N: NotificationGateway + Clone,
{
    /// Creates a new engine over a store and a notification gateway.
    pub fn new(store: S, gateway: N) -> Self {
        let credentials = CredentialService::new(store.clone(), gateway.clone());
        Self {
            store,
            credentials,
            gateway,
        }
    }

    /// Returns the credential service (login flows use it directly).
    pub fn credentials(&self) -> &CredentialService<S, N> {
        &self.credentials
    }

    /// Creates a new pending order.
    #[tracing::instrument(skip(self, cmd))]
    pub async fn create_order(&self, cmd: NewOrder) -> Result<Order> {
        let order = Order::create(
            cmd.order_number,
            cmd.customer,
            cmd.event_name,
            cmd.event_date,
            cmd.supervisor_phone,
            cmd.items,
            Utc::now(),
        )?;
        self.store.insert_order(&order).await?;

        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(order_id = %order.id, order_number = %order.order_number, "order created");
        Ok(order)
    }

    /// Loads an order by ID.
    pub async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.store.get_order(order_id).await?)
    }

    /// Loads an order by its unique number.
    pub async fn find_order(&self, number: &OrderNumber) -> Result<Option<Order>> {
        Ok(self.store.get_order_by_number(number).await?)
    }

    /// Lists all orders, most recent first.
    pub async fn list_orders(&self) -> Result<Vec<Order>> {
        Ok(self.store.list_orders().await?)
    }

    /// Updates staff/vehicle assignments; allowed before dispatch only.
    #[tracing::instrument(skip(self))]
    pub async fn assign(
        &self,
        order_id: OrderId,
        staff: Option<StaffId>,
        vehicle: Option<VehicleId>,
    ) -> Result<Order> {
        let mut order = self.load_required(order_id).await?;
        let expected = order.status;
        order.assign(staff, vehicle, Utc::now())?;
        self.commit(expected, &order).await?;
        Ok(order)
    }

    /// Issues an approval code to the order's supervisor phone.
    ///
    /// Only meaningful while the order still awaits approval.
    #[tracing::instrument(skip(self))]
    pub async fn request_approval_code(&self, order_id: OrderId) -> Result<IssuedCode> {
        let order = self.gate_for_code(order_id, ConfirmationPhase::Approval).await?;
        self.credentials
            .issue(&order.supervisor_phone, CredentialPurpose::OrderApproval)
            .await
    }

    /// Re-issues an approval code, subject to the resend cooldown.
    #[tracing::instrument(skip(self))]
    pub async fn resend_approval_code(&self, order_id: OrderId) -> Result<IssuedCode> {
        let order = self.gate_for_code(order_id, ConfirmationPhase::Approval).await?;
        self.credentials
            .resend(&order.supervisor_phone, CredentialPurpose::OrderApproval)
            .await
    }

    /// Approves the order (`pending -> approved`).
    ///
    /// With a code this is a customer self-approval: the credential is
    /// claimed first and an approval confirmation record is written after
    /// the commit. Without one it is a plain staff approval.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %order_id))]
    pub async fn approve(&self, order_id: OrderId, cmd: ApproveOrder) -> Result<Order> {
        let mut order = self.load_required(order_id).await?;
        let expected = order.status;
        order.approve(Utc::now())?;

        let credential_id = match &cmd.code {
            Some(code) => Some(
                self.credentials
                    .verify(
                        &order.supervisor_phone,
                        CredentialPurpose::OrderApproval,
                        code,
                    )
                    .await?,
            ),
            None => None,
        };

        self.commit(expected, &order).await?;
        metrics::counter!("order_transitions_total", "to" => "approved").increment(1);

        if let Some(credential_id) = credential_id {
            let recipient_name = cmd
                .approver_name
                .unwrap_or_else(|| cmd.approved_by.clone());
            let record = ConfirmationRecord::new(
                order.id,
                ConfirmationPhase::Approval,
                cmd.approved_by,
                recipient_name,
                credential_id,
                Utc::now(),
            );
            self.store.record_confirmation(&record).await?;
        }

        Ok(order)
    }

    /// Starts preparation (`approved -> preparing`).
    #[tracing::instrument(skip(self))]
    pub async fn start_preparing(&self, order_id: OrderId) -> Result<Order> {
        let mut order = self.load_required(order_id).await?;
        let expected = order.status;
        order.start_preparing(Utc::now())?;
        self.commit(expected, &order).await?;
        metrics::counter!("order_transitions_total", "to" => "preparing").increment(1);
        Ok(order)
    }

    /// Marks the order packed and ready (`preparing -> ready`).
    #[tracing::instrument(skip(self))]
    pub async fn mark_ready(&self, order_id: OrderId) -> Result<Order> {
        let mut order = self.load_required(order_id).await?;
        let expected = order.status;
        order.mark_ready(Utc::now())?;
        self.commit(expected, &order).await?;
        metrics::counter!("order_transitions_total", "to" => "ready").increment(1);
        Ok(order)
    }

    /// Dispatches the order (`ready -> dispatched`), deducting inventory.
    ///
    /// The status compare-and-swap and the all-or-nothing deduction commit
    /// in one transactional boundary: a concurrent dispatcher loses with
    /// `InvalidTransition`, a shortfall on any line leaves the order in
    /// `ready` with nothing deducted and reports which products were
    /// short.
    #[tracing::instrument(skip(self))]
    pub async fn dispatch(&self, order_id: OrderId) -> Result<Order> {
        let mut order = self.load_required(order_id).await?;
        let expected = order.status;
        order.dispatch(Utc::now())?;

        let demands = StockDemand::from_items(&order.items);
        match self
            .store
            .commit_dispatch(expected, &order, &demands)
            .await
        {
            Ok(()) => {}
            Err(StoreError::StaleStatus { actual, .. }) => {
                return Err(OrderError::InvalidTransition {
                    current: actual,
                    requested: OrderStatus::Dispatched,
                }
                .into());
            }
            Err(e) => return Err(e.into()),
        }

        metrics::counter!("order_transitions_total", "to" => "dispatched").increment(1);
        tracing::info!(order_id = %order.id, order_number = %order.order_number, "order dispatched");
        self.notify(
            &order.supervisor_phone,
            &format!(
                "Order {} is on its way for {}.",
                order.order_number, order.event_name
            ),
        )
        .await;
        Ok(order)
    }

    /// Issues a delivery confirmation code to the supervisor phone.
    ///
    /// Only meaningful while the goods are out for delivery.
    #[tracing::instrument(skip(self))]
    pub async fn request_delivery_code(&self, order_id: OrderId) -> Result<IssuedCode> {
        let order = self.gate_for_code(order_id, ConfirmationPhase::Delivery).await?;
        self.credentials
            .issue(
                &order.supervisor_phone,
                CredentialPurpose::DeliveryConfirmation,
            )
            .await
    }

    /// Re-issues a delivery confirmation code, subject to the cooldown.
    #[tracing::instrument(skip(self))]
    pub async fn resend_delivery_code(&self, order_id: OrderId) -> Result<IssuedCode> {
        let order = self.gate_for_code(order_id, ConfirmationPhase::Delivery).await?;
        self.credentials
            .resend(
                &order.supervisor_phone,
                CredentialPurpose::DeliveryConfirmation,
            )
            .await
    }

    /// Confirms delivery (`dispatched -> delivered`).
    ///
    /// The transition is validated before the credential is claimed, so an
    /// out-of-order request never burns a code; the claim happens before
    /// the commit, so the order is never delivered without a verified
    /// credential.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %order_id))]
    pub async fn deliver(&self, order_id: OrderId, cmd: DeliverOrder) -> Result<Order> {
        let mut order = self.load_required(order_id).await?;
        let expected = order.status;
        order.deliver(cmd.recipient_name.clone(), Utc::now())?;

        let credential_id = self
            .credentials
            .verify(
                &order.supervisor_phone,
                CredentialPurpose::DeliveryConfirmation,
                &cmd.code,
            )
            .await?;

        self.commit(expected, &order).await?;
        metrics::counter!("order_transitions_total", "to" => "delivered").increment(1);

        let record = ConfirmationRecord::new(
            order.id,
            ConfirmationPhase::Delivery,
            cmd.confirmed_by,
            cmd.recipient_name,
            credential_id,
            Utc::now(),
        );
        self.store.record_confirmation(&record).await?;

        tracing::info!(order_id = %order.id, order_number = %order.order_number, "delivery confirmed");
        self.notify(
            &order.supervisor_phone,
            &format!(
                "Order {} was delivered to {}.",
                order.order_number,
                order.recipient_name.as_deref().unwrap_or("the recipient")
            ),
        )
        .await;
        Ok(order)
    }

    /// Records a return (`delivered -> returned`); stock is not restored.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %order_id))]
    pub async fn mark_returned(&self, order_id: OrderId, cmd: ReturnOrder) -> Result<Order> {
        let mut order = self.load_required(order_id).await?;
        let expected = order.status;
        order.mark_returned(&cmd.lines, cmd.report, Utc::now())?;
        self.commit(expected, &order).await?;
        metrics::counter!("order_transitions_total", "to" => "returned").increment(1);
        Ok(order)
    }

    /// Cancels the order from any pre-dispatch status.
    ///
    /// Stock is never deducted before dispatch, so there is nothing to
    /// restore.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %order_id))]
    pub async fn cancel(&self, order_id: OrderId, cmd: CancelOrder) -> Result<Order> {
        let mut order = self.load_required(order_id).await?;
        let expected = order.status;
        order.cancel(cmd.reason, Utc::now())?;
        self.commit(expected, &order).await?;
        metrics::counter!("order_transitions_total", "to" => "cancelled").increment(1);
        Ok(order)
    }

    /// Appends an evidence photo reference to an order.
    #[tracing::instrument(skip(self, blob_ref, uploaded_by))]
    pub async fn attach_photo(
        &self,
        order_id: OrderId,
        phase: EvidencePhase,
        blob_ref: impl Into<String>,
        uploaded_by: impl Into<String>,
    ) -> Result<EvidencePhoto> {
        let photo = EvidencePhoto::new(order_id, phase, blob_ref, uploaded_by, Utc::now());
        self.store.attach_photo(&photo).await?;
        Ok(photo)
    }

    /// Lists an order's evidence photos.
    pub async fn photos(&self, order_id: OrderId) -> Result<Vec<EvidencePhoto>> {
        Ok(self.store.photos_for_order(order_id).await?)
    }

    /// Lists an order's confirmation records.
    pub async fn confirmations(&self, order_id: OrderId) -> Result<Vec<ConfirmationRecord>> {
        Ok(self.store.confirmations_for_order(order_id).await?)
    }

    /// Lists tracked stock levels.
    pub async fn stock_levels(&self) -> Result<Vec<InventoryLine>> {
        Ok(self.store.list_lines().await?)
    }

    /// Sets the stock level for a product.
    #[tracing::instrument(skip(self))]
    pub async fn set_stock_level(&self, line: InventoryLine) -> Result<()> {
        Ok(self.store.upsert_line(&line).await?)
    }

    async fn load_required(&self, order_id: OrderId) -> Result<Order> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or(EngineError::OrderNotFound(order_id))
    }

    /// Loads the order and checks it sits in the status whose exit the
    /// requested code would gate, so codes are only issued when they can
    /// actually be used.
    async fn gate_for_code(&self, order_id: OrderId, phase: ConfirmationPhase) -> Result<Order> {
        let order = self.load_required(order_id).await?;
        let (required, requested) = match phase {
            ConfirmationPhase::Approval => (OrderStatus::Pending, OrderStatus::Approved),
            ConfirmationPhase::Delivery => (OrderStatus::Dispatched, OrderStatus::Delivered),
        };
        if order.status != required {
            return Err(OrderError::InvalidTransition {
                current: order.status,
                requested,
            }
            .into());
        }
        Ok(order)
    }

    /// Commits a mutated order through the status compare-and-swap,
    /// surfacing a lost race as `InvalidTransition`.
    async fn commit(&self, expected: OrderStatus, order: &Order) -> Result<()> {
        match self.store.update_if_status(expected, order).await {
            Ok(()) => Ok(()),
            Err(StoreError::StaleStatus { actual, .. }) => Err(OrderError::InvalidTransition {
                current: actual,
                requested: order.status,
            }
            .into()),
            Err(e) => Err(e.into()),
        }
    }

    /// Best-effort status text; failure is a warning, never a transition
    /// failure.
    async fn notify(&self, phone: &PhoneNumber, message: &str) {
        if let Err(e) = self.gateway.send(phone, message).await {
            metrics::counter!("notifications_failed_total").increment(1);
            tracing::warn!(%phone, error = %e, "status notification failed");
        }
    }
}
