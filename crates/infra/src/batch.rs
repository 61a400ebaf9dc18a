//! Batch Processor.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, error, info, instrument, warn};

use pantry_core::{ErrorKind, OrderId, ServiceError, ServiceResult, round_quantity};
use pantry_orders::{BatchOutcome, BatchReport, ConsumptionMap, Order, OrderSubmission, StockEvent};

use crate::context::RequestContext;
use crate::ledger::StockLedger;
use crate::lifecycle::OrderLifecycleController;

/// Why one submission in a batch did not go through.
struct Declined {
    /// Set once the order was created, i.e. it may hold a reservation.
    order_id: Option<OrderId>,
    error: ServiceError,
}

/// Runs create → close per submission, isolating per-order failures.
#[derive(Clone)]
pub struct BatchProcessor {
    controller: Arc<OrderLifecycleController>,
    ledger: StockLedger,
}

impl BatchProcessor {
    pub fn new(controller: Arc<OrderLifecycleController>, ledger: StockLedger) -> Self {
        Self { controller, ledger }
    }

    /// Process every submission in input order.
    ///
    /// A failed submission is recorded as a `rejected` order whose note carries
    /// the reason, and the batch moves on. Only a fired deadline or
    /// cancellation aborts the batch; orders completed before that stay
    /// completed.
    #[instrument(skip(self, ctx, submissions), fields(total = submissions.len()), err)]
    pub async fn process_batch(
        &self,
        ctx: &RequestContext,
        submissions: &[OrderSubmission],
    ) -> ServiceResult<BatchOutcome> {
        let mut handled = Vec::with_capacity(submissions.len());
        let mut unrecorded = Vec::new();
        let mut consumption = ConsumptionMap::new();
        let mut revenue = Decimal::ZERO;
        let mut accepted = 0usize;

        for (index, submission) in submissions.iter().enumerate() {
            ctx.check()?;
            match self.process_one(ctx, submission).await {
                Ok((order, used)) => {
                    accepted += 1;
                    revenue = revenue.saturating_add(order.total);
                    consumption.merge(used);
                    handled.push(order);
                }
                Err(declined) if declined.error.kind() == ErrorKind::Timeout => {
                    return Err(declined.error);
                }
                Err(declined) => {
                    warn!(index, reason = %declined.error, "batch order declined");
                    let (order, persisted) = self.decline(ctx, submission, declined).await?;
                    if !persisted {
                        unrecorded.push(order.id);
                    }
                    handled.push(order);
                }
            }
        }

        let stock_events = self.stock_events(ctx, &consumption).await;
        let report = BatchReport {
            total: submissions.len(),
            accepted,
            declined: submissions.len() - accepted,
            revenue,
            stock_events,
        };
        info!(
            total = report.total,
            accepted = report.accepted,
            declined = report.declined,
            revenue = %report.revenue,
            "batch processed"
        );
        Ok(BatchOutcome {
            handled,
            unrecorded,
            report,
        })
    }

    async fn process_one(
        &self,
        ctx: &RequestContext,
        submission: &OrderSubmission,
    ) -> Result<(Order, ConsumptionMap), Declined> {
        let opened = self
            .controller
            .create(ctx, submission)
            .await
            .map_err(|error| Declined {
                order_id: None,
                error,
            })?;

        let (closed, consumed) = self
            .controller
            .close_consuming(ctx, opened.id)
            .await
            .map_err(|error| Declined {
                order_id: Some(opened.id),
                error,
            })?;

        let mut used = ConsumptionMap::new();
        for reservation in &consumed {
            used.record(reservation.ingredient_id, reservation.quantity);
        }
        Ok((closed, used))
    }

    /// Record the failure and report whether the rejection reached the store.
    ///
    /// Persisting is best effort: when it fails, the returned order exists only
    /// in the outcome. A timeout still aborts the batch.
    async fn decline(
        &self,
        ctx: &RequestContext,
        submission: &OrderSubmission,
        declined: Declined,
    ) -> ServiceResult<(Order, bool)> {
        let reason = declined.error.to_string();
        let persisted = match declined.order_id {
            Some(order_id) => self.controller.reject(ctx, order_id, &reason).await,
            None => self.controller.record_rejection(ctx, submission, &reason).await,
        };

        match persisted {
            Ok(order) => Ok((order, true)),
            Err(e) if e.kind() == ErrorKind::Timeout => Err(e),
            Err(e) => {
                let order_id = declined.order_id.unwrap_or_else(OrderId::new);
                error!(
                    %order_id,
                    created = declined.order_id.is_some(),
                    error = %e,
                    "failed to persist rejected batch order"
                );
                Ok((Order::rejected(order_id, submission, reason, Utc::now()).0, false))
            }
        }
    }

    /// Consumed quantity plus current on-hand per ingredient. Ingredients whose
    /// lookup fails are left out.
    async fn stock_events(&self, ctx: &RequestContext, consumption: &ConsumptionMap) -> Vec<StockEvent> {
        let mut events = Vec::new();
        for (ingredient_id, consumed) in consumption.iter() {
            match self.ledger.stock(ctx, ingredient_id).await {
                Ok(stock) => events.push(StockEvent {
                    ingredient_id,
                    ingredient_name: stock.name,
                    consumed,
                    remaining: round_quantity(stock.on_hand),
                }),
                Err(e) => debug!(%ingredient_id, error = %e, "stock lookup failed, omitted from report"),
            }
        }
        events
    }
}
