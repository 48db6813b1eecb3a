//! Payment gateway collaborators.
//!
//! The engine never charges or refunds by itself. It asks a [`RefundGateway`]
//! to return funds and applies `confirmed → refunded` only once the gateway
//! reports success, and it reads audited fee/net figures from a
//! [`ReconciliationSource`].

use crate::types::{GatewayFigures, Money, ReservationId};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Payment gateway result
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Boxed future returned by gateway collaborators
pub type GatewayFuture<T> = Pin<Box<dyn Future<Output = GatewayResult<T>> + Send>>;

/// Payment gateway error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The gateway refused the refund
    #[error("Refund declined: {reason}")]
    RefundDeclined {
        /// Decline reason
        reason: String,
    },
    /// Gateway timeout
    #[error("Gateway timeout")]
    Timeout,
    /// Other error
    #[error("Gateway error: {message}")]
    Other {
        /// Error message
        message: String,
    },
}

/// Confirmation of a completed refund
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefundReceipt {
    /// Reservation refunded
    pub reservation_id: ReservationId,
    /// Gateway transaction ID
    pub transaction_id: String,
    /// Amount returned to the guest
    pub amount: Money,
}

/// Refund collaborator
pub trait RefundGateway: Send + Sync {
    /// Ask the gateway to return `amount` to the guest
    ///
    /// # Errors
    ///
    /// Returns error if the refund did not go through
    fn request_refund(&self, reservation_id: ReservationId, amount: Money) -> GatewayFuture<RefundReceipt>;
}

/// Mock refund gateway (always succeeds for development)
#[derive(Clone, Copy, Debug, Default)]
pub struct MockRefundGateway;

impl MockRefundGateway {
    /// Creates an Arc-wrapped instance for sharing
    #[must_use]
    pub fn shared() -> Arc<dyn RefundGateway> {
        Arc::new(Self)
    }
}

impl RefundGateway for MockRefundGateway {
    fn request_refund(&self, reservation_id: ReservationId, amount: Money) -> GatewayFuture<RefundReceipt> {
        Box::pin(async move {
            let transaction_id = format!("mock_refund_{}", uuid::Uuid::new_v4().simple());

            tracing::info!(
                %reservation_id,
                amount = amount.cents(),
                %transaction_id,
                "Mock refund processed successfully"
            );

            Ok(RefundReceipt {
                reservation_id,
                transaction_id,
                amount,
            })
        })
    }
}

/// Refund gateway that declines everything
#[derive(Clone, Debug)]
pub struct FailingRefundGateway {
    error: GatewayError,
}

impl FailingRefundGateway {
    /// Creates a gateway that always fails with `error`
    #[must_use]
    pub const fn new(error: GatewayError) -> Self {
        Self { error }
    }
}

impl Default for FailingRefundGateway {
    fn default() -> Self {
        Self::new(GatewayError::Timeout)
    }
}

impl RefundGateway for FailingRefundGateway {
    fn request_refund(&self, reservation_id: ReservationId, _amount: Money) -> GatewayFuture<RefundReceipt> {
        let error = self.error.clone();
        Box::pin(async move {
            tracing::warn!(%reservation_id, %error, "Refund declined by gateway");
            Err(error)
        })
    }
}

/// Source of audited fee/net figures
pub trait ReconciliationSource: Send + Sync {
    /// Figures for a reservation, `None` while the gateway has not settled it
    ///
    /// # Errors
    ///
    /// Returns error if the gateway cannot be queried
    fn fetch(&self, reservation_id: ReservationId) -> GatewayFuture<Option<GatewayFigures>>;
}

/// In-memory reconciliation figures
#[derive(Clone, Debug, Default)]
pub struct InMemoryReconciliationSource {
    figures: Arc<RwLock<HashMap<ReservationId, GatewayFigures>>>,
}

impl InMemoryReconciliationSource {
    /// Creates an empty source
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish settled figures for a reservation
    pub async fn publish(&self, reservation_id: ReservationId, figures: GatewayFigures) {
        self.figures.write().await.insert(reservation_id, figures);
    }
}

impl ReconciliationSource for InMemoryReconciliationSource {
    fn fetch(&self, reservation_id: ReservationId) -> GatewayFuture<Option<GatewayFigures>> {
        let figures = Arc::clone(&self.figures);
        Box::pin(async move { Ok(figures.read().await.get(&reservation_id).cloned()) })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_gateway_echoes_the_refund() {
        let receipt = MockRefundGateway
            .request_refund(ReservationId::from("r1"), Money::from_units(50))
            .await
            .unwrap();
        assert_eq!(receipt.reservation_id, ReservationId::from("r1"));
        assert_eq!(receipt.amount, Money::from_units(50));
        assert!(receipt.transaction_id.starts_with("mock_refund_"));
    }

    #[tokio::test]
    async fn failing_gateway_returns_its_error() {
        let gateway = FailingRefundGateway::new(GatewayError::RefundDeclined {
            reason: "closed account".to_string(),
        });
        let error = gateway
            .request_refund(ReservationId::from("r1"), Money::from_units(50))
            .await
            .unwrap_err();
        assert_eq!(error.to_string(), "Refund declined: closed account");
    }

    #[tokio::test]
    async fn reconciliation_source_returns_published_figures() {
        let source = InMemoryReconciliationSource::new();
        assert_eq!(source.fetch(ReservationId::from("r1")).await.unwrap(), None);

        let figures = GatewayFigures {
            gateway_fee: Money::from_units(2),
            gateway_net_received: Money::from_units(18),
            gateway_status: "settled".to_string(),
        };
        source.publish(ReservationId::from("r1"), figures.clone()).await;
        assert_eq!(source.fetch(ReservationId::from("r1")).await.unwrap(), Some(figures));
    }
}
