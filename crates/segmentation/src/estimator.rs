//! Debounced audience-size recomputation with last-request-wins ordering.
//!
//! Each request takes a generation ticket. A result is published only while
//! its ticket is the newest issued; anything older is discarded, so a slow
//! stale computation can never overwrite a newer audience size.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crm_core::config::EstimatorConfig;
use crm_core::{CrmResult, Customer};
use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;

use crate::evaluator::AudienceEvaluator;
use crate::rule::Rule;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Estimate {
    pub generation: u64,
    pub audience_size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimateOutcome {
    Published(Estimate),
    /// A newer request was issued before this one finished.
    Superseded { generation: u64 },
}

pub struct AudienceEstimator {
    evaluator: AudienceEvaluator,
    debounce: Duration,
    generation: AtomicU64,
    tx: watch::Sender<Option<Estimate>>,
}

impl AudienceEstimator {
    pub fn new(evaluator: AudienceEvaluator, config: &EstimatorConfig) -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            evaluator,
            debounce: Duration::from_millis(config.debounce_ms),
            generation: AtomicU64::new(0),
            tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Estimate>> {
        self.tx.subscribe()
    }

    pub fn latest(&self) -> Option<Estimate> {
        *self.tx.borrow()
    }

    /// Wait out the debounce window, then count `rules` against `customers`
    /// unless a newer request arrived meanwhile.
    pub async fn recompute(
        &self,
        rules: Vec<Rule>,
        customers: Arc<Vec<Customer>>,
    ) -> CrmResult<EstimateOutcome> {
        let ticket = self.next_ticket();
        if !self.debounce.is_zero() {
            tokio::time::sleep(self.debounce).await;
            if !self.is_newest(ticket) {
                debug!(generation = ticket, "Audience estimate superseded during debounce");
                return Ok(EstimateOutcome::Superseded { generation: ticket });
            }
        }
        let audience_size = self.evaluator.count(&rules, &customers)?;
        Ok(self.publish(ticket, audience_size))
    }

    /// Run an arbitrary size computation under last-request-wins ordering.
    pub async fn submit<F>(&self, computation: F) -> CrmResult<EstimateOutcome>
    where
        F: Future<Output = CrmResult<u64>>,
    {
        let ticket = self.next_ticket();
        let audience_size = computation.await?;
        Ok(self.publish(ticket, audience_size))
    }

    fn next_ticket(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_newest(&self, ticket: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket
    }

    fn publish(&self, ticket: u64, audience_size: u64) -> EstimateOutcome {
        let estimate = Estimate {
            generation: ticket,
            audience_size,
        };
        let published = self.tx.send_if_modified(|current| {
            let newer_than_current = current.as_ref().map_or(true, |c| c.generation < ticket);
            if self.is_newest(ticket) && newer_than_current {
                *current = Some(estimate);
                true
            } else {
                false
            }
        });

        if published {
            debug!(generation = ticket, audience = audience_size, "Audience estimate published");
            EstimateOutcome::Published(estimate)
        } else {
            debug!(generation = ticket, "Audience estimate superseded");
            EstimateOutcome::Superseded { generation: ticket }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tokio::sync::oneshot;

    fn estimator(debounce_ms: u64) -> AudienceEstimator {
        AudienceEstimator::new(
            AudienceEvaluator::at(Utc::now()),
            &EstimatorConfig { debounce_ms },
        )
    }

    fn customers() -> Arc<Vec<Customer>> {
        Arc::new(
            [500.0, 1500.0, 25000.0]
                .into_iter()
                .map(|spend| {
                    let mut c = Customer::new("Test Customer", "test@example.com");
                    c.total_spend = spend;
                    c
                })
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_single_request_publishes() {
        let est = estimator(0);
        let rules = vec![Rule::parse("totalSpend", ">", 1000).unwrap()];
        let outcome = est.recompute(rules, customers()).await.unwrap();
        assert_eq!(
            outcome,
            EstimateOutcome::Published(Estimate {
                generation: 1,
                audience_size: 2
            })
        );
        assert_eq!(est.latest().map(|e| e.audience_size), Some(2));
    }

    #[tokio::test]
    async fn test_stale_result_is_discarded() {
        let est = estimator(0);
        let (release_slow, slow_gate) = oneshot::channel::<()>();

        let slow = est.submit(async move {
            let _ = slow_gate.await;
            Ok(999)
        });
        let fast = async {
            let outcome = est.submit(async { Ok(7) }).await;
            let _ = release_slow.send(());
            outcome
        };

        let (slow_outcome, fast_outcome) = tokio::join!(slow, fast);
        assert_eq!(
            slow_outcome.unwrap(),
            EstimateOutcome::Superseded { generation: 1 }
        );
        assert_eq!(
            fast_outcome.unwrap(),
            EstimateOutcome::Published(Estimate {
                generation: 2,
                audience_size: 7
            })
        );
        assert_eq!(est.latest().map(|e| e.audience_size), Some(7));
    }

    #[tokio::test]
    async fn test_request_superseded_during_debounce_skips_evaluation() {
        let est = estimator(30);
        let valid = vec![Rule::parse("totalSpend", ">", 1000).unwrap()];

        // An empty rule set errors if evaluated, so Superseded proves it was not.
        let (first, second) = tokio::join!(
            est.recompute(vec![], customers()),
            est.recompute(valid, customers())
        );
        assert_eq!(first.unwrap(), EstimateOutcome::Superseded { generation: 1 });
        assert_eq!(
            second.unwrap(),
            EstimateOutcome::Published(Estimate {
                generation: 2,
                audience_size: 2
            })
        );
    }

    #[tokio::test]
    async fn test_subscribers_see_latest() {
        let est = estimator(0);
        let mut rx = est.subscribe();
        let rules = vec![Rule::parse("totalSpend", ">", 100).unwrap()];
        est.recompute(rules, customers()).await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().map(|e| e.audience_size), Some(3));
    }

    #[tokio::test]
    async fn test_invalid_rules_propagate_error() {
        let est = estimator(0);
        assert!(est.recompute(vec![], customers()).await.is_err());
        assert!(est.latest().is_none());
    }
}
