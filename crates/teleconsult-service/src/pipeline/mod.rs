//! Payment reconciliation and the post-payment pipeline.
//!
//! Once a payment record is committed, a [`Pipeline`] of [`Step`]s runs against
//! it. Steps run in order; a failing step is logged and recorded in the
//! [`PipelineReport`] but never rolls back earlier steps or the payment itself.
//!
//! Every delivery of an approved payment runs the pipeline, including duplicates,
//! so steps must be idempotent per transaction: a retry completes the steps an
//! interrupted delivery never reached and repeats none of the ones it did.

pub mod fanout;
pub mod ledger;
pub mod reconcile;

use async_trait::async_trait;

use teleconsult_core::{Consultation, PaymentRecord};
use teleconsult_store::Store;

pub use fanout::NotifyProfessional;
pub use ledger::DistributeFunds;
pub use reconcile::{reconcile_payment, Reconciliation};

/// What a step sees: the paid consultation and its payment record.
#[derive(Debug, Clone)]
pub struct PaymentContext {
    /// The consultation, as marked paid.
    pub consultation: Consultation,
    /// The recorded payment.
    pub payment: PaymentRecord,
}

/// A side effect chained after a committed payment.
#[async_trait]
pub trait Step: Send + Sync {
    /// Name used in logs and reports.
    fn name(&self) -> &'static str;

    /// Run the step.
    async fn run(&self, store: &dyn Store, ctx: &PaymentContext) -> teleconsult_core::Result<()>;
}

/// Result of a single step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    /// Step name.
    pub step: &'static str,
    /// Error message when the step failed.
    pub error: Option<String>,
}

impl StepOutcome {
    /// Whether the step succeeded.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-step results of one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    /// Outcomes in execution order.
    pub outcomes: Vec<StepOutcome>,
}

impl PipelineReport {
    /// Whether every step succeeded.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(StepOutcome::succeeded)
    }

    /// Names of the steps that failed.
    #[must_use]
    pub fn failed_steps(&self) -> Vec<&'static str> {
        self.outcomes
            .iter()
            .filter(|o| !o.succeeded())
            .map(|o| o.step)
            .collect()
    }
}

/// An ordered list of steps.
pub struct Pipeline {
    steps: Vec<Box<dyn Step>>,
}

impl Pipeline {
    /// Build a pipeline from explicit steps.
    #[must_use]
    pub fn new(steps: Vec<Box<dyn Step>>) -> Self {
        Self { steps }
    }

    /// Fund distribution, then the professional's notification.
    #[must_use]
    pub fn post_payment() -> Self {
        Self::new(vec![Box::new(DistributeFunds), Box::new(NotifyProfessional)])
    }

    /// Step names in execution order.
    #[must_use]
    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run every step; failures are logged and recorded, never propagated.
    pub async fn run(&self, store: &dyn Store, ctx: &PaymentContext) -> PipelineReport {
        let mut report = PipelineReport::default();

        for step in &self.steps {
            let error = match step.run(store, ctx).await {
                Ok(()) => {
                    tracing::debug!(
                        step = step.name(),
                        transaction_id = %ctx.payment.transaction_id,
                        "Post-payment step completed"
                    );
                    None
                }
                Err(e) => {
                    tracing::error!(
                        step = step.name(),
                        transaction_id = %ctx.payment.transaction_id,
                        consultation_id = %ctx.consultation.id,
                        error = %e,
                        "Post-payment step failed"
                    );
                    Some(e.to_string())
                }
            };
            report.outcomes.push(StepOutcome {
                step: step.name(),
                error,
            });
        }

        report
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("steps", &self.step_names())
            .finish()
    }
}
