//! Status conditions for a Pulp resource
//!
//! Each subsystem owns one `<Title>-<Subsystem>-Ready` condition, and one
//! aggregate `<Title>-Operator-Finished-Execution` condition summarizes the
//! pass. Writes only happen when a condition's state actually changes.

use chrono::Utc;
use kube::ResourceExt;
use tracing::{debug, warn};

use super::cluster::{Cluster, EventType};
use crate::crd::{Condition, Pulp, PulpStatus};
use crate::error::Result;

pub const CONDITION_STATUS_TRUE: &str = "True";
pub const CONDITION_STATUS_FALSE: &str = "False";

pub const REASON_RECONCILING: &str = "Reconciling";
pub const REASON_INVALID_SPEC: &str = "InvalidSpec";
pub const REASON_INTROSPECTION_FAILED: &str = "IntrospectionFailed";
pub const REASON_WAITING_FOR_CONTENT: &str = "WaitingForContentPod";
pub const REASON_FINISHED: &str = "OperatorFinishedExecution";

/// Units of the deployment that report readiness separately
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Subsystem {
    Database,
    Api,
    Content,
    Worker,
    Web,
    Ingress,
    Route,
}

impl Subsystem {
    pub fn label(&self) -> &'static str {
        match self {
            Subsystem::Database => "Database",
            Subsystem::Api => "API",
            Subsystem::Content => "Content",
            Subsystem::Worker => "Worker",
            Subsystem::Web => "Web",
            Subsystem::Ingress => "Ingress",
            Subsystem::Route => "Route",
        }
    }

    pub fn creating_reason(&self) -> String {
        format!("Creating{}", self.label())
    }

    pub fn updating_reason(&self) -> String {
        format!("Updating{}", self.label())
    }

    pub fn finished_reason(&self) -> String {
        format!("{}TasksFinished", self.label())
    }
}

pub fn condition_type(pulp: &Pulp, subsystem: Subsystem) -> String {
    format!("{}-{}-Ready", pulp.spec.title(), subsystem.label())
}

pub fn finished_condition_type(pulp: &Pulp) -> String {
    format!("{}-Operator-Finished-Execution", pulp.spec.title())
}

/// Update or add a condition to the conditions list
///
/// The transition time only moves when the status changes.
pub fn set_condition(
    conditions: &mut Vec<Condition>,
    type_: &str,
    status: &str,
    reason: &str,
    message: &str,
) {
    let now = Utc::now().to_rfc3339();

    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == type_) {
        let should_update_time = existing.status != status;

        existing.status = status.to_string();
        existing.reason = reason.to_string();
        existing.message = message.to_string();

        if should_update_time {
            existing.last_transition_time = now;
        }
    } else {
        conditions.push(Condition::new(
            type_,
            status == CONDITION_STATUS_TRUE,
            reason,
            message,
        ));
    }
}

/// Find a condition by type
pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// Check if a condition is true
pub fn is_condition_true(conditions: &[Condition], type_: &str) -> bool {
    find_condition(conditions, type_)
        .map(|c| c.status == CONDITION_STATUS_TRUE)
        .unwrap_or(false)
}

/// Condition bookkeeping for a single reconcile pass.
///
/// Starts from the conditions stored on the resource. [`StatusTracker::set`]
/// writes through to the status subresource and emits an event, but only
/// when the condition's state flips; repeating the current state is free.
pub struct StatusTracker<'a, C: Cluster> {
    cluster: &'a C,
    pulp: &'a Pulp,
    conditions: Vec<Condition>,
    touched: Vec<String>,
}

impl<'a, C: Cluster> StatusTracker<'a, C> {
    pub fn new(cluster: &'a C, pulp: &'a Pulp) -> Self {
        Self {
            cluster,
            pulp,
            conditions: pulp
                .status
                .as_ref()
                .map(|s| s.conditions.clone())
                .unwrap_or_default(),
            touched: Vec::new(),
        }
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Record the state of a subsystem condition
    ///
    /// Returns whether anything was written.
    pub async fn subsystem(
        &mut self,
        subsystem: Subsystem,
        state: bool,
        reason: &str,
        message: &str,
    ) -> Result<bool> {
        let type_ = condition_type(self.pulp, subsystem);
        self.set(&type_, state, reason, message).await
    }

    /// Record the state of any condition type
    pub async fn set(&mut self, type_: &str, state: bool, reason: &str, message: &str) -> Result<bool> {
        if !self.touched.iter().any(|t| t == type_) {
            self.touched.push(type_.to_string());
        }
        self.write(type_, state, reason, message).await
    }

    /// Whether every condition set during this pass is True
    pub fn all_true(&self) -> bool {
        self.touched
            .iter()
            .all(|t| is_condition_true(&self.conditions, t))
    }

    /// Derive the aggregate condition from the conditions touched this pass
    pub async fn finish(&mut self) -> Result<bool> {
        let finished = finished_condition_type(self.pulp);
        if self.all_true() {
            self.write(
                &finished,
                true,
                REASON_FINISHED,
                "All tasks ran successfully",
            )
            .await
        } else {
            self.write(
                &finished,
                false,
                REASON_RECONCILING,
                "Reconciling the deployment",
            )
            .await
        }
    }

    /// Mark the whole resource as failed without touching subsystems
    pub async fn fail(&mut self, reason: &str, message: &str) -> Result<bool> {
        let finished = finished_condition_type(self.pulp);
        self.write(&finished, false, reason, message).await
    }

    async fn write(&mut self, type_: &str, state: bool, reason: &str, message: &str) -> Result<bool> {
        let current = find_condition(&self.conditions, type_).map(Condition::is_true);
        if current == Some(state) {
            return Ok(false);
        }

        let status = if state {
            CONDITION_STATUS_TRUE
        } else {
            CONDITION_STATUS_FALSE
        };
        set_condition(&mut self.conditions, type_, status, reason, message);
        let generation = self.pulp.metadata.generation;
        if let Some(condition) = self.conditions.iter_mut().find(|c| c.type_ == type_) {
            condition.observed_generation = generation;
        }

        debug!(
            "Condition {} on {} -> {} ({})",
            type_,
            self.pulp.name_any(),
            status,
            reason
        );

        self.cluster
            .patch_status(
                self.pulp,
                &PulpStatus {
                    conditions: self.conditions.clone(),
                    observed_generation: generation,
                },
            )
            .await?;

        let event_type = if state {
            EventType::Normal
        } else {
            EventType::Warning
        };
        if let Err(e) = self
            .cluster
            .publish_event(self.pulp, event_type, reason, message)
            .await
        {
            warn!("Failed to publish event for {}: {}", type_, e);
        }

        Ok(true)
    }
}
