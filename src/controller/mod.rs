//! Controllers for the VPC infrastructure CRDs
//!
//! Each pass runs the same state machine: fetch the resource, resolve its
//! owners (machines only), bind a [`Scope`](crate::scope::Scope) to it, then
//! either converge or tear down, and finally persist what changed. Errors are
//! returned to the scheduler as-is; nothing here retries.

mod cluster;
mod machine;

use std::sync::Arc;

use kube::runtime::controller::Action;
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, error, warn};

use crate::config::{ControllerConfig, VpcCredentials};
use crate::crd::{set_condition, Condition};
use crate::scope::{Scope, ScopedResource};
use crate::store::{KubeStore, ResourceStore};
use crate::vpc::{IamSessionFactory, SessionFactory};
use crate::{Error, Result};

pub use cluster::{reconcile_cluster, reconcile_cluster_key};
pub use machine::{machines_for_cluster, reconcile_machine, reconcile_machine_key};

/// Terminal state of a reconciliation pass
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The pass ran to completion (or the resource no longer exists)
    Done,
    /// The pass stopped early because a prerequisite is not there yet
    Skipped(String),
}

/// Shared context for the VpcCluster and VpcMachine controllers
///
/// Use [`ContextBuilder`] to construct instances:
///
/// ```text
/// let ctx = Context::builder(client, credentials)
///     .config(config)
///     .build();
/// ```
pub struct Context {
    /// Resource store (trait object for testability)
    pub store: Arc<dyn ResourceStore>,
    /// Opens one provider session per pass
    pub sessions: Arc<dyn SessionFactory>,
    /// Credentials every session is opened with
    pub credentials: VpcCredentials,
    /// Controller settings
    pub config: ControllerConfig,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client, credentials: VpcCredentials) -> ContextBuilder {
        ContextBuilder::new(client, credentials)
    }

    /// Create a context for testing with mock collaborators
    #[cfg(test)]
    pub fn for_testing(store: Arc<dyn ResourceStore>, sessions: Arc<dyn SessionFactory>) -> Self {
        Self {
            store,
            sessions,
            credentials: crate::scope::testing::credentials(),
            config: ControllerConfig::default(),
        }
    }
}

/// Builder for constructing [`Context`] instances
pub struct ContextBuilder {
    client: Client,
    credentials: VpcCredentials,
    store: Option<Arc<dyn ResourceStore>>,
    sessions: Option<Arc<dyn SessionFactory>>,
    config: ControllerConfig,
}

impl ContextBuilder {
    fn new(client: Client, credentials: VpcCredentials) -> Self {
        Self {
            client,
            credentials,
            store: None,
            sessions: None,
            config: ControllerConfig::default(),
        }
    }

    /// Override the resource store
    pub fn store(mut self, store: Arc<dyn ResourceStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Override the session factory
    pub fn sessions(mut self, sessions: Arc<dyn SessionFactory>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Set controller settings
    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        let timeout = self.config.request_timeout;
        Context {
            store: self
                .store
                .unwrap_or_else(|| Arc::new(KubeStore::new(self.client.clone()))),
            sessions: self
                .sessions
                .unwrap_or_else(|| Arc::new(IamSessionFactory::new(timeout))),
            credentials: self.credentials,
            config: self.config,
        }
    }
}

/// Error policy shared by both controllers
///
/// The pass already recorded the failure on the resource. The scheduler
/// re-delivers it after a fixed delay.
pub fn error_policy<K>(obj: Arc<K>, error: &Error, ctx: Arc<Context>) -> Action
where
    K: Resource<DynamicType = ()>,
{
    error!(
        ?error,
        kind = %K::kind(&()),
        name = %obj.name_any(),
        namespace = ?obj.namespace(),
        "reconciliation failed"
    );
    Action::requeue(ctx.config.error_requeue)
}

/// Scheduler action for a finished pass
pub(crate) fn outcome_action(outcome: ReconcileOutcome) -> Action {
    match outcome {
        ReconcileOutcome::Done => Action::await_change(),
        ReconcileOutcome::Skipped(reason) => {
            debug!(%reason, "reconciliation skipped");
            Action::await_change()
        }
    }
}

/// Run a pass body against the scope, then persist unconditionally.
///
/// A failed body leaves a `Ready=False` condition carrying the error message
/// and nothing else changed in status. In particular `status.ready` keeps the
/// value from the last successful pass, so a converged resource whose latest
/// pass failed shows `ready: true` next to a `Ready=False` condition. When
/// both the body and the write-back fail, the body's error is returned.
pub(crate) async fn finish_pass<R: ScopedResource>(
    scope: &mut Scope<'_, R>,
    body: Result<()>,
    reason: &str,
) -> Result<()> {
    if let Err(e) = &body {
        set_condition(
            scope.resource_mut().conditions_mut(),
            Condition::not_ready(reason, e.to_string()),
        );
    }

    let persisted = scope.persist().await;
    match (body, persisted) {
        (Err(e), Err(persist_err)) => {
            warn!(resource = %scope.key(), error = %persist_err, "failed to persist after failed pass");
            Err(e)
        }
        (Err(e), Ok(())) => Err(e),
        (Ok(()), persisted) => persisted,
    }
}
