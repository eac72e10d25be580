//! The engine: one atomically swappable snapshot slot per namespace.
//!
//! Reads are wait-free: an evaluation loads the current snapshot `Arc` and
//! works against it for the whole call, so a concurrent
//! [`Engine::replace_snapshot`] never affects evaluations already in
//! flight. The outgoing snapshot is dropped when its last reader finishes.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tracing::{debug, info};

use flagcast_core::error::{Error, FlagcastResult};
use flagcast_core::types::{
    BatchEvaluation, BooleanEvaluation, ErrorEvaluation, EvaluationRequest, Flag, FlagKind,
    VariantEvaluation,
};

use crate::rules;
use crate::snapshot::Snapshot;

pub struct Engine {
    namespaces: HashMap<String, ArcSwapOption<Snapshot>>,
}

impl Engine {
    /// Create an engine serving a fixed set of namespaces. Every slot starts
    /// unpopulated; evaluation against it fails with `NamespaceNotFound`
    /// until a snapshot is installed.
    pub fn new(namespaces: Vec<String>) -> FlagcastResult<Self> {
        if namespaces.is_empty() {
            return Err(Error::Validation(
                "engine requires at least one namespace".into(),
            ));
        }

        let mut slots = HashMap::with_capacity(namespaces.len());
        for key in namespaces {
            if key.is_empty() {
                return Err(Error::Validation("namespace with empty key".into()));
            }
            if slots.insert(key.clone(), ArcSwapOption::empty()).is_some() {
                return Err(Error::Validation(format!("duplicate namespace {key:?}")));
            }
        }

        Ok(Self { namespaces: slots })
    }

    fn slot(&self, namespace: &str) -> FlagcastResult<&ArcSwapOption<Snapshot>> {
        self.namespaces
            .get(namespace)
            .ok_or_else(|| Error::NamespaceNotFound(namespace.to_string()))
    }

    /// The snapshot currently serving `namespace`. An unpopulated slot
    /// reports the same error as an unknown namespace: neither can answer
    /// an evaluation.
    fn current(&self, namespace: &str) -> FlagcastResult<Arc<Snapshot>> {
        self.slot(namespace)?
            .load_full()
            .ok_or_else(|| Error::NamespaceNotFound(namespace.to_string()))
    }

    /// Atomically install a new snapshot for `namespace`. In-flight
    /// evaluations keep the snapshot they loaded.
    pub fn replace_snapshot(&self, namespace: &str, snapshot: Snapshot) -> FlagcastResult<()> {
        if snapshot.namespace() != namespace {
            return Err(Error::Validation(format!(
                "snapshot for namespace {:?} cannot be installed into {namespace:?}",
                snapshot.namespace()
            )));
        }

        let slot = self.slot(namespace)?;
        info!(
            namespace,
            flags = snapshot.flag_count(),
            segments = snapshot.segment_count(),
            "installing configuration snapshot"
        );
        slot.store(Some(Arc::new(snapshot)));
        Ok(())
    }

    /// Parse, validate, and install a whole-namespace JSON payload. A
    /// rejected payload is never partially applied: the previous snapshot
    /// keeps serving.
    pub fn update_namespace(&self, namespace: &str, payload: &str) -> FlagcastResult<()> {
        self.slot(namespace)?;
        let snapshot = Snapshot::from_json(namespace, payload)?;
        self.replace_snapshot(namespace, snapshot)
    }

    pub fn evaluate_variant(
        &self,
        request: &EvaluationRequest,
    ) -> FlagcastResult<VariantEvaluation> {
        let snapshot = self.current(&request.namespace_key)?;
        let flag = lookup_flag(&snapshot, request, FlagKind::Variant)?;

        let response = rules::evaluate_variant_flag(&snapshot, flag, request)?;
        debug!(
            namespace = %request.namespace_key,
            flag = %request.flag_key,
            entity = %request.entity_id,
            reason = ?response.reason,
            variant = response.variant_key.as_deref().unwrap_or(""),
            "variant evaluation"
        );
        Ok(response)
    }

    pub fn evaluate_boolean(
        &self,
        request: &EvaluationRequest,
    ) -> FlagcastResult<BooleanEvaluation> {
        let snapshot = self.current(&request.namespace_key)?;
        let flag = lookup_flag(&snapshot, request, FlagKind::Boolean)?;

        let response = rules::evaluate_boolean_flag(&snapshot, flag, request)?;
        debug!(
            namespace = %request.namespace_key,
            flag = %request.flag_key,
            entity = %request.entity_id,
            reason = ?response.reason,
            enabled = response.enabled,
            "boolean evaluation"
        );
        Ok(response)
    }

    /// Evaluate a sequence of requests, dispatching on each flag's kind.
    /// A failing request becomes an error entry; it never aborts the batch.
    pub fn evaluate_batch(&self, requests: &[EvaluationRequest]) -> Vec<BatchEvaluation> {
        requests
            .iter()
            .map(|request| match self.dispatch(request) {
                Ok(response) => response,
                Err(e) => BatchEvaluation::Error(ErrorEvaluation {
                    namespace_key: request.namespace_key.clone(),
                    flag_key: request.flag_key.clone(),
                    error_kind: e.kind().to_string(),
                    message: e.to_string(),
                }),
            })
            .collect()
    }

    fn dispatch(&self, request: &EvaluationRequest) -> FlagcastResult<BatchEvaluation> {
        let snapshot = self.current(&request.namespace_key)?;
        let flag = snapshot
            .flag(&request.flag_key)
            .ok_or_else(|| Error::FlagNotFound {
                namespace: request.namespace_key.clone(),
                flag: request.flag_key.clone(),
            })?;

        match flag.kind {
            FlagKind::Boolean => rules::evaluate_boolean_flag(&snapshot, flag, request)
                .map(BatchEvaluation::Boolean),
            FlagKind::Variant => rules::evaluate_variant_flag(&snapshot, flag, request)
                .map(BatchEvaluation::Variant),
        }
    }
}

fn lookup_flag<'a>(
    snapshot: &'a Snapshot,
    request: &EvaluationRequest,
    expected: FlagKind,
) -> FlagcastResult<&'a Flag> {
    let flag = snapshot
        .flag(&request.flag_key)
        .ok_or_else(|| Error::FlagNotFound {
            namespace: request.namespace_key.clone(),
            flag: request.flag_key.clone(),
        })?;

    if flag.kind != expected {
        return Err(Error::FlagTypeMismatch {
            flag: flag.key.clone(),
            expected,
            actual: flag.kind,
        });
    }

    Ok(flag)
}
