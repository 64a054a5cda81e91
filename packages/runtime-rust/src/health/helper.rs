//! One-shot aggregation over the checks of a registry.

use std::collections::HashSet;
use std::sync::Arc;

use lodestar_core::{
    HealthCheck, HealthCheckKind, HealthCheckOptions, HealthCheckResult, HealthState,
};
use tracing::debug;

use super::registry::HealthCheckRegistry;

/// Errors surfaced by aggregation helpers.
#[derive(Debug, thiserror::Error)]
pub enum HealthCheckError {
    #[error("health check '{check_id}' could not be invoked: {source}")]
    CheckFailed {
        check_id: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Invokes every selected check of `registry` once and collects the results.
///
/// Checks are grouped by logical group (groups in first-encounter order,
/// ungrouped checks each on their own), then disabled, excluded and
/// unselected checks are dropped, the rest is stable-sorted by
/// [`HealthCheck::order`] and deduplicated by id before invocation.
///
/// # Errors
///
/// Returns [`HealthCheckError::CheckFailed`] for the first check whose
/// `call` returns an error; no partial result is returned.
pub fn invoke<S, F>(
    registry: &HealthCheckRegistry,
    options: S,
    filter: F,
) -> Result<Vec<HealthCheckResult>, HealthCheckError>
where
    S: Fn(&dyn HealthCheck) -> HealthCheckOptions,
    F: Fn(&dyn HealthCheck) -> bool,
{
    let mut groups: Vec<(Option<String>, Vec<Arc<dyn HealthCheck>>)> = Vec::new();
    for check in registry.stream() {
        match check.group() {
            Some(group) => {
                if let Some((_, members)) = groups
                    .iter_mut()
                    .find(|(name, _)| name.as_deref() == Some(group))
                {
                    members.push(check);
                } else {
                    groups.push((Some(group.to_string()), vec![check]));
                }
            }
            None => groups.push((None, vec![check])),
        }
    }

    let mut selected: Vec<Arc<dyn HealthCheck>> = groups
        .into_iter()
        .flat_map(|(_, members)| members)
        .filter(|check| check.is_enabled())
        .filter(|check| !registry.is_excluded(check.as_ref()))
        .filter(|check| filter(check.as_ref()))
        .collect();
    selected.sort_by_key(|check| check.order());

    let mut seen = HashSet::new();
    selected.retain(|check| seen.insert(check.id().to_string()));

    let mut results = Vec::with_capacity(selected.len());
    for check in selected {
        let result = check
            .call(&options(check.as_ref()))
            .map_err(|source| HealthCheckError::CheckFailed {
                check_id: check.id().to_string(),
                source,
            })?;
        debug!(check = check.id(), state = %result.state(), "health check invoked");
        results.push(result);
    }
    Ok(results)
}

/// Invokes the readiness-applicable checks.
///
/// # Errors
///
/// See [`invoke`].
pub fn invoke_readiness(
    registry: &HealthCheckRegistry,
) -> Result<Vec<HealthCheckResult>, HealthCheckError> {
    invoke(
        registry,
        |_| registry.options(HealthCheckKind::Readiness),
        |check| check.is_readiness(),
    )
}

/// Invokes the liveness-applicable checks.
///
/// # Errors
///
/// See [`invoke`].
pub fn invoke_liveness(
    registry: &HealthCheckRegistry,
) -> Result<Vec<HealthCheckResult>, HealthCheckError> {
    invoke(
        registry,
        |_| registry.options(HealthCheckKind::Liveness),
        |check| check.is_liveness(),
    )
}

/// Readiness is up when every result is UP; liveness only fails on a DOWN result.
#[must_use]
pub fn is_results_up(results: &[HealthCheckResult], readiness: bool) -> bool {
    if readiness {
        results.iter().all(|r| r.state() == HealthState::Up)
    } else {
        results.iter().all(|r| r.state() != HealthState::Down)
    }
}
