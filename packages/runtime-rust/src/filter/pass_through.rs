use lodestar_core::{ServiceDefinition, ServiceFilter};

/// Returns its input unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughServiceFilter;

impl ServiceFilter for PassThroughServiceFilter {
    fn apply(&self, candidates: &[ServiceDefinition]) -> Vec<ServiceDefinition> {
        candidates.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_everything_including_unhealthy() {
        let input = vec![
            ServiceDefinition::new("svc", "a", 1).with_health(false),
            ServiceDefinition::new("svc", "b", 2),
        ];
        assert_eq!(PassThroughServiceFilter.apply(&input), input);
    }
}
