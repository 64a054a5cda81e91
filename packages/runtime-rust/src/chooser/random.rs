use lodestar_core::{ChooseError, ServiceChooser, ServiceDefinition};
use rand::Rng;

/// Picks a uniformly random candidate on every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomServiceChooser;

impl ServiceChooser for RandomServiceChooser {
    fn choose<'a>(
        &self,
        service_name: &str,
        candidates: &'a [ServiceDefinition],
    ) -> Result<&'a ServiceDefinition, ChooseError> {
        if candidates.is_empty() {
            return Err(ChooseError::NoCandidates {
                service: service_name.to_string(),
            });
        }
        let index = rand::rng().random_range(0..candidates.len());
        Ok(&candidates[index])
    }
}
