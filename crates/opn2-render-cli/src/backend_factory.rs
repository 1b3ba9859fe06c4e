//! Backend instantiation from an engine configuration.

use anyhow::{Result, bail};

use opn2::Opn2;
use opn2_common::{BackendKind, EngineConfig, SynthesisBackend};
use opn2_softsynth::SoftFm;

/// Create the configured synthesis backend with its clocks and volume
/// applied.
pub fn create_backend(config: &EngineConfig) -> Result<Box<dyn SynthesisBackend>> {
    let mut backend: Box<dyn SynthesisBackend> = match config.backend {
        BackendKind::Tabular => Box::new(Opn2::with_clocks(config.master_clock, config.sample_rate)),
        BackendKind::Modeled => {
            Box::new(SoftFm::with_clocks(config.master_clock, config.sample_rate))
        }
        other => bail!("unsupported backend: {}", other),
    };
    backend.set_volume(config.volume);
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tabular_backend_reports_idle_status() {
        let config = EngineConfig::default();
        let backend = create_backend(&config).unwrap();
        assert_eq!(backend.read(0), 0);
    }

    #[test]
    fn modeled_backend_builds() {
        let config = EngineConfig {
            backend: BackendKind::Modeled,
            ..Default::default()
        };
        assert!(create_backend(&config).is_ok());
    }
}
