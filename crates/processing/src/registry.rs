//! Name-keyed registries for stages and adapters.
//!
//! Configuration refers to stages and adapters by name; the registries
//! resolve those names into capability objects once at startup, so an
//! unknown name aborts the run before any work is scheduled.

use std::collections::HashMap;
use std::sync::Arc;

use crate::adapter::Adapter;
use crate::adapters::{manifest, portal, ManifestAdapter, PortalAdapter};
use crate::config::AdapterSettings;
use crate::error::{ProcessingError, Result};
use crate::processor::Processor;
use crate::stages::{atmcorr, lswt, pixclass};
use crate::stages::{AtmosphericCorrection, LakeSurfaceTemperature, PixelClassification};

/// Resolve configured stage names into processors, preserving order.
pub fn resolve_processors(names: &[String]) -> Result<Vec<Arc<dyn Processor>>> {
    names
        .iter()
        .map(|name| match name.trim().to_uppercase().as_str() {
            atmcorr::NAME => Ok(Arc::new(AtmosphericCorrection) as Arc<dyn Processor>),
            pixclass::NAME => Ok(Arc::new(PixelClassification) as Arc<dyn Processor>),
            lswt::NAME => Ok(Arc::new(LakeSurfaceTemperature) as Arc<dyn Processor>),
            other => Err(ProcessingError::UnknownProcessor(other.to_string())),
        })
        .collect()
}

/// Resolve configured adapter names, wiring in their per-adapter settings.
pub fn resolve_adapters(
    names: &[String],
    settings: &HashMap<String, AdapterSettings>,
) -> Result<Vec<Arc<dyn Adapter>>> {
    names
        .iter()
        .map(|name| match name.trim().to_uppercase().as_str() {
            portal::NAME => {
                let settings = settings.get(portal::NAME).cloned().ok_or_else(|| {
                    ProcessingError::MissingConfig(format!("{} adapter settings", portal::NAME))
                })?;
                Ok(Arc::new(PortalAdapter::new(settings)) as Arc<dyn Adapter>)
            }
            manifest::NAME => Ok(Arc::new(ManifestAdapter) as Arc<dyn Adapter>),
            other => Err(ProcessingError::UnknownAdapter(other.to_string())),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_stages_in_configured_order() {
        let names = vec!["PIXCLASS".to_string(), "atmcorr".to_string()];
        let processors = resolve_processors(&names).unwrap();
        assert_eq!(processors.len(), 2);
        assert_eq!(processors[0].name(), "PIXCLASS");
        assert_eq!(processors[1].name(), "ATMCORR");
    }

    #[test]
    fn unknown_stage_is_rejected() {
        let err = match resolve_processors(&["POLYMER".to_string()]) {
            Ok(_) => panic!("expected unknown-processor error"),
            Err(e) => e,
        };
        assert!(matches!(err, ProcessingError::UnknownProcessor(name) if name == "POLYMER"));
    }

    #[test]
    fn portal_adapter_requires_settings() {
        let err = match resolve_adapters(&["PORTAL".to_string()], &HashMap::new()) {
            Ok(_) => panic!("expected missing-config error"),
            Err(e) => e,
        };
        assert!(matches!(err, ProcessingError::MissingConfig(_)));
    }

    #[test]
    fn manifest_adapter_needs_no_settings() {
        let adapters = resolve_adapters(&["MANIFEST".to_string()], &HashMap::new()).unwrap();
        assert_eq!(adapters.len(), 1);
        assert!(adapters[0].input_stage().is_none());
    }
}
