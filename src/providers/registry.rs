use crate::providers::adapter::HostingProvider;
use crate::providers::error::{ProviderError, ProviderErrorCode, ProviderResult};
use crate::providers::manual::ManualProvider;
use crate::providers::rockvm::RockVmProvider;
use crate::providers::skystack::SkyStackProvider;
use crate::providers::types::ProviderKind;
use std::collections::HashMap;
use std::sync::Arc;

/// Holds one adapter instance per enabled backend.
///
/// The manual backend is always registered; the HTTP backends come from the
/// environment in production or are injected directly in tests.
pub struct ProviderRegistry {
    providers: HashMap<ProviderKind, Arc<dyn HostingProvider>>,
}

impl ProviderRegistry {
    pub fn from_env() -> ProviderResult<Self> {
        let mut providers: HashMap<ProviderKind, Arc<dyn HostingProvider>> = HashMap::new();
        providers.insert(
            ProviderKind::SkyStack,
            Arc::new(SkyStackProvider::from_env()?),
        );
        providers.insert(ProviderKind::RockVm, Arc::new(RockVmProvider::from_env()?));
        providers.insert(ProviderKind::Manual, Arc::new(ManualProvider::new()));
        Ok(Self { providers })
    }

    pub fn with_providers(list: Vec<Arc<dyn HostingProvider>>) -> Self {
        let mut providers = HashMap::new();
        for provider in list {
            providers.insert(provider.kind(), provider);
        }
        Self { providers }
    }

    pub fn get(&self, kind: ProviderKind) -> ProviderResult<Arc<dyn HostingProvider>> {
        self.providers.get(&kind).cloned().ok_or_else(|| {
            ProviderError::new(
                "registry",
                ProviderErrorCode::InvalidConfiguration,
                format!("provider {} is not registered", kind),
            )
        })
    }

    pub fn list(&self) -> Vec<ProviderKind> {
        self.providers.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_serves_injected_providers() {
        let registry = ProviderRegistry::with_providers(vec![
            Arc::new(ManualProvider::new()) as Arc<dyn HostingProvider>
        ]);
        assert!(registry.get(ProviderKind::Manual).is_ok());
        assert!(registry.get(ProviderKind::SkyStack).is_err());
    }
}
