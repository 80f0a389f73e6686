//! Module loader for isolated sessions that serves only pinned scaffold
//! resources. Blocks network access, the real filesystem, and any name
//! that is not on the pin list.

use crate::scaffold::{pinned, ResourceSet, SCAFFOLD_ROOT};
use deno_core::{
    anyhow::{anyhow, Error},
    ModuleLoadResponse, ModuleLoader, ModuleSource, ModuleSourceCode, ModuleSpecifier,
    ModuleType, RequestedModuleType, ResolutionKind,
};

/// A module loader whose whole namespace is `file:///scaffold/<pinned>.js`.
///
/// Security guarantees:
/// - No network access (http/https/data/blob URLs rejected)
/// - No filesystem access (sources come from a verified `ResourceSet`)
/// - Only pinned .js names resolve
/// - Dynamic imports supported but limited to the same set
pub struct PinnedResourceLoader {
    resources: ResourceSet,
}

impl PinnedResourceLoader {
    pub fn new(resources: ResourceSet) -> Self {
        Self { resources }
    }

    pub fn specifier(name: &str) -> Result<ModuleSpecifier, Error> {
        ModuleSpecifier::parse(SCAFFOLD_ROOT)
            .and_then(|root| root.join(name))
            .map_err(|e| anyhow!("Invalid scaffold module '{}': {}", name, e))
    }

    /// Pinned resource name behind a resolved specifier.
    fn pinned_name(specifier: &ModuleSpecifier) -> Result<&'static str, Error> {
        let name = specifier
            .as_str()
            .strip_prefix(SCAFFOLD_ROOT)
            .ok_or_else(|| anyhow!("Access denied: '{}' is outside the scaffold", specifier))?;

        if !name.ends_with(".js") {
            return Err(anyhow!("Only .js scaffold modules allowed, got: {}", name));
        }

        pinned(name)
            .map(|resource| resource.name)
            .ok_or_else(|| anyhow!("Module '{}' is not a pinned scaffold resource", name))
    }
}

impl ModuleLoader for PinnedResourceLoader {
    fn resolve(
        &self,
        specifier: &str,
        referrer: &str,
        _kind: ResolutionKind,
    ) -> Result<ModuleSpecifier, Error> {
        if specifier.starts_with("http://")
            || specifier.starts_with("https://")
            || specifier.starts_with("data:")
            || specifier.starts_with("blob:")
        {
            return Err(anyhow!("Remote imports are forbidden: {}", specifier));
        }

        let resolved = if specifier.starts_with("./") || specifier.starts_with("../") {
            let referrer_url = ModuleSpecifier::parse(referrer)
                .map_err(|e| anyhow!("Invalid referrer '{}': {}", referrer, e))?;
            referrer_url
                .join(specifier)
                .map_err(|e| anyhow!("Failed to resolve '{}': {}", specifier, e))?
        } else if specifier.starts_with("file://") {
            ModuleSpecifier::parse(specifier)
                .map_err(|e| anyhow!("Invalid file URL '{}': {}", specifier, e))?
        } else if specifier.starts_with('/') {
            return Err(anyhow!("Absolute paths are not allowed: {}", specifier));
        } else {
            // Bare specifier - resolve from the scaffold root
            Self::specifier(specifier)?
        };

        Self::pinned_name(&resolved)?;
        Ok(resolved)
    }

    fn load(
        &self,
        module_specifier: &ModuleSpecifier,
        _maybe_referrer: Option<&ModuleSpecifier>,
        _is_dyn_import: bool,
        _requested_module_type: RequestedModuleType,
    ) -> ModuleLoadResponse {
        // Re-check: load can be reached without resolve for the main module
        let name = match Self::pinned_name(module_specifier) {
            Ok(name) => name,
            Err(e) => return ModuleLoadResponse::Sync(Err(e)),
        };

        let code = match self.resources.get(name) {
            Some(code) => code.to_string(),
            None => {
                return ModuleLoadResponse::Sync(Err(anyhow!(
                    "Pinned resource '{}' was not loaded",
                    name
                )));
            }
        };

        ModuleLoadResponse::Sync(Ok(ModuleSource::new(
            ModuleType::JavaScript,
            ModuleSourceCode::String(code.into()),
            module_specifier,
            None,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENTRY: &str = "file:///scaffold/isolated_entry.js";

    fn loader() -> PinnedResourceLoader {
        PinnedResourceLoader::new(ResourceSet::embedded().unwrap())
    }

    #[test]
    fn test_blocks_remote_urls() {
        let result = loader().resolve("https://unpkg.com/react.js", ENTRY, ResolutionKind::Import);
        assert!(result.unwrap_err().to_string().contains("Remote imports are forbidden"));

        let result = loader().resolve("data:text/javascript,1", ENTRY, ResolutionKind::Import);
        assert!(result.is_err());
    }

    #[test]
    fn test_blocks_escape_from_scaffold() {
        let result = loader().resolve("../etc/passwd.js", ENTRY, ResolutionKind::Import);
        assert!(result.unwrap_err().to_string().contains("outside the scaffold"));

        let result = loader().resolve("file:///etc/hosts.js", ENTRY, ResolutionKind::Import);
        assert!(result.is_err());

        let result = loader().resolve("/scaffold/ui_runtime.js", ENTRY, ResolutionKind::Import);
        assert!(result.is_err());
    }

    #[test]
    fn test_allows_pinned_imports() {
        let resolved = loader()
            .resolve("./ui_runtime.js", ENTRY, ResolutionKind::Import)
            .unwrap();
        assert_eq!(resolved.as_str(), "file:///scaffold/ui_runtime.js");

        let bare = loader()
            .resolve("ui_runtime.js", ENTRY, ResolutionKind::Import)
            .unwrap();
        assert_eq!(bare, resolved);
    }

    #[test]
    fn test_blocks_unpinned_and_non_js() {
        let result = loader().resolve("./other.js", ENTRY, ResolutionKind::Import);
        assert!(result.unwrap_err().to_string().contains("not a pinned"));

        let result = loader().resolve("./data.json", ENTRY, ResolutionKind::Import);
        assert!(result.unwrap_err().to_string().contains("Only .js"));
    }

    #[test]
    fn test_loads_verified_source() {
        let specifier = PinnedResourceLoader::specifier("ui_runtime.js").unwrap();
        let response = loader().load(&specifier, None, false, RequestedModuleType::None);
        assert!(matches!(response, ModuleLoadResponse::Sync(Ok(_))));

        let outside = ModuleSpecifier::parse("file:///tmp/evil.js").unwrap();
        let response = loader().load(&outside, None, false, RequestedModuleType::None);
        assert!(matches!(response, ModuleLoadResponse::Sync(Err(_))));
    }
}
