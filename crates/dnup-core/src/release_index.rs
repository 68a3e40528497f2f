use std::path::Path;

use dnup_backend::{InstallError, ProductInfo, ReleaseIndex};
use log::debug;
use serde::Deserialize;

/// Release index held in memory, loaded from a JSON document of the form
/// `{"products": [...]}` or a bare product array.
#[derive(Debug, Clone, Default)]
pub struct FileReleaseIndex {
    products: Vec<ProductInfo>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawIndex {
    Wrapped { products: Vec<ProductInfo> },
    Bare(Vec<ProductInfo>),
}

impl FileReleaseIndex {
    #[must_use]
    pub fn from_products(products: Vec<ProductInfo>) -> Self {
        Self { products }
    }

    /// Parse an index document.
    ///
    /// # Errors
    /// Returns [`InstallError::ReleaseIndex`] when the JSON is malformed or a
    /// version string is invalid.
    pub fn from_json(json: &str) -> Result<Self, InstallError> {
        let raw: RawIndex = serde_json::from_str(json)
            .map_err(|error| InstallError::release_index(format!("failed to parse release index: {error}")))?;
        let products = match raw {
            RawIndex::Wrapped { products } | RawIndex::Bare(products) => products,
        };
        Ok(Self { products })
    }

    /// Load an index document from disk.
    ///
    /// # Errors
    /// Returns [`InstallError::ReleaseIndex`] when the file cannot be read or
    /// parsed.
    pub fn load(path: &Path) -> Result<Self, InstallError> {
        let json = std::fs::read_to_string(path).map_err(|error| {
            InstallError::release_index(format!(
                "failed to read release index {}: {error}",
                path.display()
            ))
        })?;
        let index = Self::from_json(&json)?;
        debug!(
            "Loaded {} product lines from {}",
            index.products.len(),
            path.display()
        );
        Ok(index)
    }
}

impl ReleaseIndex for FileReleaseIndex {
    fn products(&self) -> Result<Vec<ProductInfo>, InstallError> {
        Ok(self.products.clone())
    }
}
