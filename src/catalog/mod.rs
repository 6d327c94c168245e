//! Product catalog
//!
//! Products arrive as normalized JSON records (see [`normalize`]) and are turned
//! into immutable [`Document`]s that both indexes share.

pub mod normalize;

pub use normalize::Normalizer;

use crate::error::{AssistError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A cleaned product record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(rename = "ten_san_pham")]
    pub name: String,
    /// Price in VND
    #[serde(rename = "gia", default)]
    pub price: Option<u64>,
    #[serde(rename = "hinh_anh", default)]
    pub image: String,
    #[serde(default)]
    pub url: String,
    #[serde(rename = "thuong_hieu", default)]
    pub brand: String,
    #[serde(rename = "mau_sac", default)]
    pub colors: Vec<String>,
    #[serde(rename = "tinh_trang", default)]
    pub status: String,
    /// Hardware sections keyed by field name (screen, cameras, battery...)
    #[serde(default)]
    pub specs: BTreeMap<String, String>,
    #[serde(rename = "chi_nhanh", default)]
    pub branches: Vec<String>,
}

/// Metadata carried alongside a document's searchable text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: String,
    pub price: Option<u64>,
    pub url: String,
    pub brand: String,
    pub image: String,
    pub colors: Vec<String>,
    pub status: String,
    pub branches: Vec<String>,
    pub attributes: BTreeMap<String, String>,
}

/// A searchable catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub metadata: DocumentMetadata,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>, metadata: DocumentMetadata) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata,
        }
    }

    /// Build a document whose text is the product name followed by its hardware details
    pub fn from_product(id: impl Into<String>, product: &Product) -> Self {
        let mut text = product.name.clone();
        for value in product.specs.values() {
            let value = value.replace(normalize::CHUNK_SEPARATOR, " ");
            let value = value.trim();
            if !value.is_empty() {
                text.push(' ');
                text.push_str(value);
            }
        }

        let attributes = product
            .specs
            .iter()
            .filter(|(_, v)| !v.trim().is_empty())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Self {
            id: id.into(),
            text,
            metadata: DocumentMetadata {
                title: product.name.clone(),
                price: product.price,
                url: product.url.clone(),
                brand: product.brand.clone(),
                image: product.image.clone(),
                colors: product.colors.clone(),
                status: product.status.clone(),
                branches: product.branches.clone(),
                attributes,
            },
        }
    }

    pub fn title(&self) -> &str {
        &self.metadata.title
    }
}

/// Anything that can hand over the full set of catalog documents
pub trait CatalogSource: Send + Sync {
    fn get_all_documents(&self) -> Result<Vec<Document>>;
}

/// Catalog backed by a normalized JSON file
pub struct JsonCatalog {
    path: PathBuf,
}

impl JsonCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the products without converting them
    pub fn load_products(&self) -> Result<Vec<Product>> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| AssistError::Io {
            source: e,
            context: format!("Failed to read catalog: {}", self.path.display()),
        })?;

        serde_json::from_str(&content).map_err(|e| AssistError::Json {
            source: e,
            context: format!("Failed to parse catalog: {}", self.path.display()),
        })
    }
}

impl CatalogSource for JsonCatalog {
    fn get_all_documents(&self) -> Result<Vec<Document>> {
        let products = self.load_products()?;
        let documents: Vec<Document> = products
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.name.trim().is_empty())
            .map(|(i, p)| Document::from_product(i.to_string(), p))
            .collect();

        tracing::info!(
            path = %self.path.display(),
            products = products.len(),
            documents = documents.len(),
            "Loaded catalog"
        );
        Ok(documents)
    }
}

/// Catalog held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    documents: Vec<Document>,
}

impl InMemoryCatalog {
    pub fn new(documents: Vec<Document>) -> Self {
        Self { documents }
    }
}

impl CatalogSource for InMemoryCatalog {
    fn get_all_documents(&self) -> Result<Vec<Document>> {
        let mut seen = std::collections::HashSet::new();
        for doc in &self.documents {
            if !seen.insert(doc.id.as_str()) {
                return Err(AssistError::Catalog(format!("Duplicate document id: {}", doc.id)));
            }
        }
        Ok(self.documents.clone())
    }
}
