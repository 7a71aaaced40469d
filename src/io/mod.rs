//! Scene ingestion: metadata parsing and imagery sources

pub mod metadata;
pub mod source;

pub use metadata::{MetadataReader, MtlDocument, ProductId};
pub use source::{CatalogFilter, InMemorySource, SceneSource};
