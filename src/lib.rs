//! Embedding-to-layout pipeline: a flat text store for document embeddings
//! and the reduction that turns them into 2-D graph positions.

pub mod config;
pub mod embedder;
pub mod error;
pub mod files;
pub mod record;
pub mod reduce;
pub mod store;
pub mod vector_ops;

pub use config::{Number, Settings};
pub use embedder::{embed_documents, Encoder, HashingEncoder};
pub use error::{Error, Result};
pub use record::{Dataset, DocumentRecord, Layout, NodePosition};
pub use reduce::{
    Algorithm, AlgorithmKind, DimensionReducer, LayoutReducer, Pca, Tsne, TsneInit, TsneParams,
};
