//! Text-to-vector capability used ahead of the store.
//!
//! Real deployments plug a sentence-embedding model in behind [`Encoder`];
//! [`HashingEncoder`] is a deterministic bag-of-words stand-in that needs no
//! model files.

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::Number;
use crate::error::{Error, Result};
use crate::record::{Dataset, DocumentRecord};
use crate::vector_ops::normalize_vector;

/// Contract for embedding backends.
pub trait Encoder {
    /// Width of every vector this encoder returns.
    fn dimensions(&self) -> usize;

    /// Encode one document's text.
    fn encode(&self, text: &str) -> Result<Vec<Number>>;
}

/// Signed feature hashing of lower-cased alphanumeric tokens, L2-normalised.
#[derive(Debug, Clone)]
pub struct HashingEncoder {
    dimensions: usize,
}

impl HashingEncoder {
    pub fn new(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(Error::invalid_parameter("dimensions", "must be at least 1"));
        }
        Ok(Self { dimensions })
    }
}

impl Encoder for HashingEncoder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn encode(&self, text: &str) -> Result<Vec<Number>> {
        let mut vector = vec![0.0; self.dimensions];
        let mut tokens = 0usize;

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimensions as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
            tokens += 1;
        }

        normalize_vector(&mut vector);
        debug!("Hashed {} tokens into {} dimensions", tokens, self.dimensions);
        Ok(vector)
    }
}

/// Encodes `(id, text)` pairs in order and validates the resulting dataset.
pub fn embed_documents<E, I, S, T>(encoder: &E, documents: I) -> Result<Dataset>
where
    E: Encoder + ?Sized,
    I: IntoIterator<Item = (S, T)>,
    S: Into<String>,
    T: AsRef<str>,
{
    let records = documents
        .into_iter()
        .map(|(id, text)| {
            let id = id.into();
            let vector = encoder.encode(text.as_ref())?;
            if vector.len() != encoder.dimensions() {
                return Err(Error::DimensionMismatch {
                    id,
                    expected: encoder.dimensions(),
                    found: vector.len(),
                });
            }
            Ok(DocumentRecord::new(id, vector))
        })
        .collect::<Result<Vec<_>>>()?;
    Dataset::new(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_ops::{dot_simd, norm};

    #[test]
    fn rejects_zero_dimensions() {
        assert!(matches!(
            HashingEncoder::new(0),
            Err(Error::InvalidParameter { .. })
        ));
    }

    #[test]
    fn encoding_is_deterministic_and_normalised() {
        let encoder = HashingEncoder::new(64).unwrap();
        let a = encoder.encode("Rust borrow checker notes").unwrap();
        let b = encoder.encode("rust BORROW checker, notes!").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!((norm(&a) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn empty_text_gives_zero_vector() {
        let encoder = HashingEncoder::new(16).unwrap();
        let v = encoder.encode("  \n ").unwrap();
        assert_eq!(v, vec![0.0; 16]);
    }

    #[test]
    fn overlapping_texts_are_closer() {
        let encoder = HashingEncoder::new(256).unwrap();
        let base = encoder
            .encode("graph layout of similar markdown notes")
            .unwrap();
        let near = encoder
            .encode("layout of similar markdown notes in a graph view")
            .unwrap();
        let far = encoder
            .encode("sourdough starter hydration schedule")
            .unwrap();
        assert!(dot_simd(&base, &near) > dot_simd(&base, &far));
    }

    struct FixedEncoder(Vec<Number>);

    impl Encoder for FixedEncoder {
        fn dimensions(&self) -> usize {
            3
        }

        fn encode(&self, _text: &str) -> Result<Vec<Number>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn embed_documents_keeps_order() {
        let encoder = HashingEncoder::new(8).unwrap();
        let dataset = embed_documents(
            &encoder,
            vec![("b.md", "second"), ("a.md", "first"), ("c.md", "third")],
        )
        .unwrap();
        assert_eq!(dataset.ids().collect::<Vec<_>>(), vec!["b.md", "a.md", "c.md"]);
        assert_eq!(dataset.dimensions(), 8);
    }

    #[test]
    fn embed_documents_checks_encoder_width() {
        let encoder = FixedEncoder(vec![1.0, 2.0]);
        let err = embed_documents(&encoder, vec![("a.md", "text")]).unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 3,
                found: 2,
                ..
            }
        ));
    }
}
