//! The duck-typed ndarray capability. The codec never imports a numeric
//! array library itself — it only moves bytes, shape, and dtype around,
//! mirroring the original's `ndarray()` helper and the `_encode`/`_decode`
//! ndarray branches.

use crate::value::ARRAY_CHUNK;

/// What the codec requires of a numeric-array value before it will encode it
/// as `ndarray` instead of a generic argument. A concrete array type (e.g.
/// from `ndarray` or `nalgebra`) implements this to participate.
pub trait NdarrayLike {
    fn shape(&self) -> Vec<u64>;
    fn dtype(&self) -> String;
    fn to_bytes(&self) -> Vec<u8>;
}

/// Bytes, shape, and dtype reconstructed from an incoming `ndarray` envelope.
/// Turning this into a concrete typed array is left to the caller's own
/// numeric library; the core never does that conversion itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedNdarray {
    pub bytes: Vec<u8>,
    pub shape: Vec<u64>,
    pub dtype: String,
}

impl DecodedNdarray {
    pub fn from_like(value: &dyn NdarrayLike) -> Self {
        DecodedNdarray {
            bytes: value.to_bytes(),
            shape: value.shape(),
            dtype: value.dtype(),
        }
    }
}

pub fn chunk_bytes(bytes: &[u8]) -> Vec<Vec<u8>> {
    bytes.chunks(ARRAY_CHUNK).map(|chunk| chunk.to_vec()).collect()
}

pub fn concat_chunks(chunks: &[Vec<u8>]) -> Vec<u8> {
    let total: usize = chunks.iter().map(Vec::len).sum();
    let mut bytes = Vec::with_capacity(total);
    for chunk in chunks {
        bytes.extend_from_slice(chunk);
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_then_concat_round_trips() {
        let bytes: Vec<u8> = (0..(ARRAY_CHUNK * 2 + 7)).map(|i| (i % 251) as u8).collect();
        let chunks = chunk_bytes(&bytes);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), ARRAY_CHUNK);
        assert_eq!(chunks[2].len(), 7);
        assert_eq!(concat_chunks(&chunks), bytes);
    }

    #[test]
    fn bytes_under_threshold_form_a_single_chunk() {
        let bytes = vec![1u8, 2, 3];
        let chunks = chunk_bytes(&bytes);
        assert_eq!(chunks, vec![bytes]);
    }
}
