//! Binary model (`.mod`) format decoder
//!
//! Layout: `u32 vertex_count`, `u32 index_count`, `vertex_count` tightly
//! packed vertex records, `index_count` `u32` indices. There is no magic
//! number, version, or byte-order marker; byte order is assumed to match the
//! host (a fixed contract with the mesh exporter). The record stride is not
//! encoded either — the caller must already know whether the file holds
//! static or skinned vertices from the surrounding scene description.

use bytemuck::{Pod, Zeroable};
use thiserror::Error;

/// Model format errors
#[derive(Debug, Error)]
pub enum ModelFormatError {
    /// File ends before the declared vertex/index data
    #[error("truncated model file: need {expected} bytes, have {actual}")]
    Truncated {
        /// Bytes required by the header's counts
        expected: usize,
        /// Bytes actually present
        actual: usize,
    },
}

/// Position + normal vertex, 24 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Object-space position
    pub position: [f32; 3],
    /// Unit normal
    pub normal: [f32; 3],
}

/// Skinned vertex: position + normal + up to 3 bone influences, 48 bytes.
///
/// Blend weights are expected to sum to roughly 1 but the decoder does not
/// enforce it; the exporter is trusted.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct RiggedVertex {
    /// Object-space position
    pub position: [f32; 3],
    /// Unit normal
    pub normal: [f32; 3],
    /// Skeleton bone indices, unused influences are 0
    pub bones: [i32; 3],
    /// Blend weights matching `bones`
    pub weights: [f32; 3],
}

/// Vertex layout of a model's geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexKind {
    /// Position + normal
    Static,
    /// Position + normal + bone influences
    Skinned,
}

impl VertexKind {
    /// Byte stride of one vertex record.
    pub fn stride(self) -> usize {
        match self {
            Self::Static => std::mem::size_of::<Vertex>(),
            Self::Skinned => std::mem::size_of::<RiggedVertex>(),
        }
    }

    /// Arena bank index for this kind (0 = static, 1 = skinned).
    pub(crate) fn bank(self) -> usize {
        match self {
            Self::Static => 0,
            Self::Skinned => 1,
        }
    }
}

/// Borrowed view of a decoded model file.
#[derive(Debug)]
pub struct ModelData<'a> {
    /// Vertex layout the file was decoded with
    pub kind: VertexKind,
    /// Number of vertex records
    pub vertex_count: u32,
    /// Number of indices
    pub index_count: u32,
    /// Raw vertex records, `vertex_count * kind.stride()` bytes
    pub vertex_bytes: &'a [u8],
    /// Raw `u32` indices, `index_count * 4` bytes
    pub index_bytes: &'a [u8],
}

impl ModelData<'_> {
    /// Decode the indices into owned values. Indices are model-local and
    /// 0-based; they are rebased at draw time, never here.
    pub fn indices(&self) -> Vec<u32> {
        self.index_bytes
            .chunks_exact(4)
            .map(bytemuck::pod_read_unaligned)
            .collect()
    }

    /// Decode static vertex records. Meaningful only for `VertexKind::Static`.
    pub fn static_vertices(&self) -> Vec<Vertex> {
        self.vertex_bytes
            .chunks_exact(VertexKind::Static.stride())
            .map(bytemuck::pod_read_unaligned)
            .collect()
    }

    /// Decode skinned vertex records. Meaningful only for `VertexKind::Skinned`.
    pub fn rigged_vertices(&self) -> Vec<RiggedVertex> {
        self.vertex_bytes
            .chunks_exact(VertexKind::Skinned.stride())
            .map(bytemuck::pod_read_unaligned)
            .collect()
    }
}

/// Decode a model file with the given vertex layout.
///
/// Returns borrowed byte ranges into `bytes`; nothing is copied here.
/// Trailing bytes beyond the declared counts are ignored with a debug log.
pub fn decode(bytes: &[u8], kind: VertexKind) -> Result<ModelData<'_>, ModelFormatError> {
    let header = 8;
    if bytes.len() < header {
        return Err(ModelFormatError::Truncated {
            expected: header,
            actual: bytes.len(),
        });
    }
    let vertex_count: u32 = bytemuck::pod_read_unaligned(&bytes[0..4]);
    let index_count: u32 = bytemuck::pod_read_unaligned(&bytes[4..8]);

    let vertex_len = vertex_count as usize * kind.stride();
    let index_len = index_count as usize * 4;
    let expected = header + vertex_len + index_len;
    if bytes.len() < expected {
        return Err(ModelFormatError::Truncated {
            expected,
            actual: bytes.len(),
        });
    }
    if bytes.len() > expected {
        log::debug!(
            "model file has {} trailing bytes past declared counts",
            bytes.len() - expected
        );
    }

    Ok(ModelData {
        kind,
        vertex_count,
        index_count,
        vertex_bytes: &bytes[header..header + vertex_len],
        index_bytes: &bytes[header + vertex_len..expected],
    })
}


#[cfg(test)]
mod tests {
    use super::test_support::{encode, triangle};
    use super::*;

    #[test]
    fn test_decode_static_model() {
        let (vertices, indices) = triangle();
        let bytes = encode(&vertices, &indices);

        let data = decode(&bytes, VertexKind::Static).unwrap();
        assert_eq!(data.vertex_count, 3);
        assert_eq!(data.index_count, 3);
        assert_eq!(data.static_vertices(), vertices);
        assert_eq!(data.indices(), indices);
    }

    #[test]
    fn test_decode_rigged_model() {
        let vertices = vec![RiggedVertex {
            position: [1.0, 2.0, 3.0],
            normal: [0.0, 1.0, 0.0],
            bones: [0, 2, 0],
            weights: [0.75, 0.25, 0.0],
        }];
        let bytes = encode(&vertices, &[0, 0, 0]);

        let data = decode(&bytes, VertexKind::Skinned).unwrap();
        assert_eq!(data.vertex_count, 1);
        assert_eq!(data.rigged_vertices(), vertices);
    }

    #[test]
    fn test_truncated_file_is_rejected() {
        let (vertices, indices) = triangle();
        let mut bytes = encode(&vertices, &indices);
        bytes.truncate(bytes.len() - 1);

        match decode(&bytes, VertexKind::Static) {
            Err(ModelFormatError::Truncated { expected, actual }) => {
                assert_eq!(actual, expected - 1);
            }
            other => panic!("expected truncation error, got {other:?}"),
        }
    }

    #[test]
    fn test_truncated_header_is_rejected() {
        assert!(decode(&[1, 0, 0], VertexKind::Static).is_err());
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let (vertices, indices) = triangle();
        let mut bytes = encode(&vertices, &indices);
        bytes.extend_from_slice(&[0xab; 7]);
        assert!(decode(&bytes, VertexKind::Static).is_ok());
    }
}
