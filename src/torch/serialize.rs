//! Tensor and device serialization
#![allow(clippy::use_self)] // created by serde derive for KindDef

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use tch::{Device, Kind, Tensor};

/// Remote serialization definition for [`tch::Kind`].
///
/// Use `#[serde(with = "KindDef")]` when serializing a field of type [`Kind`].
#[derive(Serialize, Deserialize)]
#[serde(remote = "Kind")]
pub enum KindDef {
    Uint8,
    Int8,
    Int16,
    Int,
    Int64,
    Half,
    Float,
    Double,
    ComplexHalf,
    ComplexFloat,
    ComplexDouble,
    Bool,
    QInt8,
    QUInt8,
    QInt32,
    BFloat16,
}

/// System byte order serialization.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    /// Native byte order for this system
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            Self::BigEndian
        } else {
            Self::LittleEndian
        }
    }
}

/// Owned serializable copy of a [`Tensor`].
///
/// Converting back to a tensor places it in CPU memory.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorData {
    #[serde(with = "KindDef")]
    pub kind: Kind,
    pub shape: Vec<i64>,
    pub byte_order: ByteOrder,
    #[serde_as(as = "Bytes")]
    pub data: Vec<u8>,
}

/// Create a [`TensorData`] by copying data from a [`Tensor`].
impl From<&Tensor> for TensorData {
    fn from(tensor: &Tensor) -> Self {
        let tensor = tensor.to_device(Device::Cpu);
        let kind = tensor.kind();
        let shape = tensor.size();
        let num_elements = tensor.numel();

        // Tensor data may be shared and reallocated so it must be copied out.
        let mut data = vec![0; num_elements * kind.elt_size_in_bytes()];
        tensor.copy_data_u8(&mut data, num_elements);

        Self {
            kind,
            shape,
            byte_order: ByteOrder::native(),
            data,
        }
    }
}

impl TensorData {
    /// Copy into a new CPU tensor. `None` if the data has a non-native byte order.
    #[must_use]
    pub fn to_tensor(&self) -> Option<Tensor> {
        if self.byte_order != ByteOrder::native() {
            return None;
        }
        Some(Tensor::of_data_size(&self.data, &self.shape, self.kind))
    }
}

/// Serializable device selection.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceDef {
    Cpu,
    Cuda(usize),
    /// The first CUDA device if available, otherwise the CPU.
    CudaIfAvailable,
}

impl Default for DeviceDef {
    fn default() -> Self {
        Self::CudaIfAvailable
    }
}

impl From<DeviceDef> for Device {
    fn from(device: DeviceDef) -> Self {
        match device {
            DeviceDef::Cpu => Self::Cpu,
            DeviceDef::Cuda(index) => Self::Cuda(index),
            DeviceDef::CudaIfAvailable => Self::cuda_if_available(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_test::{assert_tokens, Token};

    #[test]
    fn tensor_data_copies_values() {
        let tensor = Tensor::of_slice(&[1.0_f32, -2.0, 3.5, 0.0]).reshape(&[2, 2]);
        let data = TensorData::from(&tensor);
        assert_eq!(data.kind, Kind::Float);
        assert_eq!(data.shape, [2, 2]);
        assert_eq!(data.data.len(), 16);
        assert_eq!(data.to_tensor().unwrap(), tensor);
    }

    #[test]
    fn tensor_data_cbor() {
        let tensor = Tensor::of_slice(&[7_i64, 8, 9]);
        let data = TensorData::from(&tensor);
        let bytes = serde_cbor::to_vec(&data).unwrap();
        let restored: TensorData = serde_cbor::from_slice(&bytes).unwrap();
        assert_eq!(restored, data);
        assert_eq!(restored.to_tensor().unwrap(), tensor);
    }

    #[test]
    fn foreign_byte_order_rejected() {
        let mut data = TensorData::from(&Tensor::of_slice(&[1_u8]));
        data.byte_order = match ByteOrder::native() {
            ByteOrder::LittleEndian => ByteOrder::BigEndian,
            ByteOrder::BigEndian => ByteOrder::LittleEndian,
        };
        assert!(data.to_tensor().is_none());
    }

    #[test]
    fn device_def_cpu() {
        assert_eq!(Device::from(DeviceDef::Cpu), Device::Cpu);
    }

    #[test]
    fn tensor_data_tokens() {
        let data = TensorData {
            kind: Kind::Uint8,
            shape: vec![2],
            byte_order: ByteOrder::LittleEndian,
            data: vec![3, 4],
        };
        let tokens = [
            Token::Struct {
                name: "TensorData",
                len: 4,
            },
            Token::Str("kind"),
            Token::UnitVariant {
                name: "KindDef",
                variant: "Uint8",
            },
            Token::Str("shape"),
            Token::Seq { len: Some(1) },
            Token::I64(2),
            Token::SeqEnd,
            Token::Str("byte_order"),
            Token::UnitVariant {
                name: "ByteOrder",
                variant: "LittleEndian",
            },
            Token::Str("data"),
            Token::BorrowedBytes(&[3, 4]),
            Token::StructEnd,
        ];
        assert_tokens(&data, &tokens);
    }

    #[test]
    fn device_def_tokens() {
        assert_tokens(
            &DeviceDef::Cuda(1),
            &[
                Token::NewtypeVariant {
                    name: "DeviceDef",
                    variant: "Cuda",
                },
                Token::U64(1),
            ],
        );
    }
}
