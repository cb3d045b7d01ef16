use crate::error::Error;
use eyre::{bail, Result};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::mem::size_of;

/// Size of a PRF key in bytes
pub const PRF_KEY_SIZE: usize = 32;

/// Value sent over the network
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum NetworkValue {
    PrfKey([u8; PRF_KEY_SIZE]),
    Bit(bool),
    /// Bit shares packed 64 per word.
    VecBit64(Vec<u64>),
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
pub enum DescriptorByte {
    PrfKey = 0x01,
    Bit0 = 0x02,
    Bit1 = 0x12,
    VecBit64 = 0x06,
}

impl DescriptorByte {
    // VecBit64 carries a length field that has to be parsed for the total length
    pub fn base_len(&self) -> usize {
        match self {
            DescriptorByte::PrfKey => 1 + PRF_KEY_SIZE,
            DescriptorByte::Bit0 | DescriptorByte::Bit1 => 1,
            DescriptorByte::VecBit64 => 5,
        }
    }
}

/// Length field of a vector payload.
pub fn payload_len(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| {
        Error::Transport(format!("payload of {len} bytes overflows its length field")).into()
    })
}

impl NetworkValue {
    fn descriptor_byte(&self) -> DescriptorByte {
        match self {
            NetworkValue::PrfKey(_) => DescriptorByte::PrfKey,
            NetworkValue::Bit(true) => DescriptorByte::Bit1,
            NetworkValue::Bit(false) => DescriptorByte::Bit0,
            NetworkValue::VecBit64(_) => DescriptorByte::VecBit64,
        }
    }

    pub fn byte_len(&self) -> usize {
        let base_len = self.descriptor_byte().base_len();
        match self {
            NetworkValue::VecBit64(v) => base_len + size_of::<u64>() * v.len(),
            _ => base_len,
        }
    }

    pub fn to_network(&self) -> Result<Vec<u8>> {
        let mut res = Vec::with_capacity(self.byte_len());
        res.push(self.descriptor_byte().into());
        match self {
            NetworkValue::PrfKey(key) => res.extend_from_slice(key),
            // the descriptor byte already contains the bit
            NetworkValue::Bit(_) => {}
            NetworkValue::VecBit64(v) => {
                let len = payload_len(v.len() * size_of::<u64>())?;
                res.extend_from_slice(&len.to_le_bytes());
                for x in v {
                    res.extend_from_slice(&x.to_le_bytes());
                }
            }
        }
        Ok(res)
    }

    pub fn from_network(serialized: Result<Vec<u8>>) -> Result<Self> {
        let v = serialized?;
        Self::from_network_slice(&v)
    }

    fn from_network_slice(serialized: &[u8]) -> Result<Self> {
        let Some(&descriptor) = serialized.first() else {
            bail!("Empty serialized data");
        };
        let descriptor_byte = DescriptorByte::try_from(descriptor)
            .map_err(|_| Error::UnexpectedMessage(format!("descriptor byte {descriptor:#x}")))?;
        match descriptor_byte {
            DescriptorByte::PrfKey => {
                if serialized.len() != descriptor_byte.base_len() {
                    bail!("Invalid length for PrfKey");
                }
                Ok(NetworkValue::PrfKey(<[u8; PRF_KEY_SIZE]>::try_from(
                    &serialized[1..],
                )?))
            }
            DescriptorByte::Bit0 | DescriptorByte::Bit1 => {
                if serialized.len() != 1 {
                    bail!("Invalid length for Bit");
                }
                Ok(NetworkValue::Bit(descriptor_byte == DescriptorByte::Bit1))
            }
            DescriptorByte::VecBit64 => {
                if serialized.len() < 5 {
                    bail!("Can't parse vector length: buffer too short");
                }
                let len = u32::from_le_bytes(<[u8; 4]>::try_from(&serialized[1..5])?) as usize;
                if serialized.len() != 5 + len || len % size_of::<u64>() != 0 {
                    bail!(
                        "Invalid length for VecBit64: {} vs expected {}",
                        serialized.len() - 5,
                        len
                    );
                }
                let words = serialized[5..]
                    .chunks_exact(size_of::<u64>())
                    .map(|c| <[u8; 8]>::try_from(c).map(u64::from_le_bytes))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(NetworkValue::VecBit64(words))
            }
        }
    }

    pub fn into_prf_key(self) -> Result<[u8; PRF_KEY_SIZE]> {
        match self {
            NetworkValue::PrfKey(key) => Ok(key),
            other => Err(Error::UnexpectedMessage(format!("expected PrfKey, got {other:?}")).into()),
        }
    }

    pub fn into_bit(self) -> Result<bool> {
        match self {
            NetworkValue::Bit(bit) => Ok(bit),
            other => Err(Error::UnexpectedMessage(format!("expected Bit, got {other:?}")).into()),
        }
    }

    /// Unwraps packed bit shares and checks the word count.
    pub fn into_words(self, expected: usize) -> Result<Vec<u64>> {
        match self {
            NetworkValue::VecBit64(words) if words.len() == expected => Ok(words),
            NetworkValue::VecBit64(words) => Err(Error::UnexpectedMessage(format!(
                "expected {expected} words, got {}",
                words.len()
            ))
            .into()),
            other => {
                Err(Error::UnexpectedMessage(format!("expected VecBit64, got {other:?}")).into())
            }
        }
    }
}
