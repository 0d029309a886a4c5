use regway_error::{comm::CommError, CommResult};
use regway_models::domain::prelude::{Endianness, RegisterDataType, RegisterDescriptor};

/// Conversions between engineering values and 16-bit register words.
///
/// Decoding divides the raw value by the descriptor's scale; encoding
/// multiplies and rounds back to the raw integer. Byte and word order follow
/// the descriptor, so two-word values from little-word-order meters decode
/// with the same code path as big-endian ones.
pub struct RegisterCodec;

impl RegisterCodec {
    /// Convert registers to raw bytes honoring byte and word order.
    ///
    /// For `word_order = LittleEndian`, words are reversed before byte extraction.
    #[inline]
    pub fn words_to_bytes(words: &[u16], byte_order: Endianness, word_order: Endianness) -> Vec<u8> {
        let mut out: Vec<u8> = Vec::with_capacity(words.len() * 2);
        let reversed = words.len() > 1 && word_order == Endianness::LittleEndian;
        let mut push = |w: u16| {
            let [b0, b1] = w.to_be_bytes();
            match byte_order {
                Endianness::BigEndian => out.extend_from_slice(&[b0, b1]),
                Endianness::LittleEndian => out.extend_from_slice(&[b1, b0]),
            }
        };
        if reversed {
            words.iter().rev().copied().for_each(&mut push);
        } else {
            words.iter().copied().for_each(&mut push);
        }
        out
    }

    /// Inverse of [`words_to_bytes`](Self::words_to_bytes) for big-endian byte input.
    #[inline]
    pub fn bytes_to_words(bytes: &[u8], byte_order: Endianness, word_order: Endianness) -> Vec<u16> {
        let mut words: Vec<u16> = bytes
            .chunks(2)
            .map(|c| {
                let (hi, lo) = (c[0], c.get(1).copied().unwrap_or(0));
                match byte_order {
                    Endianness::BigEndian => u16::from_be_bytes([hi, lo]),
                    Endianness::LittleEndian => u16::from_be_bytes([lo, hi]),
                }
            })
            .collect();
        if words.len() > 1 && word_order == Endianness::LittleEndian {
            words.reverse();
        }
        words
    }

    /// Raw (unscaled) numeric value held by `words`.
    pub fn decode_raw(words: &[u16], desc: &RegisterDescriptor) -> CommResult<f64> {
        let expected = desc.word_count() as usize;
        if words.len() != expected {
            return Err(CommError::TransactionFailed(format!(
                "register `{}`: expected {} words, got {}",
                desc.name,
                expected,
                words.len()
            )));
        }
        let bytes = Self::words_to_bytes(words, desc.byte_order, desc.word_order);
        let value = match desc.data_type {
            RegisterDataType::U16 => u16::from_be_bytes([bytes[0], bytes[1]]) as f64,
            RegisterDataType::I16 => i16::from_be_bytes([bytes[0], bytes[1]]) as f64,
            RegisterDataType::U32 => {
                u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64
            }
            RegisterDataType::I32 => {
                i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64
            }
            RegisterDataType::F32 => {
                f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64
            }
        };
        Ok(value)
    }

    /// Engineering value: raw ÷ scale, optionally rounded to `precision` places.
    pub fn decode(words: &[u16], desc: &RegisterDescriptor) -> CommResult<f64> {
        let raw = Self::decode_raw(words, desc)?;
        if desc.data_type == RegisterDataType::F32 && !raw.is_finite() {
            return Err(CommError::TransactionFailed(format!(
                "register `{}`: non-finite float",
                desc.name
            )));
        }
        let scaled = raw / desc.scale as f64;
        Ok(match desc.precision {
            Some(p) => round_to(scaled, p),
            None => scaled,
        })
    }

    /// Encode an engineering value into wire words: `round(value × scale)`.
    ///
    /// Values that do not fit the register type are rejected as
    /// `InvalidCommand` so no transaction is ever issued for them.
    pub fn encode(value: f64, desc: &RegisterDescriptor) -> CommResult<Vec<u16>> {
        if !value.is_finite() {
            return Err(CommError::InvalidCommand(format!(
                "register `{}`: value must be finite",
                desc.name
            )));
        }
        let raw = value * desc.scale as f64;
        let out_of_range = |min: f64, max: f64| {
            CommError::InvalidCommand(format!(
                "register `{}`: value {} encodes to {} outside [{}, {}]",
                desc.name,
                value,
                raw.round(),
                min,
                max
            ))
        };
        let bytes: Vec<u8> = match desc.data_type {
            RegisterDataType::U16 => {
                let r = raw.round();
                if !(0.0..=u16::MAX as f64).contains(&r) {
                    return Err(out_of_range(0.0, u16::MAX as f64));
                }
                (r as u16).to_be_bytes().to_vec()
            }
            RegisterDataType::I16 => {
                let r = raw.round();
                if !(i16::MIN as f64..=i16::MAX as f64).contains(&r) {
                    return Err(out_of_range(i16::MIN as f64, i16::MAX as f64));
                }
                (r as i16).to_be_bytes().to_vec()
            }
            RegisterDataType::U32 => {
                let r = raw.round();
                if !(0.0..=u32::MAX as f64).contains(&r) {
                    return Err(out_of_range(0.0, u32::MAX as f64));
                }
                (r as u32).to_be_bytes().to_vec()
            }
            RegisterDataType::I32 => {
                let r = raw.round();
                if !(i32::MIN as f64..=i32::MAX as f64).contains(&r) {
                    return Err(out_of_range(i32::MIN as f64, i32::MAX as f64));
                }
                (r as i32).to_be_bytes().to_vec()
            }
            RegisterDataType::F32 => {
                if raw.abs() > f32::MAX as f64 {
                    return Err(out_of_range(f32::MIN as f64, f32::MAX as f64));
                }
                (raw as f32).to_be_bytes().to_vec()
            }
        };
        Ok(Self::bytes_to_words(&bytes, desc.byte_order, desc.word_order))
    }
}

#[inline]
fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}
