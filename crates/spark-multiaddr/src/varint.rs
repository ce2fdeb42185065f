//! 无符号 LEB128 变长整数编解码。
//!
//! 结构化地址的二进制形态中，协议码与变长值的长度前缀都以该格式写入。

use crate::error::MultiaddrError;

/// `u64` 编码后的最大字节数（`ceil(64 / 7)`）。
pub const MAX_VARINT_LEN: usize = 10;

/// 将 `value` 编码为 LEB128 字节序列并追加到 `out`。
pub fn encode_into(value: u64, out: &mut Vec<u8>) {
    let mut value = value;
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// 返回 `value` 的 LEB128 编码。
pub fn encode(value: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(MAX_VARINT_LEN);
    encode_into(value, &mut out);
    out
}

/// 从 `input` 头部解码一个 LEB128 整数。
///
/// # 契约（What）
/// - 成功时返回 `(值, 剩余切片)`；
/// - 输入在终止字节之前耗尽时返回 [`MultiaddrError::Truncated`]；
/// - 超过 [`MAX_VARINT_LEN`] 字节或数值溢出 `u64` 时返回 [`MultiaddrError::InvalidVarint`]；
/// - 非最短编码（多余的 `0x80` 续位后跟 `0x00`）同样视为非法，保证编码唯一、二进制可逐字节比较。
pub fn decode(input: &[u8]) -> Result<(u64, &[u8]), MultiaddrError> {
    let mut value: u64 = 0;
    for (index, byte) in input.iter().copied().enumerate() {
        if index >= MAX_VARINT_LEN {
            return Err(MultiaddrError::InvalidVarint);
        }
        let payload = u64::from(byte & 0x7f);
        let shift = 7 * index as u32;
        if shift == 63 && payload > 1 {
            return Err(MultiaddrError::InvalidVarint);
        }
        value |= payload << shift;
        if byte & 0x80 == 0 {
            if byte == 0 && index > 0 {
                return Err(MultiaddrError::InvalidVarint);
            }
            return Ok((value, &input[index + 1..]));
        }
    }
    Err(MultiaddrError::Truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_known_protocol_codes() {
        assert_eq!(encode(4), vec![0x04]);
        assert_eq!(encode(421), vec![0xa5, 0x03]);
        assert_eq!(encode(477), vec![0xdd, 0x03]);
        assert_eq!(encode(478), vec![0xde, 0x03]);
    }

    #[test]
    fn decode_returns_remaining_bytes() {
        let (value, rest) = decode(&[0xde, 0x03, 0xff]).expect("decode");
        assert_eq!(value, 478);
        assert_eq!(rest, &[0xff]);
    }

    #[test]
    fn decode_rejects_truncated_and_overlong_input() {
        assert_eq!(decode(&[0x80]), Err(MultiaddrError::Truncated));
        assert_eq!(decode(&[]), Err(MultiaddrError::Truncated));
        assert_eq!(decode(&[0x80, 0x00]), Err(MultiaddrError::InvalidVarint));
        assert_eq!(decode(&[0xff; 11]), Err(MultiaddrError::InvalidVarint));
    }

    #[test]
    fn max_value_survives() {
        let bytes = encode(u64::MAX);
        assert_eq!(bytes.len(), MAX_VARINT_LEN);
        assert_eq!(decode(&bytes).expect("decode").0, u64::MAX);
    }
}
