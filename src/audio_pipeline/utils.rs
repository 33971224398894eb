use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("PCM16 payload has odd length {len}")]
    OddLength { len: usize },
    #[error("audio payload is empty")]
    Empty,
    #[error("invalid base64 payload: {message}")]
    Base64 { message: String },
}

/// S16LE のバイト列を i16 サンプル列へ展開
pub fn decode_pcm16le(bytes: &[u8]) -> Result<Vec<i16>, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    if bytes.len() % 2 != 0 {
        return Err(DecodeError::OddLength { len: bytes.len() });
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|ch| i16::from_le_bytes([ch[0], ch[1]]))
        .collect())
}

pub fn encode_pcm16le(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}
