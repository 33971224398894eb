use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ResampleError {
    #[error("sample rate must be non-zero (from {from_rate} Hz to {to_rate} Hz)")]
    ZeroRate { from_rate: u32, to_rate: u32 },
}

/// 単純な線形補間ベースのリサンプラ（PCM16 モノラル）
#[derive(Debug, Clone)]
pub struct LinearResampler {
    input_rate: u32,
    output_rate: u32,
}

impl LinearResampler {
    /// 入出力サンプルレートを指定して作成
    pub fn new(input_rate: u32, output_rate: u32) -> Self {
        Self {
            input_rate,
            output_rate,
        }
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    /// 線形補間によりリサンプル。失敗時は期待長の無音を返す
    pub fn resample(&self, samples: &[i16]) -> Vec<i16> {
        resample(samples, self.input_rate, self.output_rate)
    }
}

/// 出力長 `round(len * to / from)`。レートが0の場合の扱いは `try_resample` を参照
pub fn expected_len(len: usize, from_rate: u32, to_rate: u32) -> usize {
    if to_rate == 0 {
        return 0;
    }
    if from_rate == 0 {
        return len;
    }
    (len as f64 * to_rate as f64 / from_rate as f64).round() as usize
}

/// リサンプル処理の本体。呼び出し側を止めないよう、エラー時は無音で埋める
pub fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    match try_resample(samples, from_rate, to_rate) {
        Ok(output) => output,
        Err(err) => {
            warn!(error = %err, input_len = samples.len(), "resampling failed; substituting silence");
            vec![0; expected_len(samples.len(), from_rate, to_rate)]
        }
    }
}

pub fn try_resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Result<Vec<i16>, ResampleError> {
    if from_rate == 0 || to_rate == 0 {
        return Err(ResampleError::ZeroRate { from_rate, to_rate });
    }
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let output_len = expected_len(samples.len(), from_rate, to_rate);
    let last = samples[samples.len() - 1];

    let mut output = Vec::with_capacity(output_len);
    for n in 0..output_len {
        let position = n as f64 / ratio;
        let base_index = position.floor() as usize;
        let frac = position - base_index as f64;
        let a = samples.get(base_index).copied().unwrap_or(last) as f64;
        let b = samples.get(base_index + 1).copied().unwrap_or(last) as f64;
        let sample = (a + (b - a) * frac).round();
        output.push(sample.clamp(i16::MIN as f64, i16::MAX as f64) as i16);
    }
    Ok(output)
}
