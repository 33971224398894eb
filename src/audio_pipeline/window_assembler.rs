/// 任意長のフレームを固定長の判定ウィンドウへ組み直す
#[derive(Debug)]
pub struct WindowAssembler {
    window_samples: usize,
    buffer: Vec<i16>,
}

impl WindowAssembler {
    pub fn new(window_samples: usize) -> Self {
        Self {
            window_samples,
            buffer: Vec::with_capacity(window_samples * 2),
        }
    }

    pub fn window_samples(&self) -> usize {
        self.window_samples
    }

    pub fn push(&mut self, frame: &[i16]) -> Vec<Vec<i16>> {
        self.buffer.extend_from_slice(frame);
        let mut windows = Vec::new();

        while self.buffer.len() >= self.window_samples {
            let remainder = self.buffer.split_off(self.window_samples);
            let produced = std::mem::replace(&mut self.buffer, remainder);
            windows.push(produced);
        }

        windows
    }

    /// 判定に足りない端数を捨てる。捨てたサンプル数を返す
    pub fn discard_remainder(&mut self) -> usize {
        let dropped = self.buffer.len();
        self.buffer.clear();
        dropped
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}
