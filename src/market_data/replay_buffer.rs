//! 帶時間偏置的經驗回放緩衝區
//!
//! 經驗 `i` 的抽樣權重正比於 `bias^(end_index - i)`：`bias = 0` 只取最新的經驗，
//! `bias = 1` 為均勻抽樣。抽樣使用截斷幾何分佈的反函數，邊界處的分佈仍然良定義。

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::BufferError;

/// 一條經驗
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub state_index: usize,
    /// 未歸一化的抽樣權重
    pub weight: f64,
}

/// 經驗回放緩衝區，區間 `[start_index, end_index]` 只會增長
#[derive(Debug)]
pub struct ReplayBuffer {
    start_index: usize,
    end_index: AtomicUsize,
    bias: f64,
    is_permed: bool,
}

impl ReplayBuffer {
    pub fn new(start_index: usize, end_index: usize, bias: f64, is_permed: bool) -> Self {
        Self {
            start_index,
            end_index: AtomicUsize::new(end_index),
            bias: bias.clamp(0.0, 1.0),
            is_permed,
        }
    }

    pub fn start_index(&self) -> usize {
        self.start_index
    }

    pub fn end_index(&self) -> usize {
        self.end_index.load(Ordering::Acquire)
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }

    pub fn is_permed(&self) -> bool {
        self.is_permed
    }

    /// 加入新經驗，區間終點只會單調增大
    pub fn append_experience(&self, new_index: usize) {
        self.end_index.fetch_max(new_index, Ordering::AcqRel);
    }

    /// 經驗 `state_index` 在給定終點下的抽樣權重
    pub fn weight_of(&self, state_index: usize, end_index: usize) -> f64 {
        let distance = end_index.saturating_sub(state_index);
        if self.bias == 0.0 {
            return if distance == 0 { 1.0 } else { 0.0 };
        }
        self.bias.powi(distance.min(i32::MAX as usize) as i32)
    }

    /// 抽取一個批次
    ///
    /// 非打亂模式抽一個偏置的起點，返回從起點開始的連續經驗；打亂模式獨立抽取
    /// `batch_size` 次。終點在進入時讀取一次，並發的追加不影響本次抽樣。
    pub fn next_batch<R: Rng + ?Sized>(
        &self,
        batch_size: usize,
        rng: &mut R,
    ) -> Result<Vec<Experience>, BufferError> {
        let end_index = self.end_index();
        if end_index <= self.start_index {
            return Err(BufferError::EmptyRange {
                start_index: self.start_index,
                end_index,
            });
        }
        let available = end_index - self.start_index + 1;

        let indices: Vec<usize> = if self.is_permed {
            (0..batch_size)
                .map(|_| end_index - sample_offset(available, self.bias, rng))
                .collect()
        } else {
            if batch_size > available {
                return Err(BufferError::BatchTooLarge {
                    batch_size,
                    available,
                });
            }
            let latest_start = end_index + 1 - batch_size;
            let num_starts = latest_start - self.start_index + 1;
            let batch_start = latest_start - sample_offset(num_starts, self.bias, rng);
            (batch_start..batch_start + batch_size).collect()
        };

        Ok(indices
            .into_iter()
            .map(|state_index| Experience {
                state_index,
                weight: self.weight_of(state_index, end_index),
            })
            .collect())
    }
}

/// 在 `[0, n)` 中抽取距離終點的偏移，`P(k)` 正比於 `bias^k`
pub fn sample_offset<R: Rng + ?Sized>(n: usize, bias: f64, rng: &mut R) -> usize {
    if n <= 1 || bias <= 0.0 {
        return 0;
    }
    if bias >= 1.0 {
        return rng.random_range(0..n);
    }

    let u: f64 = rng.random::<f64>();
    // 截斷幾何分佈的反函數：k = floor(ln(1 - u(1 - b^n)) / ln b)
    let tail = bias.powf(n as f64);
    let k = ((1.0 - u * (1.0 - tail)).ln() / bias.ln()).floor();
    if k.is_finite() && k >= 0.0 {
        (k as usize).min(n - 1)
    } else {
        0
    }
}
