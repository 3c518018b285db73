//! 樣本窗口、訓練/測試劃分與兩階段抽樣
//!
//! 抽樣返回批次與一個提交憑證，憑證只能使用一次；決策產生的新權重通過
//! `commit` 寫回 PVM。

use ndarray::{s, Array1, Array2, Array3, Array4};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::Arc;
use tracing::info;

use crate::config::ApplicationConfig;
use crate::error::{PipelineError, PipelineResult, WindowError};
use crate::market_data::global_matrix::FeatureTensor;
use crate::market_data::pvm::PortfolioVectorMemory;
use crate::market_data::replay_buffer::ReplayBuffer;

/// 訓練與測試的索引劃分
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexPartition {
    pub train: Range<usize>,
    pub test: Range<usize>,
}

/// 劃分 `[0, num_periods)`
///
/// 正向時訓練集在前，反向時測試集在前；訓練集尾部去掉 `window_size + 1` 個索引，
/// 使任何訓練窗口都不會讀到測試集之後的數據。
pub fn split(
    num_periods: usize,
    window_size: usize,
    test_portion: f64,
    reversed: bool,
) -> Result<IndexPartition, WindowError> {
    let margin = window_size + 1;

    let (train, test) = if reversed {
        let split_at = (test_portion * num_periods as f64) as usize;
        (split_at..num_periods, 0..split_at)
    } else {
        let split_at = ((1.0 - test_portion) * num_periods as f64) as usize;
        (0..split_at, split_at..num_periods)
    };

    if train.len() <= margin {
        return Err(WindowError::InvalidPartition(format!(
            "訓練集只有 {} 個週期，不足窗口 {} + 1",
            train.len(),
            window_size
        )));
    }
    if test.is_empty() {
        return Err(WindowError::InvalidPartition("測試集為空".to_string()));
    }

    Ok(IndexPartition {
        train: train.start..train.end - margin,
        test,
    })
}

/// 單個窗口樣本
#[derive(Debug, Clone)]
pub struct Window {
    pub index: usize,
    /// `[特徵][資產][窗口]`，不含目標週期
    pub x: Array3<f64>,
    /// 目標週期的收盤價比，建模現金時第 0 項為 1
    pub y: Array1<f64>,
    pub previous_w: Array1<f64>,
}

/// 一批樣本
#[derive(Debug, Clone)]
pub struct Batch {
    pub indices: Vec<usize>,
    /// `[批次][特徵][資產][窗口]`
    pub x: Array4<f64>,
    /// `[批次][欄]`
    pub y: Array2<f64>,
    /// `[批次][欄]`
    pub previous_w: Array2<f64>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// 抽樣後寫回權重的憑證，只能提交一次
#[derive(Debug)]
#[must_use = "抽樣後必須提交新權重"]
pub struct CommitToken {
    indices: Vec<usize>,
}

impl CommitToken {
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }
}

/// 窗口抽樣器，持有一次運行的張量、PVM 與回放緩衝區
pub struct SampleWindower {
    tensor: FeatureTensor,
    pvm: PortfolioVectorMemory,
    window_size: usize,
    partition: IndexPartition,
    buffer: Arc<ReplayBuffer>,
    batch_size: usize,
    rng: StdRng,
}

/// 抽樣器參數
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowerParams {
    pub window_size: usize,
    pub test_portion: f64,
    pub portion_reversed: bool,
    pub batch_size: usize,
    pub buffer_bias: f64,
    pub is_permed: bool,
    pub random_seed: u64,
}

impl WindowerParams {
    pub fn from_config(config: &ApplicationConfig) -> Self {
        Self {
            window_size: config.input.window_size,
            test_portion: config.input.test_portion,
            portion_reversed: config.input.portion_reversed,
            batch_size: config.training.batch_size,
            buffer_bias: config.training.buffer_biased,
            is_permed: config.input.is_permed,
            random_seed: config.random_seed,
        }
    }
}

impl SampleWindower {
    pub fn new(tensor: FeatureTensor, pvm: PortfolioVectorMemory, params: &WindowerParams) -> PipelineResult<Self> {
        if pvm.num_rows() != tensor.num_periods()
            || pvm.num_columns() != tensor.num_assets() + usize::from(pvm.include_cash())
        {
            return Err(PipelineError::ConfigMismatch(format!(
                "PVM 形狀 ({}, {}) 與張量的 {} 個週期、{} 個資產不符",
                pvm.num_rows(),
                pvm.num_columns(),
                tensor.num_periods(),
                tensor.num_assets()
            )));
        }

        let partition = split(
            tensor.num_periods(),
            params.window_size,
            params.test_portion,
            params.portion_reversed,
        )?;

        // 緩衝區為閉區間，終點是最後一個訓練索引
        let buffer = Arc::new(ReplayBuffer::new(
            partition.train.start,
            partition.train.end.saturating_sub(1),
            params.buffer_bias,
            params.is_permed,
        ));

        info!(
            num_periods = tensor.num_periods(),
            train = ?partition.train,
            test = ?partition.test,
            window_size = params.window_size,
            "數據劃分完成"
        );

        Ok(Self {
            tensor,
            pvm,
            window_size: params.window_size,
            partition,
            buffer,
            batch_size: params.batch_size,
            rng: StdRng::seed_from_u64(params.random_seed),
        })
    }

    pub fn tensor(&self) -> &FeatureTensor {
        &self.tensor
    }

    pub fn pvm(&self) -> &PortfolioVectorMemory {
        &self.pvm
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn partition(&self) -> &IndexPartition {
        &self.partition
    }

    pub fn buffer(&self) -> Arc<ReplayBuffer> {
        self.buffer.clone()
    }

    /// 測試集可迭代的狀態索引
    pub fn test_indices(&self) -> Range<usize> {
        let test = &self.partition.test;
        test.start..test.end.saturating_sub(self.window_size + 1).max(test.start)
    }

    pub fn num_train_samples(&self) -> usize {
        self.partition.train.len()
    }

    pub fn num_test_samples(&self) -> usize {
        self.test_indices().len()
    }

    /// `tensor[:, :, index ..= index + window_size]`
    pub fn slice_window(&self, index: usize) -> Result<Array3<f64>, WindowError> {
        self.tensor.slice_window(index, self.window_size)
    }

    /// 目標週期的收盤價比，建模現金時在前面補 1
    fn target_relative(&self, index: usize) -> Result<Array1<f64>, WindowError> {
        let relative = self.tensor.price_relative(index + self.window_size)?;
        if self.pvm.include_cash() {
            let mut y = Array1::ones(relative.len() + 1);
            y.slice_mut(s![1..]).assign(&relative);
            Ok(y)
        } else {
            Ok(relative)
        }
    }

    /// 狀態索引的完整樣本
    pub fn window(&self, index: usize) -> Result<Window, WindowError> {
        let full = self.slice_window(index)?;
        Ok(Window {
            index,
            x: full.slice(s![.., .., ..self.window_size]).to_owned(),
            y: self.target_relative(index)?,
            previous_w: self.pvm.previous(index)?,
        })
    }

    /// 將多個狀態索引打包為一批
    pub fn pack(&self, indices: &[usize]) -> Result<Batch, WindowError> {
        let (f, a) = (self.tensor.num_features(), self.tensor.num_assets());
        let columns = self.pvm.num_columns();
        let mut x = Array4::zeros((indices.len(), f, a, self.window_size));
        let mut y = Array2::zeros((indices.len(), columns));

        for (b, &index) in indices.iter().enumerate() {
            let full = self.slice_window(index)?;
            x.slice_mut(s![b, .., .., ..])
                .assign(&full.slice(s![.., .., ..self.window_size]));
            y.row_mut(b).assign(&self.target_relative(index)?);
        }

        Ok(Batch {
            indices: indices.to_vec(),
            x,
            y,
            previous_w: self.pvm.previous_rows(indices)?,
        })
    }

    /// 從回放緩衝區抽一批訓練樣本
    pub fn sample(&mut self) -> PipelineResult<(Batch, CommitToken)> {
        let experiences = self.buffer.next_batch(self.batch_size, &mut self.rng)?;
        let indices: Vec<usize> = experiences.iter().map(|e| e.state_index).collect();
        let batch = self.pack(&indices)?;
        Ok((batch, CommitToken { indices }))
    }

    /// 整個測試集
    pub fn test_set(&self) -> Result<(Batch, CommitToken), WindowError> {
        let indices: Vec<usize> = self.test_indices().collect();
        let batch = self.pack(&indices)?;
        Ok((batch, CommitToken { indices }))
    }

    /// 整個訓練集
    pub fn training_set(&self) -> Result<(Batch, CommitToken), WindowError> {
        let indices: Vec<usize> = self.partition.train.clone().collect();
        let batch = self.pack(&indices)?;
        Ok((batch, CommitToken { indices }))
    }

    /// 寫回決策權重，每個索引一行
    pub fn commit(&mut self, token: CommitToken, weights: &Array2<f64>) -> Result<(), WindowError> {
        self.pvm.set_rows(&token.indices, weights)
    }

    /// 寫回單步決策
    pub fn commit_step(&mut self, index: usize, weights: &Array1<f64>) -> Result<(), WindowError> {
        self.pvm.set_row(index, weights.view())
    }

    /// 線上學習：訓練區間向後延伸一個索引並通知回放緩衝區
    pub fn append_experience(&mut self) -> Result<usize, WindowError> {
        let next_index = self.partition.train.end;
        // 新索引的窗口必須在張量之內
        if next_index + self.window_size >= self.tensor.num_periods() {
            return Err(WindowError::OutOfBounds {
                index: next_index,
                window_size: self.window_size,
                num_periods: self.tensor.num_periods(),
            });
        }
        self.partition.train.end += 1;
        self.buffer.append_experience(next_index);
        Ok(next_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_types::Feature;
    use assert_matches::assert_matches;
    use ndarray::{array, Array};
    use proptest::prelude::*;

    fn windower(num_periods: usize, include_cash: bool, reversed: bool) -> SampleWindower {
        let data = Array::from_shape_fn((1, 2, num_periods), |(_, a, t)| (a + 1) as f64 * (t + 1) as f64);
        let tensor = FeatureTensor::new(
            data,
            vec![Feature::Close],
            vec!["ETH".to_string(), "LTC".to_string()],
            0,
            1800,
        )
        .unwrap();
        let pvm = PortfolioVectorMemory::new(num_periods, 2, include_cash);
        let params = WindowerParams {
            window_size: 3,
            test_portion: 0.2,
            portion_reversed: reversed,
            batch_size: 4,
            buffer_bias: 0.9,
            is_permed: false,
            random_seed: 42,
        };
        SampleWindower::new(tensor, pvm, &params).unwrap()
    }

    #[test]
    fn test_forward_split() {
        let partition = split(100, 10, 0.2, false).unwrap();
        assert_eq!(partition.train, 0..69);
        assert_eq!(partition.test, 80..100);
    }

    #[test]
    fn test_reversed_split() {
        let partition = split(100, 10, 0.2, true).unwrap();
        assert_eq!(partition.test, 0..20);
        assert_eq!(partition.train, 20..89);
        assert!(partition.test.end <= partition.train.start);
    }

    #[test]
    fn test_split_too_short() {
        assert_matches!(split(10, 10, 0.2, false), Err(WindowError::InvalidPartition(_)));
    }

    proptest! {
        #[test]
        fn prop_split_lengths(
            num_periods in 50usize..2000,
            window_size in 1usize..20,
            test_portion in 0.05f64..0.5,
            reversed in any::<bool>(),
        ) {
            let partition = split(num_periods, window_size, test_portion, reversed).unwrap();
            prop_assert_eq!(
                partition.train.len() + partition.test.len() + window_size + 1,
                num_periods
            );
            if reversed {
                prop_assert!(partition.test.end <= partition.train.start);
            } else {
                prop_assert!(partition.train.end <= partition.test.start);
            }
        }
    }

    #[test]
    fn test_window_contents() {
        let windower = windower(20, true, false);
        let window = windower.window(2).unwrap();
        assert_eq!(window.x.dim(), (1, 2, 3));
        assert_eq!(window.x[[0, 0, 0]], 3.0);
        // 目標週期 5 相對週期 4
        assert_eq!(window.y, array![1.0, 6.0 / 5.0, 6.0 / 5.0]);
        assert_eq!(window.previous_w.len(), 3);
    }

    #[test]
    fn test_window_without_cash() {
        let windower = windower(20, false, false);
        let window = windower.window(0).unwrap();
        assert_eq!(window.y.len(), 2);
        assert_eq!(window.previous_w, array![0.5, 0.5]);
    }

    #[test]
    fn test_sample_and_commit() {
        let mut windower = windower(40, true, false);
        let (batch, token) = windower.sample().unwrap();
        assert_eq!(batch.len(), 4);
        assert_eq!(batch.x.dim(), (4, 1, 2, 3));
        assert!(batch.indices.windows(2).all(|w| w[1] == w[0] + 1));

        let indices = token.indices().to_vec();
        let weights = Array2::from_shape_fn((4, 3), |(_, c)| if c == 0 { 1.0 } else { 0.0 });
        windower.commit(token, &weights).unwrap();

        for index in indices {
            assert_eq!(windower.pvm().row(index).unwrap()[0], 1.0);
            assert_eq!(windower.pvm().previous(index + 1).unwrap()[0], 1.0);
        }
    }

    #[test]
    fn test_test_indices_drop_tail() {
        let windower = windower(40, true, false);
        // 測試集 [32, 40)，去掉 window_size + 1 = 4
        assert_eq!(windower.partition().test, 32..40);
        assert_eq!(windower.test_indices(), 32..36);
        let (batch, _token) = windower.test_set().unwrap();
        assert_eq!(batch.indices, vec![32, 33, 34, 35]);
    }

    #[test]
    fn test_append_experience_extends_buffer() {
        let mut windower = windower(40, true, false);
        let buffer = windower.buffer();
        let before = buffer.end_index();
        let appended = windower.append_experience().unwrap();
        assert_eq!(appended, before + 1);
        assert_eq!(buffer.end_index(), appended);
        assert_eq!(windower.partition().train.end, appended + 1);
    }
}
