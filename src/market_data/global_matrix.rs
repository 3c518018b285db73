//! 全局特徵張量
//!
//! 張量按 `[特徵][資產][時間]` 排列，時間軸覆蓋 `[start, end]` 的每個週期且沒有空洞。
//! 收盤價永遠是第 0 個特徵。

use ndarray::{s, Array1, Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::InputConfig;
use crate::data_provider::{AssetRanking, AssetSelector, BarStore};
use crate::domain_types::period::{check_period, snap_down};
use crate::domain_types::Feature;
use crate::error::{PipelineError, PipelineResult, SelectionError, WindowError};
use crate::market_data::pvm::PortfolioVectorMemory;

/// 稠密特徵張量
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureTensor {
    data: Array3<f64>,
    features: Vec<Feature>,
    assets: Vec<String>,
    start: i64,
    period: i64,
}

impl FeatureTensor {
    /// 由已填好的數組建立，數組形狀必須與特徵、資產數一致
    pub fn new(
        data: Array3<f64>,
        features: Vec<Feature>,
        assets: Vec<String>,
        start: i64,
        period: i64,
    ) -> PipelineResult<Self> {
        let (f, a, _) = data.dim();
        if f != features.len() || a != assets.len() {
            return Err(PipelineError::ConfigMismatch(format!(
                "張量形狀 {:?} 與 {} 個特徵、{} 個資產不符",
                data.dim(),
                features.len(),
                assets.len()
            )));
        }
        if features.first() != Some(&Feature::Close) {
            return Err(PipelineError::ConfigMismatch("第一個特徵必須是收盤價".to_string()));
        }
        Ok(Self {
            data,
            features,
            assets,
            start,
            period,
        })
    }

    pub fn data(&self) -> &Array3<f64> {
        &self.data
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn num_features(&self) -> usize {
        self.data.dim().0
    }

    pub fn num_assets(&self) -> usize {
        self.data.dim().1
    }

    pub fn num_periods(&self) -> usize {
        self.data.dim().2
    }

    pub fn period(&self) -> i64 {
        self.period
    }

    /// 時間索引對應的時間戳
    pub fn timestamp_at(&self, index: usize) -> i64 {
        self.start + index as i64 * self.period
    }

    /// 收盤價矩陣 `[資產][時間]`
    pub fn close(&self) -> ArrayView2<'_, f64> {
        self.data.index_axis(Axis(0), 0)
    }

    /// `tensor[:, :, index ..= index + window_size]`，最後一欄是目標週期
    pub fn slice_window(&self, index: usize, window_size: usize) -> Result<Array3<f64>, WindowError> {
        let num_periods = self.num_periods();
        if index + window_size >= num_periods {
            return Err(WindowError::OutOfBounds {
                index,
                window_size,
                num_periods,
            });
        }
        Ok(self.data.slice(s![.., .., index..=index + window_size]).to_owned())
    }

    /// 週期 `t` 相對 `t - 1` 的收盤價比
    pub fn price_relative(&self, t: usize) -> Result<Array1<f64>, WindowError> {
        let num_periods = self.num_periods();
        if t == 0 || t >= num_periods {
            return Err(WindowError::OutOfBounds {
                index: t,
                window_size: 0,
                num_periods,
            });
        }
        let close = self.close();
        Ok(&close.column(t) / &close.column(t - 1))
    }
}

/// 建立全局張量的參數
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixParams {
    pub start: i64,
    pub end: i64,
    pub period: i64,
    pub features: Vec<Feature>,
    pub asset_count: usize,
    pub volume_average_days: i64,
    pub volume_forward: i64,
    pub dust_threshold: f64,
    pub include_cash: bool,
}

/// 資產篩選的成交量窗口向前偏移的秒數
///
/// 正向劃分時測試集位於尾部，篩選窗口需整個避開測試集；反向劃分時不偏移。
pub fn volume_forward(start: i64, end: i64, test_portion: f64, reversed: bool) -> i64 {
    if reversed {
        0
    } else {
        ((end - start) as f64 * test_portion) as i64
    }
}

impl MatrixParams {
    pub fn from_config(input: &InputConfig) -> PipelineResult<Self> {
        let start = input
            .start_timestamp()
            .map_err(|e| PipelineError::ConfigMismatch(e.to_string()))?;
        let end = input
            .end_timestamp()
            .map_err(|e| PipelineError::ConfigMismatch(e.to_string()))?;

        Ok(Self {
            start,
            end,
            period: input.global_period,
            features: Feature::from_count(input.feature_number)?,
            asset_count: input.coin_number,
            volume_average_days: input.volume_average_days,
            volume_forward: volume_forward(start, end, input.test_portion, input.portion_reversed),
            dust_threshold: input.dust_threshold,
            include_cash: input.include_cash,
        })
    }
}

/// 建立完成的全局數據
#[derive(Debug)]
pub struct GlobalMatrix {
    pub tensor: FeatureTensor,
    pub pvm: PortfolioVectorMemory,
    pub assets: Vec<AssetRanking>,
}

/// 選取資產、補齊歷史並組裝張量與 PVM
pub async fn build(store: &BarStore, selector: &AssetSelector, params: &MatrixParams) -> PipelineResult<GlobalMatrix> {
    let period = check_period(params.period)?;
    let start = snap_down(params.start, period);
    let end = snap_down(params.end, period);
    if end <= start {
        return Err(PipelineError::ConfigMismatch(format!(
            "對齊後的區間為空: start={}, end={}",
            start, end
        )));
    }

    let assets = selector
        .top_k_by_volume(
            end,
            params.asset_count,
            params.volume_average_days,
            params.volume_forward,
            params.dust_threshold,
        )
        .await?;
    if assets.len() != params.asset_count {
        return Err(SelectionError::InsufficientAssets {
            requested: params.asset_count,
            available: assets.len(),
        }
        .into());
    }

    let num_periods = ((end - start) / period + 1) as usize;
    let mut data = Array3::<f64>::zeros((params.features.len(), assets.len(), num_periods));

    for (a, asset) in assets.iter().enumerate() {
        // 第一個週期包含 start 之前一個週期的記錄
        store.ensure_range(&asset.asset_id, start - period, end).await?;

        for (f, feature) in params.features.iter().enumerate() {
            let series = store
                .query_feature(&asset.asset_id, *feature, start, end, period)
                .await?;
            data.slice_mut(s![f, a, ..])
                .assign(&Array1::from_vec(series.values));
        }
        info!(asset_id = %asset.asset_id, "已載入資產數據");
    }

    let tensor = FeatureTensor::new(
        data,
        params.features.clone(),
        assets.iter().map(|a| a.asset_id.clone()).collect(),
        start,
        period,
    )?;
    let pvm = PortfolioVectorMemory::new(num_periods, assets.len(), params.include_cash);

    info!(
        shape = ?tensor.data().dim(),
        include_cash = params.include_cash,
        "全局張量建立完成"
    );

    Ok(GlobalMatrix { tensor, pvm, assets })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use ndarray::Array;

    fn tensor() -> FeatureTensor {
        // 2 個特徵、2 個資產、5 個週期
        let data = Array::from_shape_fn((2, 2, 5), |(f, a, t)| (f * 100 + a * 10 + t + 1) as f64);
        FeatureTensor::new(
            data,
            vec![Feature::Close, Feature::Volume],
            vec!["ETH".to_string(), "LTC".to_string()],
            0,
            1800,
        )
        .unwrap()
    }

    #[test]
    fn test_slice_window_includes_target() {
        let tensor = tensor();
        let window = tensor.slice_window(1, 3).unwrap();
        assert_eq!(window.dim(), (2, 2, 4));
        assert_eq!(window[[0, 0, 0]], 2.0);
        assert_eq!(window[[0, 0, 3]], 5.0);
        assert_eq!(window[[1, 1, 3]], 115.0);
    }

    #[test]
    fn test_slice_window_out_of_bounds() {
        let tensor = tensor();
        assert!(tensor.slice_window(1, 3).is_ok());
        assert_matches!(
            tensor.slice_window(2, 3),
            Err(WindowError::OutOfBounds { index: 2, window_size: 3, num_periods: 5 })
        );
    }

    #[test]
    fn test_price_relative() {
        let tensor = tensor();
        let y = tensor.price_relative(2).unwrap();
        assert_eq!(y[0], 3.0 / 2.0);
        assert_eq!(y[1], 13.0 / 12.0);
        assert!(tensor.price_relative(0).is_err());
    }

    #[test]
    fn test_close_must_be_first_feature() {
        let data = Array3::<f64>::ones((1, 1, 3));
        let result = FeatureTensor::new(data, vec![Feature::Volume], vec!["ETH".to_string()], 0, 300);
        assert!(result.is_err());
    }

    #[test]
    fn test_volume_forward() {
        assert_eq!(volume_forward(0, 1000, 0.08, false), 80);
        assert_eq!(volume_forward(0, 1000, 0.08, true), 0);
    }

    #[test]
    fn test_timestamp_at() {
        assert_eq!(tensor().timestamp_at(3), 5400);
    }
}
