//! 決策策略介面與基準策略

use ndarray::{s, Array1, ArrayView1, Axis};

use crate::error::PolicyError;
use crate::market_data::{FeatureTensor, Window};

/// 由窗口與上一期權重產生新權重
///
/// 回測引擎按時間順序逐步調用，同一策略實例不會被並發調用。
pub trait Policy: Send {
    fn name(&self) -> &str;

    fn decide(&mut self, window: &Window, previous: &Array1<f64>) -> Result<Array1<f64>, PolicyError>;

    /// 複製當前狀態（含已累積的內部狀態）
    fn boxed_clone(&self) -> Box<dyn Policy>;
}

/// 權重是否包含現金欄
fn has_cash_column(window: &Window, previous: &Array1<f64>) -> bool {
    previous.len() == window.x.dim().1 + 1
}

/// 上一期權重持有期間的收盤價比，從窗口最後兩欄取得
pub fn held_relative(window: &Window, previous: &Array1<f64>) -> Result<Array1<f64>, PolicyError> {
    let width = window.x.dim().2;
    if width < 2 {
        return Err(PolicyError::Failed("窗口寬度不足 2，無法計算持有期收益".to_string()));
    }
    let close = window.x.index_axis(Axis(0), 0);
    let relative = &close.column(width - 1) / &close.column(width - 2);

    if has_cash_column(window, previous) {
        let mut with_cash = Array1::ones(relative.len() + 1);
        with_cash.slice_mut(s![1..]).assign(&relative);
        Ok(with_cash)
    } else {
        Ok(relative)
    }
}

/// 權重隨價格漂移後的值
pub fn drift(weights: ArrayView1<'_, f64>, relative: ArrayView1<'_, f64>) -> Array1<f64> {
    let grown = &weights * &relative;
    let total = grown.sum();
    if total > 0.0 {
        grown / total
    } else {
        weights.to_owned()
    }
}

/// 全部資產等權，現金為 0
fn uniform_assets(columns: usize, cash: bool) -> Array1<f64> {
    let offset = usize::from(cash);
    let assets = columns - offset;
    let mut weights = Array1::zeros(columns);
    if assets > 0 {
        weights.slice_mut(s![offset..]).fill(1.0 / assets as f64);
    }
    weights
}

fn check_len(previous: &Array1<f64>, expected: usize) -> Result<(), PolicyError> {
    if previous.len() != expected {
        return Err(PolicyError::ShapeMismatch {
            expected,
            actual: previous.len(),
        });
    }
    Ok(())
}

/// 等權定期再平衡組合
#[derive(Debug, Default, Clone)]
pub struct UniformConstantRebalanced;

impl Policy for UniformConstantRebalanced {
    fn name(&self) -> &str {
        "ucrp"
    }

    fn boxed_clone(&self) -> Box<dyn Policy> {
        Box::new(self.clone())
    }

    fn decide(&mut self, window: &Window, previous: &Array1<f64>) -> Result<Array1<f64>, PolicyError> {
        let cash = has_cash_column(window, previous);
        check_len(previous, window.x.dim().1 + usize::from(cash))?;
        Ok(uniform_assets(previous.len(), cash))
    }
}

/// 等權買入持有：第一步等權買入，之後只隨價格漂移
#[derive(Debug, Default, Clone)]
pub struct UniformBuyAndHold {
    started: bool,
}

impl Policy for UniformBuyAndHold {
    fn name(&self) -> &str {
        "ubah"
    }

    fn boxed_clone(&self) -> Box<dyn Policy> {
        Box::new(self.clone())
    }

    fn decide(&mut self, window: &Window, previous: &Array1<f64>) -> Result<Array1<f64>, PolicyError> {
        let cash = has_cash_column(window, previous);
        check_len(previous, window.x.dim().1 + usize::from(cash))?;

        if !self.started {
            self.started = true;
            return Ok(uniform_assets(previous.len(), cash));
        }
        let relative = held_relative(window, previous)?;
        Ok(drift(previous.view(), relative.view()))
    }
}

/// 事後表現最好的單一資產
#[derive(Debug, Clone)]
pub struct BestAsset {
    asset_index: usize,
}

impl BestAsset {
    pub fn new(asset_index: usize) -> Self {
        Self { asset_index }
    }

    /// 在時間索引 `[from, to]` 之間收盤價漲幅最大的資產
    pub fn in_hindsight(tensor: &FeatureTensor, from: usize, to: usize) -> Result<Self, PolicyError> {
        let close = tensor.close();
        if to >= tensor.num_periods() || from > to {
            return Err(PolicyError::Failed(format!(
                "無效的事後區間 [{}, {}]，共 {} 個週期",
                from,
                to,
                tensor.num_periods()
            )));
        }

        let growth = &close.column(to) / &close.column(from);
        let best = growth
            .iter()
            .enumerate()
            .filter(|(_, g)| g.is_finite())
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .ok_or_else(|| PolicyError::Failed("沒有可比較的資產".to_string()))?;

        Ok(Self::new(best))
    }

    pub fn asset_index(&self) -> usize {
        self.asset_index
    }
}

impl Policy for BestAsset {
    fn name(&self) -> &str {
        "best"
    }

    fn boxed_clone(&self) -> Box<dyn Policy> {
        Box::new(self.clone())
    }

    fn decide(&mut self, window: &Window, previous: &Array1<f64>) -> Result<Array1<f64>, PolicyError> {
        let assets = window.x.dim().1;
        let cash = has_cash_column(window, previous);
        check_len(previous, assets + usize::from(cash))?;
        if self.asset_index >= assets {
            return Err(PolicyError::Failed(format!(
                "資產索引 {} 超出 {} 個資產",
                self.asset_index, assets
            )));
        }

        let mut weights = Array1::zeros(previous.len());
        weights[self.asset_index + usize::from(cash)] = 1.0;
        Ok(weights)
    }
}

/// 指數梯度組合
///
/// `w[t] ∝ w'[t-1] · exp(η · r / (w'[t-1] · r))`，`r` 為上一期的收盤價比，
/// `w'` 為漂移後的上一期權重。
#[derive(Debug, Clone)]
pub struct ExponentialGradient {
    learning_rate: f64,
}

impl ExponentialGradient {
    pub const DEFAULT_LEARNING_RATE: f64 = 0.05;

    pub fn new(learning_rate: f64) -> Self {
        Self { learning_rate }
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }
}

impl Default for ExponentialGradient {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LEARNING_RATE)
    }
}

impl Policy for ExponentialGradient {
    fn name(&self) -> &str {
        "eg"
    }

    fn boxed_clone(&self) -> Box<dyn Policy> {
        Box::new(self.clone())
    }

    fn decide(&mut self, window: &Window, previous: &Array1<f64>) -> Result<Array1<f64>, PolicyError> {
        let cash = has_cash_column(window, previous);
        check_len(previous, window.x.dim().1 + usize::from(cash))?;

        let relative = held_relative(window, previous)?;
        let drifted = drift(previous.view(), relative.view());
        let growth = drifted.dot(&relative);
        if !growth.is_finite() || growth <= 0.0 {
            return Err(PolicyError::Failed(format!("組合收益無效: {}", growth)));
        }

        let scaled = &drifted * &relative.mapv(|r| (self.learning_rate * r / growth).exp());
        let total = scaled.sum();
        Ok(scaled / total)
    }
}

/// 依名稱建立基準策略，`best` 需要張量與測試區間
pub fn benchmark(
    name: &str,
    tensor: &FeatureTensor,
    hindsight: (usize, usize),
) -> Result<Box<dyn Policy>, PolicyError> {
    match name.to_lowercase().as_str() {
        "ucrp" => Ok(Box::new(UniformConstantRebalanced)),
        "ubah" => Ok(Box::new(UniformBuyAndHold::default())),
        "best" => Ok(Box::new(BestAsset::in_hindsight(tensor, hindsight.0, hindsight.1)?)),
        "eg" => Ok(Box::new(ExponentialGradient::default())),
        other => Err(PolicyError::Failed(format!("未知的策略: {}", other))),
    }
}
