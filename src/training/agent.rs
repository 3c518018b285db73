use ndarray::{Array1, Array2};

use crate::backtest::policy::{benchmark, Policy};
use crate::error::PolicyError;
use crate::market_data::{Batch, FeatureTensor, Window};

/// 可訓練的決策代理
///
/// 內部的學習算法對管線不透明：每批訓練返回該批的新權重，由調用者寫回 PVM。
pub trait Agent: Policy {
    /// 以一批樣本訓練，返回每行的新權重
    fn train_batch(&mut self, batch: &Batch) -> Result<Array2<f64>, PolicyError>;

    /// 保存當前的代理狀態，供快照模式在訓練結束後還原表現最好的版本
    fn snapshot(&self) -> Box<dyn Agent>;

    /// 對一批樣本逐行決策，不更新內部狀態以外的任何東西
    fn decide_batch(&mut self, batch: &Batch) -> Result<Array2<f64>, PolicyError> {
        let mut weights = Array2::zeros(batch.previous_w.dim());
        for (b, &index) in batch.indices.iter().enumerate() {
            let window = Window {
                index,
                x: batch.x.index_axis(ndarray::Axis(0), b).to_owned(),
                y: batch.y.row(b).to_owned(),
                previous_w: batch.previous_w.row(b).to_owned(),
            };
            let decided = self.decide(&window, &window.previous_w)?;
            if decided.len() != weights.ncols() {
                return Err(PolicyError::ShapeMismatch {
                    expected: weights.ncols(),
                    actual: decided.len(),
                });
            }
            weights.row_mut(b).assign(&decided);
        }
        Ok(weights)
    }
}

/// 不學習的代理，訓練時直接返回策略的決策
pub struct StaticAgent {
    policy: Box<dyn Policy>,
}

impl StaticAgent {
    pub fn new(policy: Box<dyn Policy>) -> Self {
        Self { policy }
    }
}

impl Policy for StaticAgent {
    fn name(&self) -> &str {
        self.policy.name()
    }

    fn decide(&mut self, window: &Window, previous: &Array1<f64>) -> Result<Array1<f64>, PolicyError> {
        self.policy.decide(window, previous)
    }

    fn boxed_clone(&self) -> Box<dyn Policy> {
        Box::new(StaticAgent::new(self.policy.boxed_clone()))
    }
}

impl Agent for StaticAgent {
    fn train_batch(&mut self, batch: &Batch) -> Result<Array2<f64>, PolicyError> {
        self.decide_batch(batch)
    }

    fn snapshot(&self) -> Box<dyn Agent> {
        Box::new(StaticAgent::new(self.policy.boxed_clone()))
    }
}

/// 依配置中的代理名稱建立代理
pub fn agent_from_name(
    name: &str,
    tensor: &FeatureTensor,
    hindsight: (usize, usize),
) -> Result<Box<dyn Agent>, PolicyError> {
    Ok(Box::new(StaticAgent::new(benchmark(name, tensor, hindsight)?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::{UniformBuyAndHold, UniformConstantRebalanced};
    use ndarray::{array, Array3, Array4};

    #[test]
    fn test_decide_batch_rows() {
        let batch = Batch {
            indices: vec![3, 4],
            x: Array4::ones((2, 1, 2, 3)),
            y: Array2::ones((2, 3)),
            previous_w: Array2::from_elem((2, 3), 1.0 / 3.0),
        };
        let mut agent = StaticAgent::new(Box::new(UniformConstantRebalanced));
        let weights = agent.train_batch(&batch).unwrap();
        assert_eq!(weights, array![[0.0, 0.5, 0.5], [0.0, 0.5, 0.5]]);
        assert_eq!(agent.name(), "ucrp");
    }

    #[test]
    fn test_snapshot_keeps_policy_state() {
        let window = Window {
            index: 0,
            x: Array3::ones((1, 2, 3)),
            y: array![1.0, 1.0, 1.0],
            previous_w: array![1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0],
        };
        let mut agent = StaticAgent::new(Box::new(UniformBuyAndHold::default()));
        agent.decide(&window, &window.previous_w).unwrap();

        // 已開始持有的快照不會再次等權買入
        let mut restored = agent.snapshot();
        let held = array![0.2, 0.3, 0.5];
        assert_eq!(restored.decide(&window, &held).unwrap(), held);
        assert_eq!(restored.name(), "ubah");
    }
}
