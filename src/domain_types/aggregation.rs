use serde::{Deserialize, Serialize};

/// 週期聚合操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregationOp {
    First, // 開盤價取第一個值
    Max,   // 最高價取最大值
    Min,   // 最低價取最小值
    Last,  // 收盤價取最後一個值
    Sum,   // 成交量累加
}

impl AggregationOp {
    /// 對按時間排序的值序列執行聚合，空序列返回 None
    pub fn apply<I>(&self, values: I) -> Option<f64>
    where
        I: IntoIterator<Item = f64>,
    {
        let mut iter = values.into_iter();
        let first = iter.next()?;
        let result = match self {
            AggregationOp::First => first,
            AggregationOp::Last => iter.last().unwrap_or(first),
            AggregationOp::Max => iter.fold(first, f64::max),
            AggregationOp::Min => iter.fold(first, f64::min),
            AggregationOp::Sum => iter.fold(first, |acc, v| acc + v),
        };
        Some(result)
    }
}

/// 向前再向後填補缺失值
///
/// 全部缺失時返回 None。
pub fn fill_both(values: &[Option<f64>]) -> Option<Vec<f64>> {
    let first_known = values.iter().flatten().next().copied()?;

    let mut last = first_known;
    Some(
        values
            .iter()
            .map(|value| {
                if let Some(v) = value {
                    last = *v;
                }
                last
            })
            .collect(),
    )
}
