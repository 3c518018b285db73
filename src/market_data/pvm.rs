use ndarray::{Array1, Array2, ArrayView1};

use crate::error::WindowError;

/// 組合權重記憶（PVM）
///
/// 每個時間索引一行，每個資產一欄，建模現金時第 0 欄為現金。初始為均勻權重，
/// 之後由決策結果覆蓋。第 `i` 行只在第 `i - 1` 行被讀取之後寫入。
#[derive(Debug, Clone)]
pub struct PortfolioVectorMemory {
    weights: Array2<f64>,
    include_cash: bool,
}

impl PortfolioVectorMemory {
    pub fn new(num_periods: usize, num_assets: usize, include_cash: bool) -> Self {
        let columns = num_assets + usize::from(include_cash);
        let uniform = if columns == 0 { 0.0 } else { 1.0 / columns as f64 };
        Self {
            weights: Array2::from_elem((num_periods, columns), uniform),
            include_cash,
        }
    }

    pub fn include_cash(&self) -> bool {
        self.include_cash
    }

    pub fn num_rows(&self) -> usize {
        self.weights.nrows()
    }

    pub fn num_columns(&self) -> usize {
        self.weights.ncols()
    }

    /// 初始均勻權重
    pub fn initial(&self) -> Array1<f64> {
        let columns = self.num_columns();
        Array1::from_elem(columns, 1.0 / columns as f64)
    }

    pub fn row(&self, index: usize) -> Option<ArrayView1<'_, f64>> {
        (index < self.num_rows()).then(|| self.weights.row(index))
    }

    /// 狀態索引 `index` 的上一期權重，索引 0 使用初始權重
    pub fn previous(&self, index: usize) -> Result<Array1<f64>, WindowError> {
        if index == 0 {
            return Ok(self.initial());
        }
        self.row(index - 1)
            .map(|row| row.to_owned())
            .ok_or(WindowError::OutOfBounds {
                index,
                window_size: 0,
                num_periods: self.num_rows(),
            })
    }

    /// 批量讀取上一期權重，每個索引一行
    pub fn previous_rows(&self, indices: &[usize]) -> Result<Array2<f64>, WindowError> {
        let mut rows = Array2::zeros((indices.len(), self.num_columns()));
        for (r, &index) in indices.iter().enumerate() {
            rows.row_mut(r).assign(&self.previous(index)?);
        }
        Ok(rows)
    }

    pub fn set_row(&mut self, index: usize, weights: ArrayView1<'_, f64>) -> Result<(), WindowError> {
        if weights.len() != self.num_columns() {
            return Err(WindowError::WeightShape {
                expected: (1, self.num_columns()),
                actual: (1, weights.len()),
            });
        }
        if index >= self.num_rows() {
            return Err(WindowError::OutOfBounds {
                index,
                window_size: 0,
                num_periods: self.num_rows(),
            });
        }
        self.weights.row_mut(index).assign(&weights);
        Ok(())
    }

    /// 批量寫入，`weights` 的第 `r` 行寫到 `indices[r]`
    pub fn set_rows(&mut self, indices: &[usize], weights: &Array2<f64>) -> Result<(), WindowError> {
        let expected = (indices.len(), self.num_columns());
        if weights.dim() != expected {
            return Err(WindowError::WeightShape {
                expected,
                actual: weights.dim(),
            });
        }
        for (r, &index) in indices.iter().enumerate() {
            self.set_row(index, weights.row(r))?;
        }
        Ok(())
    }

    pub fn as_array(&self) -> &Array2<f64> {
        &self.weights
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use ndarray::array;

    #[test]
    fn test_uniform_initialisation() {
        let pvm = PortfolioVectorMemory::new(10, 3, true);
        assert_eq!(pvm.num_columns(), 4);
        assert!(pvm.as_array().iter().all(|w| (*w - 0.25).abs() < 1e-12));

        let pvm = PortfolioVectorMemory::new(10, 3, false);
        assert_eq!(pvm.num_columns(), 3);
        assert_eq!(pvm.initial().sum(), 1.0);
    }

    #[test]
    fn test_previous_reads_preceding_row() {
        let mut pvm = PortfolioVectorMemory::new(5, 1, true);
        pvm.set_row(2, array![0.9, 0.1].view()).unwrap();

        assert_eq!(pvm.previous(3).unwrap(), array![0.9, 0.1]);
        assert_eq!(pvm.previous(0).unwrap(), array![0.5, 0.5]);
        assert_matches!(pvm.previous(6), Err(WindowError::OutOfBounds { .. }));
    }

    #[test]
    fn test_set_rows_checks_shape() {
        let mut pvm = PortfolioVectorMemory::new(5, 2, false);
        let weights = array![[1.0, 0.0], [0.0, 1.0]];
        pvm.set_rows(&[1, 3], &weights).unwrap();
        assert_eq!(pvm.row(3).unwrap(), array![0.0, 1.0].view());

        let bad = array![[1.0, 0.0, 0.0]];
        assert_matches!(pvm.set_rows(&[1], &bad), Err(WindowError::WeightShape { .. }));
    }
}
