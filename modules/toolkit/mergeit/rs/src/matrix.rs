use derive_getters::{Dissolve, Getters};
use eyre::{ensure, Result};
use metabit_io_rs::tsv::{self, TsvRecord};

/// Value that can be stored in a merged matrix cell.
pub trait Cell: Clone + PartialEq + Send + Sync {
    fn format(&self) -> String;
}

impl Cell for f64 {
    fn format(&self) -> String {
        tsv::float(*self)
    }
}

impl Cell for u32 {
    fn format(&self) -> String {
        self.to_string()
    }
}

impl Cell for bool {
    fn format(&self) -> String {
        match self {
            true => "1".to_string(),
            false => "0".to_string(),
        }
    }
}

/// Row of a merged matrix: label columns followed by one cell per sample.
#[derive(Clone, PartialEq, Debug, Getters, Dissolve)]
pub struct Row<T> {
    labels: Vec<String>,
    cells: Vec<Option<T>>,
}

impl<T: Cell> TsvRecord for Row<T> {
    fn fields(&self) -> Vec<String> {
        let cells = self.cells.iter().map(|x| match x {
            Some(value) => value.format(),
            None => tsv::NA.to_string(),
        });
        self.labels.iter().cloned().chain(cells).collect()
    }
}

/// Samples-as-columns matrix. Samples are referenced by their column index, a missing value is
/// an explicit `None`, never a zero.
#[derive(Clone, PartialEq, Debug, Getters, Dissolve)]
pub struct Matrix<T> {
    index: Vec<String>,
    samples: Vec<String>,
    rows: Vec<Row<T>>,
}

impl<T: Cell> Matrix<T> {
    pub fn new(index: &[&str], samples: Vec<String>) -> Self {
        Self {
            index: index.iter().map(|x| x.to_string()).collect(),
            samples,
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, labels: Vec<String>, cells: Vec<Option<T>>) -> Result<()> {
        ensure!(
            labels.len() == self.index.len() && cells.len() == self.samples.len(),
            "Matrix row has {} labels and {} cells, expected {} and {}",
            labels.len(),
            cells.len(),
            self.index.len(),
            self.samples.len()
        );
        self.rows.push(Row { labels, cells });
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn header(&self) -> Vec<String> {
        self.index.iter().chain(&self.samples).cloned().collect()
    }

    pub fn column(&self, sample: &str) -> Option<usize> {
        self.samples.iter().position(|x| x == sample)
    }

    pub fn row(&self, labels: &[&str]) -> Option<&Row<T>> {
        self.rows
            .iter()
            .find(|x| x.labels.iter().map(|x| x.as_str()).eq(labels.iter().copied()))
    }

    /// Cell of the row with the given labels in the given sample column.
    pub fn get(&self, labels: &[&str], sample: &str) -> Option<&T> {
        let column = self.column(sample)?;
        self.row(labels)?.cells[column].as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix() -> Result<()> {
        let mut matrix = Matrix::new(&["gene_id"], vec!["s1".into(), "s2".into()]);
        matrix.push(vec!["g1".into()], vec![Some(1.5), None])?;
        matrix.push(vec!["g2".into()], vec![Some(0.0), Some(2.0)])?;
        assert!(matrix.push(vec!["g3".into()], vec![Some(1.0)]).is_err());

        assert_eq!(matrix.header(), vec!["gene_id", "s1", "s2"]);
        assert_eq!(matrix.get(&["g1"], "s1"), Some(&1.5));
        assert_eq!(matrix.get(&["g1"], "s2"), None);
        assert_eq!(matrix.get(&["g2"], "s1"), Some(&0.0));
        assert_eq!(matrix.get(&["g3"], "s1"), None);

        assert_eq!(matrix.rows()[0].fields(), vec!["g1", "1.500000", "NA"]);
        Ok(())
    }

    #[test]
    fn test_presence_cells() {
        let row = Row {
            labels: vec!["g1".to_string()],
            cells: vec![Some(true), Some(false), None],
        };
        assert_eq!(row.fields(), vec!["g1", "1", "0", "NA"]);
    }
}
