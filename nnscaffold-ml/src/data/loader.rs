use rand::Rng;
use rand::seq::SliceRandom;

use super::RunDataset;
use crate::error::MlError;

/// A batch of items with features flattened row by row.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub features: Vec<f32>,
    pub feature_size: usize,
    pub labels: Vec<usize>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Splits a dataset into batches of `batch_size` items; the last batch may be smaller.
pub struct BatchLoader<'a> {
    dataset: &'a dyn RunDataset,
    batch_size: usize,
    order: Vec<usize>,
}

impl<'a> BatchLoader<'a> {
    /// Batches in dataset order.
    pub fn sequential(dataset: &'a dyn RunDataset, batch_size: usize) -> Self {
        Self {
            dataset,
            batch_size: batch_size.max(1),
            order: (0..dataset.len()).collect(),
        }
    }

    /// Batches in an order drawn from `rng`.
    pub fn shuffled<R: Rng + ?Sized>(
        dataset: &'a dyn RunDataset,
        batch_size: usize,
        rng: &mut R,
    ) -> Self {
        let mut loader = Self::sequential(dataset, batch_size);
        loader.order.shuffle(rng);
        loader
    }

    pub fn nb_batches(&self) -> usize {
        batch_count(self.order.len(), self.batch_size)
    }

    pub fn iter(&self) -> impl Iterator<Item = Result<Batch, MlError>> + '_ {
        self.order
            .chunks(self.batch_size)
            .map(|indices| self.collect_batch(indices))
    }

    fn collect_batch(&self, indices: &[usize]) -> Result<Batch, MlError> {
        let feature_size = self.dataset.feature_size();
        let mut features = Vec::with_capacity(indices.len() * feature_size);
        let mut labels = Vec::with_capacity(indices.len());

        for &index in indices {
            let item = self
                .dataset
                .get(index)
                .ok_or_else(|| MlError::dataset(format!("missing item at index {index}")))?;
            if item.features.len() != feature_size {
                return Err(MlError::dataset(format!(
                    "item {index} has {} features, expected {feature_size}",
                    item.features.len()
                )));
            }
            features.extend_from_slice(&item.features);
            labels.push(item.label);
        }

        Ok(Batch {
            features,
            feature_size,
            labels,
        })
    }
}

/// Number of batches needed to cover `len` items.
pub fn batch_count(len: usize, batch_size: usize) -> usize {
    len.div_ceil(batch_size.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MockClassificationDataset;
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn dataset() -> MockClassificationDataset {
        MockClassificationDataset::generate(2, 5, &mut StdRng::seed_from_u64(3)).unwrap()
    }

    #[test]
    fn test_sequential_batches() {
        let dataset = dataset();
        let loader = BatchLoader::sequential(&dataset, 4);
        assert_eq!(loader.nb_batches(), 3);

        let batches: Vec<Batch> = loader.iter().collect::<Result<_, _>>().unwrap();
        let sizes: Vec<usize> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        assert_eq!(batches[0].features.len(), 8);
        assert_eq!(batches[0].labels, vec![0, 0, 0, 0]);
        assert_eq!(batches[2].labels, vec![1, 1]);
    }

    #[test]
    fn test_shuffled_batches_cover_every_item() {
        let dataset = dataset();
        let mut rng = StdRng::seed_from_u64(11);
        let loader = BatchLoader::shuffled(&dataset, 3, &mut rng);

        let mut labels: Vec<usize> = loader
            .iter()
            .flat_map(|b| b.unwrap().labels)
            .collect();
        labels.sort();
        assert_eq!(labels, vec![0, 0, 0, 0, 0, 1, 1, 1, 1, 1]);
    }

    #[test]
    fn test_shuffle_is_seeded() {
        let dataset = dataset();
        let first: Vec<Batch> = BatchLoader::shuffled(&dataset, 2, &mut StdRng::seed_from_u64(5))
            .iter()
            .collect::<Result<_, _>>()
            .unwrap();
        let second: Vec<Batch> = BatchLoader::shuffled(&dataset, 2, &mut StdRng::seed_from_u64(5))
            .iter()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_batch_count() {
        assert_eq!(batch_count(0, 4), 0);
        assert_eq!(batch_count(8, 4), 2);
        assert_eq!(batch_count(9, 4), 3);
        assert_eq!(batch_count(3, 0), 3);
    }
}
