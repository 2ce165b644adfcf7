use burn::data::dataset::Dataset;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use super::{ClassificationItem, RunDataset};
use crate::error::MlError;

/// Randomly generated 2-D points grouped in `nb_classes` gaussian blobs.
///
/// Class `c` is centred at `(2c, 2c)` with a unit standard deviation, so
/// neighbouring classes overlap a little and the task is not trivial.
#[derive(Debug, Clone)]
pub struct MockClassificationDataset {
    items: Vec<ClassificationItem>,
    nb_classes: usize,
}

impl MockClassificationDataset {
    pub const FEATURE_SIZE: usize = 2;

    pub fn generate<R: Rng + ?Sized>(
        nb_classes: usize,
        points_per_class: usize,
        rng: &mut R,
    ) -> Result<Self, MlError> {
        if nb_classes == 0 {
            return Err(MlError::dataset("mock dataset needs at least one class"));
        }

        let mut items = Vec::with_capacity(nb_classes * points_per_class);
        for class in 0..nb_classes {
            let center = (class * 2) as f32;
            let normal = Normal::new(center, 1.0_f32)
                .map_err(|e| MlError::dataset(format!("invalid distribution: {e}")))?;
            for _ in 0..points_per_class {
                let features = (0..Self::FEATURE_SIZE).map(|_| normal.sample(rng)).collect();
                items.push(ClassificationItem {
                    features,
                    label: class,
                });
            }
        }

        tracing::debug!(
            "Mock dataset generated: {} classes, {} points per class",
            nb_classes,
            points_per_class
        );
        Ok(Self { items, nb_classes })
    }
}

impl Dataset<ClassificationItem> for MockClassificationDataset {
    fn get(&self, index: usize) -> Option<ClassificationItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

impl RunDataset for MockClassificationDataset {
    fn class_names(&self) -> Vec<String> {
        (0..self.nb_classes).map(|c| format!("class {c}")).collect()
    }

    fn feature_size(&self) -> usize {
        Self::FEATURE_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_generate_sizes_and_labels() {
        let mut rng = StdRng::seed_from_u64(7);
        let dataset = MockClassificationDataset::generate(3, 10, &mut rng).unwrap();

        assert_eq!(dataset.len(), 30);
        assert_eq!(dataset.nb_classes(), 3);
        assert_eq!(dataset.feature_size(), 2);
        assert_eq!(dataset.get(0).unwrap().label, 0);
        assert_eq!(dataset.get(29).unwrap().label, 2);
        assert!(dataset.get(30).is_none());
    }

    #[test]
    fn test_class_centers() {
        let mut rng = StdRng::seed_from_u64(42);
        let dataset = MockClassificationDataset::generate(2, 500, &mut rng).unwrap();

        for class in 0..2 {
            let points: Vec<_> = (0..dataset.len())
                .filter_map(|i| dataset.get(i))
                .filter(|item| item.label == class)
                .collect();
            let mean_x =
                points.iter().map(|p| p.features[0] as f64).sum::<f64>() / points.len() as f64;
            assert!((mean_x - (class * 2) as f64).abs() < 0.2, "class {class} mean {mean_x}");
        }
    }

    #[test]
    fn test_same_seed_same_points() {
        let a = MockClassificationDataset::generate(2, 5, &mut StdRng::seed_from_u64(1)).unwrap();
        let b = MockClassificationDataset::generate(2, 5, &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(a.get(3), b.get(3));
    }

    #[test]
    fn test_zero_classes_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(MockClassificationDataset::generate(0, 5, &mut rng).is_err());
    }
}
