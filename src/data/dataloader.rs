use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Result};
use burn::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::data::dataset::{ImageDataset, ImageSpec};

/// How batches are produced: inline on the caller's thread, or prefetched by workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderOptions {
    pub num_workers: usize,
    /// Batches each worker may run ahead of the consumer.
    pub prefetch: usize,
}

impl LoaderOptions {
    pub const INLINE: LoaderOptions = LoaderOptions {
        num_workers: 0,
        prefetch: 0,
    };

    /// One prefetch worker when training on an accelerator, inline loading otherwise.
    pub fn detect() -> Self {
        if crate::backend::accelerator_available() {
            Self {
                num_workers: 1,
                prefetch: 2,
            }
        } else {
            Self::INLINE
        }
    }
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self::INLINE
    }
}

/// Images `[N, C, H, W]` and class indices `[N]` on the training device.
#[derive(Debug, Clone)]
pub struct ClassBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> ClassBatch<B> {
    pub fn len(&self) -> usize {
        self.targets.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Host-side batch, assembled before tensors are created on the device.
struct RawBatch {
    images: Vec<f32>,
    labels: Vec<i64>,
}

impl RawBatch {
    fn collate(dataset: &dyn ImageDataset, indices: &[usize], spec: ImageSpec) -> Result<Self> {
        let mut images = Vec::with_capacity(indices.len() * spec.numel());
        let mut labels = Vec::with_capacity(indices.len());
        for &idx in indices {
            let sample = dataset.get(idx)?;
            if sample.image.len() != spec.numel() {
                return Err(anyhow!(
                    "sample {} of {} has {} values, expected {}",
                    idx,
                    dataset.name(),
                    sample.image.len(),
                    spec.numel()
                ));
            }
            images.extend(sample.image);
            labels.push(sample.label as i64);
        }
        Ok(Self { images, labels })
    }

    fn into_batch<B: Backend>(self, spec: ImageSpec, device: &B::Device) -> ClassBatch<B> {
        let n = self.labels.len();
        let images = Tensor::<B, 4>::from_data(
            TensorData::new(
                self.images,
                [n, spec.num_channels, spec.image_size, spec.image_size],
            ),
            device,
        );
        let targets = Tensor::<B, 1, Int>::from_data(TensorData::new(self.labels, [n]), device);
        ClassBatch { images, targets }
    }
}

/// Batches a dataset into [`ClassBatch`]es, reshuffling on every pass when `shuffle` is set.
pub struct ClassifierDataLoader<B: Backend> {
    dataset: Arc<dyn ImageDataset>,
    batch_size: usize,
    shuffle: bool,
    spec: ImageSpec,
    options: LoaderOptions,
    device: B::Device,
    rng: StdRng,
}

impl<B: Backend> ClassifierDataLoader<B> {
    pub fn new(
        dataset: Arc<dyn ImageDataset>,
        spec: ImageSpec,
        batch_size: usize,
        shuffle: bool,
        seed: u64,
        device: B::Device,
    ) -> Self {
        Self {
            dataset,
            batch_size: batch_size.max(1),
            shuffle,
            spec,
            options: LoaderOptions::INLINE,
            device,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn with_options(mut self, options: LoaderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn dataset(&self) -> &dyn ImageDataset {
        self.dataset.as_ref()
    }

    /// Number of samples in the underlying dataset.
    pub fn dataset_len(&self) -> usize {
        self.dataset.len()
    }

    /// Number of batches per pass; the last one may be short.
    pub fn len(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn spec(&self) -> ImageSpec {
        self.spec
    }

    /// Starts one pass over the dataset.
    pub fn iter(&mut self) -> BatchIter<B> {
        let mut indices: Vec<usize> = (0..self.dataset.len()).collect();
        if self.shuffle {
            indices.shuffle(&mut self.rng);
        }
        let chunks: Vec<Vec<usize>> = indices
            .chunks(self.batch_size)
            .map(<[usize]>::to_vec)
            .collect();
        let num_batches = chunks.len();

        let source = if self.options.num_workers == 0 {
            BatchSource::Inline {
                dataset: Arc::clone(&self.dataset),
                chunks,
            }
        } else {
            spawn_workers(
                Arc::clone(&self.dataset),
                chunks,
                self.spec,
                self.options,
            )
        };

        BatchIter {
            source,
            next: 0,
            num_batches,
            spec: self.spec,
            device: self.device.clone(),
        }
    }
}

enum BatchSource {
    Inline {
        dataset: Arc<dyn ImageDataset>,
        chunks: Vec<Vec<usize>>,
    },
    /// Batch `i` comes from worker `i % receivers.len()`, which keeps the order stable.
    Prefetch {
        receivers: Vec<Receiver<Result<RawBatch>>>,
        workers: Vec<JoinHandle<()>>,
    },
}

fn spawn_workers(
    dataset: Arc<dyn ImageDataset>,
    chunks: Vec<Vec<usize>>,
    spec: ImageSpec,
    options: LoaderOptions,
) -> BatchSource {
    let num_workers = options.num_workers;
    let chunks = Arc::new(chunks);
    let mut receivers = Vec::with_capacity(num_workers);
    let mut workers = Vec::with_capacity(num_workers);

    for worker in 0..num_workers {
        let (tx, rx) = mpsc::sync_channel(options.prefetch.max(1));
        let dataset = Arc::clone(&dataset);
        let chunks = Arc::clone(&chunks);
        workers.push(thread::spawn(move || {
            for indices in chunks.iter().skip(worker).step_by(num_workers) {
                let batch = RawBatch::collate(dataset.as_ref(), indices, spec);
                let failed = batch.is_err();
                if tx.send(batch).is_err() || failed {
                    break;
                }
            }
        }));
        receivers.push(rx);
    }

    BatchSource::Prefetch { receivers, workers }
}

/// One pass over a [`ClassifierDataLoader`].
pub struct BatchIter<B: Backend> {
    source: BatchSource,
    next: usize,
    num_batches: usize,
    spec: ImageSpec,
    device: B::Device,
}

impl<B: Backend> Iterator for BatchIter<B> {
    type Item = Result<ClassBatch<B>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.num_batches {
            return None;
        }
        let idx = self.next;
        self.next += 1;

        let raw = match &self.source {
            BatchSource::Inline { dataset, chunks } => {
                RawBatch::collate(dataset.as_ref(), &chunks[idx], self.spec)
            }
            BatchSource::Prefetch { receivers, .. } => receivers[idx % receivers.len()]
                .recv()
                .map_err(|_| anyhow!("loader worker stopped before batch {}", idx))
                .and_then(|batch| batch),
        };

        Some(raw.map(|raw| raw.into_batch(self.spec, &self.device)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.num_batches - self.next;
        (remaining, Some(remaining))
    }
}

impl<B: Backend> Drop for BatchIter<B> {
    fn drop(&mut self) {
        if let BatchSource::Prefetch { receivers, workers } = &mut self.source {
            // Closing the channels unblocks workers waiting on a full buffer.
            receivers.clear();
            for handle in workers.drain(..) {
                if handle.join().is_err() {
                    log::warn!("loader worker panicked");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::Sample;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    /// Sample `i` is a constant image of value `i` with label `i % 3`.
    struct Counting {
        len: usize,
        spec: ImageSpec,
        fail_at: Option<usize>,
    }

    impl ImageDataset for Counting {
        fn len(&self) -> usize {
            self.len
        }

        fn get(&self, index: usize) -> Result<Sample> {
            if Some(index) == self.fail_at {
                return Err(anyhow!("broken sample {index}"));
            }
            Ok(Sample {
                image: vec![index as f32; self.spec.numel()],
                label: index % 3,
            })
        }

        fn num_classes(&self) -> usize {
            3
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    fn loader(len: usize, batch: usize, shuffle: bool) -> ClassifierDataLoader<TestBackend> {
        let spec = ImageSpec::new(1, 2);
        let ds = Arc::new(Counting {
            len,
            spec,
            fail_at: None,
        });
        ClassifierDataLoader::new(ds, spec, batch, shuffle, 42, Default::default())
    }

    fn first_pixels(batch: &ClassBatch<TestBackend>) -> Vec<f32> {
        let n = batch.len();
        batch
            .images
            .clone()
            .reshape([n, 4])
            .slice([0..n, 0..1])
            .reshape([n])
            .into_data()
            .to_vec::<f32>()
            .unwrap()
    }

    #[test]
    fn last_batch_is_short() {
        let mut loader = loader(10, 4, false);
        assert_eq!(loader.len(), 3);
        assert_eq!(loader.dataset_len(), 10);

        let sizes: Vec<usize> = loader.iter().map(|b| b.unwrap().len()).collect();

        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[test]
    fn sequential_loader_keeps_order_and_shapes() {
        let mut loader = loader(5, 2, false);

        let batches: Vec<_> = loader.iter().map(|b| b.unwrap()).collect();

        assert_eq!(batches[0].images.dims(), [2, 1, 2, 2]);
        assert_eq!(first_pixels(&batches[0]), vec![0.0, 1.0]);
        assert_eq!(first_pixels(&batches[2]), vec![4.0]);
        let labels = batches[1].targets.clone().into_data().to_vec::<i64>().unwrap();
        assert_eq!(labels, vec![2, 0]);
    }

    #[test]
    fn shuffled_pass_visits_every_sample_once() {
        let mut loader = loader(9, 4, true);

        let mut seen: Vec<f32> = loader
            .iter()
            .flat_map(|b| first_pixels(&b.unwrap()))
            .collect();
        seen.sort_by(|a, b| a.partial_cmp(b).unwrap());

        assert_eq!(seen, (0..9).map(|i| i as f32).collect::<Vec<_>>());
    }

    #[test]
    fn same_seed_same_shuffle() {
        let mut a = loader(16, 4, true);
        let mut b = loader(16, 4, true);

        let order_a: Vec<f32> = a.iter().flat_map(|x| first_pixels(&x.unwrap())).collect();
        let order_b: Vec<f32> = b.iter().flat_map(|x| first_pixels(&x.unwrap())).collect();

        assert_eq!(order_a, order_b);
    }

    #[test]
    fn workers_preserve_batch_order() {
        let mut inline = loader(11, 3, true);
        let mut prefetch = loader(11, 3, true).with_options(LoaderOptions {
            num_workers: 2,
            prefetch: 1,
        });

        let expected: Vec<f32> = inline.iter().flat_map(|x| first_pixels(&x.unwrap())).collect();
        let actual: Vec<f32> = prefetch
            .iter()
            .flat_map(|x| first_pixels(&x.unwrap()))
            .collect();

        assert_eq!(actual, expected);
    }

    #[test]
    fn dropping_a_prefetching_pass_early_joins_workers() {
        let mut loader = loader(64, 2, false).with_options(LoaderOptions {
            num_workers: 1,
            prefetch: 1,
        });

        let mut iter = loader.iter();
        assert!(iter.next().unwrap().is_ok());
        drop(iter);

        assert_eq!(loader.iter().count(), 32);
    }

    #[test]
    fn sample_errors_surface_from_workers() {
        let spec = ImageSpec::new(1, 2);
        let ds = Arc::new(Counting {
            len: 6,
            spec,
            fail_at: Some(3),
        });
        let mut loader =
            ClassifierDataLoader::<TestBackend>::new(ds, spec, 2, false, 0, Default::default())
                .with_options(LoaderOptions {
                    num_workers: 1,
                    prefetch: 2,
                });

        let results: Vec<_> = loader.iter().collect();

        assert!(results[0].is_ok());
        let err = results[1].as_ref().unwrap_err().to_string();
        assert!(err.contains("broken sample 3"));
    }
}
