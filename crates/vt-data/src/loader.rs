use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, Receiver};

use crate::dataset::Split;

/// A contiguous batch of examples, flattened row-major.
#[derive(Debug, Clone)]
pub struct Batch {
    pub index: usize,
    pub rows: usize,
    pub pixel_values: Vec<f32>,
    pub labels: Vec<i64>,
}

/// Materializes batches from a split, optionally on background threads.
///
/// With workers, batch `i` is built by worker `i % workers` and sent over a
/// bounded channel; the iterator reorders arrivals so consumers always see
/// dataset order. With zero workers batches are built inline on `next()`.
#[derive(Debug, Clone, Copy)]
pub struct BatchLoader {
    batch_size: usize,
    num_workers: usize,
}

impl BatchLoader {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            num_workers: 0,
        }
    }

    pub fn with_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn num_batches(&self, split: &Split) -> usize {
        (split.len() + self.batch_size - 1) / self.batch_size
    }

    pub fn batches(&self, split: &Arc<Split>) -> BatchIter {
        let total = self.num_batches(split);
        if self.num_workers == 0 || total <= 1 {
            return BatchIter {
                total,
                next: 0,
                source: BatchSource::Inline {
                    split: Arc::clone(split),
                    batch_size: self.batch_size,
                },
            };
        }

        let workers = self.num_workers.min(total);
        let (tx, rx) = bounded(workers * 2);
        for worker in 0..workers {
            let tx = tx.clone();
            let split = Arc::clone(split);
            let batch_size = self.batch_size;
            thread::spawn(move || {
                let mut index = worker;
                while index < total {
                    let batch = materialize(&split, batch_size, index);
                    // Err means the consumer went away mid-epoch.
                    if tx.send(batch).is_err() {
                        break;
                    }
                    index += workers;
                }
            });
        }

        BatchIter {
            total,
            next: 0,
            source: BatchSource::Workers {
                rx,
                pending: BTreeMap::new(),
            },
        }
    }
}

fn materialize(split: &Split, batch_size: usize, index: usize) -> Batch {
    let start = index * batch_size;
    let end = (start + batch_size).min(split.len());
    let examples = &split.examples[start..end];

    let mut pixel_values = Vec::new();
    let mut labels = Vec::new();
    for example in examples {
        pixel_values.extend_from_slice(&example.pixel_values);
        labels.extend_from_slice(&example.labels);
    }

    Batch {
        index,
        rows: end - start,
        pixel_values,
        labels,
    }
}

enum BatchSource {
    Inline {
        split: Arc<Split>,
        batch_size: usize,
    },
    Workers {
        rx: Receiver<Batch>,
        pending: BTreeMap<usize, Batch>,
    },
}

/// In-order batch iterator returned by [`BatchLoader::batches`].
pub struct BatchIter {
    total: usize,
    next: usize,
    source: BatchSource,
}

impl BatchIter {
    pub fn total(&self) -> usize {
        self.total
    }
}

impl Iterator for BatchIter {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        if self.next >= self.total {
            return None;
        }
        let wanted = self.next;

        let batch = match &mut self.source {
            BatchSource::Inline { split, batch_size } => materialize(split, *batch_size, wanted),
            BatchSource::Workers { rx, pending } => loop {
                if let Some(batch) = pending.remove(&wanted) {
                    break batch;
                }
                match rx.recv() {
                    Ok(batch) if batch.index == wanted => break batch,
                    Ok(batch) => {
                        pending.insert(batch.index, batch);
                    }
                    // Workers gone without delivering: a worker panicked.
                    Err(_) => return None,
                }
            },
        };

        self.next += 1;
        Some(batch)
    }
}
