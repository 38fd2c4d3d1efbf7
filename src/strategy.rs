//! Data-parallel execution strategies
//!
//! A strategy shards its inputs along the leading batch dimension, executes a
//! function once per shard (one shard per replica) and hands back the results
//! in replica order. `run` only returns when every replica has finished.

use candle_core::Tensor;
use rayon::prelude::*;
use tracing::debug;

use crate::error::{Error, Result};

/// Results of a function executed on every replica
#[derive(Debug, Clone)]
pub struct PerReplica<T> {
    values: Vec<T>,
}

impl<T> PerReplica<T> {
    /// Wrap replica results, first replica first
    pub fn new(values: Vec<T>) -> Self {
        Self { values }
    }

    /// Results in replica order
    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Consume into the underlying results
    pub fn into_values(self) -> Vec<T> {
        self.values
    }

    /// Number of replicas that produced a result
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no replica produced a result
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Capability interface over single-device and multi-replica execution
pub trait Strategy: Send + Sync {
    /// Number of replicas inputs are split across
    fn num_replicas(&self) -> usize;

    /// Execute `f` on each replica's shard of `inputs`
    fn run<T, F>(&self, inputs: &[&Tensor], f: F) -> Result<PerReplica<T>>
    where
        T: Send,
        F: Fn(&[Tensor]) -> Result<T> + Sync;
}

/// Runs everything on the calling thread with no sharding
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleReplica;

impl Strategy for SingleReplica {
    fn num_replicas(&self) -> usize {
        1
    }

    fn run<T, F>(&self, inputs: &[&Tensor], f: F) -> Result<PerReplica<T>>
    where
        T: Send,
        F: Fn(&[Tensor]) -> Result<T> + Sync,
    {
        let args: Vec<Tensor> = inputs.iter().map(|t| (*t).clone()).collect();
        Ok(PerReplica::new(vec![f(&args)?]))
    }
}

/// Replicates the computation across worker threads of the rayon pool
#[derive(Debug, Clone, Copy)]
pub struct MirroredStrategy {
    replicas: usize,
}

impl MirroredStrategy {
    /// Strategy with a fixed number of replicas
    pub fn new(replicas: usize) -> Result<Self> {
        if replicas == 0 {
            return Err(Error::config("MirroredStrategy needs at least one replica"));
        }
        Ok(Self { replicas })
    }

    /// One replica per available CPU
    pub fn from_available_parallelism() -> Self {
        Self {
            replicas: num_cpus::get().max(1),
        }
    }

    fn shard(&self, inputs: &[&Tensor]) -> Result<Vec<Vec<Tensor>>> {
        let batch = match inputs.first() {
            Some(first) => first.dim(0)?,
            None => return Ok(vec![Vec::new()]),
        };
        for input in inputs {
            if input.dim(0)? != batch {
                return Err(Error::invalid_input(format!(
                    "replicated inputs disagree on batch size: {} vs {}",
                    batch,
                    input.dim(0)?
                )));
            }
        }

        // Contiguous shards, earlier replicas take the remainder
        let replicas = self.replicas.min(batch.max(1));
        let base = batch / replicas;
        let extra = batch % replicas;
        let mut shards = Vec::with_capacity(replicas);
        let mut start = 0;
        for replica in 0..replicas {
            let len = base + usize::from(replica < extra);
            let shard = inputs
                .iter()
                .map(|t| t.narrow(0, start, len))
                .collect::<candle_core::Result<Vec<_>>>()?;
            shards.push(shard);
            start += len;
        }
        Ok(shards)
    }
}

impl Strategy for MirroredStrategy {
    fn num_replicas(&self) -> usize {
        self.replicas
    }

    fn run<T, F>(&self, inputs: &[&Tensor], f: F) -> Result<PerReplica<T>>
    where
        T: Send,
        F: Fn(&[Tensor]) -> Result<T> + Sync,
    {
        let shards = self.shard(inputs)?;
        debug!("Dispatching {} shards across {} replicas", shards.len(), self.replicas);
        let values = shards
            .par_iter()
            .map(|args| f(args))
            .collect::<Result<Vec<T>>>()?;
        Ok(PerReplica::new(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn test_single_replica_passes_inputs_through() {
        let x = Tensor::arange(0f32, 6f32, &Device::Cpu).unwrap().reshape((3, 2)).unwrap();
        let out = SingleReplica.run(&[&x], |args| Ok(args[0].dims().to_vec())).unwrap();
        assert_eq!(out.values(), &[vec![3, 2]]);
    }

    #[test]
    fn test_mirrored_shards_preserve_order() {
        let x = Tensor::arange(0f32, 10f32, &Device::Cpu).unwrap().reshape((5, 2)).unwrap();
        let strategy = MirroredStrategy::new(2).unwrap();
        let out = strategy
            .run(&[&x], |args| Ok(args[0].to_vec2::<f32>()?))
            .unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(out.values()[0].len(), 3);
        assert_eq!(out.values()[1].len(), 2);
        assert_eq!(out.values()[0][0], vec![0.0, 1.0]);
        assert_eq!(out.values()[1][1], vec![8.0, 9.0]);
    }

    #[test]
    fn test_mirrored_never_creates_empty_shards() {
        let x = Tensor::zeros((2, 3), candle_core::DType::F32, &Device::Cpu).unwrap();
        let strategy = MirroredStrategy::new(8).unwrap();
        let out = strategy.run(&[&x], |args| Ok(args[0].dim(0)?)).unwrap();
        assert_eq!(out.values(), &[1, 1]);
    }

    #[test]
    fn test_mirrored_rejects_mismatched_inputs() {
        let a = Tensor::zeros((4, 2), candle_core::DType::F32, &Device::Cpu).unwrap();
        let b = Tensor::zeros((3, 2), candle_core::DType::F32, &Device::Cpu).unwrap();
        let strategy = MirroredStrategy::new(2).unwrap();
        assert!(strategy.run(&[&a, &b], |_| Ok(())).is_err());
    }

    #[test]
    fn test_zero_replicas_is_a_config_error() {
        assert!(matches!(MirroredStrategy::new(0), Err(Error::Config(_))));
    }
}
