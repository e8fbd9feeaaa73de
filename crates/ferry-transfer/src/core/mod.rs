//! Pure computations shared by the transfer effects.

mod throughput;

pub use throughput::Throughput;
