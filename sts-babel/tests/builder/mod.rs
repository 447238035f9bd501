mod determinism;
mod partitions;
