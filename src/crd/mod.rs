mod xtradb_cluster;

pub use xtradb_cluster::*;
