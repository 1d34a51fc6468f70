mod failover_test;
mod join_cluster_test;
mod oversized_write_test;
