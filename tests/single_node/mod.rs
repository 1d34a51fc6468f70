mod single_node_test;
