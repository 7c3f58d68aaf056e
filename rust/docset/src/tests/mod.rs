mod planner_tests;
mod ref_count_tests;
mod sparse_tests;
