mod apply_tests;
mod common;
