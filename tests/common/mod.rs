#![allow(dead_code)]

pub use crondag_test_utils::{init_tracing, with_timeout};
