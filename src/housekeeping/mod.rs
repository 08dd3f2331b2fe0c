pub mod worker;

pub use worker::{prune_once, run_prune_loop};
