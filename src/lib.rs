pub mod catalog;
pub mod config;
pub mod math;
pub mod models;
pub mod pricing;
pub mod router;
pub mod sync;
pub mod utils;
pub mod venue;

#[cfg(test)]
mod test_helpers;
