pub mod config;
pub mod dashboard;
pub mod dataset;
pub mod fetch;
pub mod load;
pub mod query;

#[cfg(test)]
pub(crate) mod test_support;
