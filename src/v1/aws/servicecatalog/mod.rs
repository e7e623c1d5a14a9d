pub mod account;
pub mod api;

#[cfg(test)]
pub(crate) mod fake;
