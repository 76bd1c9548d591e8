pub mod event;
pub mod lease;
pub mod sweep;
pub mod transfer;

#[cfg(test)]
pub(crate) mod test_support;
