pub(crate) mod matrices;
pub(crate) mod types;
