pub mod batch;
pub mod error;
pub mod execute;
pub mod pipeline;
pub mod probe;
pub mod text;
pub mod tracker;

#[cfg(test)]
mod testutil;
