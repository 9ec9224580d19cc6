pub mod aws;
pub mod grid;
