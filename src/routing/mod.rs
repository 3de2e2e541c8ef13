//! Route generation and scoring

pub mod generator;
pub mod scorer;

pub use generator::RouteGenerator;
