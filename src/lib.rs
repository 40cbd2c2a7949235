pub mod config;
pub mod converter;
pub mod error;
pub mod mapper;
pub mod normalize;
pub mod output;
pub mod properties;
pub mod reconcile;
pub mod steps;
pub mod tree;
pub mod validation;
pub mod wizard;
