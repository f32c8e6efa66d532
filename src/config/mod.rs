pub mod builder;
pub mod rules;
