pub mod basic_models;
pub mod editor;
pub mod filter;
