pub mod cat;
pub mod export;
