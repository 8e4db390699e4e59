pub mod inference;
pub mod train;
