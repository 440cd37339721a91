pub mod catalog;
pub mod procurement;
