pub mod promotion;
pub mod records;
