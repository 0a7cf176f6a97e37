pub mod grid;
pub mod pml;
