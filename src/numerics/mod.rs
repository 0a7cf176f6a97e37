pub mod nonlinear;
pub mod sparse;
pub mod timing;
