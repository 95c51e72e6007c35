#![deny(unsafe_op_in_unsafe_fn)]

pub mod bsp;
pub mod entities;
pub mod file;
pub mod pak;
pub mod palette;

pub use bsp::Level;
