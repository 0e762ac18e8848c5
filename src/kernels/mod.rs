//! Built-in kernels and canonical operation names.
//!
//! Only CPU reference kernels ship with the crate. Accelerator kernels are
//! registered by the embedding application under the same names.

pub mod cpu;

pub const ADD: &str = "add";
pub const SUB: &str = "sub";
pub const MUL: &str = "mul";
pub const DIV: &str = "div";
pub const MATMUL: &str = "matmul";
