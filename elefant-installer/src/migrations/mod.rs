mod v5_7_1;

pub use v5_7_1::*;
