mod domains;

pub use domains::*;
