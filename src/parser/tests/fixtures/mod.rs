pub mod stereotype_defs;

pub use stereotype_defs::*;
