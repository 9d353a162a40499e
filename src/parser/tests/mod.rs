// Parser regression tests for role-marked type extraction

pub mod fixtures;

mod impl_parsing;
