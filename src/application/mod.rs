pub mod bootstrap;
pub mod lifecycle;
pub mod registry;
