// Domain layer: yard models and the store ports the core talks to.

pub mod model;
pub mod ports;
