pub mod coverage;
pub mod gate;
pub mod scorer;
