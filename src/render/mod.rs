pub mod backend;
pub mod cpu;
pub mod frames;
pub mod layout;
