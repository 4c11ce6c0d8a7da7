pub mod frames;

pub use frames::WireMessage;
