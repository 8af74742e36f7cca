//! 기본 타입.

pub mod instrument;

pub use instrument::InstrumentCode;
