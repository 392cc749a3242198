// Core modules implementing element scanning, sequence decoding, and error modeling.
pub mod decoder;
pub mod error;
pub mod scanner;
