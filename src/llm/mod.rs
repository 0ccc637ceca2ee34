pub mod confidence;
pub mod gateway;
