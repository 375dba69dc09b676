pub mod ports;
pub mod detection_use_case;
