pub mod app;
pub mod calibration;
pub mod geometry;
pub mod gesture;
pub mod hook;
pub mod messages;
pub mod mode;
pub mod model;
pub mod presenter;
pub mod runtime;
pub mod session;
