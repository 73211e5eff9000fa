pub mod math;
pub mod time;
