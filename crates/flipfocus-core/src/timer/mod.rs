pub mod countdown;
pub mod stopwatch;
