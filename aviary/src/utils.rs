/// Development utilities for locating test fixtures.
pub mod tests;
/// Time of day types used by the configuration, and the clock seam.
pub mod time;
