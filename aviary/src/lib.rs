/**
The aviary control system drives the environmental rig of an animal-housing chamber.
It follows the same split as the rest of the lab tooling: devices are the atomic
units that talk to the outside world (the microcontroller, the notification channel,
the sun), messages describe what crosses those boundaries, and components group
devices into the logical units that run the chamber (lighting, acquisition, reports).
*/

/// Components in the system are created by grouping together
/// devices into a logical unit that performs some function
/// for the chamber.
pub mod components;
/// Devices that are an atomic unit, and can be composed
/// with other devices into components to perform some function.
pub mod devices;
/// Consolidated error type for the crate.
pub mod error;
/// Message structure for communication into and out of the
/// control system, such as the raw serial lines coming from the
/// microcontroller and the light tokens going back to it.
pub mod messages;
/// Time helpers shared by the components, and development utilities
/// for working with test fixtures.
pub mod utils;
