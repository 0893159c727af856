/// Messages coming from the sensors wired to the microcontroller.
pub mod sensor {
    /// A frame is one decoded serial line of sensor and scale readings.
    pub mod frame;
}
/// Standardise how control messages are sent out of the control system.
pub mod control {
    /// Light messages go to the microcontroller and to the notification channel
    /// whenever the light output changes.
    pub mod light;
}
