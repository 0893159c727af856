/// Devices are the atomic units that can be combined together
/// into components. Their core responsibilities do not change
/// based on location, name etc.
pub mod hardware {
    /// Device interface for the chamber microcontroller on the serial port.
    pub mod controller;
}

/// Services that behave like devices but live off the rig.
pub mod software {
    /// Notification channel used for alerts and report delivery.
    pub mod slack;
    /// Solar ephemeris used to compute sunrise and sunset.
    pub mod solar;
}
