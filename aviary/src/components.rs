/// Components that are placed within a housing chamber.
pub mod chamber {
    /// Components that provide actuation capability.
    pub mod actuating {
        /// Light switching driven by the resolved sun times.
        pub mod lighting;
        /// Sunrise and sunset resolution from the configured override mode.
        pub mod sun_time;
    }
    /// Components that provide sensing capability.
    pub mod sensing {
        /// The minute long acquisition window and its aggregation.
        pub mod acquisition;
    }
    /// Components that persist and ship the collected data.
    pub mod reporting {
        /// Once a day delivery of the subject reports.
        pub mod daily;
        /// Sensor and subject report files on disk.
        pub mod writer;
    }
    /// The chamber component itself, its configuration and control loop.
    pub mod environment;
}

/// Helpful prelude when working with components.
pub mod prelude {
    pub use crate::components::chamber::actuating::lighting::*;
    pub use crate::components::chamber::actuating::sun_time::*;
    pub use crate::components::chamber::environment::*;
    pub use crate::components::chamber::reporting::daily::*;
    pub use crate::components::chamber::reporting::writer::*;
    pub use crate::components::chamber::sensing::acquisition::*;
}
