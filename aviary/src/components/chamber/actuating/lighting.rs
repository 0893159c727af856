use crate::{
    components::chamber::actuating::sun_time::{SunTimeResolver, SunTimes},
    devices::{
        hardware::controller::ChamberDevice,
        software::{slack::Notifier, solar::SolarEphemeris},
    },
    messages::control::light::{LightCommand, LightNotification},
};
use chrono::{NaiveDateTime, NaiveTime};
use strum_macros::Display;
use tracing::{debug, error, info, warn};

/// Last known state of the light circuit. `Unknown` only exists until the
/// first evaluation of a run.
#[derive(Display, Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum LightState {
    #[default]
    #[strum(serialize = "UNKNOWN")]
    Unknown,
    #[strum(serialize = "ON")]
    On,
    #[strum(serialize = "OFF")]
    Off,
}

impl LightState {
    /// State the light should be in at `now` for the resolved sun times.
    pub fn target(sun: &SunTimes, now: NaiveTime) -> Self {
        if sun.is_daytime(now) {
            LightState::On
        } else {
            LightState::Off
        }
    }

    fn command(&self) -> Option<LightCommand> {
        match self {
            LightState::On => Some(LightCommand::On),
            LightState::Off => Some(LightCommand::Off),
            LightState::Unknown => None,
        }
    }
}

/// Component switching the chamber light from the resolved sun times.
/// The last light state is not kept here, it is threaded through
/// [`ChamberLighting::handle_lights`] by the control loop.
pub struct ChamberLighting<E> {
    /// Environmental system id used in notifications.
    system_id: u32,
    /// Resolves today's sunrise and sunset.
    resolver: SunTimeResolver<E>,
}

impl<E: SolarEphemeris> ChamberLighting<E> {
    pub fn new(system_id: u32, resolver: SunTimeResolver<E>) -> Self {
        Self {
            system_id,
            resolver,
        }
    }

    pub fn resolver(&self) -> &SunTimeResolver<E> {
        &self.resolver
    }

    /// Evaluate the light at `now`, drive the output and notify on change.
    ///
    /// The output is written on every evaluation so a microcontroller that
    /// was reset picks the state back up. The notification is only sent when
    /// the target differs from `previous`, a failed notification is logged
    /// and does not hold back the state. When the sun times cannot be
    /// resolved or the write fails, `previous` is returned untouched.
    ///
    /// * `device`: microcontroller driving the light circuit.
    /// * `notifier`: channel for the transition message.
    /// * `previous`: state returned by the previous evaluation.
    /// * `now`: local time of the evaluation.
    pub fn handle_lights<D, N>(
        &self,
        device: &mut D,
        notifier: &N,
        previous: LightState,
        now: NaiveDateTime,
    ) -> LightState
    where
        D: ChamberDevice,
        N: Notifier,
    {
        let sun = match self.resolver.resolve(now.date()) {
            Ok(sun) => sun,
            Err(e) => {
                error!("Failed to resolve sun times, light left {previous}: {e}");
                return previous;
            }
        };
        debug!("Sunrise time = {}, sunset time = {}", sun.sunrise, sun.sunset);

        let target = LightState::target(&sun, now.time());
        let Some(command) = target.command() else {
            return previous;
        };
        if let Err(e) = device.write_light(command) {
            error!("Failed to write light {command} to the device: {e}");
            return previous;
        }

        if target != previous {
            info!("Light switched from {previous} to {target} at {now}");
            let notification = LightNotification {
                command,
                at: now,
                system_id: self.system_id,
            };
            if let Err(e) = notifier.post_message(&notification.text()) {
                warn!("Failed sending notification {:?}: {e}", notification.text());
            }
        }
        target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        components::chamber::actuating::sun_time::{FixedEphemeris, SunTimeMode},
        devices::{hardware::controller::ScriptedDevice, software::slack::RecordingNotifier},
        utils::time::{ManualClock, TimeOfDay},
    };
    use chrono::NaiveDate;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn lighting(sunrise: &str, sunset: &str) -> ChamberLighting<FixedEphemeris> {
        let mode = SunTimeMode::Manual {
            sunrise: sunrise.parse::<TimeOfDay>().unwrap(),
            sunset: sunset.parse::<TimeOfDay>().unwrap(),
        };
        ChamberLighting::new(4, SunTimeResolver::new(mode, 0, FixedEphemeris::default()))
    }

    fn device() -> ScriptedDevice {
        ScriptedDevice::new(ManualClock::starting_at(at(0, 0)), chrono::Duration::zero())
    }

    #[test]
    fn test_target_follows_sun_times() {
        let lighting = lighting("06:00", "18:00");
        let notifier = RecordingNotifier::default();
        let mut device = device();
        assert_eq!(
            lighting.handle_lights(&mut device, &notifier, LightState::Unknown, at(7, 0)),
            LightState::On
        );
        assert_eq!(
            lighting.handle_lights(&mut device, &notifier, LightState::On, at(19, 0)),
            LightState::Off
        );
        assert_eq!(device.written, vec![LightCommand::On, LightCommand::Off]);
    }

    #[test]
    fn test_notification_only_on_transition() {
        let lighting = lighting("06:00", "18:00");
        let notifier = RecordingNotifier::default();
        let mut device = device();

        let mut state = LightState::Unknown;
        state = lighting.handle_lights(&mut device, &notifier, state, at(5, 0));
        assert_eq!(state, LightState::Off);
        assert_eq!(notifier.messages.borrow().len(), 1, "Unknown to OFF notifies");

        state = lighting.handle_lights(&mut device, &notifier, state, at(7, 0));
        assert_eq!(state, LightState::On);
        assert_eq!(notifier.messages.borrow().len(), 2, "OFF to ON notifies once");

        state = lighting.handle_lights(&mut device, &notifier, state, at(7, 30));
        assert_eq!(state, LightState::On);
        assert_eq!(notifier.messages.borrow().len(), 2, "ON to ON stays quiet");

        assert_eq!(
            device.written,
            vec![LightCommand::Off, LightCommand::On, LightCommand::On],
            "The output is driven on every evaluation"
        );
        assert_eq!(
            notifier.messages.borrow()[1],
            "Light was turned ON at 2024-05-01 07:00:00, in environmental system 4"
        );
    }

    #[test]
    fn test_failed_notification_still_advances_state() {
        let lighting = lighting("06:00", "18:00");
        let notifier = RecordingNotifier {
            fail_messages: true,
            ..Default::default()
        };
        let mut device = device();
        let state = lighting.handle_lights(&mut device, &notifier, LightState::Off, at(7, 0));
        assert_eq!(state, LightState::On);
        assert_eq!(device.written, vec![LightCommand::On]);
    }

    #[test]
    fn test_failed_write_keeps_previous_state() {
        let lighting = lighting("06:00", "18:00");
        let notifier = RecordingNotifier::default();
        let mut device = device();
        device.fail_writes = true;
        let state = lighting.handle_lights(&mut device, &notifier, LightState::Off, at(7, 0));
        assert_eq!(state, LightState::Off);
        assert!(notifier.messages.borrow().is_empty());
    }

    #[test]
    fn test_unresolvable_sun_times_leave_light_alone() {
        let lighting = ChamberLighting::new(
            4,
            SunTimeResolver::new(
                SunTimeMode::DayOffset(i64::MAX),
                0,
                FixedEphemeris::default(),
            ),
        );
        let notifier = RecordingNotifier::default();
        let mut device = device();
        let state = lighting.handle_lights(&mut device, &notifier, LightState::Unknown, at(7, 0));
        assert_eq!(state, LightState::Unknown);
        assert!(device.written.is_empty());
        assert!(notifier.messages.borrow().is_empty());
    }

    #[test]
    fn test_light_state_labels() {
        assert_eq!(LightState::default().to_string(), "UNKNOWN");
        assert_eq!(LightState::On.to_string(), "ON");
        assert_eq!(LightState::Off.to_string(), "OFF");
    }
}
