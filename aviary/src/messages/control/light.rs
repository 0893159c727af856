use chrono::NaiveDateTime;
use strum_macros::Display;

/// Byte values the microcontroller compares against a threshold of 100,
/// anything above switches the light circuit on.
pub const LIGHT_TOKEN_THRESHOLD: u8 = 100;

/// Single byte command written to the microcontroller to drive the light
/// circuit. The tokens are the ascii letters `f` (102) and `a` (97) so they
/// sit either side of [`LIGHT_TOKEN_THRESHOLD`].
#[derive(Display, Copy, Clone, Debug, PartialEq, Eq)]
pub enum LightCommand {
    #[strum(serialize = "ON")]
    On,
    #[strum(serialize = "OFF")]
    Off,
}

impl LightCommand {
    /// Byte sent over the serial link.
    pub fn token(&self) -> u8 {
        match self {
            LightCommand::On => b'f',
            LightCommand::Off => b'a',
        }
    }
}

/// Light message published to the notification channel when the light
/// output changes state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightNotification {
    /// The command that was applied.
    pub command: LightCommand,
    /// Local time of the evaluation that triggered the change.
    pub at: NaiveDateTime,
    /// Environmental system id from the configuration.
    pub system_id: u32,
}

impl LightNotification {
    /// Human readable text for the channel.
    pub fn text(&self) -> String {
        format!(
            "Light was turned {} at {}, in environmental system {}",
            self.command,
            self.at.format("%Y-%m-%d %H:%M:%S"),
            self.system_id
        )
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use chrono::NaiveDate;
    use rstest::rstest;

    #[rstest]
    #[case(LightCommand::On, b'f')]
    #[case(LightCommand::Off, b'a')]
    fn test_light_tokens(#[case] command: LightCommand, #[case] token: u8) {
        assert_eq!(command.token(), token);
    }

    #[test]
    fn test_tokens_straddle_threshold() {
        assert!(LightCommand::On.token() > LIGHT_TOKEN_THRESHOLD);
        assert!(LightCommand::Off.token() < LIGHT_TOKEN_THRESHOLD);
    }

    #[rstest]
    #[case((LightCommand::On, 3, "Light was turned ON at 2024-05-01 06:01:07, in environmental system 3"))]
    #[case((LightCommand::Off, 1, "Light was turned OFF at 2024-05-01 06:01:07, in environmental system 1"))]
    fn test_notification_text(#[case] args: (LightCommand, u32, &str)) {
        let notification = LightNotification {
            command: args.0,
            at: NaiveDate::from_ymd_opt(2024, 5, 1)
                .unwrap()
                .and_hms_opt(6, 1, 7)
                .unwrap(),
            system_id: args.1,
        };
        assert_eq!(notification.text(), args.2, "Failed to format notification");
    }
}
