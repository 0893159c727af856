use crate::{
    components::chamber::reporting::writer::{find_single_report, ScaleReport, SubjectRegistry},
    devices::software::slack::Notifier,
    utils::time::TimeOfDay,
};
use chrono::{Duration, NaiveDateTime, NaiveTime, Timelike};
use std::{collections::HashMap, path::Path};
use tracing::{error, info};

/// Sends every subject's weight report once a day at a configured time.
///
/// The control loop does not see every wall clock minute, an iteration
/// lasts a little over a minute, so the minute after the target is
/// accepted as well. A subject that already went out inside today's
/// window is not sent again, and a subject whose send failed is retried
/// on the next iteration that still falls inside the window.
#[derive(Debug, Clone)]
pub struct DailyReportScheduler {
    target: TimeOfDay,
    started_at: NaiveDateTime,
    last_sent: HashMap<String, NaiveDateTime>,
}

impl DailyReportScheduler {
    /// * `target`: time of day to send at.
    /// * `started_at`: process start, counts as the last send of every
    ///   subject until it has really been sent.
    pub fn new(target: TimeOfDay, started_at: NaiveDateTime) -> Self {
        Self {
            target,
            started_at,
            last_sent: HashMap::new(),
        }
    }

    pub fn target(&self) -> TimeOfDay {
        self.target
    }

    /// Last successful send of `subject`.
    pub fn last_sent(&self, subject: &str) -> Option<NaiveDateTime> {
        self.last_sent.get(subject).copied()
    }

    /// The target minute or the one after, wrapping past midnight.
    fn in_window(&self, now: NaiveTime) -> bool {
        let target = self.target.as_naive_time();
        let (grace, _) = target.overflowing_add_signed(Duration::minutes(1));
        let same_minute =
            |t: NaiveTime| t.hour() == now.hour() && t.minute() == now.minute();
        same_minute(target) || same_minute(grace)
    }

    /// Start of the window `now` belongs to.
    fn window_start(&self, now: NaiveDateTime) -> NaiveDateTime {
        let start = now.date().and_time(self.target.as_naive_time());
        if start > now {
            start - Duration::days(1)
        } else {
            start
        }
    }

    /// Whether `subject` should be sent at `now`.
    pub fn is_due(&self, subject: &str, now: NaiveDateTime) -> bool {
        if !self.in_window(now.time()) {
            return false;
        }
        let last_sent = self.last_sent(subject);
        if last_sent.is_some_and(|sent| sent >= self.window_start(now)) {
            return false;
        }
        let reference = last_sent.map_or(self.started_at, |sent| sent.max(self.started_at));
        now - reference > Duration::minutes(1)
    }

    /// Send the report of every due subject. A subject that has no single
    /// report, or whose upload fails, is logged and does not hold back the
    /// others. Returns the number of reports sent.
    ///
    /// * `now`: local time of the check.
    /// * `registry`: subjects to consider.
    /// * `scale_base`: configured scale output directory.
    /// * `notifier`: channel the reports go to.
    pub fn run<N: Notifier>(
        &mut self,
        now: NaiveDateTime,
        registry: &SubjectRegistry,
        scale_base: &Path,
        notifier: &N,
    ) -> usize {
        let due: Vec<&str> = registry
            .iter()
            .map(|(_, subject)| subject)
            .filter(|subject| self.is_due(subject, now))
            .collect();
        if due.is_empty() {
            return 0;
        }
        info!(
            "Current time is {}, sending daily weight reports",
            now.format("%H:%M")
        );

        let mut sent = 0;
        for subject in due {
            let report = match find_single_report(&ScaleReport::directory(scale_base, subject)) {
                Ok(report) => report,
                Err(e) => {
                    error!("No daily weight report to send for subject {subject}: {e}");
                    continue;
                }
            };
            match notifier.post_file(&report) {
                Ok(()) => {
                    info!("Sent daily weight report for subject {subject}");
                    self.last_sent.insert(subject.to_string(), now);
                    sent += 1;
                }
                Err(e) => error!("Failed sending daily weight report for subject {subject}: {e}"),
            }
        }
        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        components::chamber::reporting::writer::SubjectChannel,
        devices::software::slack::RecordingNotifier,
    };
    use chrono::NaiveDate;
    use rstest::rstest;
    use std::fs;

    fn at(hour: u32, minute: u32, second: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(hour, minute, second)
            .unwrap()
    }

    fn scheduler(target: &str) -> DailyReportScheduler {
        DailyReportScheduler::new(target.parse().unwrap(), at(6, 0, 0))
    }

    fn registry(subjects: &[&str]) -> SubjectRegistry {
        let entries: Vec<SubjectChannel> = subjects
            .iter()
            .enumerate()
            .map(|(channel, subject)| SubjectChannel {
                channel: channel as u8,
                subject: subject.to_string(),
            })
            .collect();
        SubjectRegistry::from_entries(&entries).unwrap()
    }

    fn with_reports(subjects: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for subject in subjects {
            let report = ScaleReport::for_subject(dir.path(), subject);
            fs::create_dir_all(report.path().parent().unwrap()).unwrap();
            fs::write(report.path(), "Time,Weight\n").unwrap();
        }
        dir
    }

    #[rstest]
    #[case(at(9, 0, 5), true)]
    #[case(at(9, 1, 59), true)]
    #[case(at(8, 59, 59), false)]
    #[case(at(9, 2, 0), false)]
    #[case(at(10, 0, 0), false)]
    fn test_due_around_target(#[case] now: NaiveDateTime, #[case] due: bool) {
        assert_eq!(scheduler("09:00").is_due("bird", now), due);
    }

    #[test]
    fn test_not_due_right_after_start() {
        let scheduler = DailyReportScheduler::new("09:00".parse().unwrap(), at(8, 59, 30));
        assert!(!scheduler.is_due("bird", at(9, 0, 20)));
        assert!(scheduler.is_due("bird", at(9, 1, 10)));
    }

    #[test]
    fn test_grace_minute_wraps_midnight() {
        let scheduler = scheduler("23:59");
        assert!(scheduler.is_due("bird", at(23, 59, 10)));
        let next_day = at(0, 0, 30) + Duration::days(1);
        assert!(scheduler.is_due("bird", next_day));
    }

    #[test]
    fn test_sends_once_per_window() {
        let subjects = ["bird_a", "bird_b"];
        let dir = with_reports(&subjects);
        let registry = registry(&subjects);
        let notifier = RecordingNotifier::default();
        let mut scheduler = scheduler("09:00");

        assert_eq!(scheduler.run(at(9, 0, 2), &registry, dir.path(), &notifier), 2);
        assert_eq!(scheduler.last_sent("bird_a"), Some(at(9, 0, 2)));
        assert_eq!(
            scheduler.run(at(9, 0, 40), &registry, dir.path(), &notifier),
            0,
            "Same minute does not re-send"
        );
        assert_eq!(
            scheduler.run(at(9, 1, 45), &registry, dir.path(), &notifier),
            0,
            "Grace minute does not re-send"
        );
        assert_eq!(notifier.files.borrow().len(), 2);

        let tomorrow = at(9, 0, 10) + Duration::days(1);
        assert_eq!(scheduler.run(tomorrow, &registry, dir.path(), &notifier), 2);
    }

    #[test]
    fn test_missed_target_minute_fires_on_next() {
        let subjects = ["bird_a"];
        let dir = with_reports(&subjects);
        let notifier = RecordingNotifier::default();
        let mut scheduler = scheduler("09:00");
        assert_eq!(
            scheduler.run(at(8, 59, 58), &registry(&subjects), dir.path(), &notifier),
            0
        );
        assert_eq!(
            scheduler.run(at(9, 1, 3), &registry(&subjects), dir.path(), &notifier),
            1
        );
        assert_eq!(
            notifier.files.borrow()[0],
            ScaleReport::for_subject(dir.path(), "bird_a").path()
        );
    }

    #[test]
    fn test_failed_subject_does_not_block_others() {
        let subjects = ["bird_a", "bird_b", "bird_c"];
        let dir = with_reports(&subjects);
        let registry = registry(&subjects);
        let notifier = RecordingNotifier {
            failing_files: ["bird_b".to_string()].into(),
            ..Default::default()
        };
        let mut scheduler = scheduler("09:00");

        assert_eq!(scheduler.run(at(9, 0, 2), &registry, dir.path(), &notifier), 2);
        assert_eq!(scheduler.last_sent("bird_b"), None);
        assert!(scheduler.last_sent("bird_c").is_some());

        assert!(scheduler.is_due("bird_b", at(9, 1, 10)), "Retried in the grace minute");
        assert!(!scheduler.is_due("bird_a", at(9, 1, 10)));
    }

    #[test]
    fn test_subject_without_report_is_skipped() {
        let dir = with_reports(&["bird_a"]);
        let registry = registry(&["bird_a", "bird_missing"]);
        let notifier = RecordingNotifier::default();
        let mut scheduler = scheduler("09:00");
        assert_eq!(scheduler.run(at(9, 0, 2), &registry, dir.path(), &notifier), 1);
        assert_eq!(scheduler.last_sent("bird_missing"), None);
    }
}
