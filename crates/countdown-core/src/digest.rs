//! Plain-text summary of what falls due over the coming week.

use chrono::{DateTime, Duration, Utc};

use crate::datetime::LocalZone;
use crate::item::CountdownItem;

pub const EMPTY_DIGEST: &str = "今天没有即将到期的任务，继续保持！";

/// Open countdowns due between `now` and a week from now, soonest first.
pub fn upcoming(items: &[CountdownItem], now: DateTime<Utc>) -> Vec<&CountdownItem> {
    let horizon = now + Duration::days(7);
    let mut due: Vec<&CountdownItem> = items
        .iter()
        .filter(|item| !item.is_completed && item.due >= now && item.due <= horizon)
        .collect();
    due.sort_by_key(|item| item.due);
    due
}

/// Groups the upcoming items by local calendar day into today, tomorrow and
/// the rest of the week. `None` when nothing is due.
pub fn compose(items: &[&CountdownItem], now: DateTime<Utc>, zone: &LocalZone) -> Option<String> {
    if items.is_empty() {
        return None;
    }

    let today = zone.local_date(now);
    let tomorrow = zone.local_date(now + Duration::days(1));

    let mut today_titles = vec![];
    let mut tomorrow_titles = vec![];
    let mut later_titles = vec![];
    for item in items {
        let day = zone.local_date(item.due);
        if day == today {
            today_titles.push(item.title.as_str());
        } else if day == tomorrow {
            tomorrow_titles.push(item.title.as_str());
        } else if day > tomorrow {
            later_titles.push(item.title.as_str());
        }
    }

    let mut lines = vec![];
    for (label, titles) in [
        ("今天到期", today_titles),
        ("明天到期", tomorrow_titles),
        ("本周到期", later_titles),
    ] {
        if !titles.is_empty() {
            lines.push(format!("{label} ({}个): {}", titles.len(), titles.join(", ")));
        }
    }

    Some(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn zone() -> LocalZone {
        LocalZone::Named(chrono_tz::Asia::Shanghai)
    }

    // 2025-06-02 10:00 in Shanghai
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 2, 0, 0)
            .single()
            .expect("valid now")
    }

    fn due_in(title: &str, hours: i64) -> CountdownItem {
        CountdownItem::new(title, now() + Duration::hours(hours))
    }

    #[test]
    fn keeps_open_items_within_a_week() {
        let mut done = due_in("done", 5);
        done.is_completed = true;
        let items = vec![
            due_in("later", 48),
            due_in("past", -1),
            due_in("soon", 3),
            due_in("far", 24 * 8),
            done,
        ];

        let titles: Vec<&str> = upcoming(&items, now())
            .into_iter()
            .map(|item| item.title.as_str())
            .collect();
        assert_eq!(titles, vec!["soon", "later"]);
    }

    #[test]
    fn groups_by_local_day() {
        let items = vec![
            due_in("Quiz", 3),
            due_in("Lab", 15),
            due_in("Essay", 20),
            due_in("Exam", 24 * 3),
        ];
        let due = upcoming(&items, now());

        let text = compose(&due, now(), &zone()).expect("digest");
        assert_eq!(
            text,
            "今天到期 (1个): Quiz\n明天到期 (2个): Lab, Essay\n本周到期 (1个): Exam"
        );
    }

    #[test]
    fn empty_digest_is_none() {
        assert_eq!(compose(&[], now(), &zone()), None);
    }
}
