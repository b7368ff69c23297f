//! Resolution of Portuguese relative date and time phrases.
//!
//! All functions take text already folded by `shared_utils::text::fold`
//! (lowercase, no diacritics) and anchor on the clinic-local "today".

use std::sync::LazyLock;

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};
use regex::Regex;

use crate::models::DayPeriod;

static RELATIVE_DAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(depois de amanha|amanha|hoje)\b").expect("static regex"));
static NUMERIC_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})/(\d{1,2})(?:/(\d{2}|\d{4}))?\b").expect("static regex")
});
static DAY_OF_MONTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bdia (\d{1,2})\b").expect("static regex"));
static WEEKDAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:(proxima|proximo)\s+)?(domingo|segunda|terca|quarta|quinta|sexta|sabado)(?:[\s-]feira)?(\s+que\s+vem)?\b",
    )
    .expect("static regex")
});
static NEXT_WEEK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(proxima semana|semana que vem)\b").expect("static regex"));

static HOUR_MINUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})(?:h|:)(\d{2})\b").expect("static regex"));
static HOUR_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})\s?(?:hs|hrs|horas|hora|h)\b").expect("static regex"));
static AT_HOUR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:as|a partir das|por volta das|depois das|antes das)\s+(\d{1,2})\b")
        .expect("static regex")
});
static HOUR_OF_PERIOD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2}) da (manha|tarde|noite)\b").expect("static regex"));
static NOON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bmeio[\s-]dia\b").expect("static regex"));
static GREETING_PERIOD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(bom dia|boa tarde|boa noite)\b").expect("static regex"));
static PERIOD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:de |pela |a |na |no )?(manha|tarde|noite)\b").expect("static regex")
});

#[derive(Debug, Clone, PartialEq)]
pub struct DateMatch {
    pub phrase: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeMatch {
    pub phrase: String,
    pub time: Option<NaiveTime>,
    pub period: Option<DayPeriod>,
}

pub fn resolve_date(folded: &str, today: NaiveDate) -> Option<DateMatch> {
    if let Some(caps) = RELATIVE_DAY.captures(folded) {
        let phrase = caps.get(1)?.as_str();
        let offset = match phrase {
            "depois de amanha" => 2,
            "amanha" => 1,
            _ => 0,
        };
        return Some(DateMatch {
            phrase: phrase.to_string(),
            date: today + Duration::days(offset),
        });
    }

    if let Some(caps) = NUMERIC_DATE.captures(folded) {
        let day: u32 = caps.get(1)?.as_str().parse().ok()?;
        let month: u32 = caps.get(2)?.as_str().parse().ok()?;
        let explicit_year = caps.get(3).and_then(|y| y.as_str().parse::<i32>().ok());
        let date = match explicit_year {
            Some(year) if year < 100 => NaiveDate::from_ymd_opt(2000 + year, month, day)?,
            Some(year) => NaiveDate::from_ymd_opt(year, month, day)?,
            None => {
                let this_year = NaiveDate::from_ymd_opt(today.year(), month, day)?;
                if this_year < today {
                    NaiveDate::from_ymd_opt(today.year() + 1, month, day)?
                } else {
                    this_year
                }
            }
        };
        return Some(DateMatch {
            phrase: caps.get(0)?.as_str().to_string(),
            date,
        });
    }

    if let Some(m) = weekday_match(folded, today) {
        return Some(m);
    }

    if let Some(caps) = DAY_OF_MONTH.captures(folded) {
        let day: u32 = caps.get(1)?.as_str().parse().ok()?;
        let date = next_day_of_month(today, day)?;
        return Some(DateMatch {
            phrase: caps.get(0)?.as_str().to_string(),
            date,
        });
    }

    if let Some(m) = NEXT_WEEK.find(folded) {
        let days_to_monday = 7 - today.weekday().num_days_from_monday() as i64;
        return Some(DateMatch {
            phrase: m.as_str().to_string(),
            date: today + Duration::days(days_to_monday),
        });
    }

    None
}

fn weekday_match(folded: &str, today: NaiveDate) -> Option<DateMatch> {
    for caps in WEEKDAY.captures_iter(folded) {
        let whole = caps.get(0)?;
        // "segunda opcao" is an option number, not Monday.
        let rest = folded[whole.end()..].trim_start();
        if rest.starts_with("opcao") || rest.starts_with("alternativa") || rest.starts_with("da lista") {
            continue;
        }

        let weekday = match caps.get(2)?.as_str() {
            "domingo" => Weekday::Sun,
            "segunda" => Weekday::Mon,
            "terca" => Weekday::Tue,
            "quarta" => Weekday::Wed,
            "quinta" => Weekday::Thu,
            "sexta" => Weekday::Fri,
            _ => Weekday::Sat,
        };
        let strictly_after = caps.get(1).is_some() || caps.get(3).is_some();

        return Some(DateMatch {
            phrase: whole.as_str().to_string(),
            date: next_weekday(today, weekday, strictly_after),
        });
    }
    None
}

/// Next date falling on `weekday`. A bare weekday may be today; "próxima" never is.
pub fn next_weekday(today: NaiveDate, weekday: Weekday, strictly_after: bool) -> NaiveDate {
    let current = today.weekday().num_days_from_monday() as i64;
    let target = weekday.num_days_from_monday() as i64;
    let mut delta = (target - current + 7) % 7;
    if delta == 0 && strictly_after {
        delta = 7;
    }
    today + Duration::days(delta)
}

fn next_day_of_month(today: NaiveDate, day: u32) -> Option<NaiveDate> {
    if let Some(date) = NaiveDate::from_ymd_opt(today.year(), today.month(), day) {
        if date >= today {
            return Some(date);
        }
    }
    let (year, month) = if today.month() == 12 {
        (today.year() + 1, 1)
    } else {
        (today.year(), today.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

pub fn resolve_time(folded: &str) -> Option<TimeMatch> {
    let without_greetings = GREETING_PERIOD.replace_all(folded, " ");
    let text = without_greetings.as_ref();
    let period = period_of(text);

    if let Some(caps) = HOUR_OF_PERIOD.captures(text) {
        let hour: u32 = caps.get(1)?.as_str().parse().ok()?;
        let period = parse_period(caps.get(2)?.as_str());
        return Some(TimeMatch {
            phrase: caps.get(0)?.as_str().to_string(),
            time: hm(adjust_hour(hour, Some(period)), 0),
            period: Some(period),
        });
    }

    if let Some(caps) = HOUR_MINUTE.captures(text) {
        let hour: u32 = caps.get(1)?.as_str().parse().ok()?;
        let minute: u32 = caps.get(2)?.as_str().parse().ok()?;
        return Some(TimeMatch {
            phrase: caps.get(0)?.as_str().to_string(),
            time: hm(adjust_hour(hour, period), minute),
            period,
        });
    }

    if let Some(caps) = HOUR_SUFFIX.captures(text).or_else(|| AT_HOUR.captures(text)) {
        let hour: u32 = caps.get(1)?.as_str().parse().ok()?;
        return Some(TimeMatch {
            phrase: caps.get(0)?.as_str().to_string(),
            time: hm(adjust_hour(hour, period), 0),
            period,
        });
    }

    if let Some(m) = NOON.find(text) {
        return Some(TimeMatch {
            phrase: m.as_str().to_string(),
            time: hm(12, 0),
            period: Some(DayPeriod::Afternoon),
        });
    }

    // A period on its own leaves the hour open for a follow-up question.
    PERIOD.find(text).map(|m| TimeMatch {
        phrase: m.as_str().trim().to_string(),
        time: None,
        period,
    })
}

fn period_of(text: &str) -> Option<DayPeriod> {
    PERIOD
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| parse_period(m.as_str()))
}

fn parse_period(word: &str) -> DayPeriod {
    match word {
        "manha" => DayPeriod::Morning,
        "tarde" => DayPeriod::Afternoon,
        _ => DayPeriod::Evening,
    }
}

/// "3 da tarde" is 15:00.
fn adjust_hour(hour: u32, period: Option<DayPeriod>) -> u32 {
    match period {
        Some(DayPeriod::Afternoon) | Some(DayPeriod::Evening) if (1..12).contains(&hour) => hour + 12,
        _ => hour,
    }
}

fn hm(hour: u32, minute: u32) -> Option<NaiveTime> {
    NaiveTime::from_hms_opt(hour, minute, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Wednesday
    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 14).unwrap()
    }

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, day).unwrap()
    }

    fn t(h: u32, m: u32) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(h, m, 0)
    }

    #[test]
    fn relative_days() {
        assert_eq!(resolve_date("hoje", today()).unwrap().date, today());
        assert_eq!(resolve_date("para amanha as 15h", today()).unwrap().date, d(10, 15));
        assert_eq!(resolve_date("depois de amanha", today()).unwrap().date, d(10, 16));
    }

    #[test]
    fn weekdays_anchor_on_today() {
        assert_eq!(resolve_date("na segunda", today()).unwrap().date, d(10, 19));
        assert_eq!(resolve_date("sexta de manha", today()).unwrap().date, d(10, 16));
        // a bare weekday may be today, "proxima" is strictly later
        assert_eq!(resolve_date("quarta", today()).unwrap().date, today());
        assert_eq!(resolve_date("proxima quarta", today()).unwrap().date, d(10, 21));
        assert_eq!(resolve_date("quarta-feira que vem", today()).unwrap().date, d(10, 21));
    }

    #[test]
    fn option_ordinal_is_not_a_weekday() {
        assert_eq!(resolve_date("a segunda opcao", today()), None);
    }

    #[test]
    fn explicit_dates() {
        assert_eq!(resolve_date("dia 20/10", today()).unwrap().date, d(10, 20));
        assert_eq!(
            resolve_date("05/01", today()).unwrap().date,
            NaiveDate::from_ymd_opt(2027, 1, 5).unwrap()
        );
        assert_eq!(resolve_date("20/10/26", today()).unwrap().date, d(10, 20));
        assert_eq!(resolve_date("dia 3", today()).unwrap().date, d(11, 3));
        assert_eq!(resolve_date("31/02", today()), None);
    }

    #[test]
    fn explicit_hours() {
        assert_eq!(resolve_time("amanha as 15h").unwrap().time, t(15, 0));
        assert_eq!(resolve_time("15:30").unwrap().time, t(15, 30));
        assert_eq!(resolve_time("lá pelas 9h30").unwrap().time, t(9, 30));
        assert_eq!(resolve_time("as 9").unwrap().time, t(9, 0));
        assert_eq!(resolve_time("10 horas").unwrap().time, t(10, 0));
        assert_eq!(resolve_time("as 3 da tarde").unwrap().time, t(15, 0));
        assert_eq!(resolve_time("meio-dia").unwrap().time, t(12, 0));
    }

    #[test]
    fn period_without_hour_keeps_phrase() {
        let m = resolve_time("sexta de manha").unwrap();
        assert_eq!(m.time, None);
        assert_eq!(m.period, Some(DayPeriod::Morning));
        assert_eq!(m.phrase, "de manha");
    }

    #[test]
    fn greetings_are_not_periods() {
        assert_eq!(resolve_time("boa tarde"), None);
        assert_eq!(resolve_time("bom dia, quero agendar"), None);
    }
}
