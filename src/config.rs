use std::{env, fmt::Display, str::FromStr};

use anyhow::Context;
use chrono::NaiveDate;
use tracing::info;

use crate::store::DateWindow;

/// Citizenship code that counts as Italian; every other code is foreign.
pub const ITALIAN_CITIZENSHIP: &str = "ITA";

/// Macro geographic areas, in reporting enumeration order.
pub const MACRO_AREAS: [&str; 5] = ["NORD EST", "NORD OVEST", "CENTRO", "SUD", "ISOLE"];

/// Minimum distance from the global average for a class to be an outlier.
pub const OUTLIER_THRESHOLD: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcademicCalendar {
    pub first_semester_start: NaiveDate,
    pub second_semester_start: NaiveDate,
    pub school_year_end: NaiveDate,
}

impl AcademicCalendar {
    pub fn first_semester(&self) -> DateWindow {
        DateWindow::Between {
            from: self.first_semester_start,
            until: self.second_semester_start,
        }
    }

    pub fn second_semester(&self) -> DateWindow {
        DateWindow::Between {
            from: self.second_semester_start,
            until: self.school_year_end,
        }
    }

    pub fn semester(&self, number: i32) -> Option<DateWindow> {
        match number {
            1 => Some(self.first_semester()),
            2 => Some(self.second_semester()),
            _ => None,
        }
    }
}

impl Default for AcademicCalendar {
    fn default() -> Self {
        Self {
            first_semester_start: NaiveDate::from_ymd_opt(2023, 9, 1).unwrap_or_default(),
            second_semester_start: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap_or_default(),
            school_year_end: NaiveDate::from_ymd_opt(2024, 7, 1).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub max_connections: u32,
    pub calendar: AcademicCalendar,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let defaults = AcademicCalendar::default();
        let calendar = AcademicCalendar {
            first_semester_start: try_load("FIRST_SEMESTER_START", defaults.first_semester_start)?,
            second_semester_start: try_load(
                "SECOND_SEMESTER_START",
                defaults.second_semester_start,
            )?,
            school_year_end: try_load("SCHOOL_YEAR_END", defaults.school_year_end)?,
        };

        anyhow::ensure!(
            calendar.first_semester_start < calendar.second_semester_start
                && calendar.second_semester_start < calendar.school_year_end,
            "semester boundaries must be strictly increasing"
        );

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .context("DATABASE_URL must be set to a Postgres instance")?,
            port: try_load("PORT", 3000)?,
            max_connections: try_load("DB_MAX_CONNECTIONS", 5)?,
            calendar,
        })
    }
}

fn try_load<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {key} value {raw:?}: {e}")),
        Err(_) => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_calendar_splits_the_school_year() {
        let calendar = AcademicCalendar::default();
        let first = calendar.first_semester();
        let second = calendar.second_semester();

        assert_eq!(first.lower(), NaiveDate::from_ymd_opt(2023, 9, 1));
        assert_eq!(first.upper(), second.lower());
        assert_eq!(second.upper(), NaiveDate::from_ymd_opt(2024, 7, 1));
    }

    #[test]
    fn only_two_semesters_exist() {
        let calendar = AcademicCalendar::default();
        assert!(calendar.semester(1).is_some());
        assert!(calendar.semester(2).is_some());
        assert!(calendar.semester(0).is_none());
        assert!(calendar.semester(3).is_none());
    }

    #[test]
    fn missing_variables_fall_back_to_defaults() {
        let port: u16 = try_load("GRADEBOOK_TEST_UNSET_PORT", 3000).unwrap();
        assert_eq!(port, 3000);
    }
}
