//! Rankings of macro areas, regions and tracks by average grade.

use serde::Serialize;

use crate::aggregate::{AggregationEngine, Rounded};
use crate::config::{AcademicCalendar, MACRO_AREAS};
use crate::filters::{FilterResolver, StatsParams};
use crate::store::{EntityStore, SchoolField};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Area,
    Region,
    Track,
}

impl Dimension {
    pub fn title(&self) -> &'static str {
        match self {
            Dimension::Area => "Area geografica",
            Dimension::Region => "Regione",
            Dimension::Track => "Indirizzo",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DimensionKey {
    #[serde(rename = "area")]
    Area(String),
    #[serde(rename = "regione")]
    Region(String),
    #[serde(rename = "indirizzo")]
    Track(String),
}

impl DimensionKey {
    pub fn value(&self) -> &str {
        match self {
            DimensionKey::Area(value)
            | DimensionKey::Region(value)
            | DimensionKey::Track(value) => value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Population {
    #[serde(rename = "numero_scuole")]
    Schools(i64),
    #[serde(rename = "numero_classi")]
    Classes(i64),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    #[serde(flatten)]
    pub key: DimensionKey,
    pub media_voti: Rounded,
    pub numero_voti: i64,
    pub numero_studenti: i64,
    #[serde(flatten)]
    pub population: Population,
}

pub struct ComparisonReporter<'a> {
    store: &'a dyn EntityStore,
    calendar: &'a AcademicCalendar,
}

impl<'a> ComparisonReporter<'a> {
    pub fn new(store: &'a dyn EntityStore, calendar: &'a AcademicCalendar) -> Self {
        Self { store, calendar }
    }

    /// One entry per dimension value, best average first. Entries with equal
    /// averages keep their enumeration order.
    pub async fn compare(&self, dimension: Dimension) -> anyhow::Result<Vec<Comparison>> {
        let values: Vec<String> = match dimension {
            Dimension::Area => MACRO_AREAS.iter().map(|area| area.to_string()).collect(),
            Dimension::Region => self.store.distinct_school_values(SchoolField::Region).await?,
            Dimension::Track => self.store.distinct_tracks().await?,
        };

        let mut entries = Vec::with_capacity(values.len());
        for value in values.into_iter().filter(|value| !value.trim().is_empty()) {
            entries.push(self.entry(dimension, value).await?);
        }

        entries.sort_by(|a, b| b.media_voti.as_f64().total_cmp(&a.media_voti.as_f64()));
        Ok(entries)
    }

    async fn entry(&self, dimension: Dimension, value: String) -> anyhow::Result<Comparison> {
        let base = StatsParams::default();
        let params = match dimension {
            Dimension::Area => base.with_area(&value),
            Dimension::Region => base.with_region(&value),
            Dimension::Track => base.with_track(&value),
        };
        let filter = FilterResolver::new(self.store, self.calendar)
            .resolve(&params)
            .await?;
        let engine = AggregationEngine::new(self.store);
        let totals = engine.totals(&filter.grade_query()).await?;

        let (key, numero_studenti, population) = match dimension {
            Dimension::Area | Dimension::Region => {
                let key = if dimension == Dimension::Area {
                    DimensionKey::Area(value)
                } else {
                    DimensionKey::Region(value)
                };
                (
                    key,
                    engine.count_students(&filter).await?,
                    Population::Schools(engine.count_schools(&filter).await?),
                )
            }
            Dimension::Track => {
                let classes = engine.classes(&filter).await?;
                (
                    DimensionKey::Track(value),
                    classes.iter().map(|class| i64::from(class.headcount)).sum(),
                    Population::Classes(classes.len() as i64),
                )
            }
        };

        Ok(Comparison {
            key,
            media_voti: Rounded::mean(&totals),
            numero_voti: totals.count,
            numero_studenti,
            population,
        })
    }
}
