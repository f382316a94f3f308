//! Turns a statistics request's filter parameters into the set of schools,
//! classes, students and the grade date window they select.
//!
//! Resolution runs in a fixed order: schools by geography, classes by school
//! and class attributes, students by class and personal attributes, then the
//! semester window. A stage that matched nothing makes every later stage
//! empty without consulting the store.

use serde::Deserialize;

use crate::config::{AcademicCalendar, ITALIAN_CITIZENSHIP};
use crate::models::Class;
use crate::store::{
    ClassQuery, CodeMatch, DateWindow, EntityStore, GradeQuery, Narrowing, SchoolQuery,
    StudentQuery,
};

#[derive(Debug, Clone, Default, Deserialize, clap::Args)]
pub struct StatsParams {
    /// Macro geographic area (e.g. "NORD OVEST")
    #[serde(rename = "areageografica")]
    #[arg(long = "areageografica")]
    pub area: Option<String>,

    #[serde(rename = "regione")]
    #[arg(long = "regione")]
    pub region: Option<String>,

    #[serde(rename = "provincia")]
    #[arg(long = "provincia")]
    pub province: Option<String>,

    #[serde(rename = "comune")]
    #[arg(long = "comune")]
    pub municipality: Option<String>,

    #[serde(rename = "codicescuola")]
    #[arg(long = "codicescuola")]
    pub school_code: Option<String>,

    /// Normalized curriculum track
    #[serde(rename = "indirizzo")]
    #[arg(long = "indirizzo")]
    pub track: Option<String>,

    #[serde(rename = "annocorso")]
    #[arg(long = "annocorso")]
    pub course_year: Option<String>,

    /// 1 or 2
    #[serde(rename = "quadrimestre")]
    #[arg(long = "quadrimestre")]
    pub semester: Option<String>,

    #[serde(rename = "sesso")]
    #[arg(long = "sesso")]
    pub sex: Option<String>,

    /// "italiana" or "straniera"
    #[serde(rename = "cittadinanza")]
    #[arg(long = "cittadinanza")]
    pub citizenship: Option<String>,
}

/// A supplied filter value, after blank values are discarded.
#[derive(Debug, Clone, PartialEq)]
enum Parsed<T> {
    Absent,
    Valid(T),
    Invalid,
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

impl StatsParams {
    pub fn without_citizenship(&self) -> Self {
        Self {
            citizenship: None,
            ..self.clone()
        }
    }

    pub fn without_semester(&self) -> Self {
        Self {
            semester: None,
            ..self.clone()
        }
    }

    pub fn with_area(&self, area: &str) -> Self {
        Self {
            area: Some(area.to_string()),
            ..self.clone()
        }
    }

    pub fn with_region(&self, region: &str) -> Self {
        Self {
            region: Some(region.to_string()),
            ..self.clone()
        }
    }

    pub fn with_track(&self, track: &str) -> Self {
        Self {
            track: Some(track.to_string()),
            ..self.clone()
        }
    }

    fn school_query(&self) -> SchoolQuery {
        SchoolQuery {
            area: present(&self.area),
            region: present(&self.region),
            province: present(&self.province),
            municipality: present(&self.municipality),
        }
    }

    fn course_year(&self) -> Parsed<i32> {
        match present(&self.course_year) {
            None => Parsed::Absent,
            Some(raw) => raw.parse().map_or(Parsed::Invalid, Parsed::Valid),
        }
    }

    fn semester(&self) -> Parsed<i32> {
        match present(&self.semester) {
            None => Parsed::Absent,
            Some(raw) => match raw.parse() {
                Ok(number @ (1 | 2)) => Parsed::Valid(number),
                _ => Parsed::Invalid,
            },
        }
    }

    fn citizenship(&self) -> Parsed<CodeMatch> {
        match present(&self.citizenship).map(|raw| raw.to_lowercase()) {
            None => Parsed::Absent,
            Some(raw) if raw == "italiana" => {
                Parsed::Valid(CodeMatch::Equals(ITALIAN_CITIZENSHIP.to_string()))
            }
            Some(raw) if raw == "straniera" => {
                Parsed::Valid(CodeMatch::NotEquals(ITALIAN_CITIZENSHIP.to_string()))
            }
            Some(_) => Parsed::Invalid,
        }
    }
}

/// The outcome of filter resolution. `Unfiltered` stages impose no
/// constraint; `Only` stages list exactly the entities in scope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedFilter {
    pub schools: Narrowing<String>,
    pub classes: Narrowing<Class>,
    /// The query that produced `students`, kept so that counts can be
    /// refined further without re-resolving.
    pub student_query: StudentQuery,
    pub students: Narrowing<String>,
    pub dates: DateWindow,
}

impl ResolvedFilter {
    pub fn grade_query(&self) -> GradeQuery {
        self.grades_within(self.dates)
    }

    pub fn grades_within(&self, dates: DateWindow) -> GradeQuery {
        GradeQuery {
            students: self.students.clone(),
            dates,
            ..GradeQuery::default()
        }
    }
}

pub struct FilterResolver<'a> {
    store: &'a dyn EntityStore,
    calendar: &'a AcademicCalendar,
}

impl<'a> FilterResolver<'a> {
    pub fn new(store: &'a dyn EntityStore, calendar: &'a AcademicCalendar) -> Self {
        Self { store, calendar }
    }

    pub async fn resolve(&self, params: &StatsParams) -> anyhow::Result<ResolvedFilter> {
        let dates = match params.semester() {
            Parsed::Absent => DateWindow::Any,
            Parsed::Valid(number) => self.calendar.semester(number).unwrap_or(DateWindow::Never),
            Parsed::Invalid => DateWindow::Never,
        };

        let schools = self.resolve_schools(params).await?;
        let classes = self.resolve_classes(params, &schools).await?;
        let (student_query, students) = self.resolve_students(params, &classes).await?;

        Ok(ResolvedFilter {
            schools,
            classes,
            student_query,
            students,
            dates,
        })
    }

    async fn resolve_schools(&self, params: &StatsParams) -> anyhow::Result<Narrowing<String>> {
        let query = params.school_query();
        if query.is_empty() {
            return Ok(Narrowing::Unfiltered);
        }

        let schools = self.store.find_schools(&query).await?;
        Ok(Narrowing::Only(
            schools.into_iter().map(|school| school.code).collect(),
        ))
    }

    async fn resolve_classes(
        &self,
        params: &StatsParams,
        schools: &Narrowing<String>,
    ) -> anyhow::Result<Narrowing<Class>> {
        let course_year = match params.course_year() {
            Parsed::Absent => None,
            Parsed::Valid(year) => Some(year),
            Parsed::Invalid => return Ok(Narrowing::Only(Vec::new())),
        };
        let school_code = present(&params.school_code);
        let track = present(&params.track);

        if schools.is_unfiltered()
            && school_code.is_none()
            && track.is_none()
            && course_year.is_none()
        {
            return Ok(Narrowing::Unfiltered);
        }
        if schools.is_empty() {
            return Ok(Narrowing::Only(Vec::new()));
        }

        let query = ClassQuery {
            ids: Narrowing::Unfiltered,
            school_codes: schools.clone(),
            school_code,
            track,
            course_year,
        };
        Ok(Narrowing::Only(self.store.find_classes(&query).await?))
    }

    async fn resolve_students(
        &self,
        params: &StatsParams,
        classes: &Narrowing<Class>,
    ) -> anyhow::Result<(StudentQuery, Narrowing<String>)> {
        let mut query = StudentQuery {
            class_ids: classes.map(|class| class.id.clone()),
            sex: present(&params.sex),
            citizenship: None,
        };
        match params.citizenship() {
            Parsed::Absent => {}
            Parsed::Valid(rule) => query.citizenship = Some(rule),
            Parsed::Invalid => return Ok((query, Narrowing::Only(Vec::new()))),
        }

        if query.is_unfiltered() {
            return Ok((query, Narrowing::Unfiltered));
        }
        if query.class_ids.is_empty() {
            return Ok((query, Narrowing::Only(Vec::new())));
        }

        let students = self.store.find_students(&query).await?;
        let ids = students.into_iter().map(|student| student.id).collect();
        Ok((query, Narrowing::Only(ids)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn params() -> StatsParams {
        StatsParams::default()
    }

    async fn resolve(store: &MemoryStore, params: &StatsParams) -> ResolvedFilter {
        let calendar = AcademicCalendar::default();
        FilterResolver::new(store, &calendar)
            .resolve(params)
            .await
            .unwrap()
    }

    fn student_count(filter: &ResolvedFilter) -> Option<usize> {
        filter.students.as_slice().map(<[String]>::len)
    }

    #[tokio::test]
    async fn no_filters_resolve_to_unfiltered_without_store_calls() {
        let store = MemoryStore::fixture();
        let filter = resolve(&store, &params()).await;

        assert!(filter.schools.is_unfiltered());
        assert!(filter.classes.is_unfiltered());
        assert!(filter.students.is_unfiltered());
        assert_eq!(filter.dates, DateWindow::Any);
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn blank_values_count_as_absent() {
        let store = MemoryStore::fixture();
        let filter = resolve(
            &store,
            &StatsParams {
                region: Some("  ".into()),
                course_year: Some(String::new()),
                ..params()
            },
        )
        .await;

        assert!(filter.students.is_unfiltered());
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn unmatched_geography_stops_resolution() {
        let store = MemoryStore::fixture();
        let filter = resolve(
            &store,
            &StatsParams {
                region: Some("Molise".into()),
                sex: Some("F".into()),
                ..params()
            },
        )
        .await;

        assert!(filter.schools.is_empty());
        assert!(filter.classes.is_empty());
        assert!(filter.students.is_empty());
        // only the school lookup ran
        assert_eq!(store.calls(), 1);
    }

    #[tokio::test]
    async fn narrower_filters_never_widen_the_scope() {
        let store = MemoryStore::fixture();
        let lazio = StatsParams {
            region: Some("Lazio".into()),
            ..params()
        };
        let rome = StatsParams {
            province: Some("RM".into()),
            ..lazio.clone()
        };

        let wide = resolve(&store, &lazio).await;
        let narrow = resolve(&store, &rome).await;

        assert_eq!(student_count(&wide), Some(6));
        assert_eq!(student_count(&narrow), Some(5));
        let wide_ids = wide.students.as_slice().unwrap();
        assert!(narrow
            .students
            .as_slice()
            .unwrap()
            .iter()
            .all(|id| wide_ids.contains(id)));
    }

    #[tokio::test]
    async fn resolution_is_repeatable() {
        let store = MemoryStore::fixture();
        let narrowed = StatsParams {
            region: Some("Lazio".into()),
            track: Some("LICEO SCIENTIFICO".into()),
            ..params()
        };

        let first = resolve(&store, &narrowed).await;
        let second = resolve(&store, &narrowed).await;
        assert_eq!(first, second);
        assert!(!first.classes.is_empty());
        assert_ne!(first, resolve(&store, &params()).await);
    }

    #[tokio::test]
    async fn invalid_course_year_matches_nothing() {
        let store = MemoryStore::fixture();
        let filter = resolve(
            &store,
            &StatsParams {
                course_year: Some("terzo".into()),
                ..params()
            },
        )
        .await;

        assert!(filter.classes.is_empty());
        assert!(filter.students.is_empty());
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn semesters_map_to_calendar_windows() {
        let store = MemoryStore::fixture();
        let calendar = AcademicCalendar::default();

        let first = resolve(
            &store,
            &StatsParams {
                semester: Some("1".into()),
                ..params()
            },
        )
        .await;
        assert_eq!(first.dates, calendar.first_semester());

        for raw in ["3", "primo"] {
            let other = resolve(
                &store,
                &StatsParams {
                    semester: Some(raw.into()),
                    ..params()
                },
            )
            .await;
            assert_eq!(other.dates, DateWindow::Never);
            assert!(other.grade_query().is_void());
        }
    }

    #[tokio::test]
    async fn citizenship_splits_on_the_italian_code() {
        let store = MemoryStore::fixture();
        let foreign = resolve(
            &store,
            &StatsParams {
                citizenship: Some("Straniera".into()),
                ..params()
            },
        )
        .await;
        let italian = resolve(
            &store,
            &StatsParams {
                citizenship: Some("italiana".into()),
                ..params()
            },
        )
        .await;
        let unknown = resolve(
            &store,
            &StatsParams {
                citizenship: Some("apolide".into()),
                ..params()
            },
        )
        .await;

        assert_eq!(student_count(&foreign), Some(3));
        assert_eq!(student_count(&italian), Some(5));
        assert!(unknown.students.is_empty());
    }

    #[tokio::test]
    async fn class_filters_compose_with_school_filters() {
        let store = MemoryStore::fixture();
        let filter = resolve(
            &store,
            &StatsParams {
                region: Some("Lazio".into()),
                course_year: Some("1".into()),
                track: Some("ISTITUTO TECNICO".into()),
                ..params()
            },
        )
        .await;

        let classes = filter.classes.as_slice().unwrap();
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].id, "C3");
        assert_eq!(filter.students.as_slice().unwrap(), ["STU6".to_string()]);
    }
}
