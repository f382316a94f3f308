//! Aggregation engine: counts, averages, grouped breakdowns and the dense
//! grade distribution, computed over a [`ResolvedFilter`].
//!
//! An explicitly empty scope is answered here with zero-valued results and
//! never reaches the store.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};

use crate::filters::ResolvedFilter;
use crate::models::{Class, GradeTotals};
use crate::store::{ClassQuery, CodeMatch, EntityStore, GradeQuery, Narrowing, StudentQuery};

pub const GRADE_SCALE: std::ops::RangeInclusive<i32> = 0..=10;

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// A figure reported at two-decimal fixed precision; `"0.00"` when there is
/// nothing to report.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rounded(Option<f64>);

impl Rounded {
    pub fn value(value: f64) -> Self {
        Self(Some(round2(value)))
    }

    pub fn mean(totals: &GradeTotals) -> Self {
        Self(totals.mean().map(round2))
    }

    pub fn percent(part: i64, total: i64) -> Self {
        if total == 0 {
            return Self(None);
        }
        Self::value(part as f64 / total as f64 * 100.0)
    }

    pub fn as_f64(&self) -> f64 {
        self.0.unwrap_or(0.0)
    }
}

impl fmt::Display for Rounded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.as_f64())
    }
}

impl Serialize for Rounded {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectCount {
    pub materia: String,
    pub numero_voti: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectAverage {
    pub materia: String,
    pub media: Rounded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearClassCount {
    pub annocorso: i32,
    pub numero_classi: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearStudentCount {
    pub annocorso: i32,
    pub numero_studenti: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeBucket {
    pub voto: i32,
    pub count: i64,
}

/// Groups rows by key and folds each group into a metric; keys come back in
/// ascending order.
pub fn group_by<T, K, M>(
    rows: &[T],
    key: impl Fn(&T) -> K,
    mut fold: impl FnMut(&mut M, &T),
) -> Vec<(K, M)>
where
    K: Ord,
    M: Default,
{
    let mut groups: BTreeMap<K, M> = BTreeMap::new();
    for row in rows {
        fold(groups.entry(key(row)).or_default(), row);
    }
    groups.into_iter().collect()
}

pub fn classes_per_year(classes: &[Class]) -> Vec<YearClassCount> {
    group_by(classes, |class| class.course_year, |count: &mut i64, _| {
        *count += 1
    })
    .into_iter()
    .map(|(annocorso, numero_classi)| YearClassCount {
        annocorso,
        numero_classi,
    })
    .collect()
}

pub fn students_per_year(classes: &[Class]) -> Vec<YearStudentCount> {
    group_by(
        classes,
        |class| class.course_year,
        |total: &mut i64, class| *total += i64::from(class.headcount),
    )
    .into_iter()
    .map(|(annocorso, numero_studenti)| YearStudentCount {
        annocorso,
        numero_studenti,
    })
    .collect()
}

/// Expands sparse `(value, count)` pairs into one bucket per scale value.
/// Values off the integer scale are not reported.
pub fn dense_distribution(counts: &[(f64, i64)]) -> Vec<GradeBucket> {
    GRADE_SCALE
        .map(|voto| GradeBucket {
            voto,
            count: counts
                .iter()
                .filter(|(value, _)| *value == f64::from(voto))
                .map(|(_, count)| count)
                .sum(),
        })
        .collect()
}

pub struct AggregationEngine<'a> {
    store: &'a dyn EntityStore,
}

impl<'a> AggregationEngine<'a> {
    pub fn new(store: &'a dyn EntityStore) -> Self {
        Self { store }
    }

    pub async fn count_students(&self, filter: &ResolvedFilter) -> anyhow::Result<i64> {
        match &filter.students {
            Narrowing::Only(ids) => Ok(ids.len() as i64),
            Narrowing::Unfiltered => self.store.count_students(&StudentQuery::default()).await,
        }
    }

    /// Students in scope whose citizenship code satisfies `rule`.
    pub async fn count_students_where(
        &self,
        filter: &ResolvedFilter,
        rule: CodeMatch,
    ) -> anyhow::Result<i64> {
        if filter.students.is_empty() {
            return Ok(0);
        }
        self.store
            .count_students(&filter.student_query.with_citizenship(rule))
            .await
    }

    pub async fn count_classes(&self, filter: &ResolvedFilter) -> anyhow::Result<i64> {
        match &filter.classes {
            Narrowing::Only(classes) => Ok(classes.len() as i64),
            Narrowing::Unfiltered => self.store.count_classes().await,
        }
    }

    pub async fn count_schools(&self, filter: &ResolvedFilter) -> anyhow::Result<i64> {
        match &filter.schools {
            Narrowing::Only(codes) => Ok(codes.len() as i64),
            Narrowing::Unfiltered => self.store.count_schools().await,
        }
    }

    pub async fn classes(&self, filter: &ResolvedFilter) -> anyhow::Result<Vec<Class>> {
        match &filter.classes {
            Narrowing::Only(classes) => Ok(classes.clone()),
            Narrowing::Unfiltered => self.store.find_classes(&ClassQuery::default()).await,
        }
    }

    pub async fn totals(&self, query: &GradeQuery) -> anyhow::Result<GradeTotals> {
        if query.is_void() {
            return Ok(GradeTotals::default());
        }
        self.store.grade_totals(query).await
    }

    pub async fn average(&self, query: &GradeQuery) -> anyhow::Result<Rounded> {
        Ok(Rounded::mean(&self.totals(query).await?))
    }

    /// Grade count per subject, most graded first; ties by subject name.
    pub async fn grades_per_subject(
        &self,
        query: &GradeQuery,
    ) -> anyhow::Result<Vec<SubjectCount>> {
        let mut rows: Vec<SubjectCount> = self
            .subject_totals(query)
            .await?
            .into_iter()
            .map(|(materia, totals)| SubjectCount {
                materia,
                numero_voti: totals.count,
            })
            .collect();
        rows.sort_by(|a, b| {
            b.numero_voti
                .cmp(&a.numero_voti)
                .then_with(|| a.materia.cmp(&b.materia))
        });
        Ok(rows)
    }

    /// Average per subject, ascending by subject name.
    pub async fn average_per_subject(
        &self,
        query: &GradeQuery,
    ) -> anyhow::Result<Vec<SubjectAverage>> {
        let mut rows: Vec<SubjectAverage> = self
            .subject_totals(query)
            .await?
            .into_iter()
            .map(|(materia, totals)| SubjectAverage {
                materia,
                media: Rounded::mean(&totals),
            })
            .collect();
        rows.sort_by(|a, b| a.materia.cmp(&b.materia));
        Ok(rows)
    }

    pub async fn distribution(&self, query: &GradeQuery) -> anyhow::Result<Vec<GradeBucket>> {
        if query.is_void() {
            return Ok(dense_distribution(&[]));
        }
        let counts = self.store.grade_counts_by_value(query).await?;
        Ok(dense_distribution(&counts))
    }

    async fn subject_totals(
        &self,
        query: &GradeQuery,
    ) -> anyhow::Result<Vec<(String, GradeTotals)>> {
        if query.is_void() {
            return Ok(Vec::new());
        }
        self.store.grade_totals_by_subject(query).await
    }
}
