//! Public statistics surface: each operation resolves the filter set once
//! and hands it to the aggregation engine.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Serialize;

use crate::aggregate::{
    classes_per_year, students_per_year, AggregationEngine, GradeBucket, Rounded, SubjectAverage,
    SubjectCount, YearClassCount, YearStudentCount,
};
use crate::compare::{Comparison, ComparisonReporter, Dimension};
use crate::config::{AcademicCalendar, ITALIAN_CITIZENSHIP};
use crate::error::AppError;
use crate::filters::{FilterResolver, ResolvedFilter, StatsParams};
use crate::models::GradeTotals;
use crate::outliers::{find_outliers, OutlierReport};
use crate::server::AppState;
use crate::store::{ClassQuery, CodeMatch, EntityStore, GradeQuery, SchoolField};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneralStats {
    pub studenti: i64,
    pub docenti: i64,
    pub classi: i64,
    pub voti: i64,
    pub media_voti: Rounded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CitizenshipShares {
    pub italiani: Rounded,
    pub stranieri: Rounded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CitizenshipStats {
    pub italiani: i64,
    pub stranieri: i64,
    pub percentuali: CitizenshipShares,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SemesterSummary {
    pub media: Rounded,
    pub numero_voti: i64,
}

impl From<GradeTotals> for SemesterSummary {
    fn from(totals: GradeTotals) -> Self {
        Self {
            media: Rounded::mean(&totals),
            numero_voti: totals.count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporalTrend {
    pub primo_quadrimestre: SemesterSummary,
    pub secondo_quadrimestre: SemesterSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabeledOption<T> {
    pub value: T,
    pub label: &'static str,
}

fn option<T>(value: T, label: &'static str) -> LabeledOption<T> {
    LabeledOption { value, label }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOptions {
    pub aree_geografiche: Vec<String>,
    pub regioni: Vec<String>,
    pub province: Vec<String>,
    pub comuni: Vec<String>,
    pub indirizzi: Vec<String>,
    pub anni_corso: Vec<i32>,
    pub quadrimestri: Vec<LabeledOption<i32>>,
    pub sesso: Vec<LabeledOption<&'static str>>,
    pub cittadinanza: Vec<LabeledOption<&'static str>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HomeStats {
    pub scuole: i64,
    pub docenti: i64,
    pub classi: i64,
}

pub struct Statistics<'a> {
    store: &'a dyn EntityStore,
    calendar: &'a AcademicCalendar,
}

impl<'a> Statistics<'a> {
    pub fn new(store: &'a dyn EntityStore, calendar: &'a AcademicCalendar) -> Self {
        Self { store, calendar }
    }

    fn engine(&self) -> AggregationEngine<'a> {
        AggregationEngine::new(self.store)
    }

    async fn resolve(&self, params: &StatsParams) -> anyhow::Result<ResolvedFilter> {
        FilterResolver::new(self.store, self.calendar)
            .resolve(params)
            .await
    }

    pub async fn general(&self, params: &StatsParams) -> anyhow::Result<GeneralStats> {
        let filter = self.resolve(params).await?;
        let engine = self.engine();
        let totals = engine.totals(&filter.grade_query()).await?;

        Ok(GeneralStats {
            studenti: engine.count_students(&filter).await?,
            docenti: self.store.count_teachers().await?,
            classi: engine.count_classes(&filter).await?,
            voti: totals.count,
            media_voti: Rounded::mean(&totals),
        })
    }

    pub async fn citizenship(&self, params: &StatsParams) -> anyhow::Result<CitizenshipStats> {
        let filter = self.resolve(&params.without_citizenship()).await?;
        let engine = self.engine();

        let total = engine.count_students(&filter).await?;
        let italiani = engine
            .count_students_where(&filter, CodeMatch::Equals(ITALIAN_CITIZENSHIP.to_string()))
            .await?;
        let stranieri = total - italiani;

        Ok(CitizenshipStats {
            italiani,
            stranieri,
            percentuali: CitizenshipShares {
                italiani: Rounded::percent(italiani, total),
                stranieri: Rounded::percent(stranieri, total),
            },
        })
    }

    pub async fn grades_per_subject(
        &self,
        params: &StatsParams,
    ) -> anyhow::Result<Vec<SubjectCount>> {
        let filter = self.resolve(params).await?;
        self.engine().grades_per_subject(&filter.grade_query()).await
    }

    pub async fn average_per_subject(
        &self,
        params: &StatsParams,
    ) -> anyhow::Result<Vec<SubjectAverage>> {
        let filter = self.resolve(params).await?;
        self.engine().average_per_subject(&filter.grade_query()).await
    }

    pub async fn classes_per_year(
        &self,
        params: &StatsParams,
    ) -> anyhow::Result<Vec<YearClassCount>> {
        let filter = self.resolve(params).await?;
        Ok(classes_per_year(&self.engine().classes(&filter).await?))
    }

    pub async fn students_per_year(
        &self,
        params: &StatsParams,
    ) -> anyhow::Result<Vec<YearStudentCount>> {
        let filter = self.resolve(params).await?;
        Ok(students_per_year(&self.engine().classes(&filter).await?))
    }

    pub async fn grade_distribution(
        &self,
        params: &StatsParams,
    ) -> anyhow::Result<Vec<GradeBucket>> {
        let filter = self.resolve(params).await?;
        self.engine().distribution(&filter.grade_query()).await
    }

    pub async fn compare(&self, dimension: Dimension) -> anyhow::Result<Vec<Comparison>> {
        ComparisonReporter::new(self.store, self.calendar)
            .compare(dimension)
            .await
    }

    pub async fn filter_options(&self) -> anyhow::Result<FilterOptions> {
        Ok(FilterOptions {
            aree_geografiche: self.store.distinct_school_values(SchoolField::Area).await?,
            regioni: self.store.distinct_school_values(SchoolField::Region).await?,
            province: self.store.distinct_school_values(SchoolField::Province).await?,
            comuni: self
                .store
                .distinct_school_values(SchoolField::Municipality)
                .await?,
            indirizzi: self.store.distinct_tracks().await?,
            anni_corso: self.store.distinct_course_years().await?,
            quadrimestri: vec![
                option(1, "Primo Quadrimestre"),
                option(2, "Secondo Quadrimestre"),
            ],
            sesso: vec![option("M", "Maschio"), option("F", "Femmina")],
            cittadinanza: vec![
                option("italiana", "Italiana"),
                option("straniera", "Straniera"),
            ],
        })
    }

    pub async fn temporal_trend(&self, params: &StatsParams) -> anyhow::Result<TemporalTrend> {
        let filter = self.resolve(&params.without_semester()).await?;
        let engine = self.engine();

        let first = engine
            .totals(&filter.grades_within(self.calendar.first_semester()))
            .await?;
        let second = engine
            .totals(&filter.grades_within(self.calendar.second_semester()))
            .await?;

        Ok(TemporalTrend {
            primo_quadrimestre: first.into(),
            secondo_quadrimestre: second.into(),
        })
    }

    pub async fn class_outliers(&self) -> anyhow::Result<OutlierReport> {
        let all_grades = GradeQuery::default();
        let global = self.store.grade_totals(&all_grades).await?;
        let per_class = self.store.grade_totals_by_class(&all_grades).await?;
        let classes = self.store.find_classes(&ClassQuery::default()).await?;
        Ok(find_outliers(&classes, &per_class, &global))
    }

    pub async fn home(&self) -> anyhow::Result<HomeStats> {
        Ok(HomeStats {
            scuole: self.store.count_schools().await?,
            docenti: self.store.count_teachers().await?,
            classi: self.store.count_classes().await?,
        })
    }
}

pub async fn general(
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
) -> Result<Json<GeneralStats>, AppError> {
    Ok(Json(state.statistics().general(&params).await?))
}

pub async fn citizenship_distribution(
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
) -> Result<Json<CitizenshipStats>, AppError> {
    Ok(Json(state.statistics().citizenship(&params).await?))
}

pub async fn grades_per_subject(
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
) -> Result<Json<Vec<SubjectCount>>, AppError> {
    Ok(Json(state.statistics().grades_per_subject(&params).await?))
}

pub async fn average_per_subject(
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
) -> Result<Json<Vec<SubjectAverage>>, AppError> {
    Ok(Json(state.statistics().average_per_subject(&params).await?))
}

pub async fn classes_per_year_handler(
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
) -> Result<Json<Vec<YearClassCount>>, AppError> {
    Ok(Json(state.statistics().classes_per_year(&params).await?))
}

pub async fn students_per_year_handler(
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
) -> Result<Json<Vec<YearStudentCount>>, AppError> {
    Ok(Json(state.statistics().students_per_year(&params).await?))
}

pub async fn grade_distribution(
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
) -> Result<Json<Vec<GradeBucket>>, AppError> {
    Ok(Json(state.statistics().grade_distribution(&params).await?))
}

pub async fn compare_area(
    State(state): State<AppState>,
) -> Result<Json<Vec<Comparison>>, AppError> {
    Ok(Json(state.statistics().compare(Dimension::Area).await?))
}

pub async fn compare_region(
    State(state): State<AppState>,
) -> Result<Json<Vec<Comparison>>, AppError> {
    Ok(Json(state.statistics().compare(Dimension::Region).await?))
}

pub async fn compare_track(
    State(state): State<AppState>,
) -> Result<Json<Vec<Comparison>>, AppError> {
    Ok(Json(state.statistics().compare(Dimension::Track).await?))
}

pub async fn filter_options(
    State(state): State<AppState>,
) -> Result<Json<FilterOptions>, AppError> {
    Ok(Json(state.statistics().filter_options().await?))
}

pub async fn temporal_trend(
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
) -> Result<Json<TemporalTrend>, AppError> {
    Ok(Json(state.statistics().temporal_trend(&params).await?))
}

pub async fn class_outliers(
    State(state): State<AppState>,
) -> Result<Json<OutlierReport>, AppError> {
    Ok(Json(state.statistics().class_outliers().await?))
}

pub async fn home_stats(State(state): State<AppState>) -> Result<Json<HomeStats>, AppError> {
    Ok(Json(state.statistics().home().await?))
}
