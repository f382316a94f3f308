//! Entity store seam.
//!
//! Every statistic and registry operation reaches the data through
//! [`EntityStore`]. Queries are plain descriptors: each optional field is an
//! equality clause, each [`Narrowing`] a set-membership clause that is either
//! disabled (`Unfiltered`) or an explicit id list (`Only`, possibly empty).

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::models::{
    Assignment, Class, Grade, GradeTotals, GradeUpdate, IntegrityCounts, School, Student, Teacher,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Narrowing<T> {
    Unfiltered,
    Only(Vec<T>),
}

impl<T> Default for Narrowing<T> {
    fn default() -> Self {
        Narrowing::Unfiltered
    }
}

impl<T> Narrowing<T> {
    pub fn is_unfiltered(&self) -> bool {
        matches!(self, Narrowing::Unfiltered)
    }

    /// True only for an explicit, empty id list.
    pub fn is_empty(&self) -> bool {
        matches!(self, Narrowing::Only(items) if items.is_empty())
    }

    pub fn as_slice(&self) -> Option<&[T]> {
        match self {
            Narrowing::Unfiltered => None,
            Narrowing::Only(items) => Some(items.as_slice()),
        }
    }

    pub fn map<U>(&self, f: impl FnMut(&T) -> U) -> Narrowing<U> {
        match self {
            Narrowing::Unfiltered => Narrowing::Unfiltered,
            Narrowing::Only(items) => Narrowing::Only(items.iter().map(f).collect()),
        }
    }
}

/// Grade date constraint. `Between` is half-open: `from <= date < until`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateWindow {
    #[default]
    Any,
    Between {
        from: NaiveDate,
        until: NaiveDate,
    },
    Never,
}

impl DateWindow {
    pub fn lower(&self) -> Option<NaiveDate> {
        match self {
            DateWindow::Between { from, .. } => Some(*from),
            _ => None,
        }
    }

    pub fn upper(&self) -> Option<NaiveDate> {
        match self {
            DateWindow::Between { until, .. } => Some(*until),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchoolQuery {
    pub area: Option<String>,
    pub region: Option<String>,
    pub province: Option<String>,
    pub municipality: Option<String>,
}

impl SchoolQuery {
    pub fn is_empty(&self) -> bool {
        self.area.is_none()
            && self.region.is_none()
            && self.province.is_none()
            && self.municipality.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassQuery {
    pub ids: Narrowing<String>,
    pub school_codes: Narrowing<String>,
    pub school_code: Option<String>,
    pub track: Option<String>,
    pub course_year: Option<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CodeMatch {
    Equals(String),
    NotEquals(String),
}

impl CodeMatch {
    pub fn equals(&self) -> Option<&str> {
        match self {
            CodeMatch::Equals(code) => Some(code),
            CodeMatch::NotEquals(_) => None,
        }
    }

    pub fn not_equals(&self) -> Option<&str> {
        match self {
            CodeMatch::NotEquals(code) => Some(code),
            CodeMatch::Equals(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudentQuery {
    pub class_ids: Narrowing<String>,
    pub sex: Option<String>,
    pub citizenship: Option<CodeMatch>,
}

impl StudentQuery {
    pub fn is_unfiltered(&self) -> bool {
        self.class_ids.is_unfiltered() && self.sex.is_none() && self.citizenship.is_none()
    }

    pub fn with_citizenship(&self, citizenship: CodeMatch) -> Self {
        Self {
            citizenship: Some(citizenship),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GradeQuery {
    pub students: Narrowing<String>,
    pub dates: DateWindow,
    pub teacher_id: Option<String>,
    pub subject: Option<String>,
}

impl GradeQuery {
    pub fn for_student(student_id: &str) -> Self {
        Self {
            students: Narrowing::Only(vec![student_id.to_string()]),
            ..Self::default()
        }
    }

    /// A query that cannot match any grade, whatever the store holds.
    pub fn is_void(&self) -> bool {
        self.students.is_empty() || self.dates == DateWindow::Never
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchoolField {
    Area,
    Region,
    Province,
    Municipality,
}

impl SchoolField {
    pub fn column(&self) -> &'static str {
        match self {
            SchoolField::Area => "area",
            SchoolField::Region => "region",
            SchoolField::Province => "province",
            SchoolField::Municipality => "municipality",
        }
    }
}

#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn find_schools(&self, query: &SchoolQuery) -> anyhow::Result<Vec<School>>;
    async fn find_classes(&self, query: &ClassQuery) -> anyhow::Result<Vec<Class>>;
    async fn find_students(&self, query: &StudentQuery) -> anyhow::Result<Vec<Student>>;
    async fn count_students(&self, query: &StudentQuery) -> anyhow::Result<i64>;
    async fn count_schools(&self) -> anyhow::Result<i64>;
    async fn count_classes(&self) -> anyhow::Result<i64>;
    async fn count_teachers(&self) -> anyhow::Result<i64>;

    async fn grade_totals(&self, query: &GradeQuery) -> anyhow::Result<GradeTotals>;
    async fn grade_totals_by_subject(
        &self,
        query: &GradeQuery,
    ) -> anyhow::Result<Vec<(String, GradeTotals)>>;
    async fn grade_totals_by_class(
        &self,
        query: &GradeQuery,
    ) -> anyhow::Result<Vec<(String, GradeTotals)>>;
    async fn grade_counts_by_value(&self, query: &GradeQuery) -> anyhow::Result<Vec<(f64, i64)>>;

    async fn distinct_school_values(&self, field: SchoolField) -> anyhow::Result<Vec<String>>;
    async fn distinct_tracks(&self) -> anyhow::Result<Vec<String>>;
    async fn distinct_course_years(&self) -> anyhow::Result<Vec<i32>>;

    async fn find_student(&self, student_id: &str) -> anyhow::Result<Option<Student>>;
    async fn find_class(&self, class_id: &str) -> anyhow::Result<Option<Class>>;
    async fn find_teacher(&self, teacher_id: &str) -> anyhow::Result<Option<Teacher>>;
    async fn find_assignments(&self, teacher_id: &str) -> anyhow::Result<Vec<Assignment>>;
    async fn find_grades(&self, query: &GradeQuery) -> anyhow::Result<Vec<Grade>>;
    async fn insert_grades(&self, grades: &[Grade]) -> anyhow::Result<()>;
    async fn update_grade(
        &self,
        grade_id: &str,
        teacher_id: &str,
        update: &GradeUpdate,
    ) -> anyhow::Result<bool>;
    async fn delete_grade(&self, grade_id: &str, teacher_id: &str) -> anyhow::Result<bool>;

    async fn integrity(&self) -> anyhow::Result<IntegrityCounts>;
}
