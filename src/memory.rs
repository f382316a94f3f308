//! In-memory [`EntityStore`] used by the unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;

use crate::models::{
    AssessmentKind, Assignment, Class, Grade, GradeTotals, GradeUpdate, IntegrityCounts, School,
    Student, Teacher,
};
use crate::store::{
    ClassQuery, CodeMatch, DateWindow, EntityStore, GradeQuery, Narrowing, SchoolField,
    SchoolQuery, StudentQuery,
};

fn eq_or_absent(wanted: &Option<String>, actual: &str) -> bool {
    wanted.as_deref().map_or(true, |wanted| wanted == actual)
}

impl<T: PartialEq> Narrowing<T> {
    fn admits(&self, item: &T) -> bool {
        match self {
            Narrowing::Unfiltered => true,
            Narrowing::Only(items) => items.contains(item),
        }
    }
}

impl DateWindow {
    fn contains(&self, date: NaiveDate) -> bool {
        match self {
            DateWindow::Any => true,
            DateWindow::Between { from, until } => *from <= date && date < *until,
            DateWindow::Never => false,
        }
    }
}

impl SchoolQuery {
    fn matches(&self, school: &School) -> bool {
        eq_or_absent(&self.area, &school.area)
            && eq_or_absent(&self.region, &school.region)
            && eq_or_absent(&self.province, &school.province)
            && eq_or_absent(&self.municipality, &school.municipality)
    }
}

impl ClassQuery {
    fn matches(&self, class: &Class) -> bool {
        self.ids.admits(&class.id)
            && self.school_codes.admits(&class.school_code)
            && eq_or_absent(&self.school_code, &class.school_code)
            && eq_or_absent(&self.track, &class.track_norm)
            && self.course_year.map_or(true, |year| year == class.course_year)
    }
}

impl CodeMatch {
    fn matches(&self, code: &str) -> bool {
        match self {
            CodeMatch::Equals(wanted) => wanted == code,
            CodeMatch::NotEquals(excluded) => excluded != code,
        }
    }
}

impl StudentQuery {
    fn matches(&self, student: &Student) -> bool {
        self.class_ids.admits(&student.class_id)
            && eq_or_absent(&self.sex, &student.sex)
            && self
                .citizenship
                .as_ref()
                .map_or(true, |rule| rule.matches(&student.citizenship))
    }
}

impl GradeQuery {
    fn matches(&self, grade: &Grade) -> bool {
        self.students.admits(&grade.student_id)
            && self.dates.contains(grade.date)
            && eq_or_absent(&self.teacher_id, &grade.teacher_id)
            && eq_or_absent(&self.subject, &grade.subject)
    }
}

impl SchoolField {
    fn value<'s>(&self, school: &'s School) -> &'s str {
        match self {
            SchoolField::Area => &school.area,
            SchoolField::Region => &school.region,
            SchoolField::Province => &school.province,
            SchoolField::Municipality => &school.municipality,
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    pub schools: RwLock<Vec<School>>,
    pub classes: RwLock<Vec<Class>>,
    pub students: RwLock<Vec<Student>>,
    pub teachers: RwLock<Vec<Teacher>>,
    pub assignments: RwLock<Vec<Assignment>>,
    pub grades: RwLock<Vec<Grade>>,
    calls: AtomicUsize,
    failing: AtomicBool,
}

fn school(code: &str, area: &str, region: &str, province: &str, municipality: &str) -> School {
    School {
        code: code.into(),
        name: None,
        area: area.into(),
        region: region.into(),
        province: province.into(),
        municipality: municipality.into(),
    }
}

fn class(id: &str, school_code: &str, track: &str, course_year: i32, headcount: i32) -> Class {
    Class {
        id: id.into(),
        school_code: school_code.into(),
        name: format!("Classe {id}"),
        track: track.to_lowercase(),
        track_norm: track.into(),
        course_year,
        headcount,
    }
}

fn student(id: &str, class_id: &str, sex: &str, citizenship: &str) -> Student {
    Student {
        id: id.into(),
        class_id: class_id.into(),
        first_name: format!("Nome{id}"),
        last_name: format!("Cognome{id}"),
        sex: sex.into(),
        citizenship: citizenship.into(),
    }
}

fn teacher(id: &str, last_name: &str) -> Teacher {
    Teacher {
        id: id.into(),
        first_name: "Prof".into(),
        last_name: last_name.into(),
    }
}

fn assignment(teacher_id: &str, class_id: &str, subject: &str) -> Assignment {
    Assignment {
        teacher_id: teacher_id.into(),
        class_id: class_id.into(),
        subject: subject.into(),
    }
}

pub fn day(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

fn grade(
    id: &str,
    student_id: &str,
    teacher_id: &str,
    subject: &str,
    value: f64,
    kind: AssessmentKind,
    date: NaiveDate,
) -> Grade {
    Grade {
        id: id.into(),
        student_id: student_id.into(),
        teacher_id: teacher_id.into(),
        subject: subject.into(),
        value,
        kind,
        date,
    }
}

impl MemoryStore {
    /// Four schools in three areas, five classes (one without students),
    /// eight students, three teachers and ten grades spread over both
    /// semesters.
    pub fn fixture() -> Self {
        use AssessmentKind::*;

        let schools = vec![
            school("RMPS01", "CENTRO", "Lazio", "RM", "ROMA"),
            school("LTTF02", "CENTRO", "Lazio", "LT", "LATINA"),
            school("MIPS03", "NORD OVEST", "Lombardia", "MI", "MILANO"),
            school("NAPC04", "SUD", "Campania", "NA", "NAPOLI"),
        ];
        let classes = vec![
            class("C1", "RMPS01", "LICEO SCIENTIFICO", 1, 3),
            class("C2", "RMPS01", "LICEO SCIENTIFICO", 2, 2),
            class("C3", "LTTF02", "ISTITUTO TECNICO", 1, 1),
            class("C4", "MIPS03", "LICEO SCIENTIFICO", 3, 2),
            class("C5", "NAPC04", "LICEO CLASSICO", 5, 1),
        ];
        let students = vec![
            student("STU1", "C1", "M", "ITA"),
            student("STU2", "C1", "F", "ALB"),
            student("STU3", "C1", "F", "ROU"),
            student("STU4", "C2", "M", "ITA"),
            student("STU5", "C2", "F", "ITA"),
            student("STU6", "C3", "M", "MAR"),
            student("STU7", "C4", "F", "ITA"),
            student("STU8", "C4", "M", "ITA"),
        ];
        let teachers = vec![
            teacher("DOC1", "Rossi"),
            teacher("DOC2", "Bianchi"),
            teacher("DOC3", "Verdi"),
        ];
        let assignments = vec![
            assignment("DOC1", "C1", "Matematica"),
            assignment("DOC1", "C2", "Matematica"),
            assignment("DOC2", "C1", "Italiano"),
            assignment("DOC2", "C4", "Italiano"),
            assignment("DOC3", "C3", "Informatica"),
            assignment("DOC3", "C4", "Matematica"),
        ];
        let grades = vec![
            grade("G1", "STU1", "DOC1", "Matematica", 6.0, Scritto, day(2023, 10, 10)),
            grade("G2", "STU1", "DOC2", "Italiano", 7.0, Orale, day(2024, 3, 5)),
            grade("G3", "STU2", "DOC1", "Matematica", 8.0, Scritto, day(2023, 11, 12)),
            grade("G4", "STU3", "DOC1", "Matematica", 8.0, Orale, day(2024, 2, 20)),
            grade("G5", "STU4", "DOC1", "Matematica", 6.0, Scritto, day(2023, 12, 1)),
            grade("G6", "STU5", "DOC1", "Matematica", 8.0, Orale, day(2024, 4, 15)),
            grade("G7", "STU6", "DOC3", "Informatica", 4.0, Pratico, day(2023, 10, 20)),
            grade("G8", "STU7", "DOC2", "Italiano", 9.0, Scritto, day(2024, 5, 10)),
            grade("G9", "STU8", "DOC3", "Matematica", 10.0, Scritto, day(2024, 1, 15)),
            grade("G10", "STU7", "DOC3", "Matematica", 9.0, Orale, day(2024, 3, 1)),
        ];

        Self {
            schools: RwLock::new(schools),
            classes: RwLock::new(classes),
            students: RwLock::new(students),
            teachers: RwLock::new(teachers),
            assignments: RwLock::new(assignments),
            grades: RwLock::new(grades),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Makes every subsequent store call fail.
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    fn touch(&self) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("store unavailable");
        }
        Ok(())
    }

    async fn grouped_totals(
        &self,
        query: &GradeQuery,
        key: impl Fn(&Grade) -> Option<String>,
    ) -> Vec<(String, GradeTotals)> {
        let mut groups: Vec<(String, GradeTotals)> = Vec::new();
        for grade in self.grades.read().await.iter().filter(|g| query.matches(g)) {
            let Some(key) = key(grade) else { continue };
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, totals)) => totals.add(grade.value),
                None => {
                    let mut totals = GradeTotals::default();
                    totals.add(grade.value);
                    groups.push((key, totals));
                }
            }
        }
        groups
    }
}

fn distinct_sorted<T: Ord>(mut values: Vec<T>) -> Vec<T> {
    values.sort();
    values.dedup();
    values
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn find_schools(&self, query: &SchoolQuery) -> anyhow::Result<Vec<School>> {
        self.touch()?;
        let schools = self.schools.read().await;
        Ok(schools.iter().filter(|s| query.matches(s)).cloned().collect())
    }

    async fn find_classes(&self, query: &ClassQuery) -> anyhow::Result<Vec<Class>> {
        self.touch()?;
        let classes = self.classes.read().await;
        Ok(classes.iter().filter(|c| query.matches(c)).cloned().collect())
    }

    async fn find_students(&self, query: &StudentQuery) -> anyhow::Result<Vec<Student>> {
        self.touch()?;
        let students = self.students.read().await;
        Ok(students.iter().filter(|s| query.matches(s)).cloned().collect())
    }

    async fn count_students(&self, query: &StudentQuery) -> anyhow::Result<i64> {
        self.touch()?;
        let students = self.students.read().await;
        Ok(students.iter().filter(|s| query.matches(s)).count() as i64)
    }

    async fn count_schools(&self) -> anyhow::Result<i64> {
        self.touch()?;
        Ok(self.schools.read().await.len() as i64)
    }

    async fn count_classes(&self) -> anyhow::Result<i64> {
        self.touch()?;
        Ok(self.classes.read().await.len() as i64)
    }

    async fn count_teachers(&self) -> anyhow::Result<i64> {
        self.touch()?;
        Ok(self.teachers.read().await.len() as i64)
    }

    async fn grade_totals(&self, query: &GradeQuery) -> anyhow::Result<GradeTotals> {
        self.touch()?;
        let mut totals = GradeTotals::default();
        for grade in self.grades.read().await.iter().filter(|g| query.matches(g)) {
            totals.add(grade.value);
        }
        Ok(totals)
    }

    async fn grade_totals_by_subject(
        &self,
        query: &GradeQuery,
    ) -> anyhow::Result<Vec<(String, GradeTotals)>> {
        self.touch()?;
        Ok(self
            .grouped_totals(query, |grade| Some(grade.subject.clone()))
            .await)
    }

    async fn grade_totals_by_class(
        &self,
        query: &GradeQuery,
    ) -> anyhow::Result<Vec<(String, GradeTotals)>> {
        self.touch()?;
        let students = self.students.read().await.clone();
        Ok(self
            .grouped_totals(query, |grade| {
                students
                    .iter()
                    .find(|s| s.id == grade.student_id)
                    .map(|s| s.class_id.clone())
            })
            .await)
    }

    async fn grade_counts_by_value(&self, query: &GradeQuery) -> anyhow::Result<Vec<(f64, i64)>> {
        self.touch()?;
        let mut counts: Vec<(f64, i64)> = Vec::new();
        for grade in self.grades.read().await.iter().filter(|g| query.matches(g)) {
            match counts.iter_mut().find(|(value, _)| *value == grade.value) {
                Some((_, count)) => *count += 1,
                None => counts.push((grade.value, 1)),
            }
        }
        Ok(counts)
    }

    async fn distinct_school_values(&self, field: SchoolField) -> anyhow::Result<Vec<String>> {
        self.touch()?;
        let schools = self.schools.read().await;
        Ok(distinct_sorted(
            schools.iter().map(|s| field.value(s).to_string()).collect(),
        ))
    }

    async fn distinct_tracks(&self) -> anyhow::Result<Vec<String>> {
        self.touch()?;
        let classes = self.classes.read().await;
        Ok(distinct_sorted(
            classes.iter().map(|c| c.track_norm.clone()).collect(),
        ))
    }

    async fn distinct_course_years(&self) -> anyhow::Result<Vec<i32>> {
        self.touch()?;
        let classes = self.classes.read().await;
        Ok(distinct_sorted(classes.iter().map(|c| c.course_year).collect()))
    }

    async fn find_student(&self, student_id: &str) -> anyhow::Result<Option<Student>> {
        self.touch()?;
        let students = self.students.read().await;
        Ok(students.iter().find(|s| s.id == student_id).cloned())
    }

    async fn find_class(&self, class_id: &str) -> anyhow::Result<Option<Class>> {
        self.touch()?;
        let classes = self.classes.read().await;
        Ok(classes.iter().find(|c| c.id == class_id).cloned())
    }

    async fn find_teacher(&self, teacher_id: &str) -> anyhow::Result<Option<Teacher>> {
        self.touch()?;
        let teachers = self.teachers.read().await;
        Ok(teachers.iter().find(|t| t.id == teacher_id).cloned())
    }

    async fn find_assignments(&self, teacher_id: &str) -> anyhow::Result<Vec<Assignment>> {
        self.touch()?;
        let assignments = self.assignments.read().await;
        Ok(assignments
            .iter()
            .filter(|a| a.teacher_id == teacher_id)
            .cloned()
            .collect())
    }

    async fn find_grades(&self, query: &GradeQuery) -> anyhow::Result<Vec<Grade>> {
        self.touch()?;
        let mut grades: Vec<Grade> = self
            .grades
            .read()
            .await
            .iter()
            .filter(|g| query.matches(g))
            .cloned()
            .collect();
        grades.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.id.cmp(&b.id)));
        Ok(grades)
    }

    async fn insert_grades(&self, grades: &[Grade]) -> anyhow::Result<()> {
        self.touch()?;
        self.grades.write().await.extend_from_slice(grades);
        Ok(())
    }

    async fn update_grade(
        &self,
        grade_id: &str,
        teacher_id: &str,
        update: &GradeUpdate,
    ) -> anyhow::Result<bool> {
        self.touch()?;
        let mut grades = self.grades.write().await;
        let Some(grade) = grades
            .iter_mut()
            .find(|g| g.id == grade_id && g.teacher_id == teacher_id)
        else {
            return Ok(false);
        };
        grade.value = update.value;
        if let Some(kind) = update.kind {
            grade.kind = kind;
        }
        Ok(true)
    }

    async fn delete_grade(&self, grade_id: &str, teacher_id: &str) -> anyhow::Result<bool> {
        self.touch()?;
        let mut grades = self.grades.write().await;
        let before = grades.len();
        grades.retain(|g| !(g.id == grade_id && g.teacher_id == teacher_id));
        Ok(grades.len() < before)
    }

    async fn integrity(&self) -> anyhow::Result<IntegrityCounts> {
        self.touch()?;
        let schools = self.schools.read().await;
        let classes = self.classes.read().await;
        let students = self.students.read().await;
        let teachers = self.teachers.read().await;
        let grades = self.grades.read().await;

        Ok(IntegrityCounts {
            students: students.len() as i64,
            students_without_class: students
                .iter()
                .filter(|s| !classes.iter().any(|c| c.id == s.class_id))
                .count() as i64,
            classes_without_school: classes
                .iter()
                .filter(|c| !schools.iter().any(|s| s.code == c.school_code))
                .count() as i64,
            grades: grades.len() as i64,
            grades_without_student: grades
                .iter()
                .filter(|g| !students.iter().any(|s| s.id == g.student_id))
                .count() as i64,
            grades_without_teacher: grades
                .iter()
                .filter(|g| !teachers.iter().any(|t| t.id == g.teacher_id))
                .count() as i64,
        })
    }
}
