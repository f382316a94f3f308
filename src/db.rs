use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::query_builder::Separated;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Row};

use crate::models::{
    AssessmentKind, Assignment, Class, Grade, GradeTotals, GradeUpdate, IntegrityCounts, School,
    Student, Teacher,
};
use crate::store::{ClassQuery, EntityStore, GradeQuery, SchoolField, SchoolQuery, StudentQuery};

/// Rows per multi-value INSERT; keeps the bind count well under the
/// Postgres limit of 65535 parameters.
const BATCH_SIZE: usize = 1000;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// A model that maps onto one `gradebook` table.
pub trait Record {
    const TABLE: &'static str;
    const COLUMNS: &'static str;
    const KEY: &'static str;

    fn push_row(&self, row: Separated<'_, '_, Postgres, &'static str>);
}

impl Record for School {
    const TABLE: &'static str = "schools";
    const COLUMNS: &'static str = "school_code, name, area, region, province, municipality";
    const KEY: &'static str = "school_code";

    fn push_row(&self, mut row: Separated<'_, '_, Postgres, &'static str>) {
        row.push_bind(self.code.clone())
            .push_bind(self.name.clone())
            .push_bind(self.area.clone())
            .push_bind(self.region.clone())
            .push_bind(self.province.clone())
            .push_bind(self.municipality.clone());
    }
}

impl Record for Class {
    const TABLE: &'static str = "classes";
    const COLUMNS: &'static str =
        "class_id, school_code, name, track, track_norm, course_year, headcount";
    const KEY: &'static str = "class_id";

    fn push_row(&self, mut row: Separated<'_, '_, Postgres, &'static str>) {
        row.push_bind(self.id.clone())
            .push_bind(self.school_code.clone())
            .push_bind(self.name.clone())
            .push_bind(self.track.clone())
            .push_bind(self.track_norm.clone())
            .push_bind(self.course_year)
            .push_bind(self.headcount);
    }
}

impl Record for Student {
    const TABLE: &'static str = "students";
    const COLUMNS: &'static str = "student_id, class_id, first_name, last_name, sex, citizenship";
    const KEY: &'static str = "student_id";

    fn push_row(&self, mut row: Separated<'_, '_, Postgres, &'static str>) {
        row.push_bind(self.id.clone())
            .push_bind(self.class_id.clone())
            .push_bind(self.first_name.clone())
            .push_bind(self.last_name.clone())
            .push_bind(self.sex.clone())
            .push_bind(self.citizenship.clone());
    }
}

impl Record for Teacher {
    const TABLE: &'static str = "teachers";
    const COLUMNS: &'static str = "teacher_id, first_name, last_name";
    const KEY: &'static str = "teacher_id";

    fn push_row(&self, mut row: Separated<'_, '_, Postgres, &'static str>) {
        row.push_bind(self.id.clone())
            .push_bind(self.first_name.clone())
            .push_bind(self.last_name.clone());
    }
}

impl Record for Assignment {
    const TABLE: &'static str = "assignments";
    const COLUMNS: &'static str = "teacher_id, class_id, subject";
    const KEY: &'static str = "teacher_id, class_id, subject";

    fn push_row(&self, mut row: Separated<'_, '_, Postgres, &'static str>) {
        row.push_bind(self.teacher_id.clone())
            .push_bind(self.class_id.clone())
            .push_bind(self.subject.clone());
    }
}

impl Record for Grade {
    const TABLE: &'static str = "grades";
    const COLUMNS: &'static str =
        "grade_id, student_id, teacher_id, subject, value, kind, graded_on";
    const KEY: &'static str = "grade_id";

    fn push_row(&self, mut row: Separated<'_, '_, Postgres, &'static str>) {
        row.push_bind(self.id.clone())
            .push_bind(self.student_id.clone())
            .push_bind(self.teacher_id.clone())
            .push_bind(self.subject.clone())
            .push_bind(self.value)
            .push_bind(self.kind.as_str())
            .push_bind(self.date);
    }
}

/// Inserts `rows` in batches, skipping keys that already exist. Returns the
/// number of rows actually written.
pub async fn insert_batch<R: Record>(conn: &mut PgConnection, rows: &[R]) -> anyhow::Result<u64> {
    let mut inserted = 0;
    for chunk in rows.chunks(BATCH_SIZE) {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "INSERT INTO gradebook.{} ({}) ",
            R::TABLE,
            R::COLUMNS
        ));
        builder.push_values(chunk, |row, record| record.push_row(row));
        builder.push(format!(" ON CONFLICT ({}) DO NOTHING", R::KEY));
        inserted += builder
            .build()
            .execute(&mut *conn)
            .await
            .with_context(|| format!("inserting into gradebook.{}", R::TABLE))?
            .rows_affected();
    }
    Ok(inserted)
}

pub async fn truncate_all(conn: &mut PgConnection) -> anyhow::Result<()> {
    sqlx::query(
        "TRUNCATE gradebook.schools, gradebook.classes, gradebook.students, \
         gradebook.teachers, gradebook.assignments, gradebook.grades",
    )
    .execute(conn)
    .await
    .context("emptying gradebook tables")?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    use AssessmentKind::{Orale, Pratico, Scritto};

    let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).context("invalid date");

    let schools = vec![
        School {
            code: "RMPS12000A".into(),
            name: Some("Liceo Scientifico Galileo Galilei".into()),
            area: "CENTRO".into(),
            region: "LAZIO".into(),
            province: "ROMA".into(),
            municipality: "ROMA".into(),
        },
        School {
            code: "MITD03000B".into(),
            name: Some("Istituto Tecnico Carlo Cattaneo".into()),
            area: "NORD OVEST".into(),
            region: "LOMBARDIA".into(),
            province: "MILANO".into(),
            municipality: "MILANO".into(),
        },
    ];
    let classes = vec![
        Class {
            id: "CL-RM-3A".into(),
            school_code: "RMPS12000A".into(),
            name: "3A".into(),
            track: "Liceo Scientifico".into(),
            track_norm: "LICEO SCIENTIFICO".into(),
            course_year: 3,
            headcount: 2,
        },
        Class {
            id: "CL-MI-1B".into(),
            school_code: "MITD03000B".into(),
            name: "1B".into(),
            track: "Tecnico Economico".into(),
            track_norm: "ISTITUTO TECNICO".into(),
            course_year: 1,
            headcount: 2,
        },
    ];
    let students = vec![
        seed_student("STU-0001", "CL-RM-3A", "Giulia", "Conti", "F", "ITA"),
        seed_student("STU-0002", "CL-RM-3A", "Andrei", "Popescu", "M", "ROU"),
        seed_student("STU-0003", "CL-MI-1B", "Luca", "Ferrari", "M", "ITA"),
        seed_student("STU-0004", "CL-MI-1B", "Sara", "Hoxha", "F", "ALB"),
    ];
    let teachers = vec![
        Teacher {
            id: "DOC-001".into(),
            first_name: "Marco".into(),
            last_name: "Rossi".into(),
        },
        Teacher {
            id: "DOC-002".into(),
            first_name: "Elena".into(),
            last_name: "Bianchi".into(),
        },
    ];
    let assignments = vec![
        seed_assignment("DOC-001", "CL-RM-3A", "Matematica"),
        seed_assignment("DOC-001", "CL-MI-1B", "Matematica"),
        seed_assignment("DOC-002", "CL-RM-3A", "Italiano"),
    ];
    let grades = [
        ("VOT-SEED-01", "STU-0001", "DOC-001", "Matematica", 8.0, Scritto, (2023, 10, 12)),
        ("VOT-SEED-02", "STU-0002", "DOC-001", "Matematica", 6.5, Scritto, (2023, 10, 12)),
        ("VOT-SEED-03", "STU-0001", "DOC-002", "Italiano", 7.0, Orale, (2024, 3, 4)),
        ("VOT-SEED-04", "STU-0002", "DOC-002", "Italiano", 5.5, Orale, (2024, 3, 4)),
        ("VOT-SEED-05", "STU-0003", "DOC-001", "Matematica", 9.0, Pratico, (2024, 4, 18)),
        ("VOT-SEED-06", "STU-0004", "DOC-001", "Matematica", 7.5, Scritto, (2023, 12, 1)),
    ]
    .into_iter()
    .map(|(id, student, teacher, subject, value, kind, (y, m, d))| -> anyhow::Result<Grade> {
        Ok(seed_grade(id, student, teacher, subject, value, kind, date(y, m, d)?))
    })
    .collect::<anyhow::Result<Vec<_>>>()?;

    let mut tx = pool.begin().await?;
    insert_batch(&mut *tx, &schools).await?;
    insert_batch(&mut *tx, &classes).await?;
    insert_batch(&mut *tx, &students).await?;
    insert_batch(&mut *tx, &teachers).await?;
    insert_batch(&mut *tx, &assignments).await?;
    insert_batch(&mut *tx, &grades).await?;
    tx.commit().await?;

    Ok(())
}

fn seed_student(
    id: &str,
    class_id: &str,
    first: &str,
    last: &str,
    sex: &str,
    citizenship: &str,
) -> Student {
    Student {
        id: id.into(),
        class_id: class_id.into(),
        first_name: first.into(),
        last_name: last.into(),
        sex: sex.into(),
        citizenship: citizenship.into(),
    }
}

fn seed_assignment(teacher_id: &str, class_id: &str, subject: &str) -> Assignment {
    Assignment {
        teacher_id: teacher_id.into(),
        class_id: class_id.into(),
        subject: subject.into(),
    }
}

fn seed_grade(
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

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

const SCHOOL_COLUMNS: &str = "school_code, name, area, region, province, municipality";
const CLASS_COLUMNS: &str =
    "class_id, school_code, name, track, track_norm, course_year, headcount";
const STUDENT_COLUMNS: &str = "student_id, class_id, first_name, last_name, sex, citizenship";

const STUDENT_FILTER: &str = "($1::text[] IS NULL OR class_id = ANY($1)) \
     AND ($2::text IS NULL OR sex = $2) \
     AND ($3::text IS NULL OR citizenship = $3) \
     AND ($4::text IS NULL OR citizenship <> $4)";

const GRADE_FILTER: &str = "($1::text[] IS NULL OR g.student_id = ANY($1)) \
     AND ($2::date IS NULL OR g.graded_on >= $2) \
     AND ($3::date IS NULL OR g.graded_on < $3) \
     AND ($4::text IS NULL OR g.teacher_id = $4) \
     AND ($5::text IS NULL OR g.subject = $5)";

fn bind_students<'q>(sql: PgQuery<'q>, query: &'q StudentQuery) -> PgQuery<'q> {
    let citizenship = query.citizenship.as_ref();
    sql.bind(query.class_ids.as_slice())
        .bind(query.sex.as_deref())
        .bind(citizenship.and_then(|rule| rule.equals()))
        .bind(citizenship.and_then(|rule| rule.not_equals()))
}

fn bind_grades<'q>(sql: PgQuery<'q>, query: &'q GradeQuery) -> PgQuery<'q> {
    sql.bind(query.students.as_slice())
        .bind(query.dates.lower())
        .bind(query.dates.upper())
        .bind(query.teacher_id.as_deref())
        .bind(query.subject.as_deref())
}

fn school_from_row(row: &PgRow) -> School {
    School {
        code: row.get("school_code"),
        name: row.get("name"),
        area: row.get("area"),
        region: row.get("region"),
        province: row.get("province"),
        municipality: row.get("municipality"),
    }
}

fn class_from_row(row: &PgRow) -> Class {
    Class {
        id: row.get("class_id"),
        school_code: row.get("school_code"),
        name: row.get("name"),
        track: row.get("track"),
        track_norm: row.get("track_norm"),
        course_year: row.get("course_year"),
        headcount: row.get("headcount"),
    }
}

fn student_from_row(row: &PgRow) -> Student {
    Student {
        id: row.get("student_id"),
        class_id: row.get("class_id"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        sex: row.get("sex"),
        citizenship: row.get("citizenship"),
    }
}

fn grade_from_row(row: &PgRow) -> anyhow::Result<Grade> {
    let kind: String = row.get("kind");
    Ok(Grade {
        id: row.get("grade_id"),
        student_id: row.get("student_id"),
        teacher_id: row.get("teacher_id"),
        subject: row.get("subject"),
        value: row.get("value"),
        kind: kind.parse()?,
        date: row.get("graded_on"),
    })
}

fn totals_from_row(row: &PgRow) -> GradeTotals {
    GradeTotals {
        count: row.get("count"),
        sum: row.get("sum"),
    }
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn grouped_totals(
        &self,
        key: &str,
        join: &str,
        query: &GradeQuery,
    ) -> anyhow::Result<Vec<(String, GradeTotals)>> {
        if query.is_void() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {key} AS key, COUNT(*) AS count, SUM(g.value) AS sum \
             FROM gradebook.grades g {join} WHERE {GRADE_FILTER} \
             GROUP BY {key} ORDER BY {key}"
        );
        let rows = bind_grades(sqlx::query(&sql), query)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("grouping grade totals by {key}"))?;
        Ok(rows
            .iter()
            .map(|row| (row.get("key"), totals_from_row(row)))
            .collect())
    }

    async fn count_table(&self, table: &str) -> anyhow::Result<i64> {
        let count: i64 = sqlx::query(&format!("SELECT COUNT(*) AS count FROM gradebook.{table}"))
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("counting gradebook.{table}"))?
            .get("count");
        Ok(count)
    }
}

#[async_trait]
impl EntityStore for PgStore {
    async fn find_schools(&self, query: &SchoolQuery) -> anyhow::Result<Vec<School>> {
        let sql = format!(
            "SELECT {SCHOOL_COLUMNS} FROM gradebook.schools \
             WHERE ($1::text IS NULL OR area = $1) \
             AND ($2::text IS NULL OR region = $2) \
             AND ($3::text IS NULL OR province = $3) \
             AND ($4::text IS NULL OR municipality = $4) \
             ORDER BY school_code"
        );
        let rows = sqlx::query(&sql)
            .bind(query.area.as_deref())
            .bind(query.region.as_deref())
            .bind(query.province.as_deref())
            .bind(query.municipality.as_deref())
            .fetch_all(&self.pool)
            .await
            .context("finding schools")?;
        Ok(rows.iter().map(school_from_row).collect())
    }

    async fn find_classes(&self, query: &ClassQuery) -> anyhow::Result<Vec<Class>> {
        if query.ids.is_empty() || query.school_codes.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {CLASS_COLUMNS} FROM gradebook.classes \
             WHERE ($1::text[] IS NULL OR class_id = ANY($1)) \
             AND ($2::text[] IS NULL OR school_code = ANY($2)) \
             AND ($3::text IS NULL OR school_code = $3) \
             AND ($4::text IS NULL OR track_norm = $4) \
             AND ($5::int4 IS NULL OR course_year = $5) \
             ORDER BY class_id"
        );
        let rows = sqlx::query(&sql)
            .bind(query.ids.as_slice())
            .bind(query.school_codes.as_slice())
            .bind(query.school_code.as_deref())
            .bind(query.track.as_deref())
            .bind(query.course_year)
            .fetch_all(&self.pool)
            .await
            .context("finding classes")?;
        Ok(rows.iter().map(class_from_row).collect())
    }

    async fn find_students(&self, query: &StudentQuery) -> anyhow::Result<Vec<Student>> {
        if query.class_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {STUDENT_COLUMNS} FROM gradebook.students WHERE {STUDENT_FILTER} \
             ORDER BY last_name, first_name, student_id"
        );
        let rows = bind_students(sqlx::query(&sql), query)
            .fetch_all(&self.pool)
            .await
            .context("finding students")?;
        Ok(rows.iter().map(student_from_row).collect())
    }

    async fn count_students(&self, query: &StudentQuery) -> anyhow::Result<i64> {
        if query.class_ids.is_empty() {
            return Ok(0);
        }
        let sql =
            format!("SELECT COUNT(*) AS count FROM gradebook.students WHERE {STUDENT_FILTER}");
        let count: i64 = bind_students(sqlx::query(&sql), query)
            .fetch_one(&self.pool)
            .await
            .context("counting students")?
            .get("count");
        Ok(count)
    }

    async fn count_schools(&self) -> anyhow::Result<i64> {
        self.count_table("schools").await
    }

    async fn count_classes(&self) -> anyhow::Result<i64> {
        self.count_table("classes").await
    }

    async fn count_teachers(&self) -> anyhow::Result<i64> {
        self.count_table("teachers").await
    }

    async fn grade_totals(&self, query: &GradeQuery) -> anyhow::Result<GradeTotals> {
        if query.is_void() {
            return Ok(GradeTotals::default());
        }
        let sql = format!(
            "SELECT COUNT(*) AS count, COALESCE(SUM(g.value), 0) AS sum \
             FROM gradebook.grades g WHERE {GRADE_FILTER}"
        );
        let row = bind_grades(sqlx::query(&sql), query)
            .fetch_one(&self.pool)
            .await
            .context("computing grade totals")?;
        Ok(totals_from_row(&row))
    }

    async fn grade_totals_by_subject(
        &self,
        query: &GradeQuery,
    ) -> anyhow::Result<Vec<(String, GradeTotals)>> {
        self.grouped_totals("g.subject", "", query).await
    }

    async fn grade_totals_by_class(
        &self,
        query: &GradeQuery,
    ) -> anyhow::Result<Vec<(String, GradeTotals)>> {
        self.grouped_totals(
            "s.class_id",
            "JOIN gradebook.students s ON s.student_id = g.student_id",
            query,
        )
        .await
    }

    async fn grade_counts_by_value(&self, query: &GradeQuery) -> anyhow::Result<Vec<(f64, i64)>> {
        if query.is_void() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT g.value AS value, COUNT(*) AS count FROM gradebook.grades g \
             WHERE {GRADE_FILTER} GROUP BY g.value ORDER BY g.value"
        );
        let rows = bind_grades(sqlx::query(&sql), query)
            .fetch_all(&self.pool)
            .await
            .context("counting grades by value")?;
        Ok(rows
            .iter()
            .map(|row| (row.get("value"), row.get("count")))
            .collect())
    }

    async fn distinct_school_values(&self, field: SchoolField) -> anyhow::Result<Vec<String>> {
        let column = field.column();
        let rows = sqlx::query(&format!(
            "SELECT DISTINCT {column} AS value FROM gradebook.schools ORDER BY value"
        ))
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("listing distinct school {column} values"))?;
        Ok(rows.iter().map(|row| row.get("value")).collect())
    }

    async fn distinct_tracks(&self) -> anyhow::Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT DISTINCT track_norm AS value FROM gradebook.classes ORDER BY value",
        )
        .fetch_all(&self.pool)
        .await
        .context("listing distinct tracks")?;
        Ok(rows.iter().map(|row| row.get("value")).collect())
    }

    async fn distinct_course_years(&self) -> anyhow::Result<Vec<i32>> {
        let rows = sqlx::query(
            "SELECT DISTINCT course_year AS value FROM gradebook.classes ORDER BY value",
        )
        .fetch_all(&self.pool)
        .await
        .context("listing distinct course years")?;
        Ok(rows.iter().map(|row| row.get("value")).collect())
    }

    async fn find_student(&self, student_id: &str) -> anyhow::Result<Option<Student>> {
        let sql = format!("SELECT {STUDENT_COLUMNS} FROM gradebook.students WHERE student_id = $1");
        let row = sqlx::query(&sql)
            .bind(student_id)
            .fetch_optional(&self.pool)
            .await
            .context("loading student")?;
        Ok(row.as_ref().map(student_from_row))
    }

    async fn find_class(&self, class_id: &str) -> anyhow::Result<Option<Class>> {
        let sql = format!("SELECT {CLASS_COLUMNS} FROM gradebook.classes WHERE class_id = $1");
        let row = sqlx::query(&sql)
            .bind(class_id)
            .fetch_optional(&self.pool)
            .await
            .context("loading class")?;
        Ok(row.as_ref().map(class_from_row))
    }

    async fn find_teacher(&self, teacher_id: &str) -> anyhow::Result<Option<Teacher>> {
        let row = sqlx::query(
            "SELECT teacher_id, first_name, last_name FROM gradebook.teachers WHERE teacher_id = $1",
        )
        .bind(teacher_id)
        .fetch_optional(&self.pool)
        .await
        .context("loading teacher")?;
        Ok(row.map(|row| Teacher {
            id: row.get("teacher_id"),
            first_name: row.get("first_name"),
            last_name: row.get("last_name"),
        }))
    }

    async fn find_assignments(&self, teacher_id: &str) -> anyhow::Result<Vec<Assignment>> {
        let rows = sqlx::query(
            "SELECT teacher_id, class_id, subject FROM gradebook.assignments \
             WHERE teacher_id = $1 ORDER BY class_id, subject",
        )
        .bind(teacher_id)
        .fetch_all(&self.pool)
        .await
        .context("loading teacher assignments")?;
        Ok(rows
            .iter()
            .map(|row| Assignment {
                teacher_id: row.get("teacher_id"),
                class_id: row.get("class_id"),
                subject: row.get("subject"),
            })
            .collect())
    }

    async fn find_grades(&self, query: &GradeQuery) -> anyhow::Result<Vec<Grade>> {
        if query.is_void() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT g.grade_id, g.student_id, g.teacher_id, g.subject, g.value, g.kind, g.graded_on \
             FROM gradebook.grades g WHERE {GRADE_FILTER} \
             ORDER BY g.graded_on DESC, g.grade_id"
        );
        let rows = bind_grades(sqlx::query(&sql), query)
            .fetch_all(&self.pool)
            .await
            .context("loading grades")?;
        rows.iter().map(grade_from_row).collect()
    }

    async fn insert_grades(&self, grades: &[Grade]) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        insert_batch(&mut *tx, grades).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update_grade(
        &self,
        grade_id: &str,
        teacher_id: &str,
        update: &GradeUpdate,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE gradebook.grades SET value = $3, kind = COALESCE($4, kind) \
             WHERE grade_id = $1 AND teacher_id = $2",
        )
        .bind(grade_id)
        .bind(teacher_id)
        .bind(update.value)
        .bind(update.kind.map(|kind| kind.as_str()))
        .execute(&self.pool)
        .await
        .context("updating grade")?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_grade(&self, grade_id: &str, teacher_id: &str) -> anyhow::Result<bool> {
        let result =
            sqlx::query("DELETE FROM gradebook.grades WHERE grade_id = $1 AND teacher_id = $2")
                .bind(grade_id)
                .bind(teacher_id)
                .execute(&self.pool)
                .await
                .context("deleting grade")?;
        Ok(result.rows_affected() > 0)
    }

    async fn integrity(&self) -> anyhow::Result<IntegrityCounts> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM gradebook.students) AS students,
                (SELECT COUNT(*) FROM gradebook.students s
                    WHERE NOT EXISTS (SELECT 1 FROM gradebook.classes c WHERE c.class_id = s.class_id))
                    AS students_without_class,
                (SELECT COUNT(*) FROM gradebook.classes c
                    WHERE NOT EXISTS (SELECT 1 FROM gradebook.schools s WHERE s.school_code = c.school_code))
                    AS classes_without_school,
                (SELECT COUNT(*) FROM gradebook.grades) AS grades,
                (SELECT COUNT(*) FROM gradebook.grades g
                    WHERE NOT EXISTS (SELECT 1 FROM gradebook.students s WHERE s.student_id = g.student_id))
                    AS grades_without_student,
                (SELECT COUNT(*) FROM gradebook.grades g
                    WHERE NOT EXISTS (SELECT 1 FROM gradebook.teachers t WHERE t.teacher_id = g.teacher_id))
                    AS grades_without_teacher
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("running integrity audit")?;

        Ok(IntegrityCounts {
            students: row.get("students"),
            students_without_class: row.get("students_without_class"),
            classes_without_school: row.get("classes_without_school"),
            grades: row.get("grades"),
            grades_without_student: row.get("grades_without_student"),
            grades_without_teacher: row.get("grades_without_teacher"),
        })
    }
}
