//! Student and teacher registry: personal grade views and grade management.

use std::collections::BTreeSet;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::aggregate::{AggregationEngine, GradeBucket, Rounded, SubjectAverage};
use crate::auth::{StudentId, TeacherId};
use crate::error::AppError;
use crate::models::{AssessmentKind, Assignment, Grade, GradeUpdate, Student, Teacher};
use crate::server::AppState;
use crate::store::{DateWindow, EntityStore, GradeQuery, Narrowing, StudentQuery};

const STUDENT_NOT_FOUND: &str = "Studente non trovato";
const TEACHER_NOT_FOUND: &str = "Docente non trovato";
const GRADE_NOT_FOUND: &str = "Voto non trovato o non autorizzato";
const INVALID_PAYLOAD: &str = "Dati incompleti o errati";

#[derive(Debug, Serialize)]
pub struct Message {
    pub messaggio: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StudentInfo {
    pub nome: String,
    pub cognome: String,
    pub classe: String,
}

#[derive(Debug, Serialize)]
pub struct TeacherInfo {
    pub nome: String,
    pub cognome: String,
}

#[derive(Debug, Serialize)]
pub struct StudentGrades {
    pub studente: Student,
    pub voti: Vec<Grade>,
}

#[derive(Debug, Serialize)]
pub struct Grades {
    pub voti: Vec<Grade>,
}

#[derive(Debug, Serialize)]
pub struct Average {
    pub media: Rounded,
}

#[derive(Debug, Serialize)]
pub struct SubjectAverages {
    pub medie: Vec<SubjectAverage>,
}

#[derive(Debug, Serialize)]
pub struct Distribution {
    pub distribuzione: Vec<GradeBucket>,
}

#[derive(Debug, Serialize)]
pub struct Subjects {
    pub materie: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ClassStudentRow {
    pub id_classe: String,
    pub nome_classe: String,
    pub studente: Student,
    pub voti: Vec<Grade>,
}

#[derive(Debug, Serialize)]
pub struct TeacherClasses {
    pub docente: Teacher,
    pub classi: Vec<ClassStudentRow>,
}

#[derive(Debug, Serialize)]
pub struct GradedStudent {
    pub studente: Student,
    pub voti: Vec<Grade>,
}

#[derive(Debug, Serialize)]
pub struct ClassRoster {
    pub id_classe: String,
    pub nome_classe: String,
    pub studenti: Vec<GradedStudent>,
}

#[derive(Debug, Serialize)]
pub struct Rosters {
    pub classi: Vec<ClassRoster>,
}

#[derive(Debug, Serialize)]
pub struct StudentAverage {
    pub id_studente: String,
    pub media: Rounded,
}

#[derive(Debug, Serialize)]
pub struct ClassSubjectAverage {
    pub id_classe: String,
    pub materia: String,
    pub media: Rounded,
}

#[derive(Debug, Serialize)]
pub struct GradeCreated {
    pub messaggio: &'static str,
    pub voto: Grade,
}

#[derive(Debug, Default, Deserialize)]
pub struct DateRange {
    #[serde(rename = "dataInizio")]
    pub from: Option<String>,
    #[serde(rename = "dataFine")]
    pub until: Option<String>,
}

impl DateRange {
    /// Both bounds are inclusive calendar days.
    fn window(&self) -> Result<DateWindow, AppError> {
        let invalid = || AppError::BadRequest("Intervallo di date non valido".into());
        let from = parse_date(self.from.as_deref()).ok_or_else(invalid)?;
        let last = parse_date(self.until.as_deref()).ok_or_else(invalid)?;
        let until = last.succ_opt().ok_or_else(invalid)?;
        Ok(DateWindow::Between { from, until })
    }
}

fn parse_date(raw: Option<&str>) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw?.trim(), "%Y-%m-%d").ok()
}

#[derive(Debug, Deserialize)]
pub struct NewGrade {
    pub id_studente: Option<String>,
    pub materia: Option<String>,
    pub voto: Option<f64>,
    pub tipo: Option<String>,
    pub data: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GradeEdit {
    pub id_voto: Option<String>,
    pub voto: Option<f64>,
    pub tipologia: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GradeRef {
    pub id_voto: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ClassGradeEntry {
    pub id_studente: Option<String>,
    pub voto: Option<f64>,
    pub materia: Option<String>,
    pub tipo: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ClassGrades {
    pub id_classe: Option<String>,
    pub materia: Option<String>,
    pub tipo: Option<String>,
    #[serde(default)]
    pub voti: Vec<ClassGradeEntry>,
}

fn payload<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    body.map(|Json(value)| value)
        .map_err(|_| AppError::BadRequest(INVALID_PAYLOAD.into()))
}

fn required(value: Option<String>) -> Result<String, AppError> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::BadRequest(INVALID_PAYLOAD.into()))
}

fn grade_value(value: Option<f64>) -> Result<f64, AppError> {
    value
        .filter(|value| value.is_finite())
        .ok_or_else(|| AppError::BadRequest(INVALID_PAYLOAD.into()))
}

fn assessment_kind(value: &str) -> Result<AssessmentKind, AppError> {
    value
        .parse()
        .map_err(|_| AppError::BadRequest(INVALID_PAYLOAD.into()))
}

fn new_grade_id() -> String {
    format!("VOT{}", Uuid::new_v4().simple())
}

/// The assignment that lets `assignments`' teacher grade `student` in
/// `subject`, compared case-insensitively.
fn authorizing<'a>(
    assignments: &'a [Assignment],
    student: &Student,
    subject: &str,
) -> Result<&'a Assignment, AppError> {
    let subject = subject.to_lowercase();
    assignments
        .iter()
        .find(|a| a.class_id == student.class_id && a.subject.to_lowercase() == subject)
        .ok_or(AppError::Forbidden("Accesso negato"))
}

async fn student_or_404(store: &dyn EntityStore, student_id: &str) -> Result<Student, AppError> {
    store
        .find_student(student_id)
        .await?
        .ok_or(AppError::NotFound(STUDENT_NOT_FOUND))
}

async fn teacher_or_404(store: &dyn EntityStore, teacher_id: &str) -> Result<Teacher, AppError> {
    store
        .find_teacher(teacher_id)
        .await?
        .ok_or(AppError::NotFound(TEACHER_NOT_FOUND))
}

fn teacher_grades_of(student_id: &str, teacher_id: &str) -> GradeQuery {
    GradeQuery {
        teacher_id: Some(teacher_id.to_string()),
        ..GradeQuery::for_student(student_id)
    }
}

// student routes

pub async fn student_info(
    State(state): State<AppState>,
    StudentId(student_id): StudentId,
) -> Result<Json<StudentInfo>, AppError> {
    let store = state.store.as_ref();
    let student = student_or_404(store, &student_id).await?;
    let class = store.find_class(&student.class_id).await?;

    Ok(Json(StudentInfo {
        nome: student.first_name,
        cognome: student.last_name,
        classe: class.map_or_else(|| "N/D".to_string(), |class| class.name),
    }))
}

pub async fn student_grades(
    State(state): State<AppState>,
    StudentId(student_id): StudentId,
) -> Result<Json<StudentGrades>, AppError> {
    let store = state.store.as_ref();
    let studente = student_or_404(store, &student_id).await?;
    let voti = store.find_grades(&GradeQuery::for_student(&student_id)).await?;
    Ok(Json(StudentGrades { studente, voti }))
}

pub async fn student_grades_by_subject(
    State(state): State<AppState>,
    StudentId(student_id): StudentId,
    Path(subject): Path<String>,
) -> Result<Json<Grades>, AppError> {
    let query = GradeQuery {
        subject: Some(subject),
        ..GradeQuery::for_student(&student_id)
    };
    let voti = state.store.find_grades(&query).await?;
    Ok(Json(Grades { voti }))
}

pub async fn student_grades_between(
    State(state): State<AppState>,
    StudentId(student_id): StudentId,
    Query(range): Query<DateRange>,
) -> Result<Json<Grades>, AppError> {
    let query = GradeQuery {
        dates: range.window()?,
        ..GradeQuery::for_student(&student_id)
    };
    let voti = state.store.find_grades(&query).await?;
    Ok(Json(Grades { voti }))
}

pub async fn student_average(
    State(state): State<AppState>,
    StudentId(student_id): StudentId,
) -> Result<Json<Average>, AppError> {
    let engine = AggregationEngine::new(state.store.as_ref());
    let media = engine.average(&GradeQuery::for_student(&student_id)).await?;
    Ok(Json(Average { media }))
}

pub async fn student_average_per_subject(
    State(state): State<AppState>,
    StudentId(student_id): StudentId,
) -> Result<Json<SubjectAverages>, AppError> {
    let engine = AggregationEngine::new(state.store.as_ref());
    let medie = engine
        .average_per_subject(&GradeQuery::for_student(&student_id))
        .await?;
    Ok(Json(SubjectAverages { medie }))
}

pub async fn student_grade_distribution(
    State(state): State<AppState>,
    StudentId(student_id): StudentId,
) -> Result<Json<Distribution>, AppError> {
    let engine = AggregationEngine::new(state.store.as_ref());
    let distribuzione = engine
        .distribution(&GradeQuery::for_student(&student_id))
        .await?;
    Ok(Json(Distribution { distribuzione }))
}

// teacher routes

pub async fn teacher_info(
    State(state): State<AppState>,
    TeacherId(teacher_id): TeacherId,
) -> Result<Json<TeacherInfo>, AppError> {
    let teacher = teacher_or_404(state.store.as_ref(), &teacher_id).await?;
    Ok(Json(TeacherInfo {
        nome: teacher.first_name,
        cognome: teacher.last_name,
    }))
}

pub async fn teacher_subjects(
    State(state): State<AppState>,
    TeacherId(teacher_id): TeacherId,
) -> Result<Json<Subjects>, AppError> {
    let assignments = state.store.find_assignments(&teacher_id).await?;
    let materie: BTreeSet<String> = assignments.into_iter().map(|a| a.subject).collect();
    Ok(Json(Subjects {
        materie: materie.into_iter().collect(),
    }))
}

/// Each assigned class with its students and the grades `teacher_id` gave
/// them, in class id order.
async fn rosters(store: &dyn EntityStore, teacher_id: &str) -> anyhow::Result<Vec<ClassRoster>> {
    let class_ids: BTreeSet<String> = store
        .find_assignments(teacher_id)
        .await?
        .into_iter()
        .map(|a| a.class_id)
        .collect();

    let mut rosters = Vec::with_capacity(class_ids.len());
    for class_id in class_ids {
        let Some(class) = store.find_class(&class_id).await? else {
            continue;
        };
        let students = store
            .find_students(&StudentQuery {
                class_ids: Narrowing::Only(vec![class_id.clone()]),
                ..StudentQuery::default()
            })
            .await?;
        let grades = store
            .find_grades(&GradeQuery {
                students: Narrowing::Only(students.iter().map(|s| s.id.clone()).collect()),
                teacher_id: Some(teacher_id.to_string()),
                ..GradeQuery::default()
            })
            .await?;

        let studenti = students
            .into_iter()
            .map(|studente| GradedStudent {
                voti: grades
                    .iter()
                    .filter(|g| g.student_id == studente.id)
                    .cloned()
                    .collect(),
                studente,
            })
            .collect();
        rosters.push(ClassRoster {
            id_classe: class.id,
            nome_classe: class.name,
            studenti,
        });
    }
    Ok(rosters)
}

pub async fn teacher_classes(
    State(state): State<AppState>,
    TeacherId(teacher_id): TeacherId,
) -> Result<Json<TeacherClasses>, AppError> {
    let store = state.store.as_ref();
    let docente = teacher_or_404(store, &teacher_id).await?;

    let classi = rosters(store, &teacher_id)
        .await?
        .into_iter()
        .flat_map(|roster| {
            let ClassRoster {
                id_classe,
                nome_classe,
                studenti,
            } = roster;
            studenti.into_iter().map(move |entry| ClassStudentRow {
                id_classe: id_classe.clone(),
                nome_classe: nome_classe.clone(),
                studente: entry.studente,
                voti: entry.voti,
            })
        })
        .collect();

    Ok(Json(TeacherClasses { docente, classi }))
}

pub async fn teacher_classes_with_students(
    State(state): State<AppState>,
    TeacherId(teacher_id): TeacherId,
) -> Result<Json<Rosters>, AppError> {
    let classi = rosters(state.store.as_ref(), &teacher_id).await?;
    Ok(Json(Rosters { classi }))
}

pub async fn teacher_student_grades(
    State(state): State<AppState>,
    TeacherId(teacher_id): TeacherId,
    Path(student_id): Path<String>,
) -> Result<Json<StudentGrades>, AppError> {
    let store = state.store.as_ref();
    let studente = student_or_404(store, &student_id).await?;
    let voti = store
        .find_grades(&teacher_grades_of(&student_id, &teacher_id))
        .await?;
    Ok(Json(StudentGrades { studente, voti }))
}

pub async fn teacher_student_grades_between(
    State(state): State<AppState>,
    TeacherId(teacher_id): TeacherId,
    Path(student_id): Path<String>,
    Query(range): Query<DateRange>,
) -> Result<Json<Grades>, AppError> {
    let query = GradeQuery {
        dates: range.window()?,
        ..teacher_grades_of(&student_id, &teacher_id)
    };
    let voti = state.store.find_grades(&query).await?;
    Ok(Json(Grades { voti }))
}

pub async fn teacher_student_average(
    State(state): State<AppState>,
    TeacherId(teacher_id): TeacherId,
    Path(student_id): Path<String>,
) -> Result<Json<StudentAverage>, AppError> {
    let engine = AggregationEngine::new(state.store.as_ref());
    let media = engine
        .average(&teacher_grades_of(&student_id, &teacher_id))
        .await?;
    Ok(Json(StudentAverage {
        id_studente: student_id,
        media,
    }))
}

pub async fn class_subject_average(
    State(state): State<AppState>,
    TeacherId(_): TeacherId,
    Path((class_id, subject)): Path<(String, String)>,
) -> Result<Json<ClassSubjectAverage>, AppError> {
    let store = state.store.as_ref();
    let students = store
        .find_students(&StudentQuery {
            class_ids: Narrowing::Only(vec![class_id.clone()]),
            ..StudentQuery::default()
        })
        .await?;
    let query = GradeQuery {
        students: Narrowing::Only(students.into_iter().map(|s| s.id).collect()),
        subject: Some(subject.clone()),
        ..GradeQuery::default()
    };
    let media = AggregationEngine::new(store).average(&query).await?;

    Ok(Json(ClassSubjectAverage {
        id_classe: class_id,
        materia: subject,
        media,
    }))
}

pub async fn create_grade(
    State(state): State<AppState>,
    TeacherId(teacher_id): TeacherId,
    body: Result<Json<NewGrade>, JsonRejection>,
) -> Result<(StatusCode, Json<GradeCreated>), AppError> {
    let body = payload(body)?;
    let student_id = required(body.id_studente)?;
    let subject = required(body.materia)?;
    let value = grade_value(body.voto)?;
    let kind = assessment_kind(&required(body.tipo)?)?;
    let date = parse_date(body.data.as_deref())
        .ok_or_else(|| AppError::BadRequest(INVALID_PAYLOAD.into()))?;

    let store = state.store.as_ref();
    let student = student_or_404(store, &student_id).await?;
    let assignments = store.find_assignments(&teacher_id).await?;
    let assignment = authorizing(&assignments, &student, &subject)?;

    let grade = Grade {
        id: new_grade_id(),
        student_id,
        teacher_id,
        subject: assignment.subject.clone(),
        value,
        kind,
        date,
    };
    store.insert_grades(std::slice::from_ref(&grade)).await?;
    info!("grade {} recorded by {}", grade.id, grade.teacher_id);

    Ok((
        StatusCode::CREATED,
        Json(GradeCreated {
            messaggio: "Voto inserito",
            voto: grade,
        }),
    ))
}

pub async fn update_grade(
    State(state): State<AppState>,
    TeacherId(teacher_id): TeacherId,
    body: Result<Json<GradeEdit>, JsonRejection>,
) -> Result<Json<Message>, AppError> {
    let body = payload(body)?;
    let grade_id = required(body.id_voto)?;
    let update = GradeUpdate {
        value: grade_value(body.voto)?,
        kind: body.tipologia.as_deref().map(assessment_kind).transpose()?,
    };

    if !state.store.update_grade(&grade_id, &teacher_id, &update).await? {
        return Err(AppError::NotFound(GRADE_NOT_FOUND));
    }
    Ok(Json(Message {
        messaggio: "Voto modificato",
    }))
}

pub async fn delete_grade(
    State(state): State<AppState>,
    TeacherId(teacher_id): TeacherId,
    body: Result<Json<GradeRef>, JsonRejection>,
) -> Result<Json<Message>, AppError> {
    let grade_id = required(payload(body)?.id_voto)?;

    if !state.store.delete_grade(&grade_id, &teacher_id).await? {
        return Err(AppError::NotFound(GRADE_NOT_FOUND));
    }
    Ok(Json(Message {
        messaggio: "Voto eliminato",
    }))
}

/// Records one grade per entry, dated today. Every entry is validated and
/// authorized before anything is written.
pub async fn create_class_grades(
    State(state): State<AppState>,
    TeacherId(teacher_id): TeacherId,
    body: Result<Json<ClassGrades>, JsonRejection>,
) -> Result<(StatusCode, Json<Message>), AppError> {
    let body = payload(body)?;
    let class_id = required(body.id_classe)?;
    let default_subject = required(body.materia)?;
    let default_kind = required(body.tipo)?;
    if body.voti.is_empty() {
        return Err(AppError::BadRequest("Nessun voto valido da inserire".into()));
    }

    let store = state.store.as_ref();
    let assignments = store.find_assignments(&teacher_id).await?;
    let today = Utc::now().date_naive();

    let mut grades = Vec::with_capacity(body.voti.len());
    for entry in body.voti {
        let student = student_or_404(store, &required(entry.id_studente)?).await?;
        if student.class_id != class_id {
            return Err(AppError::Forbidden("Accesso negato"));
        }
        let subject = entry.materia.unwrap_or_else(|| default_subject.clone());
        let kind = assessment_kind(entry.tipo.as_deref().unwrap_or(&default_kind))?;
        let assignment = authorizing(&assignments, &student, &subject)?;

        grades.push(Grade {
            id: new_grade_id(),
            student_id: student.id,
            teacher_id: teacher_id.clone(),
            subject: assignment.subject.clone(),
            value: grade_value(entry.voto)?,
            kind,
            date: today,
        });
    }

    store.insert_grades(&grades).await?;
    info!("{} grades recorded by {teacher_id} for class {class_id}", grades.len());

    Ok((
        StatusCode::CREATED,
        Json(Message {
            messaggio: "Voti inseriti correttamente",
        }),
    ))
}
