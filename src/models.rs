use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct School {
    #[serde(rename = "codicescuola")]
    pub code: String,
    #[serde(rename = "denominazionescuola", default)]
    pub name: Option<String>,
    #[serde(rename = "areageografica")]
    pub area: String,
    #[serde(rename = "regione")]
    pub region: String,
    #[serde(rename = "provincia")]
    pub province: String,
    #[serde(rename = "descrizionecomune")]
    pub municipality: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Class {
    #[serde(rename = "id_classe")]
    pub id: String,
    #[serde(rename = "codicescuola")]
    pub school_code: String,
    #[serde(rename = "nome_classe")]
    pub name: String,
    #[serde(rename = "indirizzo")]
    pub track: String,
    #[serde(rename = "indirizzo_norm")]
    pub track_norm: String,
    #[serde(rename = "annocorso")]
    pub course_year: i32,
    #[serde(rename = "num_studenti", default)]
    pub headcount: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    #[serde(rename = "id_studente")]
    pub id: String,
    #[serde(rename = "id_classe")]
    pub class_id: String,
    #[serde(rename = "nome")]
    pub first_name: String,
    #[serde(rename = "cognome")]
    pub last_name: String,
    #[serde(rename = "sesso")]
    pub sex: String,
    #[serde(rename = "cittadinanza")]
    pub citizenship: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Teacher {
    #[serde(rename = "id_docente")]
    pub id: String,
    #[serde(rename = "nome")]
    pub first_name: String,
    #[serde(rename = "cognome")]
    pub last_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    #[serde(rename = "id_docente")]
    pub teacher_id: String,
    #[serde(rename = "id_classe")]
    pub class_id: String,
    #[serde(rename = "materia")]
    pub subject: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssessmentKind {
    Scritto,
    Orale,
    Pratico,
}

impl AssessmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssessmentKind::Scritto => "scritto",
            AssessmentKind::Orale => "orale",
            AssessmentKind::Pratico => "pratico",
        }
    }
}

impl fmt::Display for AssessmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssessmentKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "scritto" => Ok(AssessmentKind::Scritto),
            "orale" => Ok(AssessmentKind::Orale),
            "pratico" => Ok(AssessmentKind::Pratico),
            other => Err(anyhow::anyhow!("unknown assessment kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grade {
    #[serde(rename = "id_voto")]
    pub id: String,
    #[serde(rename = "id_studente")]
    pub student_id: String,
    #[serde(rename = "id_docente")]
    pub teacher_id: String,
    #[serde(rename = "materia")]
    pub subject: String,
    #[serde(rename = "voto")]
    pub value: f64,
    #[serde(rename = "tipologia")]
    pub kind: AssessmentKind,
    #[serde(rename = "data")]
    pub date: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct GradeUpdate {
    pub value: f64,
    pub kind: Option<AssessmentKind>,
}

/// Count and sum of the grade values behind one aggregate.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GradeTotals {
    pub count: i64,
    pub sum: f64,
}

impl GradeTotals {
    pub fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }

    #[cfg(test)]
    pub fn add(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntegrityCounts {
    pub students: i64,
    pub students_without_class: i64,
    pub classes_without_school: i64,
    pub grades: i64,
    pub grades_without_student: i64,
    pub grades_without_teacher: i64,
}
