use std::fmt::Write;

use crate::aggregate::{GradeBucket, SubjectAverage};
use crate::compare::{Comparison, Dimension, Population};
use crate::filters::StatsParams;
use crate::models::IntegrityCounts;
use crate::stats::GeneralStats;

/// Everything the statistics report renders, computed for one filter set.
pub struct ReportData {
    pub general: GeneralStats,
    pub distribution: Vec<GradeBucket>,
    pub averages: Vec<SubjectAverage>,
    pub rankings: Vec<(Dimension, Vec<Comparison>)>,
}

pub fn describe_filters(params: &StatsParams) -> String {
    let fields = [
        ("areageografica", &params.area),
        ("regione", &params.region),
        ("provincia", &params.province),
        ("comune", &params.municipality),
        ("codicescuola", &params.school_code),
        ("indirizzo", &params.track),
        ("annocorso", &params.course_year),
        ("quadrimestre", &params.semester),
        ("sesso", &params.sex),
        ("cittadinanza", &params.citizenship),
    ];

    let applied: Vec<String> = fields
        .iter()
        .filter_map(|(name, value)| {
            let value = value.as_deref()?.trim();
            (!value.is_empty()).then(|| format!("{name}={value}"))
        })
        .collect();

    if applied.is_empty() {
        "all schools".to_string()
    } else {
        applied.join(", ")
    }
}

pub fn build_report(scope: &str, data: &ReportData) -> String {
    let mut output = String::new();
    let general = &data.general;

    let _ = writeln!(output, "# Gradebook Statistics Report");
    let _ = writeln!(output, "Generated for {scope}");
    let _ = writeln!(output);
    let _ = writeln!(output, "## Overview");
    let _ = writeln!(output, "- Students: {}", general.studenti);
    let _ = writeln!(output, "- Teachers: {}", general.docenti);
    let _ = writeln!(output, "- Classes: {}", general.classi);
    let _ = writeln!(output, "- Grades: {}", general.voti);
    let _ = writeln!(output, "- Average grade: {}", general.media_voti);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Grade Distribution");
    let filled: Vec<&GradeBucket> = data
        .distribution
        .iter()
        .filter(|bucket| bucket.count > 0)
        .collect();
    if filled.is_empty() {
        let _ = writeln!(output, "No whole-point grades in this selection.");
    } else {
        for bucket in filled {
            let _ = writeln!(output, "- {}: {} grades", bucket.voto, bucket.count);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Average per Subject");
    if data.averages.is_empty() {
        let _ = writeln!(output, "No grades recorded for this selection.");
    } else {
        for average in &data.averages {
            let _ = writeln!(output, "- {}: {}", average.materia, average.media);
        }
    }

    for (dimension, entries) in &data.rankings {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Ranking by {}", dimension.title());
        let _ = writeln!(
            output,
            "| {} | Average | Grades | Students | {} |",
            dimension.title(),
            population_label(*dimension)
        );
        let _ = writeln!(output, "|---|---|---|---|---|");
        for entry in entries {
            let population = match entry.population {
                Population::Schools(n) | Population::Classes(n) => n,
            };
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} | {} |",
                entry.key.value(),
                entry.media_voti,
                entry.numero_voti,
                entry.numero_studenti,
                population
            );
        }
    }

    output
}

fn population_label(dimension: Dimension) -> &'static str {
    match dimension {
        Dimension::Area | Dimension::Region => "Schools",
        Dimension::Track => "Classes",
    }
}

pub fn build_integrity_report(counts: &IntegrityCounts) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Gradebook Integrity Report");
    let _ = writeln!(output);
    let _ = writeln!(output, "## Students");
    let _ = writeln!(output, "- Total: {}", counts.students);
    let _ = writeln!(output, "- Without a class: {}", counts.students_without_class);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Classes");
    let _ = writeln!(output, "- Without a school: {}", counts.classes_without_school);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Grades");
    let _ = writeln!(output, "- Total: {}", counts.grades);
    let _ = writeln!(output, "- Without a student: {}", counts.grades_without_student);
    let _ = writeln!(output, "- Without a teacher: {}", counts.grades_without_teacher);

    let orphans = counts.students_without_class
        + counts.classes_without_school
        + counts.grades_without_student
        + counts.grades_without_teacher;
    let _ = writeln!(output);
    if orphans == 0 {
        let _ = writeln!(output, "No orphan references found.");
    } else {
        let _ = writeln!(output, "{orphans} orphan references found; nothing was modified.");
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{dense_distribution, Rounded};
    use crate::compare::DimensionKey;

    fn general(voti: i64) -> GeneralStats {
        GeneralStats {
            studenti: 8,
            docenti: 3,
            classi: 5,
            voti,
            media_voti: if voti == 0 {
                Rounded::default()
            } else {
                Rounded::value(7.5)
            },
        }
    }

    #[test]
    fn describes_only_supplied_filters() {
        let params = StatsParams {
            region: Some("Lazio".into()),
            sex: Some("  ".into()),
            course_year: Some("2".into()),
            ..StatsParams::default()
        };
        assert_eq!(describe_filters(&params), "regione=Lazio, annocorso=2");
        assert_eq!(describe_filters(&StatsParams::default()), "all schools");
    }

    #[test]
    fn renders_overview_distribution_and_rankings() {
        let data = ReportData {
            general: general(3),
            distribution: dense_distribution(&[(6.0, 1), (9.0, 2)]),
            averages: vec![SubjectAverage {
                materia: "Matematica".into(),
                media: Rounded::value(8.0),
            }],
            rankings: vec![(
                Dimension::Region,
                vec![Comparison {
                    key: DimensionKey::Region("Lazio".into()),
                    media_voti: Rounded::value(6.71),
                    numero_voti: 7,
                    numero_studenti: 6,
                    population: Population::Schools(2),
                }],
            )],
        };

        let report = build_report("regione=Lazio", &data);
        assert!(report.contains("Generated for regione=Lazio"));
        assert!(report.contains("- Average grade: 7.50"));
        assert!(report.contains("- 9: 2 grades"));
        assert!(!report.contains("- 0: 0 grades"));
        assert!(report.contains("- Matematica: 8.00"));
        assert!(report.contains("| Regione | Average | Grades | Students | Schools |"));
        assert!(report.contains("| Lazio | 6.71 | 7 | 6 | 2 |"));
    }

    #[test]
    fn empty_selection_says_so() {
        let data = ReportData {
            general: general(0),
            distribution: dense_distribution(&[]),
            averages: Vec::new(),
            rankings: Vec::new(),
        };

        let report = build_report("all schools", &data);
        assert!(report.contains("- Average grade: 0.00"));
        assert!(report.contains("No whole-point grades in this selection."));
        assert!(report.contains("No grades recorded for this selection."));
    }

    #[test]
    fn fractional_grades_leave_no_empty_distribution_heading() {
        let data = ReportData {
            general: general(2),
            distribution: dense_distribution(&[(7.5, 2)]),
            averages: vec![SubjectAverage {
                materia: "Italiano".into(),
                media: Rounded::value(7.5),
            }],
            rankings: Vec::new(),
        };

        let report = build_report("all schools", &data);
        let section = report
            .split("## Grade Distribution\n")
            .nth(1)
            .and_then(|rest| rest.lines().next())
            .unwrap();
        assert_eq!(section, "No whole-point grades in this selection.");
        assert!(report.contains("- Italiano: 7.50"));
    }

    #[test]
    fn integrity_report_totals_orphans() {
        let counts = IntegrityCounts {
            students: 10,
            students_without_class: 1,
            classes_without_school: 0,
            grades: 40,
            grades_without_student: 2,
            grades_without_teacher: 0,
        };

        let report = build_integrity_report(&counts);
        assert!(report.contains("- Without a class: 1"));
        assert!(report.contains("3 orphan references found"));

        let clean = build_integrity_report(&IntegrityCounts::default());
        assert!(clean.contains("No orphan references found."));
    }
}
