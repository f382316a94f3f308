use std::collections::HashMap;

use serde::Serialize;

use crate::aggregate::Rounded;
use crate::config::OUTLIER_THRESHOLD;
use crate::models::{Class, GradeTotals};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Deviation {
    SopraMedia,
    SottoMedia,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassOutlier {
    pub classe: String,
    pub indirizzo: String,
    pub media_classe: Rounded,
    pub media_generale: Rounded,
    pub scostamento: Rounded,
    pub tipo: Deviation,
    pub numero_studenti: i32,
    pub numero_voti: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlierReport {
    pub media_generale: Rounded,
    pub outliers: Vec<ClassOutlier>,
}

/// Classes whose average is more than [`OUTLIER_THRESHOLD`] points away from
/// the global average, largest deviation first. Classes without grades are
/// never outliers.
pub fn find_outliers(
    classes: &[Class],
    class_totals: &[(String, GradeTotals)],
    global: &GradeTotals,
) -> OutlierReport {
    let media_generale = Rounded::mean(global);
    let Some(global_mean) = global.mean() else {
        return OutlierReport {
            media_generale,
            outliers: Vec::new(),
        };
    };

    let totals: HashMap<&str, &GradeTotals> = class_totals
        .iter()
        .map(|(class_id, totals)| (class_id.as_str(), totals))
        .collect();

    let mut flagged: Vec<(f64, ClassOutlier)> = Vec::new();
    for class in classes {
        let Some(class_totals) = totals.get(class.id.as_str()) else {
            continue;
        };
        let Some(mean) = class_totals.mean() else {
            continue;
        };

        let deviation = mean - global_mean;
        if deviation.abs() <= OUTLIER_THRESHOLD {
            continue;
        }

        flagged.push((
            deviation.abs(),
            ClassOutlier {
                classe: class.name.clone(),
                indirizzo: class.track.clone(),
                media_classe: Rounded::value(mean),
                media_generale,
                scostamento: Rounded::value(deviation),
                tipo: if deviation > 0.0 {
                    Deviation::SopraMedia
                } else {
                    Deviation::SottoMedia
                },
                numero_studenti: class.headcount,
                numero_voti: class_totals.count,
            },
        ));
    }

    flagged.sort_by(|a, b| b.0.total_cmp(&a.0));
    OutlierReport {
        media_generale,
        outliers: flagged.into_iter().map(|(_, outlier)| outlier).collect(),
    }
}
