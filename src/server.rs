use std::{sync::Arc, time::Duration};

use axum::{
    http::{header::AUTHORIZATION, header::CONTENT_TYPE, Method},
    routing::{get, post},
    Router,
};
use tokio::{net::TcpListener, signal::ctrl_c};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::config::AcademicCalendar;
use crate::registry;
use crate::stats::{self, Statistics};
use crate::store::EntityStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EntityStore>,
    pub calendar: AcademicCalendar,
}

impl AppState {
    pub fn statistics(&self) -> Statistics<'_> {
        Statistics::new(self.store.as_ref(), &self.calendar)
    }
}

async fn banner() -> &'static str {
    "Gradebook statistics API is running"
}

fn statistics_routes() -> Router<AppState> {
    Router::new()
        .route("/general", get(stats::general))
        .route(
            "/citizenship-distribution",
            get(stats::citizenship_distribution),
        )
        .route("/grades-per-subject", get(stats::grades_per_subject))
        .route("/average-per-subject", get(stats::average_per_subject))
        .route("/classes-per-year", get(stats::classes_per_year_handler))
        .route("/students-per-year", get(stats::students_per_year_handler))
        .route("/grade-distribution", get(stats::grade_distribution))
        .route("/compare-area", get(stats::compare_area))
        .route("/compare-region", get(stats::compare_region))
        .route("/compare-track", get(stats::compare_track))
        .route("/filter-options", get(stats::filter_options))
        .route("/temporal-trend", get(stats::temporal_trend))
        .route("/class-outliers", get(stats::class_outliers))
}

fn student_routes() -> Router<AppState> {
    Router::new()
        .route("/info", get(registry::student_info))
        .route("/grades", get(registry::student_grades))
        .route(
            "/grades/subject/{materia}",
            get(registry::student_grades_by_subject),
        )
        .route("/grades/between", get(registry::student_grades_between))
        .route("/average", get(registry::student_average))
        .route(
            "/average-per-subject",
            get(registry::student_average_per_subject),
        )
        .route(
            "/grade-distribution",
            get(registry::student_grade_distribution),
        )
}

fn teacher_routes() -> Router<AppState> {
    Router::new()
        .route("/info", get(registry::teacher_info))
        .route("/subjects", get(registry::teacher_subjects))
        .route("/classes", get(registry::teacher_classes))
        .route(
            "/classes-with-students",
            get(registry::teacher_classes_with_students),
        )
        .route("/student/{id}/grades", get(registry::teacher_student_grades))
        .route(
            "/student/{id}/grades/between",
            get(registry::teacher_student_grades_between),
        )
        .route(
            "/student/{id}/average",
            get(registry::teacher_student_average),
        )
        .route(
            "/class/{id}/subject/{materia}/average",
            get(registry::class_subject_average),
        )
        .route(
            "/grade",
            post(registry::create_grade)
                .put(registry::update_grade)
                .delete(registry::delete_grade),
        )
        .route(
            "/class/grades",
            post(registry::create_class_grades),
        )
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/", get(banner))
        .route("/api/home/stats", get(stats::home_stats))
        .nest("/api/statistics", statistics_routes())
        .nest("/api/registry/student", student_routes())
        .nest("/api/registry/teacher", teacher_routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serves until ctrl-c or SIGTERM, then lets in-flight requests finish.
pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let address = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let interrupt = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                tracing::error!("Failed to listen for Ctrl+C: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => {},
        _ = terminate => {},
    }
}
